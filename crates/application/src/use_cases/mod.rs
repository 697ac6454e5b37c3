pub mod debug_dump;

pub use debug_dump::{debug_dump, DebugDumpRequest};
