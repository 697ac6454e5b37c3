mod engine;
mod index;

pub use engine::{FilterListEngine, ListSource};
pub use index::DomainListIndex;
