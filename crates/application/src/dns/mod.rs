pub mod linkage;
pub mod sanitise;
