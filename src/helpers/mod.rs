pub mod filename;
pub mod size;
