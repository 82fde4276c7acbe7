pub mod digest;
pub mod memory;
