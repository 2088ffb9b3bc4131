pub mod memory;
pub mod memory_image;
