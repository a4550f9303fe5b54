pub mod fs;
pub mod memory;
pub mod rest;
