pub mod drift;
pub mod psi;
pub mod report;
pub mod sample;
