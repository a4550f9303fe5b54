pub mod detector;
pub mod gate;
pub mod layout;
pub mod trainer;
pub mod validator;

pub use gate::{Branch, RetrainingGate, RunOutcome};
pub use layout::ArtifactLayout;
