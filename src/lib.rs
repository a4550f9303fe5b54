pub mod api;
pub mod backend;
pub mod config;
pub mod monitor;
pub mod pipeline;

pub use api::pointer::{DatasetPointer, RunName};
pub use api::store::ObjectStore;
pub use api::variables::VariableStore;
pub use config::Settings;

/// Utility function to create a UTC timestamp for reports and persisted state.
pub fn timestamp() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}
