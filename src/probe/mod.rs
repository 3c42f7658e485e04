pub mod executor;
pub mod identity;
pub mod orchestrator;
pub mod types;
pub mod verifier;

pub use executor::{AttemptExecutor, AttemptRunner};
pub use orchestrator::RetryOrchestrator;
pub use verifier::DashboardVerifier;
