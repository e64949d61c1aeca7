pub mod types;
pub mod keywords;
pub mod rephrase;
pub mod sources;
pub mod disclaimer;
pub mod orchestrator;

pub use orchestrator::SafetyValidator;
pub use types::{SafetyError, SafetyLevel, ValidationResult};
