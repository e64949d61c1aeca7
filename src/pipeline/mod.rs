pub mod patterns;
pub mod rag;
pub mod safety;
pub mod orchestrator;
