//! Clinic Follow-Up Domain Models

/// Follow-up workflow
pub mod followups;

/// Domain errors
pub mod errors;

pub use errors::Error;
