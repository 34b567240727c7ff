//! Data validation and error taxonomy

pub mod data;
pub mod error;

pub use data::BatchValidator;
pub use error::{BatchIssue, ErrorSeverity, GeometryIssue, LocalizationError, LocalizationResult};
