//! Measurement sources feeding the engine
//!
//! The engine pulls one complete batch at a time through `MeasurementSource`.
//! How batches are produced (simulation, a recorded file, a producer thread)
//! is up to the implementation.

pub mod channel;
pub mod replay;
pub mod synthetic;

pub use channel::ChannelSource;
pub use replay::ReplaySource;
pub use synthetic::SyntheticSource;

use std::fmt;

use crate::core::MeasurementBatch;

/// Source failure types
#[derive(Debug, Clone, PartialEq)]
pub enum SourceError {
    /// Producer went away before the stream was complete
    Disconnected { reason: String },
    /// One entry could not be turned into a batch; later entries may still be fine
    Malformed { index: usize, details: String },
    /// Reading the underlying input failed
    Io { message: String },
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::Disconnected { reason } => write!(f, "Source disconnected: {}", reason),
            SourceError::Malformed { index, details } => {
                write!(f, "Malformed entry {}: {}", index, details)
            }
            SourceError::Io { message } => write!(f, "Source I/O error: {}", message),
        }
    }
}

impl std::error::Error for SourceError {}

impl SourceError {
    /// Whether the stream can continue after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SourceError::Malformed { .. })
    }
}

pub type SourceResult<T> = Result<T, SourceError>;

/// Blocking "receive next complete batch"
///
/// `Ok(None)` ends the stream.
pub trait MeasurementSource {
    fn next_batch(&mut self) -> SourceResult<Option<MeasurementBatch>>;
}

impl<S: MeasurementSource + ?Sized> MeasurementSource for Box<S> {
    fn next_batch(&mut self) -> SourceResult<Option<MeasurementBatch>> {
        (**self).next_batch()
    }
}
