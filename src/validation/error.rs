use serde::{Deserialize, Serialize};
use std::fmt;

/// Failures raised by the localization core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LocalizationError {
    /// Station layout or travel times make trilateration ill-posed
    DegenerateGeometry {
        issue: GeometryIssue,
        /// Value behind the rejection when relevant: |sin| of the base-triple
        /// angle, or the relative residual of a contradictory solve
        condition: Option<f64>,
    },
    /// Root-finder found no usable root within its budget
    NoConvergence {
        iterations: u32,
        brackets_found: usize,
        search_interval: (f64, f64),
    },
    /// Malformed batch, rejected without touching filter state
    InvalidBatch {
        issue: BatchIssue,
        station_id: Option<u16>,
    },
    /// Every particle's likelihood collapsed; the filter was reseeded
    DegenerateWeights {
        max_log_likelihood: f64,
        particle_count: usize,
    },
}

/// Why a geometry was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeometryIssue {
    TooFewStations,
    MismatchedInputs,
    Collinear,
    CoincidentStations,
    AllZeroTimes,
    InvalidTimes,
    NonPositiveSpeed,
    /// A root exists but the times disagree with every candidate position
    Contradictory,
}

/// Why a measurement batch was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchIssue {
    WrongStationCount { expected: usize, received: usize },
    UnknownStation,
    DuplicateStation,
    NegativeTime,
    NonFiniteTime,
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Warning,
    Recoverable,
    Rejected,
}

pub type LocalizationResult<T> = Result<T, LocalizationError>;

impl LocalizationError {
    pub fn degenerate(issue: GeometryIssue) -> Self {
        LocalizationError::DegenerateGeometry { issue, condition: None }
    }

    pub fn invalid_batch(issue: BatchIssue, station_id: Option<u16>) -> Self {
        LocalizationError::InvalidBatch { issue, station_id }
    }

    /// How the engine treats the failure; none of them ends a run
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            LocalizationError::DegenerateWeights { .. } => ErrorSeverity::Warning,
            LocalizationError::DegenerateGeometry { .. } | LocalizationError::NoConvergence { .. } => {
                ErrorSeverity::Recoverable
            }
            LocalizationError::InvalidBatch { .. } => ErrorSeverity::Rejected,
        }
    }

    /// Short stable name, used in reports
    pub fn kind(&self) -> &'static str {
        match self {
            LocalizationError::DegenerateGeometry { .. } => "DegenerateGeometry",
            LocalizationError::NoConvergence { .. } => "NoConvergence",
            LocalizationError::InvalidBatch { .. } => "InvalidBatch",
            LocalizationError::DegenerateWeights { .. } => "DegenerateWeights",
        }
    }
}

impl fmt::Display for GeometryIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            GeometryIssue::TooFewStations => "at least four stations are required",
            GeometryIssue::MismatchedInputs => "station and travel-time counts differ",
            GeometryIssue::Collinear => "base stations are collinear",
            GeometryIssue::CoincidentStations => "base stations coincide",
            GeometryIssue::AllZeroTimes => "all travel times are zero",
            GeometryIssue::InvalidTimes => "travel times must be finite and non-negative",
            GeometryIssue::NonPositiveSpeed => "solved propagation constant is not positive and finite",
            GeometryIssue::Contradictory => "travel times contradict each other",
        };
        f.write_str(text)
    }
}

impl fmt::Display for BatchIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchIssue::WrongStationCount { expected, received } => {
                write!(f, "expected {} measurements, received {}", expected, received)
            }
            BatchIssue::UnknownStation => write!(f, "measurement for unknown station"),
            BatchIssue::DuplicateStation => write!(f, "station measured twice"),
            BatchIssue::NegativeTime => write!(f, "negative travel time"),
            BatchIssue::NonFiniteTime => write!(f, "non-finite travel time"),
        }
    }
}

impl fmt::Display for LocalizationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocalizationError::DegenerateGeometry { issue, condition } => match condition {
                Some(value) => write!(f, "Degenerate geometry: {} (condition {:.3e})", issue, value),
                None => write!(f, "Degenerate geometry: {}", issue),
            },
            LocalizationError::NoConvergence { iterations, brackets_found, search_interval } => write!(
                f,
                "No convergence: {} brackets in [{:e}, {:e}] after {} iterations",
                brackets_found, search_interval.0, search_interval.1, iterations
            ),
            LocalizationError::InvalidBatch { issue, station_id } => match station_id {
                Some(id) => write!(f, "Invalid batch: {} (station {})", issue, id),
                None => write!(f, "Invalid batch: {}", issue),
            },
            LocalizationError::DegenerateWeights { max_log_likelihood, particle_count } => write!(
                f,
                "Degenerate weights: best log-likelihood {:.1} across {} particles",
                max_log_likelihood, particle_count
            ),
        }
    }
}

impl std::error::Error for LocalizationError {}
