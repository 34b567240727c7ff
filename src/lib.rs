//! Time-of-arrival localization with an unknown propagation constant
//!
//! Four fixed stations report one-way travel times of a signal from a 2D
//! target. The propagation constant `c` is not known, so the crate recovers it
//! together with the position: a closed-form solver gives a one-shot fix and
//! `c`, and a particle filter refines the position over repeated noisy batches.

pub mod core;
pub mod algorithms;
pub mod processing;
pub mod validation;
pub mod utils;
pub mod source;
pub mod api;
pub mod engine;
pub mod ensemble;

// Re-export commonly used types
pub use core::{LocationEstimate, Measurement, MeasurementBatch, Particle, SimulationBounds, Station};
pub use algorithms::{GeometrySolution, GeometrySolver, ScaleFit, ScaleSearch};
pub use processing::{BatchAssembler, FilterState, MeasurementModel, NoiseModel, ParticleFilter, SampleStats};
pub use validation::{BatchIssue, BatchValidator, GeometryIssue, LocalizationError, LocalizationResult};
pub use utils::config::{ConfigError, LocalizationConfig, PropagationPolicy};
pub use source::{ChannelSource, MeasurementSource, ReplaySource, SourceError, SourceResult, SyntheticSource};
pub use api::{CollectingSink, EstimateSink, FormattedEstimate, OutputFormat, WriterSink};
pub use engine::{BatchReport, LocalizationEngine, RunSummary, SolverOutcome, SpeedFallback, StopReason};
pub use ensemble::{EnsembleReport, EnsembleStatistics, EnsembleValidator, Scenario, TrialResult};
