//! Measurement model, sample summaries and the particle filter

pub mod measurement_model;
pub mod particle_filter;
pub mod sample_stats;

pub use measurement_model::{MeasurementModel, NoiseModel};
pub use particle_filter::{FilterState, ParticleFilter};
pub use sample_stats::{BatchAssembler, SampleStats};
