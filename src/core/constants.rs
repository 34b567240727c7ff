//! Default parameters for the localization core

/// Number of stations the system is deployed with
pub const STATION_COUNT: usize = 4;

/// Default particle population size
pub const DEFAULT_PARTICLE_COUNT: usize = 10_000;

/// Default measurement noise standard deviation (time units)
pub const DEFAULT_NOISE_STD_DEV: f64 = 0.01;

/// Fraction of the particle count below which the effective sample size triggers resampling
pub const DEFAULT_RESAMPLE_FRACTION: f64 = 0.5;

/// Default accuracy radius under which the filter counts a step as converged (distance units)
pub const DEFAULT_CONVERGENCE_TOLERANCE: f64 = 1.0;

/// Consecutive converged steps required before the filter reports convergence
pub const DEFAULT_CONVERGENCE_PATIENCE: u32 = 3;

/// Lower edge of the propagation constant search interval
pub const DEFAULT_SPEED_MIN: f64 = 1e-3;

/// Upper edge of the propagation constant search interval
pub const DEFAULT_SPEED_MAX: f64 = 1e9;

/// Geometric sub-intervals scanned for sign changes of the solver residual
pub const DEFAULT_SCAN_STEPS: usize = 512;

/// Bisection iteration cap per bracket
pub const DEFAULT_MAX_ITERATIONS: u32 = 200;

/// |sin| of the base-triple angle under which stations count as collinear
pub const DEFAULT_COLLINEARITY_TOLERANCE: f64 = 1e-9;

/// RMS distance residual, relative to the mean range, above which a solve is contradictory
pub const DEFAULT_MAX_RELATIVE_RESIDUAL: f64 = 0.5;

/// Relative departure from the running propagation constant above which a solve is discarded
pub const DEFAULT_MAX_SPEED_DEVIATION: f64 = 0.5;

/// Spread of a prior-seeded particle cloud (distance units)
pub const DEFAULT_PRIOR_SPREAD: f64 = 5.0;

/// Joint log-likelihood under which every particle is considered to have underflowed
pub const DEFAULT_MIN_LOG_LIKELIHOOD: f64 = -700.0;

/// Padding applied to the station bounding box when no bounds are configured
pub const DEFAULT_BOUNDS_PADDING_FRACTION: f64 = 0.1;
