use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::algorithms::geometry_solver::triple_condition;
use crate::core::{
    SimulationBounds, Station, DEFAULT_BOUNDS_PADDING_FRACTION, DEFAULT_COLLINEARITY_TOLERANCE,
    DEFAULT_CONVERGENCE_PATIENCE, DEFAULT_CONVERGENCE_TOLERANCE, DEFAULT_MAX_ITERATIONS, DEFAULT_MAX_RELATIVE_RESIDUAL,
    DEFAULT_MAX_SPEED_DEVIATION, DEFAULT_MIN_LOG_LIKELIHOOD, DEFAULT_PARTICLE_COUNT, DEFAULT_PRIOR_SPREAD, DEFAULT_RESAMPLE_FRACTION, DEFAULT_SCAN_STEPS, DEFAULT_SPEED_MAX,
    DEFAULT_SPEED_MIN, STATION_COUNT,
};
use crate::processing::measurement_model::NoiseModel;

/// Complete configuration consumed by the localization core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalizationConfig {
    /// Station layout; the first three form the solver's base triple
    pub stations: Vec<StationConfig>,
    /// Particle region; derived from the stations when absent
    #[serde(default)]
    pub bounds: Option<SimulationBounds>,
    /// Travel-time noise, in time units
    #[serde(default)]
    pub noise: NoiseModel,
    #[serde(default)]
    pub solver: SolverConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

/// Individual station configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationConfig {
    pub id: u16,
    #[serde(default)]
    pub name: Option<String>,
    pub x: f64,
    pub y: f64,
}

/// Root-finder settings for the geometric solver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Lower edge of the propagation constant search interval
    pub speed_min: f64,
    /// Upper edge of the propagation constant search interval
    pub speed_max: f64,
    /// Geometric sub-intervals scanned for sign changes
    pub scan_steps: usize,
    /// Bisection iteration cap per bracket
    pub max_iterations: u32,
    /// |sin| of the base-triple angle under which stations count as collinear
    pub collinearity_tolerance: f64,
    /// RMS distance residual over the mean range above which times count as contradictory
    pub max_relative_residual: f64,
}

/// Particle filter settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub particle_count: usize,
    /// Std-dev of the per-step random walk (distance units); 0 models a static target
    pub diffusion_step: f64,
    /// Resample when the effective sample size drops below this fraction of the particle count
    pub resample_threshold: f64,
    /// Accuracy radius under which a step counts as converged (distance units)
    pub convergence_tolerance: f64,
    /// Consecutive converged steps before the filter reports convergence
    pub convergence_patience: u32,
    /// Std-dev of a prior-seeded particle cloud (distance units)
    pub prior_spread: f64,
    /// Best joint log-likelihood under which the weights are declared degenerate
    pub min_log_likelihood: f64,
    /// Generator seed; drawn from the OS when absent
    pub seed: Option<u64>,
}

/// How the propagation constant evolves across batches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropagationPolicy {
    /// Re-solve every batch and feed the running mean of successful solves to the filter
    ResolvePerBatch,
    /// Solve until the first success, then hold that value
    HoldFirst,
}

/// Orchestration settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub propagation_policy: PropagationPolicy,
    /// Propagation constant used before the first successful solve
    pub initial_speed: Option<f64>,
    /// Seed the particle cloud around the first geometric solution instead of uniformly
    pub seed_from_geometry: bool,
    /// Stop after this many processed batches
    pub max_batches: Option<u64>,
    /// Stop as soon as the filter reports convergence
    pub stop_on_convergence: bool,
    /// Candidates drawn by the coarse scale search when no propagation constant is known; 0 disables it
    pub scale_search_samples: usize,
    /// Discard a per-batch solve whose constant departs from the running value by more
    /// than this fraction; `None` accepts every solve
    pub max_speed_deviation: Option<f64>,
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Invalid parameter value
    InvalidParameter { parameter: String, value: String, reason: String },
    /// Configuration file I/O error
    IoError { message: String },
    /// JSON serialization/deserialization error
    SerializationError { message: String },
    /// Station layout cannot support localization
    GeometryValidation { reason: String },
}

/// Configuration validation result
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub errors: Vec<ConfigError>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// First error, if any
    pub fn into_result(self) -> Result<Vec<String>, ConfigError> {
        match self.errors.into_iter().next() {
            Some(error) => Err(error),
            None => Ok(self.warnings),
        }
    }
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            speed_min: DEFAULT_SPEED_MIN,
            speed_max: DEFAULT_SPEED_MAX,
            scan_steps: DEFAULT_SCAN_STEPS,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            collinearity_tolerance: DEFAULT_COLLINEARITY_TOLERANCE,
            max_relative_residual: DEFAULT_MAX_RELATIVE_RESIDUAL,
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            particle_count: DEFAULT_PARTICLE_COUNT,
            diffusion_step: 0.0,
            resample_threshold: DEFAULT_RESAMPLE_FRACTION,
            convergence_tolerance: DEFAULT_CONVERGENCE_TOLERANCE,
            convergence_patience: DEFAULT_CONVERGENCE_PATIENCE,
            prior_spread: DEFAULT_PRIOR_SPREAD,
            min_log_likelihood: DEFAULT_MIN_LOG_LIKELIHOOD,
            seed: None,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            propagation_policy: PropagationPolicy::ResolvePerBatch,
            initial_speed: None,
            seed_from_geometry: true,
            max_batches: None,
            stop_on_convergence: false,
            scale_search_samples: 10_000,
            max_speed_deviation: Some(DEFAULT_MAX_SPEED_DEVIATION),
        }
    }
}

impl StationConfig {
    pub fn new(id: u16, x: f64, y: f64) -> Self {
        Self { id, name: None, x, y }
    }

    pub fn to_station(&self) -> Station {
        let name = self.name.clone().unwrap_or_else(|| format!("station-{}", self.id));
        Station::new(self.id, name, self.x, self.y)
    }
}

fn invalid(parameter: &str, value: impl ToString, reason: &str) -> ConfigError {
    ConfigError::InvalidParameter {
        parameter: parameter.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

impl LocalizationConfig {
    /// Configuration with default tuning around the given stations
    pub fn with_stations(stations: Vec<StationConfig>) -> Self {
        Self {
            stations,
            bounds: None,
            noise: NoiseModel::default(),
            solver: SolverConfig::default(),
            filter: FilterConfig::default(),
            engine: EngineConfig::default(),
        }
    }

    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::IoError {
            message: format!("Failed to read {}: {}", path.as_ref().display(), e),
        })?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(content).map_err(|e| ConfigError::SerializationError {
            message: format!("Failed to parse configuration: {}", e),
        })
    }

    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::SerializationError {
            message: format!("Failed to serialize configuration: {}", e),
        })
    }

    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = self.to_json_pretty()?;
        fs::write(path.as_ref(), content).map_err(|e| ConfigError::IoError {
            message: format!("Failed to write {}: {}", path.as_ref().display(), e),
        })
    }

    pub fn stations(&self) -> Vec<Station> {
        self.stations.iter().map(StationConfig::to_station).collect()
    }

    /// Configured bounds, or the padded station bounding box
    pub fn effective_bounds(&self) -> SimulationBounds {
        self.bounds
            .unwrap_or_else(|| SimulationBounds::around_stations(&self.stations(), DEFAULT_BOUNDS_PADDING_FRACTION))
    }

    /// Check every parameter; errors are fatal at startup, warnings are not
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();
        self.validate_stations(&mut report);

        if let Some(bounds) = &self.bounds {
            if !bounds.is_valid() {
                report.errors.push(invalid("bounds", format!("{:?}", bounds), "Bounds must have positive, finite extent"));
            }
        }

        if !self.noise.is_valid() {
            report.errors.push(invalid("noise", self.noise.spread(), "Noise spread must be positive and finite"));
        }

        let solver = &self.solver;
        if !(solver.speed_min > 0.0 && solver.speed_min.is_finite()) {
            report.errors.push(invalid("solver.speed_min", solver.speed_min, "Search interval must start above zero"));
        }
        if !(solver.speed_max > solver.speed_min && solver.speed_max.is_finite()) {
            report.errors.push(invalid("solver.speed_max", solver.speed_max, "Search interval must be non-empty and finite"));
        }
        if solver.scan_steps == 0 {
            report.errors.push(invalid("solver.scan_steps", solver.scan_steps, "At least one scan step is required"));
        }
        if solver.max_iterations == 0 {
            report.errors.push(invalid("solver.max_iterations", solver.max_iterations, "Iteration cap must be positive"));
        }
        if !(solver.max_relative_residual > 0.0) {
            report.errors.push(invalid(
                "solver.max_relative_residual",
                solver.max_relative_residual,
                "Residual gate must be positive",
            ));
        }

        let filter = &self.filter;
        if filter.particle_count == 0 {
            report.errors.push(invalid("filter.particle_count", filter.particle_count, "Particle count must be positive"));
        }
        if !(filter.diffusion_step >= 0.0 && filter.diffusion_step.is_finite()) {
            report.errors.push(invalid("filter.diffusion_step", filter.diffusion_step, "Diffusion step must be non-negative"));
        }
        if !(filter.resample_threshold > 0.0 && filter.resample_threshold <= 1.0) {
            report.errors.push(invalid(
                "filter.resample_threshold",
                filter.resample_threshold,
                "Resample threshold is a fraction of the particle count in (0, 1]",
            ));
        }
        if !(filter.convergence_tolerance > 0.0) {
            report.errors.push(invalid(
                "filter.convergence_tolerance",
                filter.convergence_tolerance,
                "Convergence tolerance must be positive",
            ));
        }
        if !(filter.prior_spread > 0.0 && filter.prior_spread.is_finite()) {
            report.errors.push(invalid("filter.prior_spread", filter.prior_spread, "Prior spread must be positive"));
        }
        if filter.particle_count > 0 && filter.particle_count < 100 {
            report.warnings.push(format!(
                "Only {} particles; the posterior will be coarse",
                filter.particle_count
            ));
        }

        if let Some(speed) = self.engine.initial_speed {
            if !(speed > 0.0 && speed.is_finite()) {
                report.errors.push(invalid("engine.initial_speed", speed, "Propagation constant must be positive"));
            }
        }
        if let Some(deviation) = self.engine.max_speed_deviation {
            if !(deviation > 0.0) {
                report.errors.push(invalid("engine.max_speed_deviation", deviation, "Deviation gate must be positive"));
            }
        }

        report
    }

    fn validate_stations(&self, report: &mut ValidationReport) {
        if self.stations.len() < STATION_COUNT {
            report.errors.push(ConfigError::GeometryValidation {
                reason: format!(
                    "{} stations configured, at least {} required",
                    self.stations.len(),
                    STATION_COUNT
                ),
            });
            return;
        }

        for (i, a) in self.stations.iter().enumerate() {
            if !(a.x.is_finite() && a.y.is_finite()) {
                report.errors.push(invalid(&format!("stations[{}]", i), format!("({}, {})", a.x, a.y), "Coordinates must be finite"));
            }
            for b in &self.stations[i + 1..] {
                if a.id == b.id {
                    report.errors.push(invalid("stations.id", a.id, "Station ids must be unique"));
                }
                if a.x == b.x && a.y == b.y {
                    report.errors.push(ConfigError::GeometryValidation {
                        reason: format!("Stations {} and {} share coordinates", a.id, b.id),
                    });
                }
            }
        }

        let stations = self.stations();
        let condition = triple_condition(&stations[0].position, &stations[1].position, &stations[2].position);
        if condition < self.solver.collinearity_tolerance {
            report.warnings.push(
                "Base stations are collinear; geometric solves will fail and tracking is filter-only".to_string(),
            );
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidParameter { parameter, value, reason } => {
                write!(f, "Invalid parameter '{}' = '{}': {}", parameter, value, reason)
            }
            ConfigError::IoError { message } => {
                write!(f, "I/O error: {}", message)
            }
            ConfigError::SerializationError { message } => {
                write!(f, "Serialization error: {}", message)
            }
            ConfigError::GeometryValidation { reason } => {
                write!(f, "Geometry validation failed: {}", reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
