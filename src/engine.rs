//! Batch-by-batch orchestration of solver and filter
//!
//! For every incoming batch the engine:
//!
//! 1. validates it (a rejected batch changes nothing),
//! 2. resolves the propagation constant according to the configured
//!    `PropagationPolicy`, falling back to the previous value or, when no value
//!    is known yet, to a Monte Carlo scale search. A solve far from the running
//!    value is discarded before it reaches the running mean,
//! 3. seeds the filter on the first batch, around the geometric fix when one exists,
//! 4. runs Predict -> Update -> Resample and reports the new estimate.
//!
//! Solver and weight failures are logged and carried in the report. Only
//! configuration errors are fatal.

use log::{debug, info, warn};
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use crate::algorithms::geometry_solver::GeometrySolver;
use crate::algorithms::scale_search::ScaleSearch;
use crate::api::sink::EstimateSink;
use crate::core::{LocationEstimate, MeasurementBatch, Station};
use crate::processing::measurement_model::MeasurementModel;
use crate::processing::particle_filter::{FilterState, ParticleFilter};
use crate::source::MeasurementSource;
use crate::utils::config::{ConfigError, LocalizationConfig, PropagationPolicy};
use crate::validation::data::BatchValidator;
use crate::validation::error::{ErrorSeverity, LocalizationError, LocalizationResult};

/// Offset between the filter seed and the scale-search seed
const SCALE_SEARCH_SEED_OFFSET: u64 = 0x5eed;

/// Where the propagation constant came from after a failed solve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpeedFallback {
    /// Reused the value from earlier batches
    Previous,
    /// No earlier value; a scale search produced one
    ScaleSearch,
    /// Nothing usable; the filter skipped its update
    Unavailable,
}

/// What the geometric stage did for one batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum SolverOutcome {
    Solved {
        speed: f64,
        position: Vector2<f64>,
        rms_residual: f64,
        roots: usize,
    },
    /// Policy holds an earlier constant; the solver was not run
    Held { speed: f64 },
    /// Solved, but too far from the running constant to be trusted
    Rejected { speed: f64, deviation: f64 },
    Failed {
        error: LocalizationError,
        fallback: SpeedFallback,
    },
}

impl SolverOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            SolverOutcome::Solved { .. } => "solved",
            SolverOutcome::Held { .. } => "held",
            SolverOutcome::Rejected { .. } => "rejected",
            SolverOutcome::Failed { error, .. } => error.kind(),
        }
    }
}

/// Result of processing one batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Zero-based index among accepted batches
    pub batch_index: u64,
    pub estimate: LocationEstimate,
    /// Propagation constant fed to the filter, if any
    pub speed: Option<f64>,
    pub solver_outcome: SolverOutcome,
    pub filter_state: FilterState,
    pub resampled: bool,
    pub warnings: Vec<String>,
}

/// Why a run ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StopReason {
    MaxBatches,
    Converged,
    SourceExhausted,
    SourceFailed { message: String },
}

/// Outcome of a full run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub batches_processed: u64,
    pub rejected_batches: u64,
    pub final_estimate: Option<LocationEstimate>,
    pub speed: Option<f64>,
    pub stop_reason: StopReason,
}

/// Owns one solver + filter pair and drives it across batches
pub struct LocalizationEngine {
    config: LocalizationConfig,
    stations: Vec<Station>,
    validator: BatchValidator,
    solver: GeometrySolver,
    filter: ParticleFilter,
    scale_search: ScaleSearch,
    speed: Option<f64>,
    speed_sum: f64,
    solved_count: u64,
    batches_processed: u64,
    rejected_batches: u64,
    last_estimate: Option<LocationEstimate>,
}

impl LocalizationEngine {
    /// Validate the configuration and build the pipeline
    pub fn new(config: LocalizationConfig) -> Result<Self, ConfigError> {
        for warning in config.validate().into_result()? {
            warn!("Configuration: {}", warning);
        }

        let stations = config.stations();
        let bounds = config.effective_bounds();
        let model = MeasurementModel::new(config.noise);
        let solver = GeometrySolver::from_config(&config.solver, model);
        let filter = ParticleFilter::new(config.filter.clone(), bounds, stations.clone(), model)?;
        let search_seed = config
            .filter
            .seed
            .map_or_else(|| rand::random(), |s| s.wrapping_add(SCALE_SEARCH_SEED_OFFSET));

        info!(
            "Engine ready: {} stations, {} particles, policy {:?}",
            stations.len(),
            config.filter.particle_count,
            config.engine.propagation_policy
        );

        Ok(Self {
            validator: BatchValidator::new(&stations),
            scale_search: ScaleSearch::new(config.engine.scale_search_samples, search_seed),
            speed: config.engine.initial_speed,
            speed_sum: 0.0,
            solved_count: 0,
            batches_processed: 0,
            rejected_batches: 0,
            last_estimate: None,
            stations,
            solver,
            filter,
            config,
        })
    }

    /// Process one complete batch
    ///
    /// `InvalidBatch` is returned without touching any state. Every other
    /// failure is recovered from and listed in the report's warnings.
    pub fn process_batch(&mut self, batch: &MeasurementBatch) -> LocalizationResult<BatchReport> {
        let times = match self.validator.aligned_times(batch) {
            Ok(times) => times,
            Err(err) => {
                warn!("Rejected batch: {}", err);
                self.rejected_batches += 1;
                return Err(err);
            }
        };

        let batch_index = self.batches_processed;
        let mut warnings = Vec::new();
        let (solver_outcome, fix) = self.resolve_speed(&times, &mut warnings);

        if self.filter.state() == FilterState::Uninitialized {
            let prior = if self.config.engine.seed_from_geometry { fix } else { None };
            self.filter.initialize(prior);
        }

        let mut resampled = false;
        match self.speed {
            Some(speed) => {
                self.filter.predict();
                match self.filter.update(batch, speed) {
                    Ok(()) => resampled = self.filter.resample(),
                    Err(err) if err.severity() == ErrorSeverity::Warning => {
                        warn!("Batch {}: {}", batch_index, err);
                        warnings.push(err.to_string());
                    }
                    Err(err) => return Err(err),
                }
            }
            None => {
                let message = "No propagation constant available; filter update skipped".to_string();
                warn!("Batch {}: {}", batch_index, message);
                warnings.push(message);
            }
        }

        let Some(estimate) = self.filter.estimate() else {
            return Err(LocalizationError::DegenerateWeights {
                max_log_likelihood: f64::NEG_INFINITY,
                particle_count: self.filter.particles().len(),
            });
        };

        self.batches_processed += 1;
        self.last_estimate = Some(estimate);
        debug!(
            "Batch {}: ({:.4}, {:.4}) radius {:.4}, c={:?}, {}",
            batch_index,
            estimate.position.x,
            estimate.position.y,
            estimate.accuracy_radius,
            self.speed,
            solver_outcome.label()
        );

        Ok(BatchReport {
            batch_index,
            estimate,
            speed: self.speed,
            solver_outcome,
            filter_state: self.filter.state(),
            resampled,
            warnings,
        })
    }

    /// Pull batches from `source` until a stop condition, emitting each report to `sink`
    pub fn run<S, K>(&mut self, source: &mut S, sink: &mut K) -> RunSummary
    where
        S: MeasurementSource + ?Sized,
        K: EstimateSink + ?Sized,
    {
        let stop_reason = loop {
            if let Some(max) = self.config.engine.max_batches {
                if self.batches_processed >= max {
                    break StopReason::MaxBatches;
                }
            }

            let batch = match source.next_batch() {
                Ok(Some(batch)) => batch,
                Ok(None) => break StopReason::SourceExhausted,
                Err(err) if err.is_recoverable() => {
                    warn!("Skipping source entry: {}", err);
                    self.rejected_batches += 1;
                    continue;
                }
                Err(err) => {
                    warn!("Stopping run: {}", err);
                    break StopReason::SourceFailed { message: err.to_string() };
                }
            };

            // Rejections are already logged and counted
            if let Ok(report) = self.process_batch(&batch) {
                sink.emit(&report);
                if self.config.engine.stop_on_convergence && report.filter_state == FilterState::Converged {
                    break StopReason::Converged;
                }
            }
        };
        sink.finish();

        let summary = RunSummary {
            batches_processed: self.batches_processed,
            rejected_batches: self.rejected_batches,
            final_estimate: self.last_estimate,
            speed: self.speed,
            stop_reason,
        };
        match &summary.final_estimate {
            Some(estimate) => info!(
                "Run finished ({:?}) after {} batches: ({:.4}, {:.4}) radius {:.4}",
                summary.stop_reason,
                summary.batches_processed,
                estimate.position.x,
                estimate.position.y,
                estimate.accuracy_radius
            ),
            None => info!("Run finished ({:?}) without an estimate", summary.stop_reason),
        }
        summary
    }

    /// Current propagation constant
    pub fn speed(&self) -> Option<f64> {
        self.speed
    }

    pub fn estimate(&self) -> Option<LocationEstimate> {
        self.last_estimate
    }

    pub fn filter(&self) -> &ParticleFilter {
        &self.filter
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    pub fn config(&self) -> &LocalizationConfig {
        &self.config
    }

    pub fn batches_processed(&self) -> u64 {
        self.batches_processed
    }

    pub fn rejected_batches(&self) -> u64 {
        self.rejected_batches
    }

    fn resolve_speed(&mut self, times: &[f64], warnings: &mut Vec<String>) -> (SolverOutcome, Option<Vector2<f64>>) {
        if let (PropagationPolicy::HoldFirst, Some(speed)) = (self.config.engine.propagation_policy, self.speed) {
            if self.solved_count > 0 {
                return (SolverOutcome::Held { speed }, None);
            }
        }

        match self.solver.solve(&self.stations, times, self.speed) {
            Ok(solution) => {
                if let Some(deviation) = self.speed_deviation(solution.speed) {
                    let message = format!(
                        "Discarded solve c={:.6}: {:.1}% away from running value",
                        solution.speed,
                        deviation * 100.0
                    );
                    warn!("{}", message);
                    warnings.push(message);
                    return (SolverOutcome::Rejected { speed: solution.speed, deviation }, None);
                }
                self.record_speed(solution.speed);
                (
                    SolverOutcome::Solved {
                        speed: solution.speed,
                        position: solution.position,
                        rms_residual: solution.rms_residual,
                        roots: solution.candidate_speeds.len(),
                    },
                    Some(solution.position),
                )
            }
            Err(error) => {
                warn!("Geometric solve failed ({:?}): {}", error.severity(), error);
                warnings.push(error.to_string());
                let fallback = if self.speed.is_some() {
                    SpeedFallback::Previous
                } else {
                    self.bootstrap_speed(times, warnings)
                };
                (SolverOutcome::Failed { error, fallback }, None)
            }
        }
    }

    /// Relative departure of `solved` from the running constant, when it exceeds the gate
    fn speed_deviation(&self, solved: f64) -> Option<f64> {
        let limit = self.config.engine.max_speed_deviation?;
        let current = self.speed.filter(|_| self.solved_count > 0)?;
        let deviation = (solved - current).abs() / current;
        (deviation > limit).then_some(deviation)
    }

    fn record_speed(&mut self, solved: f64) {
        self.solved_count += 1;
        let next = match self.config.engine.propagation_policy {
            PropagationPolicy::ResolvePerBatch => {
                self.speed_sum += solved;
                self.speed_sum / self.solved_count as f64
            }
            PropagationPolicy::HoldFirst => {
                info!("Holding propagation constant c={:.6}", solved);
                solved
            }
        };
        self.speed = Some(next);
    }

    fn bootstrap_speed(&mut self, times: &[f64], warnings: &mut Vec<String>) -> SpeedFallback {
        let bounds = *self.filter.bounds();
        match self.scale_search.search(&self.stations, times, &bounds) {
            Some(fit) if fit.speed.is_finite() && fit.speed > 0.0 => {
                info!("Bootstrapped propagation constant c={:.4} by scale search", fit.speed);
                warnings.push(format!("Propagation constant bootstrapped by scale search: {:.4}", fit.speed));
                self.speed = Some(fit.speed);
                SpeedFallback::ScaleSearch
            }
            _ => SpeedFallback::Unavailable,
        }
    }
}
