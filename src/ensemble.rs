//! Monte Carlo validation over independent engine runs
//!
//! Each trial owns its engine, filter and synthetic source, so trials share
//! nothing and run in parallel on the rayon pool. Seeds are derived from a
//! base seed and the trial index, so an ensemble is reproducible regardless of
//! scheduling.

use log::info;
use nalgebra::Vector2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::api::sink::CollectingSink;
use crate::core::LocationEstimate;
use crate::engine::{LocalizationEngine, StopReason};
use crate::source::SyntheticSource;
use crate::utils::config::{ConfigError, LocalizationConfig};

/// Offset separating source seeds from filter seeds
const SOURCE_SEED_OFFSET: u64 = 0x9e37_79b9_7f4a_7c15;

/// Ground truth and noise for synthetic trials
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub target: Vector2<f64>,
    pub speed: f64,
    /// Std-dev of the timing noise (time units)
    pub noise_std_dev: f64,
    pub batches: usize,
}

/// Outcome of one trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub trial: usize,
    pub final_estimate: Option<LocationEstimate>,
    /// Distance from the final estimate to the target; infinite without an estimate
    pub error: f64,
    pub speed: Option<f64>,
    pub radius_curve: Vec<f64>,
    pub stop_reason: StopReason,
}

/// Aggregate accuracy over an ensemble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleStatistics {
    pub trials: usize,
    /// Trials that ended without an estimate
    pub failed_trials: usize,
    pub mean_error: f64,
    pub rmse: f64,
    pub error_95_percentile: f64,
    pub max_error: f64,
    /// Fraction of all trials whose final error is within `hit_radius`
    pub hit_rate: f64,
    pub hit_radius: f64,
    /// Mean accuracy radius after each batch, over trials that reached it
    pub mean_radius_curve: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleReport {
    pub scenario: Scenario,
    pub statistics: EnsembleStatistics,
    pub results: Vec<TrialResult>,
}

/// Runs independent trials of one configuration against one scenario
pub struct EnsembleValidator {
    config: LocalizationConfig,
    scenario: Scenario,
    base_seed: u64,
    hit_radius: f64,
}

impl EnsembleValidator {
    pub fn new(config: LocalizationConfig, scenario: Scenario, base_seed: u64) -> Self {
        Self {
            config,
            scenario,
            base_seed,
            hit_radius: 5.0,
        }
    }

    pub fn with_hit_radius(mut self, radius: f64) -> Self {
        self.hit_radius = radius;
        self
    }

    pub fn run(&self, trials: usize) -> Result<EnsembleReport, ConfigError> {
        self.config.validate().into_result()?;
        info!(
            "Running {} trials at ({:.3}, {:.3}), c={}, noise {}",
            trials, self.scenario.target.x, self.scenario.target.y, self.scenario.speed, self.scenario.noise_std_dev
        );

        let results = (0..trials)
            .into_par_iter()
            .map(|trial| self.run_trial(trial))
            .collect::<Result<Vec<_>, _>>()?;
        let statistics = self.calculate_statistics(&results);

        info!(
            "Ensemble done: mean error {:.4}, p95 {:.4}, hit rate {:.3} within {}",
            statistics.mean_error, statistics.error_95_percentile, statistics.hit_rate, statistics.hit_radius
        );
        Ok(EnsembleReport {
            scenario: self.scenario,
            statistics,
            results,
        })
    }

    pub fn run_trial(&self, trial: usize) -> Result<TrialResult, ConfigError> {
        let mut config = self.config.clone();
        config.filter.seed = Some(self.base_seed.wrapping_add(trial as u64));
        let mut engine = LocalizationEngine::new(config)?;

        let mut source = SyntheticSource::new(
            engine.stations().to_vec(),
            self.scenario.target,
            self.scenario.speed,
            self.scenario.noise_std_dev,
            self.scenario.batches,
            self.base_seed.wrapping_add(SOURCE_SEED_OFFSET).wrapping_add(trial as u64),
        );
        let mut sink = CollectingSink::new();
        let summary = engine.run(&mut source, &mut sink);

        let error = summary
            .final_estimate
            .map_or(f64::INFINITY, |e| (e.position - self.scenario.target).norm());
        Ok(TrialResult {
            trial,
            final_estimate: summary.final_estimate,
            error,
            speed: summary.speed,
            radius_curve: sink.radius_curve(),
            stop_reason: summary.stop_reason,
        })
    }

    pub fn calculate_statistics(&self, results: &[TrialResult]) -> EnsembleStatistics {
        let mut errors: Vec<f64> = results.iter().map(|r| r.error).filter(|e| e.is_finite()).collect();
        errors.sort_by(|a, b| a.total_cmp(b));
        let n = errors.len();

        let (mean_error, rmse, error_95_percentile, max_error) = if n == 0 {
            (0.0, 0.0, 0.0, 0.0)
        } else {
            let mean = errors.iter().sum::<f64>() / n as f64;
            let rmse = (errors.iter().map(|e| e * e).sum::<f64>() / n as f64).sqrt();
            let index_95 = ((n as f64 * 0.95).ceil() as usize).saturating_sub(1).min(n - 1);
            (mean, rmse, errors[index_95], errors[n - 1])
        };

        let hits = errors.iter().filter(|e| **e <= self.hit_radius).count();
        let hit_rate = if results.is_empty() {
            0.0
        } else {
            hits as f64 / results.len() as f64
        };

        let longest = results.iter().map(|r| r.radius_curve.len()).max().unwrap_or(0);
        let mean_radius_curve = (0..longest)
            .map(|i| {
                let reached: Vec<f64> = results.iter().filter_map(|r| r.radius_curve.get(i).copied()).collect();
                reached.iter().sum::<f64>() / reached.len() as f64
            })
            .collect();

        EnsembleStatistics {
            trials: results.len(),
            failed_trials: results.len() - n,
            mean_error,
            rmse,
            error_95_percentile,
            max_error,
            hit_rate,
            hit_radius: self.hit_radius,
            mean_radius_curve,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::config::StationConfig;

    fn config() -> LocalizationConfig {
        let mut config = LocalizationConfig::with_stations(vec![
            StationConfig::new(1, 0.0, 0.0),
            StationConfig::new(2, 100.0, 0.0),
            StationConfig::new(3, 0.0, 100.0),
            StationConfig::new(4, 100.0, 100.0),
        ]);
        config.filter.particle_count = 500;
        config.noise = crate::processing::measurement_model::NoiseModel::Gaussian { std_dev: 1.0 / 300.0 };
        config
    }

    fn scenario() -> Scenario {
        Scenario {
            target: Vector2::new(42.0, 58.0),
            speed: 300.0,
            noise_std_dev: 0.0,
            batches: 8,
        }
    }

    fn trial(error: f64, curve: Vec<f64>) -> TrialResult {
        TrialResult {
            trial: 0,
            final_estimate: None,
            error,
            speed: None,
            radius_curve: curve,
            stop_reason: StopReason::SourceExhausted,
        }
    }

    #[test]
    fn test_noiseless_ensemble_hits_target() {
        let report = EnsembleValidator::new(config(), scenario(), 17).run(6).unwrap();

        assert_eq!(report.statistics.trials, 6);
        assert_eq!(report.statistics.failed_trials, 0);
        assert_eq!(report.statistics.hit_rate, 1.0);
        assert_eq!(report.statistics.mean_radius_curve.len(), 8);
        assert!(report.results.iter().all(|r| r.stop_reason == StopReason::SourceExhausted));
        assert!(report.results.iter().all(|r| (r.speed.unwrap() - 300.0).abs() < 1e-4));
    }

    #[test]
    fn test_ensemble_is_reproducible() {
        let validator = EnsembleValidator::new(config(), scenario(), 5);
        let a = validator.run(4).unwrap();
        let b = validator.run(4).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_config_is_reported() {
        let mut bad = config();
        bad.stations.pop();
        assert!(EnsembleValidator::new(bad, scenario(), 1).run(2).is_err());
    }

    #[test]
    fn test_statistics() {
        let validator = EnsembleValidator::new(config(), scenario(), 1).with_hit_radius(2.0);
        let results = vec![
            trial(1.0, vec![4.0, 2.0]),
            trial(3.0, vec![2.0]),
            trial(f64::INFINITY, Vec::new()),
        ];
        let stats = validator.calculate_statistics(&results);

        assert_eq!(stats.trials, 3);
        assert_eq!(stats.failed_trials, 1);
        assert_eq!(stats.mean_error, 2.0);
        assert_eq!(stats.max_error, 3.0);
        assert_eq!(stats.error_95_percentile, 3.0);
        assert!((stats.hit_rate - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(stats.mean_radius_curve, vec![3.0, 2.0]);
    }
}
