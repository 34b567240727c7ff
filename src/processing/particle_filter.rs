//! Sequential Monte Carlo estimator over 2D target positions
//!
//! Each batch drives one Predict -> Update -> Resample cycle:
//!
//! - `predict` applies a Gaussian random walk of `diffusion_step` to every
//!   particle. A step of 0 is the static-target model and leaves the cloud as is.
//! - `update` multiplies each weight by the joint likelihood of the batch,
//!   computed in log space and normalized with a max shift. The propagation
//!   constant is an input: the filter does not estimate it.
//! - `resample` draws a fresh population by systematic resampling when the
//!   effective sample size falls below `resample_threshold * N`, replacing the
//!   old population in one assignment.
//!
//! The generator is owned by the filter and seeded from the configuration, so
//! a run is reproducible bit for bit.

use log::{debug, info, warn};
use nalgebra::Vector2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

use crate::core::{LocationEstimate, MeasurementBatch, Particle, SimulationBounds, Station};
use crate::processing::measurement_model::MeasurementModel;
use crate::utils::config::{ConfigError, FilterConfig};
use crate::validation::data::BatchValidator;
use crate::validation::error::{GeometryIssue, LocalizationError, LocalizationResult};

/// Lifecycle of a filter instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterState {
    Uninitialized,
    Seeded,
    Updated,
    Converged,
}

/// Particle filter over candidate target positions
pub struct ParticleFilter {
    config: FilterConfig,
    bounds: SimulationBounds,
    stations: Vec<Station>,
    model: MeasurementModel,
    validator: BatchValidator,
    particles: Vec<Particle>,
    rng: StdRng,
    state: FilterState,
    /// Center of the last prior-seeded population, reused on reseed
    seed_center: Option<Vector2<f64>>,
    converged_streak: u32,
    updates: u64,
}

impl ParticleFilter {
    pub fn new(
        config: FilterConfig,
        bounds: SimulationBounds,
        stations: Vec<Station>,
        model: MeasurementModel,
    ) -> Result<Self, ConfigError> {
        if config.particle_count == 0 {
            return Err(ConfigError::InvalidParameter {
                parameter: "filter.particle_count".to_string(),
                value: "0".to_string(),
                reason: "Particle count must be positive".to_string(),
            });
        }
        if !bounds.is_valid() {
            return Err(ConfigError::InvalidParameter {
                parameter: "bounds".to_string(),
                value: format!("{:?}", bounds),
                reason: "Bounds must have positive, finite extent".to_string(),
            });
        }
        if !(config.diffusion_step >= 0.0 && config.diffusion_step.is_finite()) {
            return Err(ConfigError::InvalidParameter {
                parameter: "filter.diffusion_step".to_string(),
                value: config.diffusion_step.to_string(),
                reason: "Diffusion step must be non-negative and finite".to_string(),
            });
        }
        if !(config.prior_spread > 0.0 && config.prior_spread.is_finite()) {
            return Err(ConfigError::InvalidParameter {
                parameter: "filter.prior_spread".to_string(),
                value: config.prior_spread.to_string(),
                reason: "Prior spread must be positive and finite".to_string(),
            });
        }
        if !model.noise.is_valid() {
            return Err(ConfigError::InvalidParameter {
                parameter: "noise".to_string(),
                value: model.noise.spread().to_string(),
                reason: "Noise spread must be positive and finite".to_string(),
            });
        }

        let seed = config.seed.unwrap_or_else(|| rand::thread_rng().gen());
        debug!("Particle filter generator seeded with {}", seed);

        Ok(Self {
            validator: BatchValidator::new(&stations),
            config,
            bounds,
            stations,
            model,
            particles: Vec::new(),
            rng: StdRng::seed_from_u64(seed),
            state: FilterState::Uninitialized,
            seed_center: None,
            converged_streak: 0,
            updates: 0,
        })
    }

    /// Draw a fresh population with equal weights
    ///
    /// With a prior the particles are Gaussian around it with `prior_spread`,
    /// otherwise uniform over the bounds. Either way they are confined to the bounds.
    pub fn initialize(&mut self, prior: Option<Vector2<f64>>) {
        let count = self.config.particle_count;
        let weight = 1.0 / count as f64;

        let positions = match prior {
            Some(center) => self.sample_around(center, count),
            None => self.sample_uniform(count),
        };
        self.particles = positions.into_iter().map(|p| Particle::new(p, weight)).collect();
        self.seed_center = prior;
        self.converged_streak = 0;
        self.state = FilterState::Seeded;

        match prior {
            Some(center) => info!(
                "Seeded {} particles around ({:.3}, {:.3})",
                count, center.x, center.y
            ),
            None => info!("Seeded {} particles uniformly over {:?}", count, self.bounds),
        }
    }

    /// Diffuse every particle by the configured random walk
    pub fn predict(&mut self) {
        if self.state == FilterState::Uninitialized || self.config.diffusion_step == 0.0 {
            return;
        }
        let Ok(walk) = Normal::new(0.0, self.config.diffusion_step) else {
            return;
        };

        for particle in &mut self.particles {
            let step = Vector2::new(walk.sample(&mut self.rng), walk.sample(&mut self.rng));
            particle.position = self.bounds.clamp(&(particle.position + step));
        }
    }

    /// Reweight the population by the likelihood of `batch` at propagation constant `speed`
    ///
    /// A malformed batch is rejected before anything changes. When every
    /// particle's likelihood underflows the filter reseeds itself and returns
    /// `DegenerateWeights`; the filter is usable again right away.
    pub fn update(&mut self, batch: &MeasurementBatch, speed: f64) -> LocalizationResult<()> {
        let times = self.validator.aligned_times(batch)?;
        if !(speed.is_finite() && speed > 0.0) {
            return Err(LocalizationError::degenerate(GeometryIssue::NonPositiveSpeed));
        }
        if self.state == FilterState::Uninitialized {
            self.initialize(None);
        }

        let log_likelihoods: Vec<f64> = self
            .particles
            .iter()
            .map(|p| self.model.joint_log_likelihood(&times, &p.position, &self.stations, speed))
            .collect();
        let max_log_likelihood = log_likelihoods.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if !max_log_likelihood.is_finite() || max_log_likelihood < self.config.min_log_likelihood {
            return Err(self.recover_from_degenerate_weights(max_log_likelihood));
        }

        let log_weights: Vec<f64> = self
            .particles
            .iter()
            .zip(log_likelihoods.iter())
            .map(|(p, ll)| p.weight.ln() + ll)
            .collect();
        let shift = log_weights.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let mut total = 0.0;
        for (particle, log_weight) in self.particles.iter_mut().zip(log_weights.iter()) {
            particle.weight = (log_weight - shift).exp();
            total += particle.weight;
        }
        if !(total > 0.0 && total.is_finite()) {
            return Err(self.recover_from_degenerate_weights(max_log_likelihood));
        }
        for particle in &mut self.particles {
            particle.weight /= total;
        }

        self.updates += 1;
        self.state = FilterState::Updated;
        Ok(())
    }

    /// Systematic resampling when the effective sample size is too low
    ///
    /// Returns whether a new population was drawn. Also re-evaluates convergence.
    pub fn resample(&mut self) -> bool {
        let count = self.particles.len();
        if count == 0 {
            return false;
        }

        let ess = self.effective_sample_size();
        let triggered = ess < self.config.resample_threshold * count as f64;
        if triggered {
            let step = 1.0 / count as f64;
            let offset = self.rng.gen_range(0.0..step);

            let mut next = Vec::with_capacity(count);
            let mut source = 0;
            let mut cumulative = self.particles[0].weight;
            for i in 0..count {
                let target = offset + i as f64 * step;
                while cumulative < target && source < count - 1 {
                    source += 1;
                    cumulative += self.particles[source].weight;
                }
                next.push(Particle::new(self.particles[source].position, step));
            }
            self.particles = next;
            debug!("Resampled {} particles (ESS was {:.1})", count, ess);
        }

        self.update_convergence();
        triggered
    }

    /// Weighted mean and spread of the current population
    pub fn estimate(&self) -> Option<LocationEstimate> {
        let total: f64 = self.particles.iter().map(|p| p.weight).sum();
        if self.particles.is_empty() || !(total > 0.0) {
            return None;
        }

        let mean = self
            .particles
            .iter()
            .fold(Vector2::<f64>::zeros(), |acc, p| acc + p.position * p.weight)
            / total;
        let variance = self.particles.iter().fold(Vector2::<f64>::zeros(), |acc, p| {
            let d = p.position - mean;
            acc + d.component_mul(&d) * p.weight
        }) / total;

        Some(LocationEstimate {
            position: mean,
            std_dev: variance.map(f64::sqrt),
            accuracy_radius: (variance.x + variance.y).sqrt(),
            effective_sample_size: self.effective_sample_size(),
        })
    }

    /// 1 / sum(w^2) over normalized weights
    pub fn effective_sample_size(&self) -> f64 {
        let sum_squares: f64 = self.particles.iter().map(|p| p.weight * p.weight).sum();
        if sum_squares > 0.0 {
            1.0 / sum_squares
        } else {
            0.0
        }
    }

    pub fn weight_sum(&self) -> f64 {
        self.particles.iter().map(|p| p.weight).sum()
    }

    pub fn state(&self) -> FilterState {
        self.state
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    pub fn bounds(&self) -> &SimulationBounds {
        &self.bounds
    }

    /// Successful updates since construction
    pub fn updates(&self) -> u64 {
        self.updates
    }

    fn recover_from_degenerate_weights(&mut self, max_log_likelihood: f64) -> LocalizationError {
        warn!(
            "All particle likelihoods collapsed (best log-likelihood {:.1}); reseeding",
            max_log_likelihood
        );
        let center = self.seed_center;
        self.initialize(center);
        LocalizationError::DegenerateWeights {
            max_log_likelihood,
            particle_count: self.particles.len(),
        }
    }

    fn update_convergence(&mut self) {
        if self.state != FilterState::Updated {
            return;
        }
        let Some(estimate) = self.estimate() else {
            return;
        };

        let patience = self.config.convergence_patience;
        let was_converged = self.converged_streak >= patience;
        if estimate.accuracy_radius < self.config.convergence_tolerance {
            self.converged_streak += 1;
        } else {
            self.converged_streak = 0;
        }
        let converged = self.converged_streak >= patience;

        if converged && !was_converged {
            info!(
                "Filter converged: radius {:.4} at ({:.4}, {:.4})",
                estimate.accuracy_radius, estimate.position.x, estimate.position.y
            );
        } else if was_converged && !converged {
            debug!("Filter left convergence: radius {:.4}", estimate.accuracy_radius);
        }
        self.state = if converged {
            FilterState::Converged
        } else {
            FilterState::Updated
        };
    }

    fn sample_uniform(&mut self, count: usize) -> Vec<Vector2<f64>> {
        let bounds = self.bounds;
        (0..count)
            .map(|_| match bounds {
                SimulationBounds::Rectangle { min_x, min_y, max_x, max_y } => Vector2::new(
                    self.rng.gen_range(min_x..=max_x),
                    self.rng.gen_range(min_y..=max_y),
                ),
                SimulationBounds::Circle { center_x, center_y, radius } => {
                    let r = radius * self.rng.gen::<f64>().sqrt();
                    let theta = self.rng.gen_range(0.0..TAU);
                    Vector2::new(center_x + r * theta.cos(), center_y + r * theta.sin())
                }
            })
            .collect()
    }

    fn sample_around(&mut self, center: Vector2<f64>, count: usize) -> Vec<Vector2<f64>> {
        let Ok(spread) = Normal::new(0.0, self.config.prior_spread) else {
            return self.sample_uniform(count);
        };
        let bounds = self.bounds;
        (0..count)
            .map(|_| {
                let offset = Vector2::new(spread.sample(&mut self.rng), spread.sample(&mut self.rng));
                bounds.clamp(&(center + offset))
            })
            .collect()
    }
}
