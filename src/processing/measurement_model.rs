//! Travel time to distance conversion and measurement likelihoods
//!
//! The model is shared by the geometric solver, which uses it to score a
//! solution, and by the particle filter, which uses it to weight particles.
//! Likelihoods are accumulated in log space so that thousands of particles
//! times several stations never underflow before normalization.

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::core::Station;

/// Distribution of the travel-time error, in time units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum NoiseModel {
    /// Zero-mean Gaussian
    Gaussian { std_dev: f64 },
    /// Zero-mean Laplace, heavier tails for occasional late arrivals
    Laplace { scale: f64 },
}

impl Default for NoiseModel {
    fn default() -> Self {
        NoiseModel::Gaussian {
            std_dev: crate::core::DEFAULT_NOISE_STD_DEV,
        }
    }
}

impl NoiseModel {
    /// Spread parameter (std-dev or scale)
    pub fn spread(&self) -> f64 {
        match *self {
            NoiseModel::Gaussian { std_dev } => std_dev,
            NoiseModel::Laplace { scale } => scale,
        }
    }

    pub fn is_valid(&self) -> bool {
        let spread = self.spread();
        spread.is_finite() && spread > 0.0
    }

    /// Log density of an error of `residual` time units
    pub fn log_pdf(&self, residual: f64) -> f64 {
        match *self {
            NoiseModel::Gaussian { std_dev } => {
                let z = residual / std_dev;
                -0.5 * z * z - (std_dev * (2.0 * PI).sqrt()).ln()
            }
            NoiseModel::Laplace { scale } => -(residual.abs() / scale) - (2.0 * scale).ln(),
        }
    }
}

/// Converts between travel times and distances under a noise model
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MeasurementModel {
    pub noise: NoiseModel,
}

impl MeasurementModel {
    pub fn new(noise: NoiseModel) -> Self {
        Self { noise }
    }

    pub fn gaussian(std_dev: f64) -> Self {
        Self::new(NoiseModel::Gaussian { std_dev })
    }

    /// Distance covered in `time` at propagation constant `speed`
    pub fn distance(&self, time: f64, speed: f64) -> f64 {
        speed * time
    }

    /// Travel time implied by a candidate position
    pub fn expected_time(&self, candidate: &Vector2<f64>, station: &Station, speed: f64) -> f64 {
        station.distance_to(candidate) / speed
    }

    /// Log density of `observed_time` given the candidate position
    pub fn log_likelihood(&self, observed_time: f64, candidate: &Vector2<f64>, station: &Station, speed: f64) -> f64 {
        let expected = self.expected_time(candidate, station, speed);
        self.noise.log_pdf(observed_time - expected)
    }

    /// Density of `observed_time` given the candidate position
    pub fn likelihood(&self, observed_time: f64, candidate: &Vector2<f64>, station: &Station, speed: f64) -> f64 {
        self.log_likelihood(observed_time, candidate, station, speed).exp()
    }

    /// Sum of per-station log-likelihoods for one batch
    pub fn joint_log_likelihood(
        &self,
        times: &[f64],
        candidate: &Vector2<f64>,
        stations: &[Station],
        speed: f64,
    ) -> f64 {
        stations
            .iter()
            .zip(times.iter())
            .map(|(station, &time)| self.log_likelihood(time, candidate, station, speed))
            .sum()
    }

    /// Distance residuals `|P - S_i| - c t_i` per station
    pub fn distance_residuals(
        &self,
        times: &[f64],
        candidate: &Vector2<f64>,
        stations: &[Station],
        speed: f64,
    ) -> Vec<f64> {
        stations
            .iter()
            .zip(times.iter())
            .map(|(station, &time)| station.distance_to(candidate) - self.distance(time, speed))
            .collect()
    }

    /// Root-mean-square distance residual
    pub fn rms_residual(&self, times: &[f64], candidate: &Vector2<f64>, stations: &[Station], speed: f64) -> f64 {
        let residuals = self.distance_residuals(times, candidate, stations, speed);
        if residuals.is_empty() {
            return 0.0;
        }
        (residuals.iter().map(|r| r * r).sum::<f64>() / residuals.len() as f64).sqrt()
    }
}
