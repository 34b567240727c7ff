//! Coarse Monte Carlo fit of position and propagation constant
//!
//! Draws uniform candidates over the bounds and scores each with the
//! closed-form least-squares scale `k = Σ d_i t_i / Σ t_i²`. Slow and
//! imprecise, but it never fails on geometry the closed-form solver rejects,
//! so it is enough to give the filter a usable constant.

use log::debug;
use nalgebra::Vector2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

use crate::core::{SimulationBounds, Station};

/// Best candidate found by a scale search
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleFit {
    pub position: Vector2<f64>,
    /// Fitted propagation constant (0 when every time is zero)
    pub speed: f64,
    /// Sum of squared distance residuals at the fitted scale
    pub error: f64,
}

/// Seedable brute-force search
pub struct ScaleSearch {
    pub samples: usize,
    rng: StdRng,
}

impl ScaleSearch {
    pub fn new(samples: usize, seed: u64) -> Self {
        Self {
            samples,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Least-squares scale and its residual for one candidate
    pub fn fit_candidate(candidate: &Vector2<f64>, stations: &[Station], times: &[f64]) -> (f64, f64) {
        let distances: Vec<f64> = stations.iter().map(|s| s.distance_to(candidate)).collect();
        let cross: f64 = distances.iter().zip(times).map(|(d, t)| d * t).sum();
        let norm: f64 = times.iter().map(|t| t * t).sum();

        let scale = if norm == 0.0 { 0.0 } else { cross / norm };
        let error = distances
            .iter()
            .zip(times)
            .map(|(d, t)| (d - scale * t).powi(2))
            .sum();
        (scale, error)
    }

    /// Best of `samples` uniform candidates; `None` with no samples or mismatched inputs
    pub fn search(&mut self, stations: &[Station], times: &[f64], bounds: &SimulationBounds) -> Option<ScaleFit> {
        if self.samples == 0 || stations.len() != times.len() || stations.is_empty() {
            return None;
        }

        let mut best: Option<ScaleFit> = None;
        for _ in 0..self.samples {
            let candidate = self.draw(bounds);
            let (speed, error) = Self::fit_candidate(&candidate, stations, times);
            if best.map_or(true, |b| error < b.error) {
                best = Some(ScaleFit { position: candidate, speed, error });
            }
        }

        if let Some(fit) = &best {
            debug!(
                "Scale search over {} samples: c={:.4}, error={:.4e} at ({:.3}, {:.3})",
                self.samples, fit.speed, fit.error, fit.position.x, fit.position.y
            );
        }
        best
    }

    fn draw(&mut self, bounds: &SimulationBounds) -> Vector2<f64> {
        match *bounds {
            SimulationBounds::Rectangle { min_x, min_y, max_x, max_y } => Vector2::new(
                self.rng.gen_range(min_x..=max_x),
                self.rng.gen_range(min_y..=max_y),
            ),
            SimulationBounds::Circle { center_x, center_y, radius } => {
                let r = radius * self.rng.gen::<f64>().sqrt();
                let theta = self.rng.gen_range(0.0..TAU);
                Vector2::new(center_x + r * theta.cos(), center_y + r * theta.sin())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Vec<Station> {
        vec![
            Station::new(1, "a", 0.0, 0.0),
            Station::new(2, "b", 100.0, 0.0),
            Station::new(3, "c", 0.0, 100.0),
            Station::new(4, "d", 100.0, 100.0),
        ]
    }

    #[test]
    fn test_fit_candidate_exact() {
        let stations = square();
        let target = Vector2::new(42.0, 58.0);
        let times: Vec<f64> = stations.iter().map(|s| s.distance_to(&target) / 300.0).collect();

        let (scale, error) = ScaleSearch::fit_candidate(&target, &stations, &times);
        assert!((scale - 300.0).abs() < 1e-9);
        assert!(error < 1e-18);
    }

    #[test]
    fn test_fit_candidate_zero_times() {
        let stations = square();
        let (scale, error) = ScaleSearch::fit_candidate(&Vector2::new(0.0, 0.0), &stations, &[0.0; 4]);
        assert_eq!(scale, 0.0);
        assert!((error - (0.0 + 10_000.0 + 10_000.0 + 20_000.0)).abs() < 1e-9);
    }

    #[test]
    fn test_search_finds_rough_answer() {
        let stations = square();
        let target = Vector2::new(42.0, 58.0);
        let times: Vec<f64> = stations.iter().map(|s| s.distance_to(&target) / 300.0).collect();
        let bounds = SimulationBounds::rectangle(0.0, 0.0, 100.0, 100.0);

        let fit = ScaleSearch::new(10_000, 7).search(&stations, &times, &bounds).unwrap();
        assert!((fit.position - target).norm() < 5.0);
        assert!((fit.speed - 300.0).abs() < 30.0);
    }

    #[test]
    fn test_search_is_reproducible() {
        let stations = square();
        let times = [0.2, 0.25, 0.22, 0.3];
        let bounds = SimulationBounds::rectangle(0.0, 0.0, 100.0, 100.0);
        let a = ScaleSearch::new(500, 3).search(&stations, &times, &bounds);
        let b = ScaleSearch::new(500, 3).search(&stations, &times, &bounds);
        assert_eq!(a, b);
        assert!(ScaleSearch::new(0, 3).search(&stations, &times, &bounds).is_none());
    }
}
