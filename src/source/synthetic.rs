//! Simulated measurement source for testing and development

use log::trace;
use nalgebra::Vector2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use crate::core::{Measurement, MeasurementBatch, Station};
use crate::source::{MeasurementSource, SourceResult};

/// Emits batches for a fixed target with Gaussian timing noise
pub struct SyntheticSource {
    stations: Vec<Station>,
    target: Vector2<f64>,
    speed: f64,
    noise: Option<Normal<f64>>,
    remaining: usize,
    emitted: u64,
    /// Spacing of the capture timestamps attached to each batch
    interval_ms: u64,
    rng: StdRng,
}

impl SyntheticSource {
    /// `noise_std_dev` is in time units; 0 produces exact times
    pub fn new(
        stations: Vec<Station>,
        target: Vector2<f64>,
        speed: f64,
        noise_std_dev: f64,
        batches: usize,
        seed: u64,
    ) -> Self {
        let noise = if noise_std_dev > 0.0 {
            Normal::new(0.0, noise_std_dev).ok()
        } else {
            None
        };
        Self {
            stations,
            target,
            speed,
            noise,
            remaining: batches,
            emitted: 0,
            interval_ms: 1000,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn with_interval_ms(mut self, interval_ms: u64) -> Self {
        self.interval_ms = interval_ms;
        self
    }

    /// Noiseless travel times, in station order
    pub fn exact_times(&self) -> Vec<f64> {
        self.stations
            .iter()
            .map(|s| s.distance_to(&self.target) / self.speed)
            .collect()
    }

    pub fn target(&self) -> Vector2<f64> {
        self.target
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }
}

impl MeasurementSource for SyntheticSource {
    fn next_batch(&mut self) -> SourceResult<Option<MeasurementBatch>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;

        let captured_at_ms = self.emitted * self.interval_ms;
        let exact = self.exact_times();
        let measurements = self
            .stations
            .iter()
            .zip(exact)
            .map(|(station, time)| {
                let jitter = self.noise.map_or(0.0, |n| n.sample(&mut self.rng));
                // Travel times cannot be negative
                Measurement::new(station.id, (time + jitter).max(0.0)).with_timestamp(captured_at_ms)
            })
            .collect();
        self.emitted += 1;
        trace!("Synthetic batch {} emitted", self.emitted);

        Ok(Some(MeasurementBatch::new(measurements)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stations() -> Vec<Station> {
        vec![
            Station::new(1, "a", 0.0, 0.0),
            Station::new(2, "b", 100.0, 0.0),
            Station::new(3, "c", 0.0, 100.0),
            Station::new(4, "d", 100.0, 100.0),
        ]
    }

    #[test]
    fn test_exact_batches_until_exhausted() {
        let mut source = SyntheticSource::new(stations(), Vector2::new(42.0, 58.0), 300.0, 0.0, 2, 1);
        let first = source.next_batch().unwrap().unwrap();
        assert_eq!(first.len(), 4);
        assert!((first.time_for(1).unwrap() - (42.0f64.hypot(58.0) / 300.0)).abs() < 1e-15);
        assert_eq!(first.measurements[0].captured_at_ms, Some(0));

        let second = source.next_batch().unwrap().unwrap();
        assert_eq!(second.measurements[0].captured_at_ms, Some(1000));
        assert!(source.next_batch().unwrap().is_none());
        assert_eq!(source.remaining(), 0);
    }

    #[test]
    fn test_noisy_batches_are_seeded() {
        let mut a = SyntheticSource::new(stations(), Vector2::new(10.0, 20.0), 300.0, 0.01, 3, 5);
        let mut b = SyntheticSource::new(stations(), Vector2::new(10.0, 20.0), 300.0, 0.01, 3, 5);
        for _ in 0..3 {
            let batch_a = a.next_batch().unwrap().unwrap();
            assert_eq!(Some(batch_a.clone()), b.next_batch().unwrap());
            assert!(batch_a.measurements.iter().all(|m| m.travel_time >= 0.0));
        }
    }
}
