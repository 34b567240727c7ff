//! Summaries of repeated travel-time samples
//!
//! A station usually hears the same emission several times per epoch. The
//! `BatchAssembler` buffers raw samples per station and turns them into one
//! `MeasurementBatch` of per-station medians once every station has enough.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::{Measurement, MeasurementBatch, Station};

/// Descriptive statistics over a set of samples
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    /// Sample standard deviation; 0 below two samples
    pub std_dev: f64,
}

impl SampleStats {
    /// Summarize the finite values in `samples`, `None` if there are none
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        let mut sorted: Vec<f64> = samples.iter().copied().filter(|s| s.is_finite()).collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(|a, b| a.total_cmp(b));

        let count = sorted.len();
        let mean = sorted.iter().sum::<f64>() / count as f64;
        let median = if count % 2 == 1 {
            sorted[count / 2]
        } else {
            (sorted[count / 2 - 1] + sorted[count / 2]) / 2.0
        };
        let std_dev = if count < 2 {
            0.0
        } else {
            let ss: f64 = sorted.iter().map(|s| (s - mean).powi(2)).sum();
            (ss / (count - 1) as f64).sqrt()
        };

        Some(Self {
            count,
            min: sorted[0],
            max: sorted[count - 1],
            mean,
            median,
            std_dev,
        })
    }
}

/// Collects per-station samples into complete batches
#[derive(Debug, Clone)]
pub struct BatchAssembler {
    station_ids: Vec<u16>,
    min_samples: usize,
    samples: BTreeMap<u16, Vec<f64>>,
}

impl BatchAssembler {
    pub fn new(stations: &[Station], min_samples: usize) -> Self {
        Self {
            station_ids: stations.iter().map(|s| s.id).collect(),
            min_samples: min_samples.max(1),
            samples: BTreeMap::new(),
        }
    }

    /// Buffer one sample. Returns false for unknown stations and non-finite values.
    pub fn push(&mut self, station_id: u16, travel_time: f64) -> bool {
        if !self.station_ids.contains(&station_id) || !travel_time.is_finite() {
            return false;
        }
        self.samples.entry(station_id).or_default().push(travel_time);
        true
    }

    pub fn is_ready(&self) -> bool {
        self.station_ids.iter().all(|id| {
            self.samples
                .get(id)
                .map_or(false, |s| s.len() >= self.min_samples)
        })
    }

    pub fn stats_for(&self, station_id: u16) -> Option<SampleStats> {
        self.samples.get(&station_id).and_then(|s| SampleStats::from_samples(s))
    }

    /// Emit a batch of per-station medians and clear the buffers, if every station is ready
    pub fn take_batch(&mut self) -> Option<MeasurementBatch> {
        if !self.is_ready() {
            return None;
        }

        let measurements = self
            .station_ids
            .iter()
            .filter_map(|id| self.stats_for(*id).map(|stats| Measurement::new(*id, stats.median)))
            .collect();
        self.samples.clear();
        Some(MeasurementBatch::new(measurements))
    }

    pub fn pending(&self) -> usize {
        self.samples.values().map(Vec::len).sum()
    }
}
