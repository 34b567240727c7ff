//! Replays recorded batches from JSON
//!
//! The input is a JSON array. Each entry is either a full batch object
//! (`{"measurements": [{"station_id": 1, "travel_time": 0.2}, ...]}`) or a bare
//! array of times in configured station order (`[0.2, 0.25, 0.22, 0.3]`).
//! An entry matching neither shape becomes a `Malformed` item; only a file
//! that is not a JSON array fails as a whole.

use serde::Deserialize;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use crate::core::{MeasurementBatch, Station};
use crate::source::{MeasurementSource, SourceError, SourceResult};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ReplayEntry {
    Batch(MeasurementBatch),
    Times(Vec<f64>),
}

/// Finite source over recorded entries
#[derive(Debug)]
pub struct ReplaySource {
    entries: VecDeque<SourceResult<MeasurementBatch>>,
}

impl ReplaySource {
    pub fn from_batches(batches: Vec<MeasurementBatch>) -> Self {
        Self {
            entries: batches.into_iter().map(Ok).collect(),
        }
    }

    pub fn from_json_str(content: &str, stations: &[Station]) -> SourceResult<Self> {
        let raw: Vec<serde_json::Value> = serde_json::from_str(content).map_err(|e| SourceError::Io {
            message: format!("Failed to parse replay file: {}", e),
        })?;

        let entries = raw
            .into_iter()
            .enumerate()
            .map(|(index, value)| match serde_json::from_value::<ReplayEntry>(value) {
                Err(e) => Err(SourceError::Malformed {
                    index,
                    details: format!("not a batch or a time list: {}", e),
                }),
                Ok(ReplayEntry::Batch(batch)) => Ok(batch),
                Ok(ReplayEntry::Times(times)) if times.len() == stations.len() => {
                    Ok(MeasurementBatch::from_times(stations, &times))
                }
                Ok(ReplayEntry::Times(times)) => Err(SourceError::Malformed {
                    index,
                    details: format!("{} times for {} stations", times.len(), stations.len()),
                }),
            })
            .collect();
        Ok(Self { entries })
    }

    pub fn from_file<P: AsRef<Path>>(path: P, stations: &[Station]) -> SourceResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| SourceError::Io {
            message: format!("Failed to read replay file: {}", e),
        })?;
        Self::from_json_str(&content, stations)
    }

    pub fn remaining(&self) -> usize {
        self.entries.len()
    }
}

impl MeasurementSource for ReplaySource {
    fn next_batch(&mut self) -> SourceResult<Option<MeasurementBatch>> {
        self.entries.pop_front().transpose()
    }
}
