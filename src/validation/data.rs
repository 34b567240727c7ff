//! Measurement batch validation
//!
//! Batches arrive from an external source in whatever order it produced them.
//! The validator checks them against the configured station set and returns
//! the travel times aligned to station order, or an `InvalidBatch` error.

use crate::core::{MeasurementBatch, Station};
use crate::validation::error::{BatchIssue, LocalizationError, LocalizationResult};

/// Checks batches against a fixed station set
#[derive(Debug, Clone)]
pub struct BatchValidator {
    station_ids: Vec<u16>,
}

impl BatchValidator {
    pub fn new(stations: &[Station]) -> Self {
        Self {
            station_ids: stations.iter().map(|s| s.id).collect(),
        }
    }

    pub fn station_count(&self) -> usize {
        self.station_ids.len()
    }

    /// Validate `batch` and return its travel times in station order
    pub fn aligned_times(&self, batch: &MeasurementBatch) -> LocalizationResult<Vec<f64>> {
        if batch.len() != self.station_ids.len() {
            return Err(LocalizationError::invalid_batch(
                BatchIssue::WrongStationCount {
                    expected: self.station_ids.len(),
                    received: batch.len(),
                },
                None,
            ));
        }

        let mut times: Vec<Option<f64>> = vec![None; self.station_ids.len()];
        for measurement in &batch.measurements {
            let index = self
                .station_ids
                .iter()
                .position(|&id| id == measurement.station_id)
                .ok_or_else(|| {
                    LocalizationError::invalid_batch(BatchIssue::UnknownStation, Some(measurement.station_id))
                })?;

            if times[index].is_some() {
                return Err(LocalizationError::invalid_batch(
                    BatchIssue::DuplicateStation,
                    Some(measurement.station_id),
                ));
            }
            if !measurement.travel_time.is_finite() {
                return Err(LocalizationError::invalid_batch(
                    BatchIssue::NonFiniteTime,
                    Some(measurement.station_id),
                ));
            }
            if measurement.travel_time < 0.0 {
                return Err(LocalizationError::invalid_batch(
                    BatchIssue::NegativeTime,
                    Some(measurement.station_id),
                ));
            }
            times[index] = Some(measurement.travel_time);
        }

        // Count matched and no duplicates, so every slot is filled.
        Ok(times.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Measurement;

    fn stations() -> Vec<Station> {
        vec![
            Station::new(10, "a", 0.0, 0.0),
            Station::new(20, "b", 1.0, 0.0),
            Station::new(30, "c", 0.0, 1.0),
            Station::new(40, "d", 1.0, 1.0),
        ]
    }

    #[test]
    fn test_out_of_order_batch_is_aligned() {
        let validator = BatchValidator::new(&stations());
        let batch = MeasurementBatch::new(vec![
            Measurement::new(40, 4.0),
            Measurement::new(10, 1.0),
            Measurement::new(30, 3.0),
            Measurement::new(20, 2.0),
        ]);
        assert_eq!(validator.aligned_times(&batch).unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_wrong_count_rejected() {
        let validator = BatchValidator::new(&stations());
        let batch = MeasurementBatch::new(vec![Measurement::new(10, 1.0)]);
        assert_eq!(
            validator.aligned_times(&batch),
            Err(LocalizationError::invalid_batch(
                BatchIssue::WrongStationCount { expected: 4, received: 1 },
                None
            ))
        );
    }

    #[test]
    fn test_negative_and_unknown_rejected() {
        let validator = BatchValidator::new(&stations());
        let mut batch = MeasurementBatch::from_times(&stations(), &[1.0, -2.0, 3.0, 4.0]);
        assert!(matches!(
            validator.aligned_times(&batch),
            Err(LocalizationError::InvalidBatch { issue: BatchIssue::NegativeTime, station_id: Some(20) })
        ));

        batch.measurements[1] = Measurement::new(99, 2.0);
        assert!(matches!(
            validator.aligned_times(&batch),
            Err(LocalizationError::InvalidBatch { issue: BatchIssue::UnknownStation, station_id: Some(99) })
        ));

        batch.measurements[1] = Measurement::new(10, 2.0);
        assert!(matches!(
            validator.aligned_times(&batch),
            Err(LocalizationError::InvalidBatch { issue: BatchIssue::DuplicateStation, .. })
        ));
    }

    #[test]
    fn test_non_finite_rejected() {
        let validator = BatchValidator::new(&stations());
        let batch = MeasurementBatch::from_times(&stations(), &[1.0, f64::NAN, 3.0, 4.0]);
        assert!(matches!(
            validator.aligned_times(&batch),
            Err(LocalizationError::InvalidBatch { issue: BatchIssue::NonFiniteTime, .. })
        ));
    }
}
