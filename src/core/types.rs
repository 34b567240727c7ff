//! Core data types for the localization system

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

/// Fixed receiver station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub id: u16,
    pub name: String,
    pub position: Vector2<f64>,
}

impl Station {
    pub fn new(id: u16, name: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            id,
            name: name.into(),
            position: Vector2::new(x, y),
        }
    }

    /// Euclidean distance from this station to `point`
    pub fn distance_to(&self, point: &Vector2<f64>) -> f64 {
        (point - self.position).norm()
    }
}

/// One travel-time reading attributed to a station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub station_id: u16,
    /// One-way travel time (time units)
    pub travel_time: f64,
    /// Capture timestamp (milliseconds since epoch), if the source provides one
    #[serde(default)]
    pub captured_at_ms: Option<u64>,
}

impl Measurement {
    pub fn new(station_id: u16, travel_time: f64) -> Self {
        Self {
            station_id,
            travel_time,
            captured_at_ms: None,
        }
    }

    pub fn with_timestamp(mut self, captured_at_ms: u64) -> Self {
        self.captured_at_ms = Some(captured_at_ms);
        self
    }
}

/// One emission observed at every station
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MeasurementBatch {
    pub measurements: Vec<Measurement>,
}

impl MeasurementBatch {
    pub fn new(measurements: Vec<Measurement>) -> Self {
        Self { measurements }
    }

    /// Build a batch by pairing `times` with `stations` in order
    pub fn from_times(stations: &[Station], times: &[f64]) -> Self {
        Self {
            measurements: stations
                .iter()
                .zip(times.iter())
                .map(|(station, &time)| Measurement::new(station.id, time))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    /// Travel time reported for `station_id`, if present
    pub fn time_for(&self, station_id: u16) -> Option<f64> {
        self.measurements
            .iter()
            .find(|m| m.station_id == station_id)
            .map(|m| m.travel_time)
    }
}

/// Weighted candidate position owned by the particle filter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    pub position: Vector2<f64>,
    pub weight: f64,
}

impl Particle {
    pub fn new(position: Vector2<f64>, weight: f64) -> Self {
        Self { position, weight }
    }
}

/// Snapshot of the posterior after a filter step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationEstimate {
    /// Weighted mean particle position
    pub position: Vector2<f64>,
    /// Weighted standard deviation along each axis
    pub std_dev: Vector2<f64>,
    /// sqrt(var_x + var_y), the reported accuracy figure
    pub accuracy_radius: f64,
    pub effective_sample_size: f64,
}

/// Region the particle population is drawn from and confined to
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape")]
pub enum SimulationBounds {
    Rectangle {
        min_x: f64,
        min_y: f64,
        max_x: f64,
        max_y: f64,
    },
    Circle {
        center_x: f64,
        center_y: f64,
        radius: f64,
    },
}

impl SimulationBounds {
    pub fn rectangle(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        SimulationBounds::Rectangle { min_x, min_y, max_x, max_y }
    }

    pub fn circle(center: Vector2<f64>, radius: f64) -> Self {
        SimulationBounds::Circle {
            center_x: center.x,
            center_y: center.y,
            radius,
        }
    }

    /// Bounding box of `stations`, padded on each side by `padding_fraction` of its larger side
    pub fn around_stations(stations: &[Station], padding_fraction: f64) -> Self {
        let mut min = Vector2::new(f64::INFINITY, f64::INFINITY);
        let mut max = Vector2::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
        for station in stations {
            min = min.inf(&station.position);
            max = max.sup(&station.position);
        }
        if stations.is_empty() {
            min = Vector2::zeros();
            max = Vector2::zeros();
        }

        let extent = (max - min).max();
        let pad = if extent > 0.0 { extent * padding_fraction } else { 1.0 };
        SimulationBounds::rectangle(min.x - pad, min.y - pad, max.x + pad, max.y + pad)
    }

    pub fn contains(&self, point: &Vector2<f64>) -> bool {
        match *self {
            SimulationBounds::Rectangle { min_x, min_y, max_x, max_y } => {
                point.x >= min_x && point.x <= max_x && point.y >= min_y && point.y <= max_y
            }
            SimulationBounds::Circle { center_x, center_y, radius } => {
                (point - Vector2::new(center_x, center_y)).norm() <= radius
            }
        }
    }

    /// Project `point` onto the region
    pub fn clamp(&self, point: &Vector2<f64>) -> Vector2<f64> {
        match *self {
            SimulationBounds::Rectangle { min_x, min_y, max_x, max_y } => {
                Vector2::new(point.x.clamp(min_x, max_x), point.y.clamp(min_y, max_y))
            }
            SimulationBounds::Circle { center_x, center_y, radius } => {
                let center = Vector2::new(center_x, center_y);
                let offset = point - center;
                let distance = offset.norm();
                if distance <= radius {
                    *point
                } else {
                    center + offset * (radius / distance)
                }
            }
        }
    }

    /// Whether the region has positive, finite extent
    pub fn is_valid(&self) -> bool {
        match *self {
            SimulationBounds::Rectangle { min_x, min_y, max_x, max_y } => {
                [min_x, min_y, max_x, max_y].iter().all(|v| v.is_finite())
                    && max_x > min_x
                    && max_y > min_y
            }
            SimulationBounds::Circle { center_x, center_y, radius } => {
                center_x.is_finite() && center_y.is_finite() && radius.is_finite() && radius > 0.0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Vec<Station> {
        vec![
            Station::new(1, "sw", 0.0, 0.0),
            Station::new(2, "se", 100.0, 0.0),
            Station::new(3, "nw", 0.0, 100.0),
            Station::new(4, "ne", 100.0, 100.0),
        ]
    }

    #[test]
    fn test_batch_from_times_pairs_in_order() {
        let batch = MeasurementBatch::from_times(&square(), &[0.1, 0.2, 0.3, 0.4]);
        assert_eq!(batch.len(), 4);
        assert_eq!(batch.time_for(3), Some(0.3));
        assert_eq!(batch.time_for(9), None);
    }

    #[test]
    fn test_bounds_around_stations_are_padded() {
        let bounds = SimulationBounds::around_stations(&square(), 0.1);
        assert_eq!(bounds, SimulationBounds::rectangle(-10.0, -10.0, 110.0, 110.0));
        assert!(bounds.contains(&Vector2::new(-5.0, 105.0)));
    }

    #[test]
    fn test_circle_clamp_projects_onto_boundary() {
        let bounds = SimulationBounds::circle(Vector2::new(0.0, 0.0), 10.0);
        let clamped = bounds.clamp(&Vector2::new(20.0, 0.0));
        assert!((clamped - Vector2::new(10.0, 0.0)).norm() < 1e-12);
        assert!(bounds.is_valid());
        assert!(!SimulationBounds::rectangle(0.0, 0.0, 0.0, 1.0).is_valid());
    }

    #[test]
    fn test_bounds_serialization_is_tagged() {
        let json = serde_json::to_string(&SimulationBounds::rectangle(0.0, 0.0, 1.0, 2.0)).unwrap();
        assert!(json.contains("\"shape\":\"Rectangle\""));
        let back: SimulationBounds = serde_json::from_str(&json).unwrap();
        assert_eq!(back, SimulationBounds::rectangle(0.0, 0.0, 1.0, 2.0));
    }
}
