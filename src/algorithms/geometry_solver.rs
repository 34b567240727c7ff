//! Closed-form trilateration with an unknown propagation constant
//!
//! Stations 1-3 form the base triple. Subtracting the first circle equation
//! `|P - S_1|^2 = c^2 t_1^2` from the other two removes the quadratic terms in
//! P and leaves a 2x2 linear system whose right-hand side is affine in
//! `s = c^2`, so every trial `c` maps to one candidate position `P(c)`.
//! The remaining stations pin down `c`: the solver searches for the roots of
//!
//! ```text
//! residual(c) = sum_{k >= 4} (|P(c) - S_k| - c t_k)
//! ```
//!
//! over a geometric grid of the configured interval, refines each sign change
//! by bisection and back-substitutes the chosen root.
//!
//! With several roots the one closest to a supplied prior wins, otherwise the
//! smallest positive root.
//!
//! Beyond four stations the residual stays a signed sum rather than a sum of
//! squares. Its roots are brackets the scan can find, and under zero-mean
//! noise they land next to the least-squares optimum. Terms of opposite sign
//! can still cancel, so every solution is checked against all stations: an
//! RMS distance residual above `max_relative_residual` times the mean range
//! rejects the times as contradictory.

use log::{debug, trace};
use nalgebra::{Matrix2, Vector2};

use crate::core::{
    Station, DEFAULT_COLLINEARITY_TOLERANCE, DEFAULT_MAX_ITERATIONS, DEFAULT_SCAN_STEPS, DEFAULT_SPEED_MAX,
    DEFAULT_MAX_RELATIVE_RESIDUAL, DEFAULT_SPEED_MIN,
};
use crate::processing::measurement_model::MeasurementModel;
use crate::utils::config::SolverConfig;
use crate::validation::error::{GeometryIssue, LocalizationError, LocalizationResult};

/// Relative bracket width at which bisection stops
const BISECTION_TOLERANCE: f64 = 1e-13;

/// Geometric solver for position and propagation constant
#[derive(Debug, Clone)]
pub struct GeometrySolver {
    /// Search interval for the propagation constant
    pub speed_interval: (f64, f64),
    /// Geometric sub-intervals scanned for sign changes
    pub scan_steps: usize,
    /// Bisection iteration cap per bracket
    pub max_iterations: u32,
    /// |sin| of the base-triple angle under which the triple is collinear
    pub collinearity_tolerance: f64,
    /// RMS residual over the mean range above which the times are contradictory
    pub max_relative_residual: f64,
    /// Model used to score the returned solution
    pub model: MeasurementModel,
}

impl Default for GeometrySolver {
    fn default() -> Self {
        Self {
            speed_interval: (DEFAULT_SPEED_MIN, DEFAULT_SPEED_MAX),
            scan_steps: DEFAULT_SCAN_STEPS,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            collinearity_tolerance: DEFAULT_COLLINEARITY_TOLERANCE,
            max_relative_residual: DEFAULT_MAX_RELATIVE_RESIDUAL,
            model: MeasurementModel::default(),
        }
    }
}

/// Result of a successful solve
#[derive(Debug, Clone, PartialEq)]
pub struct GeometrySolution {
    pub position: Vector2<f64>,
    /// Propagation constant (distance units per time unit)
    pub speed: f64,
    /// RMS distance residual over every station
    pub rms_residual: f64,
    /// Every converged root, ascending
    pub candidate_speeds: Vec<f64>,
    /// Bisection iterations spent across all brackets
    pub iterations: u32,
}

/// Linearized base triple: `P(s) = offset - s * slope`
#[derive(Debug, Clone, Copy)]
struct BaseTriple {
    offset: Vector2<f64>,
    slope: Vector2<f64>,
}

impl BaseTriple {
    fn position(&self, speed: f64) -> Vector2<f64> {
        self.offset - self.slope * (speed * speed)
    }
}

/// |sin| of the angle at `a` spanned by `b` and `c`, 0 for collinear or coincident points
pub fn triple_condition(a: &Vector2<f64>, b: &Vector2<f64>, c: &Vector2<f64>) -> f64 {
    let u = b - a;
    let v = c - a;
    let norms = u.norm() * v.norm();
    if norms == 0.0 {
        return 0.0;
    }
    (u.x * v.y - u.y * v.x).abs() / norms
}

impl GeometrySolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &SolverConfig, model: MeasurementModel) -> Self {
        Self {
            speed_interval: (config.speed_min, config.speed_max),
            scan_steps: config.scan_steps,
            max_iterations: config.max_iterations,
            collinearity_tolerance: config.collinearity_tolerance,
            max_relative_residual: config.max_relative_residual,
            model,
        }
    }

    pub fn with_speed_interval(mut self, min: f64, max: f64) -> Self {
        self.speed_interval = (min, max);
        self
    }

    pub fn with_model(mut self, model: MeasurementModel) -> Self {
        self.model = model;
        self
    }

    /// Solve for position and propagation constant
    ///
    /// `times[i]` is the travel time observed at `stations[i]`. `prior_speed`
    /// only breaks ties between multiple roots.
    pub fn solve(
        &self,
        stations: &[Station],
        times: &[f64],
        prior_speed: Option<f64>,
    ) -> LocalizationResult<GeometrySolution> {
        if stations.len() < 4 {
            return Err(LocalizationError::degenerate(GeometryIssue::TooFewStations));
        }
        if stations.len() != times.len() {
            return Err(LocalizationError::degenerate(GeometryIssue::MismatchedInputs));
        }
        if times.iter().any(|t| !t.is_finite() || *t < 0.0) {
            return Err(LocalizationError::degenerate(GeometryIssue::InvalidTimes));
        }
        if times.iter().all(|&t| t == 0.0) {
            return Err(LocalizationError::degenerate(GeometryIssue::AllZeroTimes));
        }

        let triple = self.linearize(stations, times)?;
        let residual = |speed: f64| -> f64 {
            let position = triple.position(speed);
            stations[3..]
                .iter()
                .zip(times[3..].iter())
                .map(|(station, &time)| station.distance_to(&position) - speed * time)
                .sum()
        };

        let (roots, iterations) = self.find_roots(&residual)?;
        let speed = select_root(&roots, prior_speed);
        let position = triple.position(speed);

        if !(speed.is_finite() && speed > 0.0) || !position.iter().all(|v| v.is_finite()) {
            return Err(LocalizationError::degenerate(GeometryIssue::NonPositiveSpeed));
        }

        let rms_residual = self.model.rms_residual(times, &position, stations, speed);
        let mean_range = speed * times.iter().sum::<f64>() / times.len() as f64;
        let relative_residual = rms_residual / mean_range;
        if !(relative_residual <= self.max_relative_residual) {
            debug!(
                "Rejecting c={:.6}: rms residual {:.3e} is {:.3} of the mean range",
                speed, rms_residual, relative_residual
            );
            return Err(LocalizationError::DegenerateGeometry {
                issue: GeometryIssue::Contradictory,
                condition: Some(relative_residual),
            });
        }

        debug!(
            "Geometry solve: c={:.6} at ({:.4}, {:.4}), rms residual {:.3e}, {} candidate root(s)",
            speed,
            position.x,
            position.y,
            rms_residual,
            roots.len()
        );

        Ok(GeometrySolution {
            position,
            speed,
            rms_residual,
            candidate_speeds: roots,
            iterations,
        })
    }

    /// Reduce the base triple to `P(s) = offset - s * slope`
    fn linearize(&self, stations: &[Station], times: &[f64]) -> LocalizationResult<BaseTriple> {
        let (s1, s2, s3) = (&stations[0].position, &stations[1].position, &stations[2].position);
        if s1 == s2 || s1 == s3 || s2 == s3 {
            return Err(LocalizationError::degenerate(GeometryIssue::CoincidentStations));
        }

        let condition = triple_condition(s1, s2, s3);
        if condition < self.collinearity_tolerance {
            return Err(LocalizationError::DegenerateGeometry {
                issue: GeometryIssue::Collinear,
                condition: Some(condition),
            });
        }

        let a = Matrix2::new(
            2.0 * (s2.x - s1.x), 2.0 * (s2.y - s1.y),
            2.0 * (s3.x - s1.x), 2.0 * (s3.y - s1.y),
        );
        let a_inv = a.try_inverse().ok_or(LocalizationError::DegenerateGeometry {
            issue: GeometryIssue::Collinear,
            condition: Some(condition),
        })?;

        let geometric = Vector2::new(
            s2.norm_squared() - s1.norm_squared(),
            s3.norm_squared() - s1.norm_squared(),
        );
        let temporal = Vector2::new(
            times[1] * times[1] - times[0] * times[0],
            times[2] * times[2] - times[0] * times[0],
        );

        Ok(BaseTriple {
            offset: a_inv * geometric,
            slope: a_inv * temporal,
        })
    }

    /// Scan the interval for sign changes and bisect each bracket
    fn find_roots<F: Fn(f64) -> f64>(&self, residual: &F) -> LocalizationResult<(Vec<f64>, u32)> {
        let (min, max) = self.speed_interval;
        let steps = self.scan_steps.max(1);
        let ratio = (max / min).powf(1.0 / steps as f64);

        let mut roots = Vec::new();
        let mut brackets = 0usize;
        let mut total_iterations = 0u32;

        let mut lo = min;
        let mut f_lo = residual(lo);
        for step in 1..=steps {
            let hi = if step == steps { max } else { min * ratio.powi(step as i32) };
            let f_hi = residual(hi);

            if f_lo.is_finite() && f_hi.is_finite() {
                if f_lo == 0.0 {
                    roots.push(lo);
                } else if f_lo * f_hi < 0.0 {
                    brackets += 1;
                    trace!("Residual sign change in [{:.6e}, {:.6e}]", lo, hi);
                    let (root, iterations) = self.bisect(residual, lo, hi, f_lo);
                    total_iterations += iterations;
                    if let Some(root) = root {
                        roots.push(root);
                    }
                }
                if step == steps && f_hi == 0.0 {
                    roots.push(hi);
                }
            }

            lo = hi;
            f_lo = f_hi;
        }

        if roots.is_empty() {
            return Err(LocalizationError::NoConvergence {
                iterations: total_iterations,
                brackets_found: brackets,
                search_interval: self.speed_interval,
            });
        }

        roots.sort_by(|a, b| a.total_cmp(b));
        Ok((roots, total_iterations))
    }

    /// Bisection on a bracket; `None` when the cap runs out first
    fn bisect<F: Fn(f64) -> f64>(&self, residual: &F, mut lo: f64, mut hi: f64, mut f_lo: f64) -> (Option<f64>, u32) {
        for iteration in 1..=self.max_iterations {
            let mid = 0.5 * (lo + hi);
            if mid <= lo || mid >= hi || (hi - lo) <= BISECTION_TOLERANCE * mid {
                return (Some(mid), iteration);
            }

            let f_mid = residual(mid);
            if f_mid == 0.0 {
                return (Some(mid), iteration);
            }
            if f_lo * f_mid < 0.0 {
                hi = mid;
            } else {
                lo = mid;
                f_lo = f_mid;
            }
        }
        (None, self.max_iterations)
    }
}

/// Closest root to the prior, else the smallest root
fn select_root(roots: &[f64], prior_speed: Option<f64>) -> f64 {
    match prior_speed {
        Some(prior) => roots
            .iter()
            .copied()
            .min_by(|a, b| (a - prior).abs().total_cmp(&(b - prior).abs()))
            .unwrap_or(roots[0]),
        None => roots[0],
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

    fn exact_times(stations: &[Station], target: &Vector2<f64>, speed: f64) -> Vec<f64> {
        stations.iter().map(|s| s.distance_to(target) / speed).collect()
    }

    #[test]
    fn test_square_scenario_recovers_position_and_speed() {
        let stations = square();
        let target = Vector2::new(42.0, 58.0);
        let times = exact_times(&stations, &target, 300.0);

        let solution = GeometrySolver::new().solve(&stations, &times, None).unwrap();

        assert!((solution.position.x - 42.0).abs() < 1e-4);
        assert!((solution.position.y - 58.0).abs() < 1e-4);
        assert!((solution.speed - 300.0).abs() < 1e-4);
        assert!(solution.rms_residual < 1e-6);
    }

    #[test]
    fn test_relative_accuracy_for_generic_layout() {
        let stations = vec![
            Station::new(1, "a", -20.0, 5.0),
            Station::new(2, "b", 140.0, -10.0),
            Station::new(3, "c", 30.0, 160.0),
            Station::new(4, "d", 120.0, 130.0),
        ];
        let target = Vector2::new(61.5, 47.25);
        let speed = 1482.0;
        let times = exact_times(&stations, &target, speed);

        let solution = GeometrySolver::new().solve(&stations, &times, Some(1500.0)).unwrap();

        assert!(((solution.speed - speed) / speed).abs() < 1e-6);
        assert!((solution.position - target).norm() / target.norm() < 1e-6);
    }

    #[test]
    fn test_roundtrip_through_measurement_model() {
        let stations = square();
        let times = exact_times(&stations, &Vector2::new(42.0, 58.0), 300.0);
        let solution = GeometrySolver::new().solve(&stations, &times, None).unwrap();

        let model = MeasurementModel::default();
        for (station, &time) in stations.iter().zip(times.iter()) {
            let replayed = model.expected_time(&solution.position, station, solution.speed);
            assert!((replayed - time).abs() < 1e-9);
        }
    }

    #[test]
    fn test_collinear_base_triple_is_degenerate() {
        let stations = vec![
            Station::new(1, "a", 0.0, 0.0),
            Station::new(2, "b", 50.0, 0.0),
            Station::new(3, "c", 100.0, 0.0),
            Station::new(4, "d", 50.0, 80.0),
        ];
        for times in [vec![0.1, 0.2, 0.3, 0.4], vec![1.0, 1.0, 1.0, 1.0], vec![0.0, 3.0, 0.5, 2.0]] {
            let result = GeometrySolver::new().solve(&stations, &times, None);
            assert!(matches!(
                result,
                Err(LocalizationError::DegenerateGeometry { issue: GeometryIssue::Collinear, .. })
            ));
        }
    }

    #[test]
    fn test_all_zero_times_are_degenerate() {
        let result = GeometrySolver::new().solve(&square(), &[0.0; 4], None);
        assert_eq!(result, Err(LocalizationError::degenerate(GeometryIssue::AllZeroTimes)));
    }

    #[test]
    fn test_too_few_stations_and_mismatched_inputs() {
        let stations = square();
        assert_eq!(
            GeometrySolver::new().solve(&stations[..3], &[0.1, 0.2, 0.3], None),
            Err(LocalizationError::degenerate(GeometryIssue::TooFewStations))
        );
        assert_eq!(
            GeometrySolver::new().solve(&stations, &[0.1, 0.2, 0.3], None),
            Err(LocalizationError::degenerate(GeometryIssue::MismatchedInputs))
        );
    }

    #[test]
    fn test_coincident_stations_are_degenerate() {
        let mut stations = square();
        stations[2].position = stations[0].position;
        let result = GeometrySolver::new().solve(&stations, &[0.1, 0.2, 0.3, 0.4], None);
        assert_eq!(result, Err(LocalizationError::degenerate(GeometryIssue::CoincidentStations)));
    }

    #[test]
    fn test_interval_without_root_reports_no_convergence() {
        let stations = square();
        let times = exact_times(&stations, &Vector2::new(42.0, 58.0), 300.0);
        let solver = GeometrySolver::new().with_speed_interval(1.0, 10.0);

        assert!(matches!(
            solver.solve(&stations, &times, None),
            Err(LocalizationError::NoConvergence { brackets_found: 0, .. })
        ));
    }

    #[test]
    fn test_iteration_cap_reports_no_convergence() {
        let stations = square();
        let times = exact_times(&stations, &Vector2::new(42.0, 58.0), 300.0);
        let mut solver = GeometrySolver::new();
        solver.max_iterations = 2;

        assert!(matches!(
            solver.solve(&stations, &times, None),
            Err(LocalizationError::NoConvergence { brackets_found, .. }) if brackets_found > 0
        ));
    }

    #[test]
    fn test_prior_selects_closest_root() {
        let stations = square();
        let times = exact_times(&stations, &Vector2::new(42.0, 58.0), 300.0);
        let solver = GeometrySolver::new();

        let smallest = solver.solve(&stations, &times, None).unwrap();
        assert!(smallest.candidate_speeds.len() >= 2);
        assert_eq!(smallest.speed, smallest.candidate_speeds[0]);

        let far_prior = *smallest.candidate_speeds.last().unwrap();
        let alternative = solver.solve(&stations, &times, Some(far_prior)).unwrap();
        assert!((alternative.speed - far_prior).abs() < 1e-9 * far_prior);
        assert!((alternative.speed - 300.0).abs() > 1.0);

        let near_prior = solver.solve(&stations, &times, Some(310.0)).unwrap();
        assert!((near_prior.speed - 300.0).abs() < 1e-4);
    }

    #[test]
    fn test_overdetermined_layout_uses_every_extra_station() {
        let mut stations = square();
        stations.push(Station::new(5, "s", 50.0, -40.0));
        let target = Vector2::new(42.0, 58.0);
        let times = exact_times(&stations, &target, 300.0);

        let solution = GeometrySolver::new().solve(&stations, &times, Some(300.0)).unwrap();
        assert!((solution.speed - 300.0).abs() < 1e-4);
        assert!((solution.position - target).norm() < 1e-4);
    }

    #[test]
    fn test_contradictory_times_are_degenerate() {
        let result = GeometrySolver::new().solve(&square(), &[0.1, 0.1, 0.1, 100.0], None);
        match result {
            Err(LocalizationError::DegenerateGeometry { issue: GeometryIssue::Contradictory, condition }) => {
                assert!(condition.unwrap() > 1.0);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_residual_gate_is_configurable() {
        let times = [0.1, 0.1, 0.1, 100.0];
        let mut solver = GeometrySolver::new();
        solver.max_relative_residual = f64::INFINITY;

        let solution = solver.solve(&square(), &times, None).unwrap();
        assert!(solution.rms_residual > 10.0);
    }

    #[test]
    fn test_noisy_times_pass_the_residual_gate() {
        let stations = square();
        let target = Vector2::new(42.0, 58.0);
        let offsets = [0.004, -0.003, 0.002, -0.005];
        let times: Vec<f64> = exact_times(&stations, &target, 300.0)
            .iter()
            .zip(offsets.iter())
            .map(|(t, o)| t + o)
            .collect();

        let solution = GeometrySolver::new().solve(&stations, &times, Some(300.0)).unwrap();
        assert!((solution.speed - 300.0).abs() / 300.0 < 0.25);
        assert!((solution.position - target).norm() < 10.0);
    }

    #[test]
    fn test_triple_condition() {
        let a = Vector2::new(0.0, 0.0);
        assert!((triple_condition(&a, &Vector2::new(1.0, 0.0), &Vector2::new(0.0, 1.0)) - 1.0).abs() < 1e-12);
        assert_eq!(triple_condition(&a, &Vector2::new(1.0, 1.0), &Vector2::new(2.0, 2.0)), 0.0);
        assert_eq!(triple_condition(&a, &a, &Vector2::new(2.0, 2.0)), 0.0);
    }
}
