//! Deterministic position and propagation-constant solvers

pub mod geometry_solver;
pub mod scale_search;

pub use geometry_solver::{triple_condition, GeometrySolution, GeometrySolver};
pub use scale_search::{ScaleFit, ScaleSearch};
