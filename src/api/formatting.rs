//! Estimate output formatting and serialization
//!
//! Reports are flattened into a `FormattedEstimate` and then rendered as
//! human-readable text, JSON or CSV rows.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::engine::BatchReport;
use crate::processing::particle_filter::FilterState;

/// Output format selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
    Csv,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "text" => Some(OutputFormat::Text),
            "json" => Some(OutputFormat::Json),
            "csv" => Some(OutputFormat::Csv),
            _ => None,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

/// Flat view of one batch report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormattedEstimate {
    pub batch_index: u64,
    pub x: f64,
    pub y: f64,
    /// Weighted standard deviation per axis
    pub std_x: f64,
    pub std_y: f64,
    pub accuracy_radius: f64,
    pub effective_sample_size: f64,
    /// Propagation constant used for this batch
    pub speed: Option<f64>,
    pub solver: String,
    pub filter_state: FilterState,
    pub resampled: bool,
    pub warnings: Vec<String>,
}

impl From<&BatchReport> for FormattedEstimate {
    fn from(report: &BatchReport) -> Self {
        let estimate = &report.estimate;
        Self {
            batch_index: report.batch_index,
            x: estimate.position.x,
            y: estimate.position.y,
            std_x: estimate.std_dev.x,
            std_y: estimate.std_dev.y,
            accuracy_radius: estimate.accuracy_radius,
            effective_sample_size: estimate.effective_sample_size,
            speed: report.speed,
            solver: report.solver_outcome.label().to_string(),
            filter_state: report.filter_state,
            resampled: report.resampled,
            warnings: report.warnings.clone(),
        }
    }
}

/// Human-readable text formatter
pub struct TextFormatter {
    /// Single line per estimate
    pub compact: bool,
    /// Decimal places for coordinates
    pub precision: usize,
}

impl Default for TextFormatter {
    fn default() -> Self {
        Self {
            compact: true,
            precision: 3,
        }
    }
}

impl TextFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn detailed() -> Self {
        Self {
            compact: false,
            ..Self::default()
        }
    }

    pub fn format_text(&self, estimate: &FormattedEstimate) -> String {
        let p = self.precision;
        let speed = estimate
            .speed
            .map_or_else(|| "unknown".to_string(), |c| format!("{:.4}", c));

        if self.compact {
            let mut line = format!(
                "#{} ({:.p$}, {:.p$}) ±{:.p$} c={} [{:?}, {}]",
                estimate.batch_index,
                estimate.x,
                estimate.y,
                estimate.accuracy_radius,
                speed,
                estimate.filter_state,
                estimate.solver,
                p = p
            );
            if !estimate.warnings.is_empty() {
                line.push_str(&format!(" warnings: {}", estimate.warnings.join("; ")));
            }
            return line;
        }

        let mut output = String::new();
        output.push_str(&format!("Batch #{}:\n", estimate.batch_index));
        output.push_str(&format!("  Position:   ({:.p$}, {:.p$})\n", estimate.x, estimate.y, p = p));
        output.push_str(&format!("  Std dev:    ({:.p$}, {:.p$})\n", estimate.std_x, estimate.std_y, p = p));
        output.push_str(&format!("  Radius:     {:.p$}\n", estimate.accuracy_radius, p = p));
        output.push_str(&format!("  ESS:        {:.1}\n", estimate.effective_sample_size));
        output.push_str(&format!("  Speed:      {}\n", speed));
        output.push_str(&format!("  Solver:     {}\n", estimate.solver));
        output.push_str(&format!("  Filter:     {:?}\n", estimate.filter_state));
        if !estimate.warnings.is_empty() {
            output.push_str("  Warnings:\n");
            for warning in &estimate.warnings {
                output.push_str(&format!("    - {}\n", warning));
            }
        }
        output
    }
}

/// JSON formatter for structured output
#[derive(Default)]
pub struct JsonFormatter {
    pub pretty: bool,
}

impl JsonFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pretty() -> Self {
        Self { pretty: true }
    }

    pub fn format_json(&self, estimate: &FormattedEstimate) -> Result<String, serde_json::Error> {
        if self.pretty {
            serde_json::to_string_pretty(estimate)
        } else {
            serde_json::to_string(estimate)
        }
    }
}

/// CSV formatter for data logging
pub struct CsvFormatter {
    pub include_header: bool,
}

impl Default for CsvFormatter {
    fn default() -> Self {
        Self { include_header: true }
    }
}

impl CsvFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(&self) -> String {
        "batch,x,y,std_x,std_y,radius,ess,speed,solver,state,resampled,warnings".to_string()
    }

    pub fn format_csv(&self, estimate: &FormattedEstimate) -> String {
        format!(
            "{},{:.6},{:.6},{:.6},{:.6},{:.6},{:.1},{},{},{:?},{},{}",
            estimate.batch_index,
            estimate.x,
            estimate.y,
            estimate.std_x,
            estimate.std_y,
            estimate.accuracy_radius,
            estimate.effective_sample_size,
            estimate.speed.map_or_else(String::new, |c| format!("{:.6}", c)),
            estimate.solver,
            estimate.filter_state,
            estimate.resampled,
            estimate.warnings.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::LocationEstimate;
    use crate::engine::SolverOutcome;
    use nalgebra::Vector2;

    fn report() -> BatchReport {
        BatchReport {
            batch_index: 3,
            estimate: LocationEstimate {
                position: Vector2::new(42.0, 58.0),
                std_dev: Vector2::new(0.3, 0.4),
                accuracy_radius: 0.5,
                effective_sample_size: 812.0,
            },
            speed: Some(300.0),
            solver_outcome: SolverOutcome::Held { speed: 300.0 },
            filter_state: FilterState::Updated,
            resampled: true,
            warnings: vec!["late station".to_string()],
        }
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!(OutputFormat::parse("JSON"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::parse("csv"), Some(OutputFormat::Csv));
        assert_eq!(OutputFormat::parse("xml"), None);
        assert_eq!(OutputFormat::Text.to_string(), "text");
    }

    #[test]
    fn test_text_formats() {
        let formatted = FormattedEstimate::from(&report());
        let line = TextFormatter::new().format_text(&formatted);
        assert!(line.starts_with("#3 (42.000, 58.000) ±0.500 c=300.0000 [Updated, held]"));
        assert!(line.contains("late station"));

        let detailed = TextFormatter::detailed().format_text(&formatted);
        assert!(detailed.contains("Radius:     0.500"));
        assert!(detailed.contains("    - late station"));
    }

    #[test]
    fn test_json_round_trip() {
        let formatted = FormattedEstimate::from(&report());
        let json = JsonFormatter::new().format_json(&formatted).unwrap();
        let back: FormattedEstimate = serde_json::from_str(&json).unwrap();
        assert_eq!(back, formatted);
    }

    #[test]
    fn test_csv_row_matches_header() {
        let csv = CsvFormatter::new();
        let row = csv.format_csv(&FormattedEstimate::from(&report()));
        assert_eq!(row.split(',').count(), csv.header().split(',').count());
        assert!(row.starts_with("3,42.000000,58.000000"));
    }
}
