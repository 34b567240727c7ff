//! Destinations for per-batch reports

use log::warn;
use std::io::Write;

use crate::api::formatting::{CsvFormatter, FormattedEstimate, JsonFormatter, OutputFormat, TextFormatter};
use crate::engine::BatchReport;

/// Receives every report the engine produces
pub trait EstimateSink {
    fn emit(&mut self, report: &BatchReport);

    /// Called once when the run ends
    fn finish(&mut self) {}
}

/// Keeps reports in memory
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub reports: Vec<BatchReport>,
    pub finished: bool,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accuracy radius after each batch
    pub fn radius_curve(&self) -> Vec<f64> {
        self.reports.iter().map(|r| r.estimate.accuracy_radius).collect()
    }
}

impl EstimateSink for CollectingSink {
    fn emit(&mut self, report: &BatchReport) {
        self.reports.push(report.clone());
    }

    fn finish(&mut self) {
        self.finished = true;
    }
}

/// Writes one formatted line per report
pub struct WriterSink<W: Write> {
    writer: W,
    format: OutputFormat,
    text: TextFormatter,
    json: JsonFormatter,
    csv: CsvFormatter,
    header_written: bool,
}

impl<W: Write> WriterSink<W> {
    pub fn new(writer: W, format: OutputFormat) -> Self {
        Self {
            writer,
            format,
            text: TextFormatter::new(),
            json: JsonFormatter::new(),
            csv: CsvFormatter::new(),
            header_written: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn render(&mut self, estimate: &FormattedEstimate) -> Option<String> {
        match self.format {
            OutputFormat::Text => Some(self.text.format_text(estimate)),
            OutputFormat::Json => match self.json.format_json(estimate) {
                Ok(line) => Some(line),
                Err(e) => {
                    warn!("Failed to serialize estimate {}: {}", estimate.batch_index, e);
                    None
                }
            },
            OutputFormat::Csv => {
                let row = self.csv.format_csv(estimate);
                if self.csv.include_header && !self.header_written {
                    self.header_written = true;
                    Some(format!("{}\n{}", self.csv.header(), row))
                } else {
                    Some(row)
                }
            }
        }
    }
}

impl<W: Write> EstimateSink for WriterSink<W> {
    fn emit(&mut self, report: &BatchReport) {
        let estimate = FormattedEstimate::from(report);
        if let Some(line) = self.render(&estimate) {
            if let Err(e) = writeln!(self.writer, "{}", line) {
                warn!("Failed to write estimate {}: {}", report.batch_index, e);
            }
        }
    }

    fn finish(&mut self) {
        if let Err(e) = self.writer.flush() {
            warn!("Failed to flush output: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::LocationEstimate;
    use crate::engine::SolverOutcome;
    use crate::processing::particle_filter::FilterState;
    use nalgebra::Vector2;

    fn report(index: u64, radius: f64) -> BatchReport {
        BatchReport {
            batch_index: index,
            estimate: LocationEstimate {
                position: Vector2::new(1.0, 2.0),
                std_dev: Vector2::new(radius, 0.0),
                accuracy_radius: radius,
                effective_sample_size: 10.0,
            },
            speed: None,
            solver_outcome: SolverOutcome::Held { speed: 1.0 },
            filter_state: FilterState::Seeded,
            resampled: false,
            warnings: Vec::new(),
        }
    }

    #[test]
    fn test_collecting_sink() {
        let mut sink = CollectingSink::new();
        sink.emit(&report(0, 3.0));
        sink.emit(&report(1, 2.0));
        sink.finish();
        assert_eq!(sink.radius_curve(), vec![3.0, 2.0]);
        assert!(sink.finished);
    }

    #[test]
    fn test_csv_writer_emits_header_once() {
        let mut sink = WriterSink::new(Vec::new(), OutputFormat::Csv);
        sink.emit(&report(0, 3.0));
        sink.emit(&report(1, 2.0));
        sink.finish();

        let output = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("batch,"));
        assert!(lines[2].starts_with("1,"));
    }

    #[test]
    fn test_json_writer_one_object_per_line() {
        let mut sink = WriterSink::new(Vec::new(), OutputFormat::Json);
        sink.emit(&report(0, 3.0));
        let output = String::from_utf8(sink.into_inner()).unwrap();
        let parsed: FormattedEstimate = serde_json::from_str(output.trim()).unwrap();
        assert_eq!(parsed.batch_index, 0);
        assert_eq!(parsed.speed, None);
    }
}
