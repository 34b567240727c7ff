//! Reporting surface: formatting of batch reports and the sinks that receive them

pub mod formatting;
pub mod sink;

pub use formatting::{CsvFormatter, FormattedEstimate, JsonFormatter, OutputFormat, TextFormatter};
pub use sink::{CollectingSink, EstimateSink, WriterSink};
