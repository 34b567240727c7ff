use nalgebra::Vector2;
use std::error::Error;
use std::io;

use toa_localizer::api::{OutputFormat, WriterSink};
use toa_localizer::core::Station;
use toa_localizer::ensemble::{EnsembleValidator, Scenario};
use toa_localizer::source::{ReplaySource, SyntheticSource};
use toa_localizer::utils::config::LocalizationConfig;
use toa_localizer::LocalizationEngine;

const DEFAULT_VALIDATION_BATCHES: usize = 50;

fn usage(program: &str) -> String {
    format!(
        "Usage: {p} run <config.json> <batches.json> [--format text|json|csv]\n   \
         or: {p} simulate <config.json> <x> <y> <c> <batches> [--seed N] [--format text|json|csv]\n   \
         or: {p} validate <config.json> <trials> [--target X,Y] [--speed C] [--batches N] [--seed N]",
        p = program
    )
}

/// Value following `name` in `args`
fn flag_value<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn output_format(args: &[String]) -> Result<OutputFormat, Box<dyn Error>> {
    match flag_value(args, "--format") {
        Some(value) => OutputFormat::parse(value).ok_or_else(|| format!("Unknown output format: {}", value).into()),
        None => Ok(OutputFormat::Text),
    }
}

fn centroid(stations: &[Station]) -> Vector2<f64> {
    if stations.is_empty() {
        return Vector2::zeros();
    }
    stations.iter().fold(Vector2::<f64>::zeros(), |acc, s| acc + s.position) / stations.len() as f64
}

fn parse_point(value: &str) -> Result<Vector2<f64>, Box<dyn Error>> {
    let (x, y) = value
        .split_once(',')
        .ok_or_else(|| format!("Expected X,Y but got {}", value))?;
    Ok(Vector2::new(x.trim().parse::<f64>()?, y.trim().parse::<f64>()?))
}

fn run_command(config_path: &str, batches_path: &str, options: &[String]) -> Result<(), Box<dyn Error>> {
    let format = output_format(options)?;
    let config = LocalizationConfig::from_file(config_path)?;
    let mut engine = LocalizationEngine::new(config)?;
    let mut source = ReplaySource::from_file(batches_path, engine.stations())?;
    let mut sink = WriterSink::new(io::stdout().lock(), format);

    let summary = engine.run(&mut source, &mut sink);
    if summary.batches_processed == 0 {
        return Err("No batch could be processed".into());
    }
    Ok(())
}

fn simulate_command(args: &[String]) -> Result<(), Box<dyn Error>> {
    let config = LocalizationConfig::from_file(&args[0])?;
    let target = Vector2::new(args[1].parse::<f64>()?, args[2].parse::<f64>()?);
    let speed: f64 = args[3].parse()?;
    let batches: usize = args[4].parse()?;
    let options = &args[5..];
    let seed = flag_value(options, "--seed").map(str::parse::<u64>).transpose()?.unwrap_or(0);
    let format = output_format(options)?;

    let noise = config.noise.spread();
    let mut engine = LocalizationEngine::new(config)?;
    let mut source = SyntheticSource::new(engine.stations().to_vec(), target, speed, noise, batches, seed);
    let mut sink = WriterSink::new(io::stdout().lock(), format);

    let summary = engine.run(&mut source, &mut sink);
    if let Some(estimate) = summary.final_estimate {
        eprintln!(
            "Final error against ({:.3}, {:.3}): {:.4}",
            target.x,
            target.y,
            (estimate.position - target).norm()
        );
    }
    Ok(())
}

fn validate_command(config_path: &str, trials: &str, options: &[String]) -> Result<(), Box<dyn Error>> {
    let config = LocalizationConfig::from_file(config_path)?;
    let trials: usize = trials.parse()?;
    let target = match flag_value(options, "--target") {
        Some(value) => parse_point(value)?,
        None => centroid(&config.stations()),
    };
    let speed = match flag_value(options, "--speed") {
        Some(value) => value.parse()?,
        None => config.engine.initial_speed.unwrap_or(1.0),
    };
    let batches = match flag_value(options, "--batches") {
        Some(value) => value.parse()?,
        None => DEFAULT_VALIDATION_BATCHES,
    };
    let seed = flag_value(options, "--seed").map(str::parse::<u64>).transpose()?.unwrap_or(0);

    let scenario = Scenario {
        target,
        speed,
        noise_std_dev: config.noise.spread(),
        batches,
    };
    let report = EnsembleValidator::new(config, scenario, seed).run(trials)?;
    println!("{}", serde_json::to_string_pretty(&report.statistics)?);
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    let program = args.first().map_or("toa-localizer", |s| s.as_str());

    match args.get(1).map(String::as_str) {
        Some("run") if args.len() >= 4 => run_command(&args[2], &args[3], &args[4..]),
        Some("simulate") if args.len() >= 7 => simulate_command(&args[2..]),
        Some("validate") if args.len() >= 4 => validate_command(&args[2], &args[3], &args[4..]),
        _ => {
            eprintln!("{}", usage(program));
            Err("Invalid arguments".into())
        }
    }
}
