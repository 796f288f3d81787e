//! synthload CLI
//!
//! Generates synthetic JSON event workloads from a state-graph definition,
//! or replays an existing event file, writing records to the configured
//! target.

use chrono::{DateTime, Utc};
use clap::Parser;
use std::io::Read;
use std::path::PathBuf;
use synthload_engine::{
    target_from_value, JobConfig, JobDriver, JobError, SinkErrorPolicy, Termination, TimeConfig,
    WorkloadConfig,
};

#[derive(Parser)]
#[command(name = "synthload")]
#[command(about = "Synthetic JSON event workload generator")]
#[command(version)]
struct Cli {
    /// Workload definition file (JSON); reads stdin when omitted
    #[arg(short = 'f', long = "config")]
    config: Option<PathBuf>,

    /// Target definition file (JSON); overrides the workload file's target
    #[arg(short = 'o', long = "target")]
    target: Option<PathBuf>,

    /// Run duration (e.g. "30s", "5m", "1h"); may not be used with --records
    #[arg(short = 't', long, conflicts_with = "records")]
    duration: Option<humantime::Duration>,

    /// Total number of records to generate
    #[arg(short = 'n', long)]
    records: Option<u64>,

    /// Time mode: real, sim, or sim-to-real
    #[arg(short = 's', long, default_value = "real")]
    time_mode: String,

    /// Clock start time (RFC 3339); only meaningful outside real mode
    #[arg(long)]
    start_time: Option<String>,

    /// Maximum concurrently live entities
    #[arg(short = 'm', long, default_value_t = 100)]
    max_entities: usize,

    /// RNG seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    /// What an actor does when record delivery fails: continue or abort
    #[arg(long, default_value = "continue")]
    on_sink_error: String,
}

fn parse_time_config(
    mode: &str,
    start_time: Option<&str>,
) -> Result<TimeConfig, Box<dyn std::error::Error>> {
    let start = start_time
        .map(|s| {
            DateTime::parse_from_rfc3339(s)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|err| format!("invalid start time {s:?}: {err}"))
        })
        .transpose()?;

    match mode.to_lowercase().as_str() {
        "real" => Ok(TimeConfig::real()),
        "sim" | "simulated" => Ok(match start {
            Some(start) => TimeConfig::simulated_from(start),
            None => TimeConfig::simulated(),
        }),
        "sim-to-real" => Ok(TimeConfig::sim_to_real(start.unwrap_or_else(Utc::now))),
        other => Err(format!("unknown time mode: {other}").into()),
    }
}

fn parse_sink_error_policy(s: &str) -> Result<SinkErrorPolicy, String> {
    match s.to_lowercase().as_str() {
        "continue" => Ok(SinkErrorPolicy::Continue),
        "abort" => Ok(SinkErrorPolicy::Abort),
        other => Err(format!("unknown sink error policy: {other}")),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let (raw, name) = match &cli.config {
        Some(path) => (std::fs::read_to_string(path)?, path.display().to_string()),
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            (buffer, "stdin".to_string())
        }
    };
    let workload_value: serde_json::Value = serde_json::from_str(&raw)?;
    let workload = WorkloadConfig::from_value(&workload_value)?;

    let target = match &cli.target {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => target_from_value(&workload_value)?.ok_or(JobError::MissingTarget)?,
    };

    let termination = Termination::from_options(
        cli.records,
        cli.duration.map(|d| d.as_secs_f64()),
    )?;
    let time = parse_time_config(&cli.time_mode, cli.start_time.as_deref())?;
    let policy = parse_sink_error_policy(&cli.on_sink_error)?;

    let mut config = JobConfig::new(name, workload, target)
        .with_termination(termination)
        .with_max_entities(cli.max_entities)
        .with_time(time)
        .with_sink_error_policy(policy);
    if let Some(seed) = cli.seed {
        config = config.with_seed(seed);
    }

    let driver = JobDriver::new(config)?;
    driver.run()?;

    Ok(())
}
