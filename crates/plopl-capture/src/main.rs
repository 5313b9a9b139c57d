//! PLOPL capture CLI
//!
//! Replays recorded capture signals through a correlator session, validates
//! response bodies against a schema, and drains events that could not be
//! delivered.
//!
//! Usage:
//!   plopl-capture replay --schema <schema.json> --events <signals.jsonl>
//!   plopl-capture validate --schema <schema.json> --body <response.json>
//!   plopl-capture recover

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use plopl_capture::capture::{CaptureSignal, CorrelatorSession};
use plopl_capture::config::Config;
use plopl_capture::scheduler::{Scheduler, TokioScheduler};
use plopl_capture::schema::Schema;
use plopl_capture::store::{create_exchange_store, ExchangeStore};
use plopl_capture::validation;
use serde_json::{json, Value};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "plopl-capture")]
#[command(author, version, about = "Correlate and validate captured API exchanges")]
struct Args {
    /// Path to YAML configuration file
    #[arg(short, long, global = true, env = "PLOPL_CONFIG")]
    config: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Feed a JSON-lines signal log through a correlator session
    Replay {
        #[arg(short, long)]
        schema: PathBuf,
        /// One signal per line; an optional `delayMs` field waits before applying it
        #[arg(short, long)]
        events: PathBuf,
    },
    /// Validate a response body against a schema
    Validate {
        #[arg(short, long)]
        schema: PathBuf,
        #[arg(short, long)]
        body: PathBuf,
    },
    /// Print and drain exchanges whose delivery exhausted its retries
    Recover,
}

fn init_tracing(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(Config::default()),
    }
}

fn load_schema(path: &Path) -> anyhow::Result<Schema> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read schema {}", path.display()))?;
    Schema::from_json(&text).with_context(|| format!("Invalid schema {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level, args.log_format);

    let config = load_config(args.config.as_deref())?;

    match args.command {
        Command::Replay { schema, events } => replay(&config, &schema, &events).await,
        Command::Validate { schema, body } => validate(&schema, &body),
        Command::Recover => recover(&config),
    }
}

async fn replay(config: &Config, schema_path: &Path, events_path: &Path) -> anyhow::Result<()> {
    let schema = Arc::new(load_schema(schema_path)?);
    let scheduler: Arc<dyn Scheduler> = Arc::new(TokioScheduler::current()?);
    let (session, channel) = CorrelatorSession::from_config(config, scheduler)?;

    match session.restore() {
        Ok(count) if count > 0 => info!(count, "Restored exchanges from store"),
        Ok(_) => {}
        Err(e) => warn!("Failed to restore exchanges: {:#}", e),
    }

    let printer = channel.as_ref().map(|channel| {
        let mut rx = channel.attach();
        let schema = schema.clone();
        tokio::spawn(async move {
            while let Some(ready) = rx.recv().await {
                let result = ready
                    .response
                    .as_ref()
                    .map(|response| validation::validate(&schema, &response.body))
                    .unwrap_or_default();
                println!("{}", json!({ "exchange": ready, "validation": result }));
            }
        })
    });

    session.activate_schema((*schema).clone());

    let file = std::fs::File::open(events_path)
        .with_context(|| format!("Failed to open events {}", events_path.display()))?;
    let mut applied = 0usize;
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let mut value: Value = serde_json::from_str(&line)
            .with_context(|| format!("Line {}: invalid JSON", index + 1))?;
        if let Some(delay) = value
            .as_object_mut()
            .and_then(|obj| obj.remove("delayMs"))
            .and_then(|v| v.as_u64())
        {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        let signal: CaptureSignal = serde_json::from_value(value)
            .with_context(|| format!("Line {}: not a capture signal", index + 1))?;
        session.apply(signal);
        applied += 1;
    }
    info!(applied, "Replayed capture signals");

    // Let pending timers fire and deliveries settle.
    let settle = config.correlator.wait_timeout() + config.correlator.response_buffer_ttl();
    tokio::time::sleep(settle + Duration::from_millis(100)).await;

    if let Some(channel) = &channel {
        channel.detach();
    }
    if let Some(printer) = printer {
        printer.await?;
    }
    Ok(())
}

fn validate(schema_path: &Path, body_path: &Path) -> anyhow::Result<()> {
    let schema = load_schema(schema_path)?;
    for diagnostic in &schema.diagnostics {
        warn!("{}", diagnostic);
    }
    let loose = schema.loose_equality_conditions();
    if !loose.is_empty() {
        eprintln!(
            "note: {} condition(s) use '=='/'!=' and always fail: {}",
            loose.len(),
            loose.join(", ")
        );
        eprintln!("note: rewrite them with strict equality, e.g. \"x === 'value'\"");
    }
    let text = std::fs::read_to_string(body_path)
        .with_context(|| format!("Failed to read body {}", body_path.display()))?;
    let body: Value = serde_json::from_str(&text)
        .with_context(|| format!("Body {} is not JSON", body_path.display()))?;

    let result = validation::validate(&schema, &body);
    println!("{}", serde_json::to_string_pretty(&result)?);
    if !result.is_valid {
        std::process::exit(1);
    }
    Ok(())
}

fn recover(config: &Config) -> anyhow::Result<()> {
    let store = create_exchange_store(&config.store)?;
    let undelivered = store.take_undelivered()?;
    info!(count = undelivered.len(), "Recovered undelivered exchanges");
    for ready in undelivered {
        println!("{}", serde_json::to_string(&ready)?);
    }
    Ok(())
}
