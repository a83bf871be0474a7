mod config;
mod seed;
mod serve;
mod simulate;
mod store;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracechain_core::{
    EventLog, EventPayload, GenericEvent, LotSummary, NewLot, SensorReading, TraceError,
    TransportEvent,
};
use tracechain_storage::{LotStore, StorageError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{ServeConfig, ServeOverrides};
use crate::seed::{seed_demo, SeedOutcome, DEMO_LOT};

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Exit code for `verify` when the chain does not check out.
const EXIT_BROKEN_CHAIN: i32 = 2;

/// Tamper-evident traceability log for farm produce lots.
#[derive(Parser)]
#[command(
    name = "tracechain",
    version,
    about = "Tamper-evident traceability log for farm produce lots"
)]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// Journal file holding lots and events
    #[arg(long, global = true, env = "TRACECHAIN_DATA")]
    data: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Port to listen on [default: 8000]
        #[arg(long, env = "TRACECHAIN_PORT")]
        port: Option<u16>,
        /// TOML config file
        #[arg(long, env = "TRACECHAIN_CONFIG")]
        config: Option<PathBuf>,
        /// Requests per minute per IP, 0 disables [default: 60]
        #[arg(long, env = "TRACECHAIN_RATE_LIMIT")]
        rate_limit: Option<u64>,
        /// Require this key on every endpoint except /health
        #[arg(long, env = "TRACECHAIN_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
        /// Path to TLS certificate PEM file (requires --tls-key)
        #[arg(long)]
        tls_cert: Option<PathBuf>,
        /// Path to TLS private key PEM file (requires --tls-cert)
        #[arg(long)]
        tls_key: Option<PathBuf>,
    },

    /// Register a harvest lot
    Create {
        lot_id: String,
        #[arg(long)]
        farm_name: String,
        #[arg(long)]
        farm_location: String,
        #[arg(long)]
        crop: String,
        /// Harvest date (YYYY-MM-DD)
        #[arg(long)]
        harvest_date: String,
    },

    /// Append a field sensor reading
    Sensor {
        lot_id: String,
        #[arg(long)]
        farm_name: String,
        /// Temperature in °C
        #[arg(long, allow_negative_numbers = true)]
        temperature: f64,
        /// Relative humidity in %
        #[arg(long)]
        humidity: f64,
        /// Soil moisture in %
        #[arg(long)]
        soil_moisture: f64,
        #[arg(long)]
        ph: f64,
        /// ISO-8601 timestamp; defaults to now (UTC)
        #[arg(long)]
        timestamp: Option<String>,
    },

    /// Append a transport or storage checkpoint
    Transport {
        lot_id: String,
        #[arg(long)]
        location: String,
        /// Temperature in °C
        #[arg(long, allow_negative_numbers = true)]
        temperature: f64,
        /// Relative humidity in %
        #[arg(long)]
        humidity: f64,
        #[arg(long)]
        note: Option<String>,
        /// ISO-8601 timestamp; defaults to now (UTC)
        #[arg(long)]
        timestamp: Option<String>,
    },

    /// Append an event of any type
    Event {
        lot_id: String,
        /// Event type, e.g. washed or packed
        #[arg(long = "type")]
        kind: String,
        /// Event body as a JSON object
        #[arg(long, default_value = "{}")]
        payload: String,
        /// ISO-8601 timestamp; defaults to now (UTC)
        #[arg(long)]
        timestamp: Option<String>,
    },

    /// Show a lot's summary and chain
    Show { lot_id: String },

    /// Check a lot's chain (exit code 2 when broken)
    Verify { lot_id: String },

    /// List lots
    Lots,

    /// Remove a lot and its chain
    Delete { lot_id: String },

    /// Load the demo lot
    Seed,

    /// Post randomized readings to a running server
    Simulate {
        /// Server base URL
        #[arg(long, default_value = "http://localhost:8000")]
        url: String,
        /// Number of sensor readings to send
        #[arg(long, default_value = "5")]
        readings: usize,
        /// Pause between readings in milliseconds
        #[arg(long, default_value = "1000")]
        interval_ms: u64,
        #[arg(long, env = "TRACECHAIN_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Trace(#[from] TraceError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("invalid --payload: {0}")]
    Payload(String),
}

fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);

    match cli.command {
        Commands::Serve {
            port,
            config,
            rate_limit,
            api_key,
            tls_cert,
            tls_key,
        } => {
            // Validate TLS flags: both must be provided or neither
            if tls_cert.is_some() != tls_key.is_some() {
                report_error(
                    "error: --tls-cert and --tls-key must both be provided",
                    cli.output,
                    cli.quiet,
                );
                process::exit(1);
            }
            let overrides = ServeOverrides {
                port,
                data: cli.data,
                rate_limit,
                api_key,
            };
            let config = match ServeConfig::load(config.as_deref(), overrides) {
                Ok(c) => c,
                Err(e) => {
                    report_error(&format!("error: {}", e), cli.output, cli.quiet);
                    process::exit(1);
                }
            };
            let (output, quiet) = (cli.output, cli.quiet);
            block_on(output, quiet, async move {
                if let Err(e) = serve::start_server(config, tls_cert, tls_key).await {
                    report_error(&format!("Server error: {}", e), output, quiet);
                    process::exit(1);
                }
            });
        }
        Commands::Simulate {
            url,
            readings,
            interval_ms,
            api_key,
        } => {
            let options = simulate::SimulateOptions {
                base_url: url,
                readings,
                interval: Duration::from_millis(interval_ms),
                api_key,
            };
            let quiet = cli.quiet;
            let result = simulate::run_simulation(&options, |line| {
                if !quiet {
                    println!("{}", line);
                }
            });
            if let Err(e) = result {
                report_error(&format!("error: {}", e), cli.output, cli.quiet);
                process::exit(1);
            }
        }
        command => {
            let data = cli
                .data
                .unwrap_or_else(|| PathBuf::from(store::DEFAULT_JOURNAL));
            let (output, quiet) = (cli.output, cli.quiet);
            let code = block_on(output, quiet, async move {
                match run_command(command, &data, output, quiet).await {
                    Ok(code) => code,
                    Err(e) => {
                        report_error(&format!("error: {}", e), output, quiet);
                        1
                    }
                }
            });
            process::exit(code);
        }
    }
}

/// Log to stderr. `RUST_LOG` wins; otherwise `serve` logs at info and the
/// one-shot commands only surface warnings.
fn init_tracing(cli: &Cli) {
    let default = match (&cli.command, cli.quiet) {
        (_, true) => "warn",
        (Commands::Serve { .. }, false) => "info",
        _ => "warn",
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn block_on<T>(output: OutputFormat, quiet: bool, fut: impl Future<Output = T>) -> T {
    match tokio::runtime::Runtime::new() {
        Ok(rt) => rt.block_on(fut),
        Err(e) => {
            report_error(
                &format!("error: failed to create tokio runtime: {}", e),
                output,
                quiet,
            );
            process::exit(1);
        }
    }
}

/// Run a command against the journal at `data`, returning the exit code.
async fn run_command(
    command: Commands,
    data: &Path,
    output: OutputFormat,
    quiet: bool,
) -> Result<i32, CliError> {
    let log = EventLog::new(store::open_store(Some(data))?);

    match command {
        Commands::Create {
            lot_id,
            farm_name,
            farm_location,
            crop,
            harvest_date,
        } => {
            let summary = log
                .create_lot(NewLot {
                    lot_id,
                    farm_name,
                    farm_location,
                    crop,
                    harvest_date,
                })
                .await?;
            match output {
                OutputFormat::Json => print_json(&summary),
                OutputFormat::Text if !quiet => {
                    println!(
                        "created lot {} ({} event)",
                        summary.lot_id, summary.total_events
                    );
                }
                OutputFormat::Text => {}
            }
        }
        Commands::Sensor {
            lot_id,
            farm_name,
            temperature,
            humidity,
            soil_moisture,
            ph,
            timestamp,
        } => {
            let body = EventPayload::Sensor(SensorReading {
                lot_id,
                farm_name,
                temperature_c: temperature,
                humidity_pct: humidity,
                soil_moisture_pct: soil_moisture,
                ph,
                timestamp,
            });
            append(&log, body, output, quiet).await?;
        }
        Commands::Transport {
            lot_id,
            location,
            temperature,
            humidity,
            note,
            timestamp,
        } => {
            let body = EventPayload::Transport(TransportEvent {
                lot_id,
                location,
                temperature_c: temperature,
                humidity_pct: humidity,
                note,
                timestamp,
            });
            append(&log, body, output, quiet).await?;
        }
        Commands::Event {
            lot_id,
            kind,
            payload,
            timestamp,
        } => {
            let data = match serde_json::from_str::<serde_json::Value>(&payload) {
                Ok(serde_json::Value::Object(map)) => map,
                Ok(_) => return Err(CliError::Payload("expected a JSON object".into())),
                Err(e) => return Err(CliError::Payload(e.to_string())),
            };
            let body = EventPayload::Generic(GenericEvent {
                lot_id,
                kind,
                data,
                timestamp,
            });
            append(&log, body, output, quiet).await?;
        }
        Commands::Show { lot_id } => {
            let summary = log.summarize(&lot_id).await?;
            match output {
                OutputFormat::Json => print_json(&summary),
                OutputFormat::Text => print_summary(&summary),
            }
        }
        Commands::Verify { lot_id } => {
            let verification = log.verify(&lot_id).await?;
            match output {
                OutputFormat::Json => print_json(&verification),
                OutputFormat::Text => {
                    let state = if verification.verified {
                        "intact"
                    } else {
                        "BROKEN"
                    };
                    println!(
                        "{}: chain {} ({} events)",
                        lot_id, state, verification.event_count
                    );
                }
            }
            if !verification.verified {
                return Ok(EXIT_BROKEN_CHAIN);
            }
        }
        Commands::Lots => {
            let lots = log.list_lots().await?;
            match output {
                OutputFormat::Json => print_json(&serde_json::json!({ "lots": lots })),
                OutputFormat::Text => {
                    if lots.is_empty() && !quiet {
                        println!("no lots");
                    }
                    for lot in &lots {
                        println!(
                            "{}\t{}\t{}\t{}",
                            lot.lot_id, lot.farm_name, lot.crop, lot.harvest_date
                        );
                    }
                }
            }
        }
        Commands::Delete { lot_id } => {
            log.delete_lot(&lot_id).await?;
            match output {
                OutputFormat::Json => {
                    print_json(&serde_json::json!({"status": "deleted", "lot_id": lot_id}))
                }
                OutputFormat::Text if !quiet => println!("deleted lot {}", lot_id),
                OutputFormat::Text => {}
            }
        }
        Commands::Seed => {
            let outcome = seed_demo(&log).await?;
            match output {
                OutputFormat::Json => print_json(&outcome.to_json()),
                OutputFormat::Text if quiet => {}
                OutputFormat::Text => match outcome {
                    SeedOutcome::Seeded => println!("seeded demo lot {}", DEMO_LOT),
                    SeedOutcome::Exists => println!("demo lot {} already exists", DEMO_LOT),
                },
            }
        }
        // Dispatched in `main` before a journal is opened.
        Commands::Serve { .. } | Commands::Simulate { .. } => {}
    }
    Ok(0)
}

async fn append<S: LotStore + ?Sized>(
    log: &EventLog<S>,
    body: EventPayload,
    output: OutputFormat,
    quiet: bool,
) -> Result<(), CliError> {
    let event = log.record(body).await?;
    match output {
        OutputFormat::Json => print_json(&event),
        OutputFormat::Text if !quiet => println!("appended {} {}", event.kind, event.hash),
        OutputFormat::Text => {}
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(e) => eprintln!("error: could not serialize output: {}", e),
    }
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map_or_else(|| "-".to_string(), |v| v.to_string())
}

fn print_summary(summary: &LotSummary) {
    println!("lot:         {}", summary.lot_id);
    println!("farm:        {}", summary.farm_name);
    println!("crop:        {}", summary.crop);
    println!("harvested:   {}", summary.harvest_date);
    println!("events:      {}", summary.total_events);
    println!(
        "verified:    {}",
        if summary.verified { "yes" } else { "NO" }
    );
    println!(
        "quality:     {:.2} ({} risk)",
        summary.quality_score, summary.spoilage_risk
    );
    println!(
        "latest:      temperature {} C, humidity {} %, pH {}",
        fmt_opt(summary.latest_temperature_c),
        fmt_opt(summary.latest_humidity_pct),
        fmt_opt(summary.latest_ph)
    );
    for (i, event) in summary.chain.iter().enumerate() {
        println!(
            "  {:>3}  {:<16} {}  {}",
            i + 1,
            event.kind.as_str(),
            event.timestamp,
            event.hash
        );
    }
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}
