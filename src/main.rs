//! CLI entry point for transit_pulse.
//!
//! Provides subcommands for a one-shot vehicle snapshot, polling the feeds
//! on an interval, searching the stop directory and showing call stats.

use anyhow::{Result, bail};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use std::ffi::OsStr;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};
use transit_pulse::{
    config::{Config, DEFAULT_TRIP_UPDATES_URL, DEFAULT_VEHICLE_POSITIONS_URL},
    fetch::{BasicClient, UrlParam},
    lookup::{StopDirectory, stop_directory::SNAPSHOT_MAX_AGE},
    output::{print_json, print_pretty},
    pipeline::{Pipeline, VehicleQuery},
    realtime::LineFilter,
    stats::StatsStore,
};

#[derive(Parser)]
#[command(name = "transit_pulse")]
#[command(about = "Live vehicle positions, ETAs and destinations from GTFS-RT feeds", long_about = None)]
struct Cli {
    /// Indent JSON output
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct QueryArgs {
    /// Home stop ids to compute ETAs for (defaults to HOME_STOPS)
    #[arg(short, long, value_delimiter = ',')]
    stop: Vec<String>,

    /// Only include these lines, e.g. "4,6,172"
    #[arg(short, long, value_delimiter = ',')]
    lines: Vec<String>,
}

impl QueryArgs {
    fn into_query(self, config: &Config) -> VehicleQuery {
        let stops = if self.stop.is_empty() {
            config.home_stops.clone()
        } else {
            self.stop
        };
        let stops = stops.into_iter().map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        VehicleQuery::new(stops, LineFilter::only(self.lines))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print one snapshot of vehicles with ETAs and destinations
    Vehicles {
        #[command(flatten)]
        query: QueryArgs,
    },
    /// Poll the feeds and print a snapshot on every tick
    Watch {
        #[command(flatten)]
        query: QueryArgs,

        /// Seconds between snapshots
        #[arg(short, long, default_value_t = 5)]
        interval: u64,

        /// Number of snapshots to print (0 = until Ctrl+C)
        #[arg(short = 'n', long, default_value_t = 0)]
        count: usize,
    },
    /// Search the stop directory by name
    Stops {
        /// Part of the stop name
        #[arg(value_name = "QUERY")]
        query: String,
    },
    /// Show upstream and cached call counts
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/transit_pulse.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("transit_pulse.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Commands::Vehicles { query } => {
            let pipeline = build_pipeline(&config)?;
            let query = query.into_query(&config);
            print_pretty(&query);

            let response = pipeline.vehicles(&query).await;
            print_json(&response, cli.pretty)?;
        }
        Commands::Watch {
            query,
            interval,
            count,
        } => {
            let pipeline = build_pipeline(&config)?;
            let query = query.into_query(&config);
            watch(&pipeline, &query, interval, count, cli.pretty).await?;
        }
        Commands::Stops { query } => {
            let client = BasicClient::with_timeout(config.fetch_timeout)?;
            let directory = StopDirectory::load_or_refresh(
                &client,
                &config.stop_directory_url,
                &config.stop_directory,
                SNAPSHOT_MAX_AGE,
            )
            .await?;

            let matches = directory.search(&query);
            info!(query = %query, hits = matches.len(), "Stop search");
            print_json(&matches, cli.pretty)?;
        }
        Commands::Stats => {
            let Some(path) = &config.stats_file else {
                bail!("call stats are disabled (STATS_FILE is empty)");
            };
            let today = Utc::now().with_timezone(&config.timezone).date_naive();
            let summary = StatsStore::new(path).load().summary(today);
            print_json(&summary, cli.pretty)?;
        }
    }

    Ok(())
}

/// Feed client with the Trafiklab key attached, wrapped in the request pipeline.
fn build_pipeline(config: &Config) -> Result<Pipeline<UrlParam<BasicClient>>> {
    let uses_trafiklab = config.endpoints.vehicle_positions == DEFAULT_VEHICLE_POSITIONS_URL
        || config.endpoints.trip_updates == DEFAULT_TRIP_UPDATES_URL;
    if config.api_key.is_empty() && uses_trafiklab {
        warn!("TRAFIKLAB_KEY is not set; upstream feeds will likely reject requests");
    }

    let client = UrlParam::api_key(
        BasicClient::with_timeout(config.fetch_timeout)?,
        config.api_key.clone(),
    );
    Ok(Pipeline::from_config(client, config)?)
}

/// Prints a snapshot every `interval` seconds until `count` snapshots or Ctrl+C.
#[tracing::instrument(skip(pipeline, query, pretty))]
async fn watch(
    pipeline: &Pipeline<UrlParam<BasicClient>>,
    query: &VehicleQuery,
    interval: u64,
    count: usize,
    pretty: bool,
) -> Result<()> {
    if count == 0 {
        info!(interval, "Watching infinitely. Press Ctrl+C to stop.");
    } else {
        info!(count, interval, "Starting watch");
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(interval.max(1)));
    let mut printed = 0;

    loop {
        if count > 0 && printed >= count {
            break;
        }

        tokio::select! {
            _ = ticker.tick() => {
                let response = pipeline.vehicles(query).await;
                print_json(&response, pretty)?;
                printed += 1;
            }
            _ = tokio::signal::ctrl_c() => {
                info!(printed, "Interrupted");
                break;
            }
        }
    }

    Ok(())
}
