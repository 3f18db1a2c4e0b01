//! CLI entry point for the HFP ingestion service.
//!
//! Provides subcommands for running the live ingestion pipeline, running the
//! periodic database cleanup on its own, and applying schema migrations.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hfp_ingest::cleanup::{CleanupJob, CleanupStatus};
use hfp_ingest::config::{DatabaseArgs, LookupArgs, MqttArgs};
use hfp_ingest::fetch::{BasicClient, auth::ApiKey};
use hfp_ingest::infra::digitransit::DigitransitClient;
use hfp_ingest::infra::nominatim::NominatimClient;
use hfp_ingest::infra::operators::OperatorTable;
use hfp_ingest::location::LocationResolver;
use hfp_ingest::mqtt::Subscriber;
use hfp_ingest::pipeline::IngestionPipeline;
use hfp_ingest::services::geocoding::ReverseGeocoder;
use hfp_ingest::services::stop_lookup::StopLookup;
use hfp_ingest::store::{PgStore, Store};
use hfp_ingest::writer::PersistenceWriter;
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "hfp_ingest")]
#[command(about = "Ingests live HFP vehicle telemetry into Postgres", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Subscribe to the telemetry feed and store every event
    Ingest {
        #[command(flatten)]
        db: DatabaseArgs,

        #[command(flatten)]
        mqtt: MqttArgs,

        #[command(flatten)]
        lookup: LookupArgs,

        /// Empty all tables every N seconds (0 = never)
        #[arg(long, env = "CLEANUP_INTERVAL_SECS", default_value_t = 360)]
        cleanup_interval_secs: u64,
    },
    /// Empty all tables, once or on a fixed schedule
    Cleanup {
        #[command(flatten)]
        db: DatabaseArgs,

        /// Run a single cleanup and exit
        #[arg(long, default_value_t = false)]
        once: bool,

        /// Seconds between cleanups when not running once
        #[arg(long, env = "CLEANUP_INTERVAL_SECS", default_value_t = 360)]
        cleanup_interval_secs: u64,
    },
    /// Apply database migrations and exit
    Migrate {
        #[command(flatten)]
        db: DatabaseArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    let _file_guard = init_tracing()?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Ingest {
            db,
            mqtt,
            lookup,
            cleanup_interval_secs,
        } => ingest(db, mqtt, lookup, cleanup_interval_secs).await?,
        Commands::Cleanup {
            db,
            once,
            cleanup_interval_secs,
        } => {
            let store = PgStore::connect(&db.pool_settings()).await?;
            let job = CleanupJob::new(Arc::new(store.clone()), CleanupStatus::new());

            if once {
                job.run_once().await.context("cleanup failed")?;
            } else {
                let period = Duration::from_secs(cleanup_interval_secs.max(1));
                tokio::select! {
                    _ = job.run_every(period) => {}
                    _ = shutdown_signal() => info!("Shutdown requested, stopping cleanup"),
                }
            }
            store.close().await;
        }
        Commands::Migrate { db } => {
            let store = PgStore::connect(&db.pool_settings()).await?;
            store.migrate().await?;
            info!("Migrations applied");
            store.close().await;
        }
    }

    Ok(())
}

/// Logging setup: colored stderr + JSON rolling log file.
fn init_tracing() -> Result<WorkerGuard> {
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/hfp_ingest.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("hfp_ingest.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::NONE)
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

    Ok(file_guard)
}

/// Connects everything and runs the subscriber until Ctrl+C.
#[tracing::instrument(skip_all, fields(broker = %mqtt.mqtt_host, topic = %mqtt.mqtt_topic))]
async fn ingest(
    db: DatabaseArgs,
    mqtt: MqttArgs,
    lookup: LookupArgs,
    cleanup_interval_secs: u64,
) -> Result<()> {
    let store = PgStore::connect(&db.pool_settings()).await?;
    store.migrate().await?;
    let shared: Arc<dyn Store> = Arc::new(store.clone());

    let mut pipeline = build_pipeline(&lookup, shared.clone())?;

    let cleanup_status = CleanupStatus::new();
    let cleanup_task = (cleanup_interval_secs > 0).then(|| {
        let job = CleanupJob::new(shared.clone(), cleanup_status.clone());
        tokio::spawn(async move {
            job.run_every(Duration::from_secs(cleanup_interval_secs))
                .await
        })
    });

    info!("Starting subscriber");
    let result = Subscriber::new(&mqtt.settings())
        .run(&mut pipeline, &cleanup_status, shutdown_signal())
        .await;

    if let Some(task) = cleanup_task {
        task.abort();
    }
    store.close().await;
    info!("Subscriber stopped");

    result
}

fn build_pipeline(lookup: &LookupArgs, store: Arc<dyn Store>) -> Result<IngestionPipeline> {
    let operators = OperatorTable::load(&lookup.operators_path)?;
    info!(
        operators = operators.len(),
        path = %lookup.operators_path,
        "Operator table loaded"
    );

    let stop_http = BasicClient::new(&lookup.nominatim_user_agent)?;
    let stops: Arc<dyn StopLookup> = match &lookup.digitransit_subscription_key {
        Some(key) => Arc::new(DigitransitClient::new(
            ApiKey::digitransit(stop_http, key)?,
            lookup.digitransit_url.clone(),
            lookup.stop_id_namespace.clone(),
        )),
        None => {
            warn!("No Digitransit subscription key configured; stop lookups may be refused");
            Arc::new(DigitransitClient::new(
                stop_http,
                lookup.digitransit_url.clone(),
                lookup.stop_id_namespace.clone(),
            ))
        }
    };

    let nominatim = NominatimClient::new(
        BasicClient::new(&lookup.nominatim_user_agent)?,
        lookup.nominatim_url.clone(),
    );
    let geocoder = Arc::new(ReverseGeocoder::new(nominatim, lookup.geocoder_settings())?);

    let resolver = LocationResolver::new(stops, geocoder, store.clone());
    let writer = PersistenceWriter::new(store, operators);
    Ok(IngestionPipeline::new(resolver, writer))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}
