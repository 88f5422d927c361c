use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use mainlert_config::AppConfig;
use mainlert_motion::source::SampleParser;
use mainlert_motion::SampleSink;
use mainlert_session::notify::{CooldownNotifier, LogNotifier};
use mainlert_session::{SessionController, SessionOutcome};
use mainlert_store::{JsonFileStore, ServiceRecord, ServiceStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info, warn};

#[derive(Parser, Debug)]
#[command(name = "mainlert")]
#[command(about = "Track vehicle movement against a service mileage limit", long_about = None)]
struct Args {
    /// Store file (overrides the config and the platform default)
    #[arg(long, global = true, value_name = "PATH")]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create or replace a service
    Register {
        service: String,
        /// Accumulated movement at which the service is due
        #[arg(long)]
        limit: Option<f32>,
        /// Vehicle attached to the service (repeatable)
        #[arg(long = "vehicle", value_name = "ID")]
        vehicles: Vec<String>,
    },
    /// Run a monitoring session over a recorded sample log ("-" for stdin)
    Replay {
        service: String,
        input: String,
        #[arg(long, value_name = "ID")]
        vehicle: Option<String>,
        /// Pace samples at the configured sampling interval
        #[arg(long)]
        realtime: bool,
        /// Take over a service still flagged by a session that never finished
        #[arg(long)]
        force: bool,
    },
    /// Show a service's total and readings
    Status { service: String },
    /// Delete a service's readings and zero its total
    Reset { service: String },
    /// Write the effective configuration to the config file
    InitConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "mainlert=info,mainlert_motion=info,mainlert_session=info,mainlert_store=info"
                    .into()
            }),
        )
        .init();

    let args = Args::parse();

    let config = mainlert_config::load_config().unwrap_or_else(|e| {
        warn!(?e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    match args.command {
        Command::Register {
            service,
            limit,
            vehicles,
        } => {
            let limit = limit.unwrap_or(config.motion.effective().default_mileage_limit);
            if !limit.is_finite() || limit <= 0.0 {
                bail!("Mileage limit must be positive, got {limit}");
            }
            let mut record = ServiceRecord::new(service.as_str(), limit);
            record.vehicle_ids = vehicles;
            open_controller(args.store, &config)?
                .store()
                .put_service(record)?;
            info!(%service, limit, "Service registered");
        }
        Command::Replay {
            service,
            input,
            vehicle,
            realtime,
            force,
        } => {
            let pacing = realtime.then(|| {
                Duration::from_millis(config.motion.effective().sampling_interval_ms)
            });
            let controller = open_controller(args.store, &config)?;
            if force {
                controller.release_monitoring(&service).await?;
            }
            let outcome = replay(&controller, &service, vehicle.as_deref(), &input, pacing).await?;
            print_outcome(&outcome);
        }
        Command::Status { service } => {
            let summary = open_controller(args.store, &config)?
                .status(&service)
                .await?;
            println!(
                "{}: {:.1} / {:.1}{}",
                summary.service_id,
                summary.total_movement,
                summary.mileage_limit,
                if summary.is_mileage_exceeded {
                    " (service due)"
                } else {
                    ""
                }
            );
            println!(
                "readings: {}, monitoring: {}, last reading: {}",
                summary.total_readings, summary.is_monitoring, summary.last_reading_time
            );
        }
        Command::Reset { service } => {
            open_controller(args.store, &config)?
                .reset_service(&service)
                .await?;
            println!("{service}: reset");
        }
        Command::InitConfig => {
            mainlert_config::save_config(&config.effective())?;
            println!("{}", mainlert_config::config_path()?.display());
        }
    }

    Ok(())
}

/// Open the store and build the session controller around it.
fn open_controller(store_override: Option<PathBuf>, config: &AppConfig) -> Result<SessionController> {
    let store_path = match store_override.or_else(|| config.store.path.clone()) {
        Some(path) => path,
        None => mainlert_config::default_store_path()?,
    };
    let store: Arc<dyn ServiceStore> = Arc::new(JsonFileStore::open(store_path)?);

    let notifier =
        CooldownNotifier::from_minutes(LogNotifier, config.notifications.cooldown_minutes);
    let user_id = config
        .store
        .user_id
        .clone()
        .unwrap_or_else(|| "local".to_string());

    Ok(SessionController::new(
        store,
        Arc::new(notifier),
        &config.motion,
        user_id,
    ))
}

/// Feed a recorded sample log through one monitoring session.
async fn replay(
    controller: &SessionController,
    service_id: &str,
    vehicle_id: Option<&str>,
    input: &str,
    pacing: Option<Duration>,
) -> Result<SessionOutcome> {
    let reader: Box<dyn AsyncRead + Unpin + Send> = if input == "-" {
        Box::new(tokio::io::stdin())
    } else {
        Box::new(tokio::fs::File::open(input).await?)
    };

    let session = controller.start(service_id, vehicle_id).await?;

    let mut updates = session.updates();
    let watcher = tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let Some(event) = *updates.borrow_and_update() else {
                continue;
            };
            debug!(
                timestamp_ms = event.timestamp_ms,
                magnitude = event.magnitude,
                rolling_average = event.rolling_average,
                total_movement = event.total_movement,
                is_vehicle_movement = event.is_vehicle_movement,
                "Classification"
            );
        }
    });

    let fed = tokio::select! {
        result = feed_samples(reader, session.sample_sink(), pacing) => Some(result),
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, stopping session");
            None
        }
    };

    // Stop even if the log failed midway, so the service is not left flagged.
    let outcome = session.stop().await;
    watcher.abort();

    if let Some(count) = fed.transpose()? {
        info!(count, "Sample log consumed");
    }
    outcome
}

/// Parse samples from `reader` into `sink` until EOF or the session ends.
/// Returns the number of samples accepted.
async fn feed_samples(
    mut reader: Box<dyn AsyncRead + Unpin + Send>,
    sink: SampleSink,
    pacing: Option<Duration>,
) -> Result<u64> {
    let mut parser = SampleParser::new();
    let mut buf = [0u8; 4096];
    let mut ticker = pacing.map(tokio::time::interval);
    let mut accepted: u64 = 0;

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            parser.finish();
        } else {
            parser.push_data(&buf[..n]);
        }

        // Drain all complete lines.
        while let Some(result) = parser.next_sample() {
            match result {
                Ok(sample) => {
                    if let Some(ticker) = ticker.as_mut() {
                        ticker.tick().await;
                    }
                    if !sink.push(sample) {
                        debug!(line = parser.lines_read(), "Session ended, leaving rest of log");
                        return Ok(accepted);
                    }
                    accepted += 1;
                }
                Err(e) => {
                    warn!(%e, "Skipping malformed sample line");
                }
            }
        }

        if n == 0 {
            return Ok(accepted);
        }
    }
}

fn print_outcome(outcome: &SessionOutcome) {
    let reading = &outcome.end.reading;
    println!(
        "session {:?}: total {:.1}, vehicle movement: {}, duration {:.1}s",
        outcome.end.reason,
        reading.total_movement,
        reading.is_vehicle_movement,
        reading.duration_ms as f64 / 1000.0
    );
    match &outcome.reading {
        Some(stored) => println!("saved {}", stored.id),
        None => println!("nothing to save"),
    }
}
