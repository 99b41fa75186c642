use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use clap::Subcommand;
use siteclock_core::{Config, Database, PositionSource, ReplaySource, TrackingController};

#[derive(Subcommand)]
pub enum TrackAction {
    /// Replay a recorded position trace through the tracking loop
    Replay {
        employee: String,
        /// JSON-lines file, one position per line
        #[arg(long)]
        file: PathBuf,
        /// Delay between replayed samples in milliseconds
        #[arg(long, default_value_t = 200)]
        interval_ms: u64,
    },
    /// Current tracking status for an employee
    Status { employee: String },
}

pub fn run(action: TrackAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        TrackAction::Replay {
            employee,
            file,
            interval_ms,
        } => replay(employee, &file, interval_ms),
        TrackAction::Status { employee } => {
            let store = Arc::new(Database::open()?);
            let controller = TrackingController::new(employee, store, Config::load_or_default())?;
            println!("{}", serde_json::to_string_pretty(&controller.status())?);
            Ok(())
        }
    }
}

fn replay(
    employee: String,
    file: &std::path::Path,
    interval_ms: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = Arc::new(Database::open()?);
    let config = Config::load_or_default();
    let mut controller = TrackingController::new(employee, store, config)?;
    let source = ReplaySource::from_jsonl(file, Duration::from_millis(interval_ms))?;
    let total = source.len();

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    rt.block_on(async {
        controller.poll_schedule(Local::now().naive_local())?;
        let mut subscription = source.subscribe()?;
        while let Some(position) = subscription.next().await {
            controller.poll_schedule(Local::now().naive_local())?;
            match controller.handle_sample(&position, Local::now().naive_local()) {
                Ok(events) => {
                    for event in &events {
                        println!("{}", serde_json::to_string(event)?);
                    }
                }
                Err(e) => eprintln!("sample not applied, will retry: {e}"),
            }
        }
        controller.stop()?;
        Ok::<(), Box<dyn std::error::Error>>(())
    })?;

    println!("replayed {total} positions");
    Ok(())
}
