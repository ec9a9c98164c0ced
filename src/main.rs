use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use truck_tracker::error::Result;
use truck_tracker::feed::firestore::FirestoreClient;
use truck_tracker::handler::ProximityHandler;
use truck_tracker::prelude::TrackerSettings;
use truck_tracker::tracker::{Tracker, interrupt_or, shutdown_channel};

/// Alert when the tracked truck comes near.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Settings file (.yaml, .yml, .toml or .json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Alert distance in meters, overriding the settings
    #[arg(short, long)]
    threshold: Option<f64>,

    /// Service-account key file, overriding the settings
    #[arg(short = 'k', long)]
    credentials: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            for line in err.diagnostic() {
                println!("{}", line);
            }
            tracing::error!(error = %err, "tracker exited");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let mut builder = TrackerSettings::builder();
    if let Some(path) = args.config {
        builder = builder.with_file(path);
    }
    builder = builder.with_env_overrides("TRACKER", "__");
    if let Some(threshold) = args.threshold {
        builder = builder.with_override("threshold_m", threshold);
    }
    if let Some(path) = args.credentials {
        builder = builder.with_override("credentials_path", path.to_string_lossy().into_owned());
    }
    let settings = builder.build()?;

    let client = FirestoreClient::builder(&settings.credentials_path)
        .with_database(&settings.database)
        .with_poll_interval(settings.poll_interval())
        .build()
        .await?;
    println!("Successfully connected to Firestore.");

    let document = client
        .collection(&settings.collection)
        .document(&settings.document);
    let handler = ProximityHandler::new(settings.reference, settings.threshold_m);

    // Held for the life of the process; only Ctrl-C ends the wait.
    let (_trigger, signal) = shutdown_channel();
    Tracker::new(document, handler)
        .run_until(interrupt_or(signal))
        .await
}
