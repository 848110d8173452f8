use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use parking_core::{Lot, Plate, VehicleStore};
use parking_hw::Camera;
use parking_vision::{GateOptions, ScrfdDetector};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod config;
mod console;
mod gate;
mod input;

use config::Config;
use console::Console;
use gate::CameraPresence;
use input::StdinLines;

#[derive(Parser)]
#[command(name = "parking", about = "Parking lot entry/exit console")]
struct Cli {
    /// SQLite database file (overrides PARKING_DB_PATH)
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,
    /// V4L2 camera device (overrides PARKING_CAMERA_DEVICE)
    #[arg(long, global = true)]
    camera: Option<String>,
    /// Directory holding det_10g.onnx (overrides PARKING_MODEL_DIR)
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the interactive entry/exit console (default)
    Run,
    /// Print the stored record for a plate as JSON
    Show {
        /// Plate in AAA1A11 format
        plate: Plate,
    },
    /// List video capture devices
    Devices,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(path) = cli.db_path {
        config.db_path = path;
    }
    if let Some(device) = cli.camera {
        config.camera_device = device;
    }
    if let Some(dir) = cli.model_dir {
        config.model_dir = dir;
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_console(&config),
        Commands::Show { plate } => show(&config, &plate),
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No video capture devices found");
            }
            for dev in devices {
                println!("{}  {} ({}, {})", dev.path, dev.name, dev.driver, dev.bus);
            }
            Ok(())
        }
    }
}

fn run_console(config: &Config) -> Result<()> {
    tracing::info!(db = %config.db_path.display(), camera = %config.camera_device, "parking console starting");

    let store = VehicleStore::open(&config.db_path)
        .with_context(|| format!("opening database {}", config.db_path.display()))?;

    let model_path = config.scrfd_model_path();
    let detector = ScrfdDetector::load(&model_path)
        .with_context(|| format!("loading face detector {}", model_path.display()))?;

    let options = GateOptions {
        max_duration: config.gate_timeout,
        ..GateOptions::default()
    };
    let presence = CameraPresence::new(
        config.camera_device.clone(),
        detector,
        options,
        config.snapshot_path.clone(),
    );

    let input = StdinLines::spawn().context("starting stdin reader")?;
    let mut console = Console::new(Lot::new(store), presence, input, std::io::stdout());
    console.run().context("writing to terminal")?;

    tracing::info!("parking console stopped");
    Ok(())
}

fn show(config: &Config, plate: &Plate) -> Result<()> {
    let store = VehicleStore::open(&config.db_path)
        .with_context(|| format!("opening database {}", config.db_path.display()))?;

    match Lot::new(store).record(plate)? {
        Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
        None => println!("No record for {plate}"),
    }
    Ok(())
}
