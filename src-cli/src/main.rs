//! Strata - headless control surface for the streaming equalizer
//!
//! Loads an engine config, then reads commands from stdin (`start`, `stop`,
//! `gain <band> <db>`, ...) while polling the spectrum channel at the
//! configured interval.

mod commands;

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError};
use tracing::{debug, info, warn};

use strata_core::{
    AudioBackend, AudioDevice, CpalBackend, EngineConfig, EqualizerController, Event, ToneBackend,
};

use commands::{Command, HELP};

#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "Real-time multi-band bandpass equalizer", long_about = None)]
struct Cli {
    /// Engine configuration file (defaults to the platform config path)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the equalizer and read control commands from stdin (default)
    Run {
        /// Use a synthetic sine input at this frequency instead of audio devices
        #[arg(long, value_name = "HZ")]
        tone: Option<f64>,

        /// Start the stream immediately
        #[arg(long)]
        autostart: bool,
    },
    /// List audio devices
    Devices,
    /// Write the reference configuration to a file
    InitConfig {
        /// Destination (defaults to the platform config path)
        path: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "strata=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Run {
        tone: None,
        autostart: false,
    }) {
        Commands::Run { tone, autostart } => run(cli.config, tone, autostart),
        Commands::Devices => list_devices(),
        Commands::InitConfig { path } => init_config(path.or(cli.config)),
    }
}

fn load_config(path: Option<PathBuf>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(&path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(EngineConfig::load_or_default()),
    }
}

fn run(config_path: Option<PathBuf>, tone: Option<f64>, autostart: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let poll_interval = Duration::from_millis(config.spectrum_poll_ms);

    let backend: Arc<dyn AudioBackend> = match tone {
        Some(hz) => Arc::new(ToneBackend::new(hz)),
        None => Arc::new(CpalBackend::new()),
    };
    let mut controller = EqualizerController::with_backend(config, backend)?;
    info!(
        "Bands at {:?}Hz, Q {}, backend {}",
        controller.config().center_frequencies,
        controller.config().quality_factor,
        controller.backend_name()
    );

    if autostart {
        controller.start()?;
    }
    println!("{}", HELP);

    let lines = spawn_stdin_reader()?;
    loop {
        match lines.recv_timeout(poll_interval) {
            Ok(line) if line.trim().is_empty() => {}
            Ok(line) => match line.parse::<Command>() {
                Ok(Command::Quit) => break,
                Ok(command) => execute(&mut controller, command),
                Err(e) => println!("error: {:#}", e),
            },
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        drain_events(&controller);
        log_spectrum(&controller);
    }

    if controller.is_running() {
        controller.stop()?;
    }
    Ok(())
}

fn execute(controller: &mut EqualizerController, command: Command) {
    let result = match command {
        Command::Start => controller.start().map(|_| println!("running")),
        Command::Stop => controller.stop().map(|_| println!("stopped")),
        Command::Gain { band, gain_db } => controller
            .set_gain(band, gain_db)
            .map(|stored| println!("band {} = {:+.1}dB", band, stored)),
        Command::Gains => {
            print_gains(controller);
            Ok(())
        }
        Command::Flat => {
            controller.reset_gains();
            print_gains(controller);
            Ok(())
        }
        Command::Status => {
            let stats = controller.stats();
            println!(
                "{:?} | blocks {} | underrun frames {} | overrun samples {} | faults {} | peak {:.3}",
                controller.state(),
                stats.blocks_rendered(),
                stats.underrun_frames(),
                stats.overrun_samples(),
                stats.faults(),
                stats.output_peak()
            );
            Ok(())
        }
        Command::Spectrum => {
            match controller.latest_spectrum().and_then(|s| s.peak()) {
                Some((hz, db)) => println!("peak {:.0}Hz at {:.1}dB", hz, db),
                None => println!("no spectrum available"),
            }
            Ok(())
        }
        Command::Help => {
            println!("{}", HELP);
            Ok(())
        }
        Command::Quit => Ok(()),
    };

    if let Err(e) = result {
        println!("error: {}", e);
    }
}

fn print_gains(controller: &EqualizerController) {
    for (band, (center, gain)) in controller
        .config()
        .center_frequencies
        .iter()
        .zip(controller.gains())
        .enumerate()
    {
        println!("  {} {:>7.0}Hz {:+6.1}dB", band, center, gain);
    }
}

fn drain_events(controller: &EqualizerController) {
    while let Some(event) = controller.poll_event() {
        match event {
            Event::StreamFault { message } => warn!("Stream fault: {}", message),
            Event::Error { message } => warn!("Engine error: {}", message),
            other => debug!("{:?}", other),
        }
    }
}

/// Consume the newest snapshot, as a plot refresh would
fn log_spectrum(controller: &EqualizerController) {
    if let Some((hz, db)) = controller.latest_spectrum().and_then(|s| s.peak()) {
        debug!("Spectrum peak {:.0}Hz {:.1}dB", hz, db);
    }
}

fn spawn_stdin_reader() -> Result<Receiver<String>> {
    let (sender, receiver) = unbounded();
    thread::Builder::new()
        .name("strata-stdin".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if sender.send(line).is_err() {
                    break;
                }
            }
        })
        .context("spawning stdin reader")?;
    Ok(receiver)
}

fn list_devices() -> Result<()> {
    let devices = AudioDevice::enumerate_all()?;
    for device in devices {
        println!(
            "{:?}{} {} (max {} ch, rates {:?})",
            device.direction,
            if device.is_default { " [default]" } else { "" },
            device.name,
            device.max_channels,
            device.sample_rates
        );
    }
    Ok(())
}

fn init_config(path: Option<PathBuf>) -> Result<()> {
    let path = path
        .or_else(EngineConfig::default_path)
        .context("could not determine a config path")?;
    let config = EngineConfig::reference();
    config.save(&path)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    println!("wrote {}", path.display());
    Ok(())
}
