//! camwall binary entry point
//!
//! Plays the UI collaborator against the simulated native backend: opens a
//! grid over the configured cameras, reconfigures, and shuts down.
//!
//! Usage:
//!   camwall run --seconds 10
//!   camwall devices generate --base 192.168.1 --first 10 --count 4
//!   camwall reconfigure --blocksize-mb 20

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use camwall_core::config::{AutoGenerate, ConfigManager};
use camwall_core::logging;
use camwall_core::native::SimulatedServices;
use camwall_core::session::{Session, SessionPaths};

#[derive(Parser, Debug)]
#[command(name = "camwall", version, about = "Camera wall resource orchestrator")]
struct Cli {
    /// Configuration directory (defaults to the platform config dir).
    #[arg(long = "config-dir", value_name = "DIR", global = true)]
    config_dir: Option<PathBuf>,

    /// Only log warnings and errors.
    #[arg(long, short, action = clap::ArgAction::SetTrue, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Open the wall, show every active camera in one grid, then shut down.
    Run {
        /// How long to keep the wall open.
        #[arg(long, default_value_t = 5)]
        seconds: u64,
    },
    /// Manage the camera collection.
    Devices {
        #[command(subcommand)]
        action: DevicesAction,
    },
    /// Change storage settings and rebuild the resource graph.
    Reconfigure(ReconfigureArgs),
    /// Reset settings and cameras to defaults.
    Reset,
}

#[derive(Subcommand, Debug)]
enum DevicesAction {
    /// Print every occupied slot.
    List,
    /// Fill the first slots with RTSP cameras at consecutive addresses.
    Generate(GenerateArgs),
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// First three octets, e.g. 192.168.1
    #[arg(long)]
    base: String,
    #[arg(long, default_value_t = 10)]
    first: u32,
    #[arg(long, default_value_t = 4)]
    count: u32,
    #[arg(long, default_value = "")]
    port: String,
    #[arg(long, default_value = "")]
    tail: String,
    #[arg(long, default_value = "admin")]
    username: String,
    #[arg(long, default_value = "")]
    password: String,
}

#[derive(Args, Debug)]
struct ReconfigureArgs {
    #[arg(long = "blocksize-mb", value_name = "MB")]
    blocksize_mb: Option<u64>,
    #[arg(long = "blocks", value_name = "N")]
    n_blocks: Option<u64>,
    /// Record every camera into block storage.
    #[arg(long)]
    record: Option<bool>,
}

fn default_config_dir() -> Result<PathBuf> {
    directories::ProjectDirs::from("", "", "camwall")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .context("could not determine a config directory")
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let paths = SessionPaths::new(match cli.config_dir.clone() {
        Some(dir) => dir,
        None => default_config_dir()?,
    });

    // Missing settings leave the defaults in place
    let mut peek = ConfigManager::new(paths.settings_file());
    let _ = peek.load();
    let logging_settings = peek.settings().logging.clone();
    let level = if cli.quiet {
        logging_settings.level.quiet()
    } else {
        logging_settings.level
    };
    let _guard = if logging_settings.file_logging {
        let logs = peek.logs_folder();
        std::fs::create_dir_all(&logs)
            .with_context(|| format!("creating log folder {}", logs.display()))?;
        Some(logging::init_tracing_with_file(level, &logs))
    } else {
        logging::init_tracing(level);
        None
    };

    tracing::info!("camwall v{} starting", camwall_core::version());

    let native = Arc::new(SimulatedServices::new());
    let mut session = Session::bootstrap(paths, native).context("starting session")?;

    let result = match cli.command {
        Command::Run { seconds } => run(&mut session, seconds),
        Command::Devices { action } => devices(&mut session, action),
        Command::Reconfigure(args) => reconfigure(&mut session, args),
        Command::Reset => reset(&mut session),
    };

    let report = session.shutdown().context("shutting down")?;
    if !report.is_clean() {
        for failure in &report.failures {
            tracing::warn!("Teardown: {}", failure);
        }
    }
    result
}

fn run(session: &mut Session, seconds: u64) -> Result<()> {
    let active: Vec<u64> = session.devices().active().map(|d| d.id).collect();
    let cols = (active.len() as f64).sqrt().ceil().max(1.0) as u32;
    let rows = (active.len() as u32).div_ceil(cols).max(1);

    let grid = session.open_grid(rows, cols)?;
    for (cell, device) in active.iter().enumerate() {
        if let Err(e) = session.assign_device(grid, cell, Some(*device)) {
            tracing::warn!(device, "Camera not shown: {}", e);
        }
    }
    println!("Showing {} camera(s) in a {}x{} grid", active.len(), rows, cols);

    for _ in 0..seconds {
        std::thread::sleep(Duration::from_secs(1));
        for event in session.poll_worker_events() {
            tracing::debug!(?event, "Worker event");
        }
    }
    session.save_layout()?;
    Ok(())
}

fn devices(session: &mut Session, action: DevicesAction) -> Result<()> {
    match action {
        DevicesAction::List => {
            for device in session.devices().active() {
                println!("slot {:>2}  #{:<4} {}", device.slot, device.id, device.label());
            }
        }
        DevicesAction::Generate(args) => {
            session.devices_mut().auto_generate(&AutoGenerate {
                base_address: args.base,
                first_octet: args.first,
                count: args.count,
                port: args.port,
                tail: args.tail,
                username: args.username,
                password: args.password,
            })?;
            session.mark_config_modified();
            session.config_dialog_closed()?;
            println!("{} camera(s) configured", session.devices().active().count());
        }
    }
    Ok(())
}

fn reconfigure(session: &mut Session, args: ReconfigureArgs) -> Result<()> {
    let storage = &mut session.settings_mut().storage;
    if let Some(mb) = args.blocksize_mb {
        storage.blocksize_mb = mb;
    }
    if let Some(n) = args.n_blocks {
        storage.n_blocks = n;
    }
    if let Some(record) = args.record {
        storage.record = record;
    }
    session.mark_storage_modified();

    match session.config_dialog_closed()? {
        Some(report) => println!(
            "Storage {}; {} container(s) restored",
            report.storage_decision, report.restored.containers
        ),
        None => println!("Nothing changed"),
    }
    Ok(())
}

fn reset(session: &mut Session) -> Result<()> {
    *session.settings_mut() = Default::default();
    session.devices_mut().reset()?;
    session.mark_config_modified();
    session.config_dialog_closed()?;
    println!("Settings and cameras reset");
    Ok(())
}
