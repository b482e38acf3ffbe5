//! Ramdisk - mount an in-memory filesystem.
//!
//! Provides:
//! - Mounting a fresh, empty ramdisk at a directory
//! - Optional logging of every file lifecycle event
//! - Unmounting a running ramdisk

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::select;
use tokio::signal;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use ramdisk_bus::BusConfig;
use ramdisk_fs::{ops, FsEventBus, FsListener, MountConfig, RamFs};

/// In-memory filesystem.
#[derive(Parser)]
#[command(name = "ramdisk")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Configuration file path
    #[arg(short, long, default_value = "~/.ramdisk/config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mount a ramdisk and serve it until interrupted
    Mount {
        /// Mount point path (defaults to the configured one)
        mount_point: Option<PathBuf>,

        /// Allow other users to access the mount
        #[arg(long)]
        allow_other: bool,

        /// Print every file event
        #[arg(long)]
        log_events: bool,
    },

    /// Unmount a ramdisk
    Unmount {
        /// Mount point path
        mount_point: PathBuf,
    },
}

/// Ramdisk configuration.
#[derive(Debug, Clone, Default)]
struct Config {
    /// Mount settings
    mount: MountConfig,
    /// Event bus settings
    bus: BusConfig,
    /// Print every file event
    log_events: bool,
}

/// Load configuration from TOML file.
fn load_config(path: &Path) -> Result<Config> {
    let path = expand_tilde(path);

    if !path.exists() {
        info!("No config file found at {:?}, using defaults", path);
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(&path).context("Failed to read config file")?;
    parse_config(&content)
}

fn parse_config(content: &str) -> Result<Config> {
    let toml: toml::Value = content.parse().context("Failed to parse config file")?;

    let mut config = Config::default();

    // Parse [mount] section
    if let Some(mount) = toml.get("mount") {
        if let Some(mount_point) = mount.get("mount_point").and_then(|v| v.as_str()) {
            config.mount.mount_point = expand_tilde(Path::new(mount_point));
        }
        if let Some(fs_name) = mount.get("fs_name").and_then(|v| v.as_str()) {
            config.mount.fs_name = fs_name.to_string();
        }
        if let Some(allow_other) = mount.get("allow_other").and_then(|v| v.as_bool()) {
            config.mount.allow_other = allow_other;
        }
        if let Some(auto_unmount) = mount.get("auto_unmount").and_then(|v| v.as_bool()) {
            config.mount.auto_unmount = auto_unmount;
        }
    }

    // Parse [events] section
    if let Some(events) = toml.get("events") {
        if let Some(capacity) = events.get("listener_capacity").and_then(|v| v.as_integer()) {
            if capacity < 1 {
                anyhow::bail!("events.listener_capacity must be at least 1");
            }
            config.bus.listener_capacity = capacity as usize;
        }
        if let Some(backlog) = events.get("listener_backlog").and_then(|v| v.as_integer()) {
            if backlog < 1 {
                anyhow::bail!("events.listener_backlog must be at least 1");
            }
            config.bus.listener_backlog = backlog as usize;
        }
        if let Some(log_events) = events.get("log_events").and_then(|v| v.as_bool()) {
            config.log_events = log_events;
        }
    }

    Ok(config)
}

/// Expand ~ to home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set up logging")?;

    match cli.command {
        Commands::Mount {
            mount_point,
            allow_other,
            log_events,
        } => {
            let mut config = load_config(&cli.config)?;

            // Flags override the file
            if let Some(mount_point) = mount_point {
                config.mount.mount_point = mount_point;
            }
            config.mount.allow_other |= allow_other;
            config.log_events |= log_events;

            cmd_mount(config).await
        }

        Commands::Unmount { mount_point } => cmd_unmount(&mount_point),
    }
}

/// Mounts a fresh ramdisk and serves it until interrupted or unmounted.
async fn cmd_mount(config: Config) -> Result<()> {
    let bus = FsEventBus::new(config.bus.clone());

    // Subscribe before mounting so the logger sees every event
    let logger = if config.log_events {
        let listener = bus.subscribe().context("Failed to subscribe event logger")?;
        Some(tokio::spawn(log_events(listener)))
    } else {
        None
    };

    let fs = RamFs::with_bus(&bus);
    let mount_config = config.mount.clone();
    let mut session = tokio::task::spawn_blocking(move || ops::mount(fs, &mount_config));

    println!("Ramdisk mounted");
    println!("  Mount point: {}", config.mount.path().display());
    println!();
    println!("Press Ctrl+C to unmount");

    let result = select! {
        joined = &mut session => joined.context("Filesystem session panicked")?,
        signal = signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            info!("Received shutdown signal");
            if let Err(e) = ops::unmount(config.mount.path()) {
                warn!("Unmount failed: {}", e);
            }
            session.await.context("Filesystem session panicked")?
        }
    };

    bus.shutdown();
    bus.join().await.context("Event bus failed")?;
    if let Some(logger) = logger {
        logger.await.context("Event logger panicked")?;
    }

    result.context("Filesystem session failed")?;
    info!("Ramdisk stopped");
    Ok(())
}

/// Prints events until the filesystem unmounts or the bus closes.
async fn log_events(mut listener: FsListener) {
    debug!(listener = listener.id(), "Event logger started");

    while let Some(event) = listener.recv().await {
        match event.file().map(|file| file.info()) {
            Some(info) => println!(
                "{} name={} inode={} size={}",
                event.subject(),
                info.name,
                info.inode,
                info.size
            ),
            None => println!("{}", event.subject()),
        }

        if event.is_unmount() {
            break;
        }
    }

    if listener.lagged() > 0 {
        warn!(missed = listener.lagged(), "Event logger fell behind");
    }
    debug!(listener = listener.id(), "Event logger stopped");
}

fn cmd_unmount(mount_point: &Path) -> Result<()> {
    info!("Unmounting {:?}", mount_point);
    ops::unmount(mount_point).context("Failed to unmount")?;
    println!("Unmounted {}", mount_point.display());
    Ok(())
}
