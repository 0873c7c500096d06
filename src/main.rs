//! Host Activity Monitor CLI
//!
//! Logs focus changes, process starts/stops and filesystem changes until the
//! operator types `q`.

use anyhow::Context;
use clap::Parser;
use host_activity_monitor::{
    orchestrator::spawn_console_reader, ConfigOverrides, EnumerationFailurePolicy, EventSink, HostSources,
    MonitorConfig, Orchestrator, OutputFormat, SessionStats, BANNER, INSTRUCTIONS, STOPPED,
    VERSION,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "host-monitor")]
#[command(version = VERSION)]
#[command(about = "Real-time log of focus, process and file activity", long_about = None)]
struct Cli {
    /// Directory subtree to watch (defaults to the desktop)
    #[arg(long)]
    path: Option<PathBuf>,

    /// Foreground window poll interval in milliseconds
    #[arg(long)]
    focus_interval_ms: Option<u64>,

    /// Process list capture interval in milliseconds
    #[arg(long)]
    process_interval_ms: Option<u64>,

    /// Change notification buffer size in bytes
    #[arg(long)]
    buffer_size: Option<usize>,

    /// Event line format
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// How a failed process enumeration is treated
    #[arg(long, value_enum)]
    on_enumeration_failure: Option<EnumerationFailurePolicy>,

    /// Configuration file (defaults to the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();
    let config = build_config(&cli)?;

    let stats = Arc::new(SessionStats::new());
    let (sink, writer) = EventSink::spawn(std::io::stdout(), config.output_format, stats.clone());

    let host = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string());
    info!(session = %Uuid::new_v4(), %host, version = VERSION, "monitor starting");

    let orchestrator = Orchestrator::new(config.clone(), stats.clone());

    sink.notice(BANNER);
    sink.notice(format!(
        "Monitoring directory (including subfolders): {}",
        orchestrator.watch_root().display()
    ));
    sink.notice(INSTRUCTIONS);

    let monitors = orchestrator.start(HostSources::host(&config), &sink);

    let stop = monitors.stop_handle();
    if let Err(e) = ctrlc::set_handler(move || stop.stop()) {
        warn!("could not install Ctrl+C handler: {e}");
    }

    let commands = spawn_console_reader(std::io::BufReader::new(std::io::stdin()));
    orchestrator.command_loop(&commands, &monitors.stop_handle(), &sink);
    monitors.shutdown();

    sink.notice(STOPPED);
    sink.notice(stats.summary());
    if let Err(e) = writer.finish(sink) {
        warn!("event output incomplete: {e}");
    }

    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            watch_root: self.path.clone(),
            focus_interval: self.focus_interval_ms.map(Duration::from_millis),
            process_interval: self.process_interval_ms.map(Duration::from_millis),
            change_buffer_size: self.buffer_size,
            output_format: self.format,
            enumeration_failure: self.on_enumeration_failure,
        }
    }
}

/// Load the config file, then apply command-line overrides.
fn build_config(cli: &Cli) -> anyhow::Result<MonitorConfig> {
    let config = match &cli.config {
        Some(path) => MonitorConfig::load_existing(path),
        None => MonitorConfig::load(&MonitorConfig::config_path()),
    }
    .context("could not load configuration")?
    .apply_overrides(cli.overrides());

    config.validate().context("invalid configuration")?;
    Ok(config)
}
