//! vigil CLI - thin wrapper over vigil-core.
//!
//! Inspects the capture directory (`vigil logs ...`) and hosts a small demo
//! harness (`vigil demo ...`) that exercises crash and hang capture end to
//! end against the real detectors.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use vigil_core::config::Config;
use vigil_core::lifecycle::Host;
use vigil_core::logging::init_logging;
use vigil_core::store::list_capture_logs;
use vigil_core::watchdog::channel_queue;

#[derive(Parser)]
#[command(
    name = "vigil",
    version,
    about = "Crash and hang capture for host applications"
)]
struct Cli {
    /// Path to vigil.toml (defaults to the per-user config location)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Inspect captured crash/hang logs
    Logs {
        #[command(subcommand)]
        command: LogsCommand,
    },
    /// Exercise the detectors end to end
    Demo {
        #[command(subcommand)]
        command: DemoCommand,
    },
}

#[derive(Subcommand)]
enum LogsCommand {
    /// List capture files, newest first
    List {
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,

        /// Maximum number of files to list
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Print a single capture file
    Show {
        /// File name within the capture directory
        file: String,
    },
    /// Print the capture directory path
    Dir,
}

#[derive(Subcommand)]
enum DemoCommand {
    /// Initialize capture, then panic on a worker thread
    Crash,
    /// Initialize capture, then stall the demo's primary loop
    Hang {
        /// How long the primary loop stalls (ms)
        #[arg(long, default_value_t = 1500)]
        block_ms: u64,

        /// Watchdog timeout for the demo (ms)
        #[arg(long, default_value_t = 500)]
        timeout_ms: u64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_logging(&config.logging).context("failed to initialize logging")?;

    match cli.command {
        Command::Logs { command } => match command {
            LogsCommand::List { json, limit } => logs_list(&config, json, limit),
            LogsCommand::Show { file } => logs_show(&config, &file),
            LogsCommand::Dir => {
                println!("{}", config.resolved_log_dir().display());
                Ok(())
            }
        },
        Command::Demo { command } => match command {
            DemoCommand::Crash => demo_crash(config),
            DemoCommand::Hang {
                block_ms,
                timeout_ms,
            } => demo_hang(config, block_ms, timeout_ms),
        },
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Config::load().context("failed to load config"),
    }
}

fn logs_list(config: &Config, json: bool, limit: usize) -> Result<()> {
    let dir = config.resolved_log_dir();
    let files = list_capture_logs(&dir, limit);

    if json {
        println!("{}", serde_json::to_string_pretty(&files)?);
        return Ok(());
    }

    if files.is_empty() {
        println!("no capture files in {}", dir.display());
        return Ok(());
    }
    for file in files {
        println!(
            "{:<44}  {:>8} B  {}",
            file.file_name,
            file.size_bytes,
            human_time(file.modified_ms)
        );
    }
    Ok(())
}

fn logs_show(config: &Config, file: &str) -> Result<()> {
    if file.contains(['/', '\\']) {
        bail!("expected a bare file name, got a path: {file}");
    }
    let path = config.resolved_log_dir().join(file);
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    print!("{contents}");
    Ok(())
}

fn demo_crash(config: Config) -> Result<()> {
    let dir = config.resolved_log_dir();
    vigil_core::initialize(config)?;
    println!("crash interceptor armed; panicking on a worker thread");

    let result = std::thread::Builder::new()
        .name("demo-crasher".to_string())
        .spawn(|| panic!("vigil demo crash"))
        .context("failed to spawn demo thread")?
        .join();
    if result.is_ok() {
        bail!("demo thread did not panic");
    }

    report_newest(&dir);
    vigil_core::shutdown();
    Ok(())
}

fn demo_hang(mut config: Config, block_ms: u64, timeout_ms: u64) -> Result<()> {
    config.hang_detection = true;
    config.crash_detection = false;
    config.hang_timeout_ms = timeout_ms;
    let dir = config.resolved_log_dir();

    let (queue, pump) = channel_queue();
    vigil_core::initialize_with(config, Host::detect().with_queue(queue))?;
    println!("watchdog armed (timeout {timeout_ms} ms); servicing the primary loop");

    // A healthy stretch first: the queue is serviced, no report appears.
    pump.run_for(Duration::from_millis(timeout_ms.saturating_mul(2)));

    println!("stalling the primary loop for {block_ms} ms");
    std::thread::sleep(Duration::from_millis(block_ms));

    // Recovery: run the backlog, give the store a moment, then report.
    pump.drain();
    std::thread::sleep(Duration::from_millis(100));

    report_newest(&dir);
    vigil_core::shutdown();
    Ok(())
}

fn report_newest(dir: &Path) {
    match list_capture_logs(dir, 1).into_iter().next() {
        Some(file) => println!("captured: {}", file.path.display()),
        None => println!("no capture was written (see diagnostics above)"),
    }
}

fn human_time(epoch_ms: u64) -> String {
    DateTime::<Utc>::from_timestamp_millis(epoch_ms as i64).map_or_else(
        || format!("{epoch_ms} ms"),
        |dt| dt.format("%Y-%m-%d %H:%M:%S").to_string(),
    )
}
