//! `sweepline` – process wiring for the line-following cleaning robot.
//!
//! `sweepline run`:
//!
//! 1. Loads `~/.sweepline/config.toml` (defaults when absent), then applies
//!    `SWEEPLINE_*` environment overrides and command-line flags.
//! 2. Opens the first serial port that answers.
//! 3. Reads one vision frame per line from stdin and runs one control cycle
//!    per frame.
//! 4. Prints terminal reports and sensor alerts from the event bus.
//! 5. On Ctrl-C, SIGTERM, end of input or the end of the route, stops the
//!    wheels and switches brush and suction off before exiting.
//!
//! `sweepline init-config` writes the default configuration file.

mod config;
mod vision;

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::{info, warn};

use sweepline_hal::SerialPortLink;
use sweepline_middleware::{EventBus, Topic, TopicReceiver};
use sweepline_runtime::CleaningCycle;
use sweepline_runtime::observability::init_tracing;
use sweepline_types::{EventPayload, Severity, SweepError};

use crate::vision::VisionFrame;

/// How often the main loop re-checks the shutdown flag while stdin is quiet.
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

#[derive(Parser)]
#[command(name = "sweepline")]
#[command(about = "Line-following cleaning robot controller", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (default: ~/.sweepline/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a cleaning route, reading vision frames from stdin
    Run {
        /// Serial device; replaces the configured port list
        #[arg(long)]
        port: Option<String>,

        /// Serial baud rate
        #[arg(long)]
        baud: Option<u32>,

        /// Keep brush and suction off for the whole run
        #[arg(long)]
        no_clean: bool,
    },

    /// Write the default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    let _guard = init_tracing("sweepline");

    let path = cli.config.unwrap_or_else(config::config_path);
    let result = match cli.command {
        Commands::Run {
            port,
            baud,
            no_clean,
        } => run(&path, port, baud, !no_clean),
        Commands::InitConfig { force } => init_config(&path, force),
    };

    if let Err(e) = result {
        eprintln!("{} {e}", "error:".red().bold());
        std::process::exit(1);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// init-config
// ─────────────────────────────────────────────────────────────────────────────

fn init_config(path: &Path, force: bool) -> Result<(), SweepError> {
    if path.exists() && !force {
        return Err(SweepError::Config(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }
    config::save_to(&config::Config::default(), path)?;
    println!(
        "  {} Config written to {}",
        "✓".green().bold(),
        path.display().to_string().bold()
    );
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// run
// ─────────────────────────────────────────────────────────────────────────────

fn run(
    path: &Path,
    port: Option<String>,
    baud: Option<u32>,
    cleaning: bool,
) -> Result<(), SweepError> {
    let mut cfg = config::load_or_default(path)?;
    if let Some(port) = port {
        cfg.serial.ports = vec![port];
    }
    if let Some(baud) = baud {
        cfg.serial.baud = baud;
    }

    // ── Shutdown flag ─────────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)) {
        warn!(error = %e, "failed to install Ctrl-C handler; only end of input will stop the run");
    }

    let link = SerialPortLink::open_first(&cfg.serial.ports, cfg.serial.baud)?;
    let bus = EventBus::default();
    let printer = spawn_alert_printer(bus.subscribe_to(Topic::Alerts));
    let frames = spawn_stdin_reader();

    let mut cycle = CleaningCycle::new(link, &cfg.cycle_config(), bus);
    cycle.start(cleaning)?;
    println!(
        "  {} cleaning run started (brush/suction {})",
        "▶".green().bold(),
        if cleaning { "on" } else { "off" }
    );

    let outcome = drive_loop(&mut cycle, &frames, &shutdown);

    // Switch off even when the loop failed.
    let neutral = cycle.neutralize();
    info!(cycles = cycle.cycles(), "run finished");

    drop(cycle);
    if printer.join().is_err() {
        warn!("alert printer thread panicked");
    }
    outcome.and(neutral)
}

fn drive_loop<L: sweepline_hal::SerialLink>(
    cycle: &mut CleaningCycle<L>,
    frames: &mpsc::Receiver<String>,
    shutdown: &AtomicBool,
) -> Result<(), SweepError> {
    while !shutdown.load(Ordering::SeqCst) {
        let line = match frames.recv_timeout(SHUTDOWN_POLL) {
            Ok(line) => line,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                info!("vision input closed");
                return Ok(());
            }
        };

        let frame = match vision::parse_line(&line) {
            Ok(Some(frame)) => frame,
            Ok(None) => continue,
            Err(e) => {
                warn!(error = %e, "skipping vision frame");
                continue;
            }
        };

        let now = Instant::now();
        let summary = match frame {
            VisionFrame::Reduced(lines) => cycle.run_cycle(now, &lines)?,
            VisionFrame::Segments { segments } => cycle.run_frame(now, &segments)?,
        };
        if summary.report.is_some() {
            return Ok(());
        }
    }
    println!();
    println!("{}", "⚠  Shutdown requested – stopping the robot …".yellow().bold());
    Ok(())
}

/// Forward stdin lines over a channel so the main loop can keep watching the
/// shutdown flag.  The channel disconnects at end of input.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Print alerts until every bus sender is dropped.
fn spawn_alert_printer(mut alerts: TopicReceiver) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        while let Some(event) = alerts.blocking_recv() {
            match event.payload {
                EventPayload::Terminal(report) => {
                    let line = format!("■ run ended: {}", report.reason);
                    match report.severity {
                        Severity::Alert => println!("  {}", line.red().bold()),
                        Severity::Warning => println!("  {}", line.yellow().bold()),
                    }
                }
                EventPayload::SensorAlert(alert) => {
                    println!(
                        "  {} {} ({})",
                        "⚠".yellow().bold(),
                        alert.message.yellow(),
                        alert.monitor.dimmed()
                    );
                }
                _ => {}
            }
        }
    })
}
