//! chanalloc - plan channel assignments for a session file.
//!
//! Reads a JSON session (devices plus timed segments), books a channel for
//! every segment, and prints the resulting plan.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- session.json                 # Use the session's overflow policy
//! cargo run -- session.json --policy share  # Override the overflow policy
//! cargo run -- session.json --free          # Also print free windows per channel
//! ```
//!
//! Set `RUST_LOG=chanalloc=debug` to trace every allocation and release.

use anyhow::{bail, Context, Result};
use chanalloc::{
    ChannelId, Outcome, OverflowPolicy, PlaybackPlan, Planner, Session, SessionConfig,
};
use std::path::PathBuf;

/// Command-line options for the application.
struct CliOptions {
    /// Path to the session file.
    session: PathBuf,
    /// Overflow policy overriding the session's.
    policy: Option<OverflowPolicy>,
    /// Print each channel's free windows after planning.
    show_free: bool,
}

impl CliOptions {
    /// Parses command-line arguments.
    ///
    /// Supports:
    /// - `<path>`: The session file (required)
    /// - `--policy <drop|share>` or `-p <drop|share>`: Override the overflow policy
    /// - `--free` or `-f`: Print free windows after planning
    /// - `--help` or `-h`: Print help and exit
    fn parse() -> Result<Self> {
        let args: Vec<String> = std::env::args().collect();
        let mut session: Option<PathBuf> = None;
        let mut policy: Option<OverflowPolicy> = None;
        let mut show_free = false;
        let mut i = 1;

        while i < args.len() {
            match args[i].as_str() {
                "--policy" | "-p" => {
                    i += 1;
                    let Some(value) = args.get(i) else {
                        bail!("--policy requires an argument (drop or share)");
                    };
                    policy = Some(value.parse().map_err(anyhow::Error::msg)?);
                }
                "--free" | "-f" => show_free = true,
                "--help" | "-h" => {
                    eprintln!("chanalloc - Plan channel assignments for timed segments");
                    eprintln!();
                    eprintln!(
                        "Usage: {} <SESSION.json> [OPTIONS]",
                        args.first().map(String::as_str).unwrap_or("chanalloc")
                    );
                    eprintln!();
                    eprintln!("Options:");
                    eprintln!("  -p, --policy POLICY  Overflow policy: drop or share");
                    eprintln!("  -f, --free           Print free windows per channel");
                    eprintln!("  -h, --help           Print this help message");
                    std::process::exit(0);
                }
                other if other.starts_with('-') => {
                    bail!("Unknown option: {} (use --help for usage information)", other);
                }
                other => {
                    if session.is_some() {
                        bail!("Only one session file may be given");
                    }
                    session = Some(PathBuf::from(other));
                }
            }
            i += 1;
        }

        let Some(session) = session else {
            bail!("No session file given (use --help for usage information)");
        };
        Ok(Self {
            session,
            policy,
            show_free,
        })
    }
}

fn print_plan(plan: &PlaybackPlan) {
    println!(
        "{:<16} {:<12} {:>14} {:>14}  CHANNEL",
        "SEGMENT", "DEVICE", "START", "END"
    );
    for a in &plan.assignments {
        let channel = match a.outcome {
            Outcome::Assigned(ch) => ch.to_string(),
            Outcome::Shared(ch) => format!("{} (shared)", ch),
            Outcome::Dropped => "dropped".to_string(),
        };
        println!(
            "{:<16} {:<12} {:>14} {:>14}  {}",
            a.segment,
            a.device,
            a.start.to_string(),
            a.end.to_string(),
            channel
        );
    }
    println!();
    println!(
        "{} assigned, {} shared, {} dropped",
        plan.assigned_count(),
        plan.shared_count(),
        plan.dropped_count()
    );
}

fn print_free_windows(session: &Session) -> Result<()> {
    for device in &session.devices {
        let snapshot = device
            .snapshot()
            .with_context(|| format!("Failed to read device {}", device.name()))?;
        println!();
        println!("{} ({} channels)", device.name(), device.channel_count());
        for channel in 0..snapshot.channel_count() as ChannelId {
            let windows: Vec<String> = snapshot
                .free_windows(channel)
                .iter()
                .map(|w| format!("[{}, {})", w.start(), w.end()))
                .collect();
            let marker = if snapshot.is_reserved(channel) {
                " reserved"
            } else {
                ""
            };
            println!("  {:>2}{}: {}", channel, marker, windows.join(" "));
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = CliOptions::parse()?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = SessionConfig::load_from_file(&cli.session)
        .with_context(|| format!("Failed to load session {}", cli.session.display()))?;
    let session = config.instantiate().context("Invalid session")?;
    let policy = cli.policy.unwrap_or(session.overflow);
    tracing::info!(
        devices = session.devices.len(),
        segments = session.segments.len(),
        ?policy,
        "Loaded session"
    );

    let mut planner = Planner::new(policy);
    let plan = match planner.plan(&session.segments) {
        Ok(plan) => plan,
        Err(e) => {
            tracing::error!("Planning failed: {}", e);
            return Err(e).context("Planning failed");
        }
    };

    print_plan(&plan);
    if cli.show_free {
        print_free_windows(&session)?;
    }

    planner.release_all().context("Failed to release channels")?;
    for device in &session.devices {
        let snapshot = device.snapshot()?;
        snapshot
            .check_invariants()
            .with_context(|| format!("Device {} left inconsistent", device.name()))?;
        if !snapshot.is_idle() {
            bail!("Device {} still has booked windows", device.name());
        }
    }

    Ok(())
}
