//! `keyzone` command-line entry point.
//!
//! ```text
//! keyzone [--config <PATH>] <COMMAND>
//!
//! Commands:
//!   keys         List the keys of the configured layout
//!   resolve      Resolve one camera point to a key
//!   replay       Resolve a recording of detector output
//!   init-config  Write the default configuration file
//!   probe        Open the camera and report what it delivers (feature `opencv`)
//! ```
//!
//! The log level comes from `RUST_LOG` when set, otherwise from
//! `session.log_level` in the config file.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use keyzone_tracker::config::{self, AppConfig};
use keyzone_tracker::replay::{load_recording, RecordedDetector};
use keyzone_tracker::session::{JsonLinesSink, LoggingSink, Session, SessionOptions};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Resolve tracked fingertips to the keys of a camera-observed keyboard.
#[derive(Debug, Parser)]
#[command(name = "keyzone", version, about)]
struct Cli {
    /// Configuration file. Defaults to the platform config directory.
    #[arg(long, global = true, env = "KEYZONE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the keys of the configured layout in normalized coordinates.
    Keys,

    /// Resolve one camera-pixel point to a key.
    Resolve {
        #[arg(long, allow_negative_numbers = true)]
        x: f64,
        #[arg(long, allow_negative_numbers = true)]
        y: f64,
    },

    /// Resolve a JSON-lines recording of detector output.
    Replay {
        /// Recording file, one JSON array of hand observations per line.
        file: PathBuf,
        /// Print one JSON object per frame instead of log lines.
        #[arg(long)]
        json: bool,
    },

    /// Write the default configuration file.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },

    /// Open the camera, capture for a while and report negotiated properties.
    #[cfg(feature = "opencv")]
    Probe {
        /// How long to capture, in seconds.
        #[arg(long, default_value_t = 3)]
        seconds: u64,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => config::config_file_path().context("no --config given and no platform config directory")?,
    };

    // `init-config` must work even when the existing file does not parse.
    let cfg = match cli.command {
        Command::InitConfig { .. } => AppConfig::default(),
        _ => config::load_config(&config_path)
            .with_context(|| format!("failed to load config from {}", config_path.display()))?,
    };

    // Initialise structured logging. Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.session.log_level)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Keys => list_keys(&cfg),
        Command::Resolve { x, y } => resolve_point(&cfg, x, y),
        Command::Replay { file, json } => replay(&cfg, &file, json),
        Command::InitConfig { force } => init_config(&config_path, force),
        #[cfg(feature = "opencv")]
        Command::Probe { seconds } => probe(&cfg, seconds),
    }
}

fn list_keys(cfg: &AppConfig) -> anyhow::Result<()> {
    let resolver = cfg.keyboard.build_resolver().context("failed to set up keyboard")?;
    let layout = resolver.layout();
    let mut out = io::stdout().lock();
    writeln!(
        out,
        "{} keys, frame {}x{} (h = {:.4})",
        layout.keys().len(),
        layout.width(),
        layout.height(),
        layout.aspect_ratio()
    )?;
    for key in layout.keys() {
        writeln!(
            out,
            "{:<12} x={:.4} y={:.4} w={:.4} h={:.4}",
            key.keycode, key.x, key.y, key.width, key.height
        )?;
    }
    Ok(())
}

fn resolve_point(cfg: &AppConfig, x: f64, y: f64) -> anyhow::Result<()> {
    let resolver = cfg.keyboard.build_resolver().context("failed to set up keyboard")?;
    let resolved = resolver.resolve_point(x, y);
    let (nx, ny) = resolved.normalized;
    match resolved.key {
        Some(key) => println!("({x}, {y}) -> ({nx:.4}, {ny:.4}) -> {}", key.keycode),
        None => println!("({x}, {y}) -> ({nx:.4}, {ny:.4}) -> no key"),
    }
    Ok(())
}

fn replay(cfg: &AppConfig, file: &Path, json: bool) -> anyhow::Result<()> {
    let resolver = cfg.keyboard.build_resolver().context("failed to set up keyboard")?;
    let frames = load_recording(file)?;
    let options = SessionOptions::from(&cfg.session);
    let (width, height) = (cfg.camera.width, cfg.camera.height);
    info!(frames = frames.len(), width, height, "replaying {}", file.display());

    let stats = if json {
        let sink = JsonLinesSink::new(io::stdout());
        Session::new(resolver, RecordedDetector::default(), sink, options).replay(frames, width, height)
    } else {
        Session::new(resolver, RecordedDetector::default(), LoggingSink, options).replay(frames, width, height)
    };
    info!(
        frames = stats.frames_processed,
        hits = stats.key_hits,
        misses = stats.misses,
        "replay complete"
    );
    Ok(())
}

fn init_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        bail!("{} already exists; pass --force to overwrite", path.display());
    }
    config::save_config(&AppConfig::default(), path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("wrote {}", path.display());
    Ok(())
}

#[cfg(feature = "opencv")]
fn probe(cfg: &AppConfig, seconds: u64) -> anyhow::Result<()> {
    use std::time::{Duration, Instant};

    use keyzone_camera::{FrameSource, OpenCvCamera, SourceState};

    let camera = OpenCvCamera::open(&cfg.camera).context("failed to open camera")?;
    let source = FrameSource::new(camera)?.with_stop_timeout(cfg.session.stop_timeout());
    let props = source.properties();
    println!(
        "negotiated {}x{} @ {:.1} fps, focus {}",
        props.width,
        props.height,
        props.fps,
        props.focus.map_or_else(|| "n/a".to_string(), |f| format!("{f:.0}"))
    );

    source.start()?;
    let started = Instant::now();
    let deadline = started + Duration::from_secs(seconds);
    while Instant::now() < deadline && source.state() == SourceState::Running {
        std::thread::sleep(Duration::from_millis(50));
    }
    let elapsed = started.elapsed().as_secs_f64();
    let frames = source.frames_captured();
    if let Some(e) = source.last_error() {
        println!("capture stopped early: {e}");
    }
    source.stop()?;
    println!("captured {frames} frames in {elapsed:.1} s ({:.1} fps)", frames as f64 / elapsed);
    Ok(())
}
