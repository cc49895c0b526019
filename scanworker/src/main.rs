/*!
# Scan Worker Application

Command-line front end for the optical-code scan engine.

## Usage

### Decode an image file
```bash
scanworker decode shelf.png --priority linear
```

### Serve the worker protocol over stdin/stdout
One JSON envelope per line in, one per line out.
```bash
scanworker serve < requests.jsonl
```

### Show capabilities / generate configuration
```bash
scanworker capabilities
scanworker config --output scanworker.toml
```
*/

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use scanworker::config::AppConfig;
use scanworker::{ScanService, WorkerLink, WorkerThread};
use shared::{DecodeOptions, DecodeOutcome, Frame, Roi, ScanPriority, WorkerRequest};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::thread;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "scanworker")]
#[command(about = "Real-time barcode and QR code decoding worker")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "scanworker.toml")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode codes from an image file
    Decode {
        /// Image file (any format the image crate reads)
        image: PathBuf,

        /// Which reader family to run
        #[arg(short, long, value_enum, default_value = "auto")]
        priority: PriorityArg,

        /// Region of interest as x,y,width,height
        #[arg(long)]
        roi: Option<String>,

        /// Submit the same frame this many times (shows deduplication)
        #[arg(long, default_value = "1")]
        repeat: u32,
    },

    /// Bridge the worker protocol over stdin/stdout
    Serve,

    /// Print engine capabilities as JSON
    Capabilities,

    /// Generate configuration file
    Config {
        /// Output path for configuration file
        #[arg(short, long, default_value = "scanworker.toml")]
        output: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PriorityArg {
    Auto,
    Linear,
    Matrix,
}

impl From<PriorityArg> for ScanPriority {
    fn from(arg: PriorityArg) -> Self {
        match arg {
            PriorityArg::Auto => ScanPriority::Auto,
            PriorityArg::Linear => ScanPriority::Linear,
            PriorityArg::Matrix => ScanPriority::Matrix,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr to keep stdout clean for results
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .init();

    match cli.command {
        Commands::Config { output } => generate_config_file(output),
        command => {
            let config = AppConfig::load_or_default(&cli.config)?;
            let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
            match command {
                Commands::Decode {
                    image,
                    priority,
                    roi,
                    repeat,
                } => runtime.block_on(run_decode(config, image, priority.into(), roi, repeat)),
                Commands::Serve => runtime.block_on(run_serve(config)),
                Commands::Capabilities => runtime.block_on(run_capabilities(config)),
                Commands::Config { .. } => Ok(()),
            }
        }
    }
}

fn parse_roi(value: &str) -> Result<Roi> {
    let parts = value
        .split(',')
        .map(|p| p.trim().parse::<u32>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("Invalid ROI '{}'", value))?;

    match parts.as_slice() {
        [x, y, width, height] => Ok(Roi::new(*x, *y, *width, *height)),
        _ => bail!("ROI must be x,y,width,height, got '{}'", value),
    }
}

fn load_frame(path: &Path) -> Result<Frame> {
    let image = image::open(path)
        .with_context(|| format!("Failed to open image: {}", path.display()))?
        .to_rgba8();
    let (width, height) = image.dimensions();
    Ok(Frame::new(image.into_raw(), width, height))
}

/// Decode one image file through the worker
async fn run_decode(
    config: AppConfig,
    image: PathBuf,
    priority: ScanPriority,
    roi: Option<String>,
    repeat: u32,
) -> Result<()> {
    let frame = load_frame(&image)?;
    let options = DecodeOptions {
        roi: roi.as_deref().map(parse_roi).transpose()?,
        ..DecodeOptions::with_priority(priority)
    };

    info!(
        "🔍 Decoding {} ({}x{}, {:?})",
        image.display(),
        frame.width(),
        frame.height(),
        priority
    );

    let service = ScanService::start(&config)?;
    let router = service.router().clone();
    router.initialize().await?;

    let mut found = 0;
    for attempt in 0..repeat.max(1) {
        match router.decode(&frame, options).await {
            Ok(DecodeOutcome::Found(result)) => {
                found += 1;
                println!("{}", serde_json::to_string(&result)?);
            }
            Ok(DecodeOutcome::Duplicate) => info!("Attempt {}: duplicate suppressed", attempt + 1),
            Ok(DecodeOutcome::NotFound) => info!("Attempt {}: no code found", attempt + 1),
            Err(e) => warn!("⚠️ Attempt {} failed: {}", attempt + 1, e),
        }
    }

    service.shutdown().await;

    if found == 0 {
        bail!("No code found in {}", image.display());
    }
    Ok(())
}

/// Forward stdin lines to the worker and its responses to stdout
async fn run_serve(config: AppConfig) -> Result<()> {
    let (responses_tx, mut responses_rx) = mpsc::unbounded_channel::<String>();
    let mut worker = WorkerThread::spawn(
        config.engine.clone(),
        config.router.worker_inbox,
        responses_tx,
    )?;
    let shutdown = WorkerRequest::Shutdown.to_json()?;

    let link = worker.link();
    let message = shutdown.clone();
    ctrlc::set_handler(move || {
        eprintln!("\n🛑 Received Ctrl+C, shutting down gracefully...");
        if let Err(e) = link.post(message.clone()) {
            eprintln!("⚠️ Failed to stop worker: {}", e);
        }
    })?;

    // Not joined: a blocked stdin read must not hold up shutdown
    let link = worker.link();
    thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || {
            let mut forwarded = 0u64;
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                // The worker answers malformed lines itself
                if let Err(e) = link.post_blocking(line) {
                    warn!("⚠️ Worker stopped: {}", e);
                    break;
                }
                forwarded += 1;
            }
            info!("📊 Forwarded {} requests", forwarded);
            let _ = link.post_blocking(shutdown);
        })
        .context("Failed to spawn stdin reader")?;

    info!("📡 Serving worker protocol on stdin/stdout");
    // Ends once the worker exits and drops its sender
    while let Some(message) = responses_rx.recv().await {
        let mut stdout = std::io::stdout().lock();
        if writeln!(stdout, "{}", message).and_then(|_| stdout.flush()).is_err() {
            warn!("⚠️ stdout closed");
            break;
        }
    }

    tokio::task::spawn_blocking(move || worker.stop())
        .await
        .context("Worker join panicked")?;
    Ok(())
}

async fn run_capabilities(config: AppConfig) -> Result<()> {
    let service = ScanService::start(&config)?;
    let capabilities = service.router().capabilities().await?;
    println!("{}", serde_json::to_string_pretty(&capabilities)?);
    service.shutdown().await;
    Ok(())
}

/// Generate a default configuration file
fn generate_config_file(output_path: PathBuf) -> Result<()> {
    let config = AppConfig::new();
    config.save_to_file(&output_path)?;

    println!("✅ Generated configuration file: {}", output_path.display());
    println!("📝 Edit the file to customize settings, then run:");
    println!("   scanworker --config {} serve", output_path.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roi() {
        assert_eq!(parse_roi("1, 2,30,40").unwrap(), Roi::new(1, 2, 30, 40));
        assert!(parse_roi("1,2,3").is_err());
        assert!(parse_roi("a,b,c,d").is_err());
    }
}
