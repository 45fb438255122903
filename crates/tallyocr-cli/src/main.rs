//! tallyocr command-line interface.
//!
//! ```bash
//! tallyocr extract "scans/ส.ส.5ทับ18/page-1.png"
//! tallyocr extract page-1.png --form-type "5/17(บช)" --no-correction
//! tallyocr batch scans/ --workers 5 --rate 2 --output results.json
//! tallyocr backends
//! ```
//!
//! Logging goes to stderr and honours `RUST_LOG`; results go to stdout as JSON.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tallyocr::core::io::is_supported_image;
use tallyocr::{
    BackendRegistry, BallotExtractionResult, Credentials, FormTypeHint, ProgressObserver, TallyConfig,
    batch_extract_ballots, extract_ballot,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tallyocr")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Extract vote counts from photographed ballot tally forms", long_about = None)]
struct Cli {
    /// Configuration file (.toml, .yaml or .json). Defaults to the nearest tallyocr.toml.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract one page image
    Extract {
        image: PathBuf,

        /// Form type code, e.g. "5/18" or "5/17(บช)". Inferred from the path when omitted.
        #[arg(long)]
        form_type: Option<String>,

        /// Run the ensemble once, without the two-pass self-correction
        #[arg(long)]
        no_correction: bool,

        /// Backend selection string, overriding the config
        #[arg(long)]
        backends: Option<String>,
    },
    /// Extract many page images (files or directories)
    Batch {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        #[arg(long)]
        workers: Option<usize>,

        /// Backend calls per second across all workers
        #[arg(long)]
        rate: Option<f64>,

        /// Write the batch result here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,

        #[arg(long)]
        backends: Option<String>,
    },
    /// List configured backends and whether they can run
    Backends,
}

/// Logs batch progress through `tracing`.
struct LogProgress;

impl ProgressObserver for LogProgress {
    fn on_batch_start(&self, total: usize) {
        tracing::info!(total, "Batch started");
    }

    fn on_item_done(&self, index: usize, total: usize, path: &Path, result: &BallotExtractionResult) {
        tracing::info!(
            "[{}/{}] {} -> {} entries, confidence {:.2}",
            index,
            total,
            path.display(),
            result.votes().len(),
            result.confidence
        );
    }

    fn on_item_failed(&self, index: usize, total: usize, path: &Path, error: &str) {
        tracing::warn!("[{}/{}] {} failed: {}", index, total, path.display(), error);
    }

    fn on_batch_done(&self, successes: usize, failures: usize) {
        tracing::info!(successes, failures, "Batch finished");
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<TallyConfig> {
    let config = match path {
        Some(path) => TallyConfig::from_file(path).with_context(|| format!("loading {}", path.display()))?,
        None => TallyConfig::discover()?.unwrap_or_default(),
    };
    Ok(config)
}

fn parse_form_type(code: &str) -> Result<FormTypeHint> {
    match FormTypeHint::parse(code) {
        Some(hint) => Ok(hint),
        None => bail!("Unknown form type '{}' (expected 5/16, 5/17 or 5/18, optionally with (บช))", code),
    }
}

/// Expand directories into the supported images they contain, recursively and sorted.
fn collect_images(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    for input in inputs {
        if input.is_dir() {
            collect_dir(input, &mut images)?;
        } else {
            images.push(input.clone());
        }
    }
    Ok(images)
}

fn collect_dir(dir: &Path, images: &mut Vec<PathBuf>) -> Result<()> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("reading {}", dir.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<_>>()?;
    entries.sort();

    for path in entries {
        if path.is_dir() {
            collect_dir(&path, images)?;
        } else if is_supported_image(&path) {
            images.push(path);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = load_config(cli.config.as_deref())?;
    let credentials = Credentials::from_env();

    match cli.command {
        Commands::Extract {
            image,
            form_type,
            no_correction,
            backends,
        } => {
            let hint = form_type.as_deref().map(parse_form_type).transpose()?;
            if let Some(backends) = backends {
                config.backends = backends;
            }
            if no_correction {
                config.correction.enabled = false;
            }

            match extract_ballot(&image, hint, &config, &credentials).await? {
                Some(result) => println!("{}", serde_json::to_string_pretty(&result)?),
                None => bail!("No backend produced a result for {}", image.display()),
            }
        }
        Commands::Batch {
            inputs,
            workers,
            rate,
            output,
            backends,
        } => {
            if let Some(workers) = workers {
                config.batch.workers = workers;
            }
            if let Some(rate) = rate {
                config.batch.rate_limit_per_sec = rate;
            }
            if let Some(backends) = backends {
                config.backends = backends;
            }

            let paths = collect_images(&inputs)?;
            if paths.is_empty() {
                bail!("No PNG or JPEG images found");
            }

            let observer: Arc<dyn ProgressObserver> = Arc::new(LogProgress);
            let result = batch_extract_ballots(paths, &config, &credentials, Some(observer)).await?;
            let json = serde_json::to_string_pretty(&result)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
                    tracing::info!(path = %path.display(), "Batch result written");
                }
                None => println!("{}", json),
            }
        }
        Commands::Backends => {
            let registry = BackendRegistry::from_config(&config, &credentials)?;
            for status in registry.status() {
                match status.hint {
                    None => println!("{:<48} available", status.name),
                    Some(hint) => println!("{:<48} unavailable ({})", status.name, hint),
                }
            }
        }
    }

    Ok(())
}
