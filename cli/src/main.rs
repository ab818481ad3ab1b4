//! `treewatch`: print every change under a directory until interrupted.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use treewatch::{WatchConfig, watch_directory_with_config};

#[derive(Debug, Parser)]
#[command(name = "treewatch", version, about = "Watch a directory tree and print every change")]
struct Cli {
    /// Directory to watch.
    #[arg(default_value = ".")]
    path: PathBuf,

    /// JSON configuration file. Flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Quiet period in milliseconds before a change is reported.
    #[arg(long)]
    debounce_ms: Option<u64>,

    /// Delay in milliseconds before a failed watch is retried.
    #[arg(long)]
    retry_ms: Option<u64>,

    /// Additional directory or file name to ignore (repeatable).
    #[arg(long = "ignore", value_name = "NAME")]
    ignore: Vec<String>,
}

impl Cli {
    fn watch_config(&self) -> anyhow::Result<WatchConfig> {
        let mut config = match &self.config {
            Some(path) => WatchConfig::from_file(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => WatchConfig::default(),
        };

        if let Some(ms) = self.debounce_ms {
            config = config.with_debounce(Duration::from_millis(ms));
        }
        if let Some(ms) = self.retry_ms {
            config = config.with_retry_backoff(Duration::from_millis(ms));
        }
        for name in &self.ignore {
            config = config.ignore_name(name.clone());
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.watch_config()?;
    debug!("Resolved watch config: {config:?}");

    let handle = watch_directory_with_config(&cli.path, config, |path: &Path| {
        println!("File changed: {}", path.display());
        println!("Change detected at: {}", chrono::Utc::now().to_rfc3339());
    })
    .with_context(|| format!("cannot watch {}", cli.path.display()))?;

    println!("Watching directory: {}", handle.root().display());
    println!("Press Ctrl+C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;

    tokio::task::spawn_blocking(move || handle.stop())
        .await
        .context("failed to stop watching")?;
    Ok(())
}
