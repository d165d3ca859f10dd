//! viod - SR-IOV provisioning daemon.
//!
//! Applies every descriptor in the configuration directory at startup, then
//! reapplies the full set whenever a descriptor changes or SIGHUP arrives.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use vio_core::{paths, Settings};

mod reconcile;
mod reload;
mod signals;
mod watcher;

use reconcile::Reconciler;
use reload::{ReloadLoop, Trigger};

#[derive(Parser, Debug)]
#[command(name = "viod", version, about = "SR-IOV virtual function provisioning daemon")]
struct Args {
    /// Descriptor directory (overrides the settings file)
    #[arg(long, env = "VIO_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Settings file
    #[arg(long, env = "VIO_SETTINGS")]
    settings: Option<PathBuf>,

    /// Default log filter when RUST_LOG is unset
    #[arg(long)]
    log_level: Option<String>,

    /// Apply once and exit; non-zero status if any descriptor failed
    #[arg(long)]
    oneshot: bool,

    /// Do not watch the descriptor directory
    #[arg(long)]
    no_watch: bool,
}

impl Args {
    fn settings(&self) -> Result<Settings> {
        let path = self.settings.clone().unwrap_or_else(paths::settings_path);
        let mut settings = Settings::load(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;

        if let Some(dir) = &self.config_dir {
            settings.config_dir = dir.clone();
        }
        if let Some(level) = &self.log_level {
            settings.log_level = level.clone();
        }
        if self.no_watch {
            settings.watch = false;
        }
        Ok(settings)
    }
}

/// Create the descriptor directory (mode 0755) if it does not exist yet.
fn ensure_config_dir(dir: &Path) -> Result<()> {
    if dir.is_dir() {
        return Ok(());
    }
    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o755)
        .create(dir)
        .with_context(|| format!("Failed to create config directory {}", dir.display()))?;
    info!(dir = %dir.display(), "Created configuration directory");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let settings = args.settings()?;

    // Initialize observability FIRST
    vio_core::init_observability(&settings.log_level)?;

    info!(version = env!("CARGO_PKG_VERSION"), "viod starting");
    ensure_config_dir(&settings.config_dir)?;

    let reconciler = Arc::new(Reconciler::from_settings(&settings));

    // Signals are handled before the first pass touches any device
    let (reload_tx, reload_rx) = reload::trigger_channel();
    signals::spawn_hangup_listener(reload_tx.clone()).context("Failed to install SIGHUP handler")?;
    let mut shutdown = signals::shutdown_signal().context("Failed to install shutdown handlers")?;

    if args.oneshot {
        let pass = Arc::clone(&reconciler);
        let report = tokio::task::spawn_blocking(move || pass.reconcile())
            .await
            .context("Apply pass panicked")??;
        if shutdown.try_recv().is_ok() {
            info!("Shutdown requested during apply pass");
        }
        if !report.is_success() {
            bail!("{} of {} configuration(s) failed", report.failure_count(), report.attempted());
        }
        info!("Oneshot apply complete");
        return Ok(());
    }

    // The initial pass is the first trigger the reload loop serves
    reload_tx.request(Trigger::Startup);

    let _watcher = if settings.watch {
        match watcher::watch_config_dir(&settings.config_dir, reload_tx.clone()) {
            Ok(w) => Some(w),
            Err(e) => {
                warn!(error = %e, "Failed to watch configuration directory, monitoring disabled");
                None
            }
        }
    } else {
        info!("Directory watching disabled");
        None
    };

    info!("viod ready");

    let pass = Arc::clone(&reconciler);
    ReloadLoop::new(
        move || pass.reconcile_counting_failures(),
        Duration::from_millis(settings.reload_debounce_ms),
    )
    .run(reload_rx, shutdown)
    .await;

    info!("viod shutting down");
    Ok(())
}
