//! Serialized reload loop.
//!
//! Triggers (startup, descriptor changes, SIGHUP) go through a channel with
//! room for a single pending trigger. A trigger that finds one already queued is dropped:
//! the queued pass will read the newest descriptors anyway. Passes never overlap.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

/// Why a reload was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// The initial pass. Runs without debounce.
    Startup,
    ConfigChanged,
    Hangup,
}

/// Cloneable handle for requesting reloads, from sync or async context.
#[derive(Debug, Clone)]
pub struct TriggerSender {
    tx: mpsc::Sender<Trigger>,
}

impl TriggerSender {
    /// Request a reload. Never blocks.
    pub fn request(&self, trigger: Trigger) {
        match self.tx.try_send(trigger) {
            Ok(()) => debug!(?trigger, "Reload requested"),
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(?trigger, "Reload already pending, coalescing")
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(?trigger, "Reload loop has stopped, ignoring trigger")
            }
        }
    }
}

/// Create the trigger channel.
pub fn trigger_channel() -> (TriggerSender, mpsc::Receiver<Trigger>) {
    let (tx, rx) = mpsc::channel(1);
    (TriggerSender { tx }, rx)
}

/// Runs one pass per coalesced trigger, one at a time.
pub struct ReloadLoop<F> {
    pass: Arc<F>,
    debounce: Duration,
}

impl<F> ReloadLoop<F>
where
    F: Fn() -> usize + Send + Sync + 'static,
{
    /// `pass` runs on the blocking pool and returns its failure count.
    pub fn new(pass: F, debounce: Duration) -> Self {
        Self { pass: Arc::new(pass), debounce }
    }

    /// Run until `shutdown` fires or every trigger sender is gone.
    ///
    /// A pass that is already running is always awaited before returning.
    pub async fn run(self, mut triggers: mpsc::Receiver<Trigger>, mut shutdown: broadcast::Receiver<()>) {
        loop {
            let trigger = tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                trigger = triggers.recv() => match trigger {
                    Some(trigger) => trigger,
                    None => break,
                },
            };

            // Let editors finish writing before reading the directory
            if trigger != Trigger::Startup && !self.debounce.is_zero() {
                tokio::select! {
                    biased;
                    _ = shutdown.recv() => break,
                    _ = tokio::time::sleep(self.debounce) => {}
                }
            }
            while triggers.try_recv().is_ok() {}

            if trigger == Trigger::Startup {
                info!("Applying configuration...");
            } else {
                info!(?trigger, "Configuration change detected, reloading...");
            }
            let pass = Arc::clone(&self.pass);
            match tokio::task::spawn_blocking(move || pass()).await {
                Ok(0) => info!("Reload complete"),
                Ok(failures) => warn!(failures, "Reload complete with failures"),
                Err(e) => error!(error = %e, "Reload pass panicked"),
            }
        }
        info!("Reload loop stopped");
    }
}
