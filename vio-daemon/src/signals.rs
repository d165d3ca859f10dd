//! Signal handling for viod.
//!
//! SIGHUP requests a reload; SIGTERM and SIGINT request shutdown. Handlers are
//! registered before these functions return, so a signal that arrives while
//! the first pass runs is never lost or fatal.

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::broadcast;
use tracing::info;

use crate::reload::{Trigger, TriggerSender};

/// Create a shutdown signal receiver.
///
/// Returns a broadcast receiver that will receive a signal when SIGTERM or
/// SIGINT is received.
pub fn shutdown_signal() -> std::io::Result<broadcast::Receiver<()>> {
    let (tx, rx) = broadcast::channel(1);
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
        }

        let _ = tx.send(());
    });

    Ok(rx)
}

/// Forward every SIGHUP to the reload loop.
pub fn spawn_hangup_listener(reload: TriggerSender) -> std::io::Result<()> {
    let mut sighup = signal(SignalKind::hangup())?;

    tokio::spawn(async move {
        while sighup.recv().await.is_some() {
            info!("Received SIGHUP");
            reload.request(Trigger::Hangup);
        }
    });

    Ok(())
}
