//! Descriptor directory watching.

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use tracing::{debug, info, warn};
use vio_core::source::is_descriptor_path;

use crate::reload::{Trigger, TriggerSender};

/// Whether `event` touches a descriptor in a way that changes the desired state.
fn is_descriptor_change(event: &Event) -> bool {
    let relevant_kind = matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    );
    relevant_kind && event.paths.iter().any(|p| is_descriptor_path(p))
}

/// Watch `dir` and request a reload whenever a `*.conf` file is created,
/// modified, removed or renamed. Dropping the returned watcher stops it.
pub fn watch_config_dir(dir: &Path, reload: TriggerSender) -> notify::Result<RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) if is_descriptor_change(&event) => {
            debug!(kind = ?event.kind, paths = ?event.paths, "Descriptor changed");
            reload.request(Trigger::ConfigChanged);
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "Watch error"),
    })?;

    watcher.watch(dir, RecursiveMode::NonRecursive)?;
    info!(dir = %dir.display(), "Watching configuration directory");
    Ok(watcher)
}
