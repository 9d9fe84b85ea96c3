use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::error::HostError;

/// Watches the canonical module binary for rebuilds.
///
/// `notify` delivers events on its own thread; they only travel through a
/// channel that [`RebuildWatcher::poll`] drains on the tick thread, so the
/// watcher never touches the loaded module.
pub struct RebuildWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<notify::Result<Event>>,
    file: PathBuf,
    file_name: OsString,
    settle_polls: u32,
}

/// Polls after a reload during which changes of the canonical binary are
/// dropped, about half a second at 60 ticks per second. Copying the binary
/// and late writes of the linker (e.g. a chmod) would otherwise start another
/// reload.
pub const SETTLE_POLLS: u32 = 30;

impl RebuildWatcher {
    pub fn new(canonical: impl AsRef<Path>) -> Result<Self, HostError> {
        let file = canonical.as_ref().to_path_buf();
        let file_name = file
            .file_name()
            .map(|name| name.to_os_string())
            .ok_or_else(|| HostError::Config(format!("{file:?} is not a file path")))?;

        // Build tools often replace the file instead of writing it in place,
        // which drops a watch on the file itself. Watch the directory.
        let dir = file
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        log::info!("start watching changes of file {}", file.display());

        Ok(Self {
            _watcher: watcher,
            rx,
            file,
            file_name,
            settle_polls: 0,
        })
    }

    /// Ignores changes seen during the next `polls` calls to
    /// [`poll`](Self::poll). Pending events are dropped as well.
    pub fn suppress(&mut self, polls: u32) {
        while self.rx.try_recv().is_ok() {}
        self.settle_polls = polls;
    }

    /// Drains pending file events. True if the canonical binary was created or
    /// written since the last call and the watcher is not settling.
    pub fn poll(&mut self) -> bool {
        let mut changed = false;
        while let Ok(res) = self.rx.try_recv() {
            match res {
                Ok(event) if self.is_rebuild(&event) => {
                    log::debug!("{} changed", self.file.display());
                    changed = true;
                }
                Ok(event) => {
                    log::trace!("file change event: {event:?}");
                }
                Err(err) => {
                    log::error!("file watcher error: {err}");
                }
            }
        }
        if self.settle_polls > 0 {
            self.settle_polls -= 1;
            if changed {
                log::debug!("ignoring change of {} right after a reload", self.file.display());
            }
            return false;
        }
        changed
    }

    fn is_rebuild(&self, event: &Event) -> bool {
        matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
            && event
                .paths
                .iter()
                .any(|path| path.file_name() == Some(self.file_name.as_os_str()))
    }
}
