use std::path::PathBuf;
use std::sync::mpsc;
use std::time::{Duration, Instant};

/// Progress of the reload sequence, sent to every [`ReloadObserver`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ReloadEvent {
    /// A trigger was accepted; the unload happens after `grace_ticks` ticks.
    Armed { grace_ticks: u32 },
    /// The module mapped from `binary` is about to be unloaded.
    Unloading { binary: PathBuf },
    /// A fresh copy has been loaded and is active from the next tick on.
    Reloaded { binary: PathBuf, sequence: usize },
    /// The reload failed and the host is shutting down.
    Fatal { exit_code: i32, message: String },
}

/// Receives [`ReloadEvent`]s from a host. Obtained with
/// [`Host::subscribe`](crate::Host::subscribe).
///
/// Events are queued while nobody looks, so an observer can be drained from
/// the tick thread without blocking it.
pub struct ReloadObserver {
    rx: mpsc::Receiver<ReloadEvent>,
}

impl ReloadObserver {
    /// Next queued event, if any.
    pub fn try_next(&self) -> Option<ReloadEvent> {
        self.rx.try_recv().ok()
    }

    /// All queued events.
    pub fn drain(&self) -> Vec<ReloadEvent> {
        self.rx.try_iter().collect()
    }

    /// Blocks until a [`ReloadEvent::Reloaded`] arrives or `timeout` passes.
    /// Meant for threads other than the one driving the host.
    pub fn wait_for_reload_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(ReloadEvent::Reloaded { .. }) => return true,
                Ok(_) => continue,
                Err(_) => return false,
            }
        }
    }
}

#[derive(Default)]
pub(crate) struct ReloadNotifier {
    subscribers: Vec<mpsc::Sender<ReloadEvent>>,
}

impl ReloadNotifier {
    pub(crate) fn subscribe(&mut self) -> ReloadObserver {
        log::trace!("subscribe to reload events");
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        ReloadObserver { rx }
    }

    pub(crate) fn notify(&mut self, event: ReloadEvent) {
        let n = self.subscribers.len();
        log::trace!("sending {event:?} to {n} subscribers");
        // keep only those subscribers that are still around
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        let removed = n - self.subscribers.len();
        if removed > 0 {
            log::debug!(
                "removing {removed} subscriber{}",
                if removed == 1 { "" } else { "s" }
            );
        }
    }
}
