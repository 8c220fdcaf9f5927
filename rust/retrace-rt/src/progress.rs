//! Streaming progress shared with whoever drives a session or trace run.

use tokio::sync::watch;

use crate::cancel::Execution;

/// Snapshot published after every completed item.
#[derive(Debug, Clone)]
pub struct Progress<T> {
    pub done: usize,
    pub total: usize,
    pub items: Vec<T>,
}

impl<T> Default for Progress<T> {
    fn default() -> Self {
        Self {
            done: 0,
            total: 0,
            items: Vec::new(),
        }
    }
}

pub type ProgressSender<T> = watch::Sender<Progress<T>>;
pub type ProgressReceiver<T> = watch::Receiver<Progress<T>>;

pub fn channel<T>() -> (ProgressSender<T>, ProgressReceiver<T>) {
    watch::channel(Progress::default())
}

/// Clears the published snapshot for a new run. Refused once `execution`
/// has been superseded.
pub(crate) fn reset<T>(tx: &ProgressSender<T>, execution: &Execution, total: usize) -> bool {
    tx.send_if_modified(|p| {
        if !execution.is_live() {
            return false;
        }
        p.done = 0;
        p.total = total;
        p.items.clear();
        true
    })
}

/// Applies `f` to the published items and refreshes the counters.
///
/// Liveness is checked under the channel lock, so a run superseded between
/// its last check and this call cannot overwrite the newer run's snapshot.
pub(crate) fn update<T>(
    tx: &ProgressSender<T>,
    execution: &Execution,
    total: usize,
    f: impl FnOnce(&mut Vec<T>),
) -> bool {
    tx.send_if_modified(|p| {
        if !execution.is_live() {
            return false;
        }
        f(&mut p.items);
        p.done = p.items.len();
        p.total = total.max(p.done);
        true
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
