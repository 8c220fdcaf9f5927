//! Cooperative cancellation.
//!
//! A caller that restarts work (a new root hash, a new message) begins a new
//! execution on its [`ExecutionFence`]. The previous execution's token is
//! cancelled and its id becomes stale, so any late result it produces is
//! dropped instead of published.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
pub struct ExecutionFence {
    current: AtomicU64,
    token: Mutex<CancellationToken>,
}

impl ExecutionFence {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Starts a new execution, cancelling whatever ran before it.
    pub fn begin(self: &Arc<Self>) -> Execution {
        let token = CancellationToken::new();
        let previous = std::mem::replace(&mut *self.token.lock(), token.clone());
        previous.cancel();
        let id = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        Execution {
            id,
            fence: Arc::clone(self),
            token,
        }
    }

    /// Cancels the running execution without starting another.
    pub fn cancel(&self) {
        self.current.fetch_add(1, Ordering::SeqCst);
        self.token.lock().cancel();
    }

    pub fn current(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }
}

/// Handle held by one run of work.
#[derive(Debug, Clone)]
pub struct Execution {
    id: u64,
    fence: Arc<ExecutionFence>,
    token: CancellationToken,
}

impl Execution {
    /// An execution with its own private fence.
    pub fn detached() -> Self {
        ExecutionFence::new().begin()
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// True while neither the token fired nor a newer execution began.
    pub fn is_live(&self) -> bool {
        !self.token.is_cancelled() && self.fence.current() == self.id
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
