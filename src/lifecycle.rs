//! Host lifecycle events.
//!
//! The serve loop publishes its state on a watch channel; [`HostLifetime`]
//! is the cloneable read side other components await on. States are
//! monotonic — a host never moves backwards — so a wait that arrives late
//! resolves immediately.

use tokio::sync::watch;

/// Where the host is in its life. Ordered: comparisons mean "at least this
/// far along".
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum HostState {
    NotStarted,
    Running,
    Stopping,
    Stopped,
}

pub(crate) fn channel() -> (watch::Sender<HostState>, HostLifetime) {
    let (tx, rx) = watch::channel(HostState::NotStarted);
    (tx, HostLifetime { rx })
}

/// A handle on the host's lifecycle events.
///
/// Clone it freely; hand it to anything that needs to coordinate with
/// startup or shutdown (connection registries, background workers,
/// warmup gates).
#[derive(Clone)]
pub struct HostLifetime {
    rx: watch::Receiver<HostState>,
}

impl HostLifetime {
    /// Current state snapshot.
    pub fn state(&self) -> HostState {
        *self.rx.borrow()
    }

    /// Resolves once the host is accepting connections (or has already
    /// passed that point).
    pub async fn started(&self) {
        self.wait(HostState::Running).await;
    }

    /// Resolves once shutdown has begun.
    pub async fn stopping(&self) {
        self.wait(HostState::Stopping).await;
    }

    /// Resolves once the host has fully stopped and drained.
    pub async fn stopped(&self) {
        self.wait(HostState::Stopped).await;
    }

    async fn wait(&self, at_least: HostState) {
        let mut rx = self.rx.clone();
        // A closed channel means the serve loop is gone; the state can no
        // longer advance, so there is nothing left to wait for.
        let _ = rx.wait_for(|state| *state >= at_least).await;
    }
}
