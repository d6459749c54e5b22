//! Gateway drain and stop.
//!
//! Shutting down a push gateway means more than stopping the accept loop:
//! every live socket (pre-auth and authenticated) is told to close, and
//! in-flight background work — grace timers, fire-and-forget backend
//! notifications — gets a bounded window before being aborted. The window
//! comes from [`GatewayConfig::shutdown_drain_secs`].

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use pulse_core::StateStore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::GatewayConfig;

/// Drains the gateway on shutdown.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    background: Mutex<Vec<JoinHandle<()>>>,
    store: Arc<StateStore>,
    drain_window: Duration,
}

impl ShutdownCoordinator {
    /// Create a coordinator over the gateway's socket directory.
    pub fn new(store: Arc<StateStore>, config: &GatewayConfig) -> Self {
        Self {
            token: CancellationToken::new(),
            background: Mutex::new(Vec::new()),
            store,
            drain_window: Duration::from_secs(config.shutdown_drain_secs),
        }
    }

    /// Track a background task so [`Self::drain`] waits for it.
    pub fn register_task(&self, task: JoinHandle<()>) {
        self.background.lock().push(task);
    }

    /// Token observed by the accept loop and socket sessions.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Signal shutdown without waiting for the drain.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has been signalled.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Drain the gateway.
    ///
    /// Closes every live socket, stops the accept loop, then waits out the
    /// configured window for background work; whatever is still running
    /// after that is aborted. A second call is harmless — the socket
    /// directory is already empty and the task list already drained.
    pub async fn drain(&self) {
        let counts = self.store.counts();
        info!(
            sockets = counts.authenticated,
            pre_auth = counts.pre_auth,
            online_users = counts.online_users,
            window_secs = self.drain_window.as_secs(),
            "draining gateway"
        );

        for handle in self.store.pre_auth_handles() {
            handle.disconnect();
        }
        for handle in self.store.authenticated_handles() {
            handle.disconnect();
        }
        self.token.cancel();

        let background = std::mem::take(&mut *self.background.lock());
        let aborts: Vec<_> = background.iter().map(|t| t.abort_handle()).collect();
        if tokio::time::timeout(self.drain_window, futures::future::join_all(background))
            .await
            .is_err()
        {
            warn!(
                window_secs = self.drain_window.as_secs(),
                "drain window elapsed, aborting remaining background work"
            );
            for abort in &aborts {
                abort.abort();
            }
        }

        info!(
            sockets = self.store.counts().authenticated,
            "gateway drained"
        );
    }
}
