use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Shared state of the service, cloned into every connection task.
///
/// SQLite does not cope with concurrent writers, so every request passes the
/// store gate for its whole duration: fetches share it, replaces hold it
/// exclusively. Reads of one fetch therefore see one consistent snapshot, and
/// no fetch observes a half-applied replace.
#[derive(Clone)]
pub struct AppState {
    store_gate: Arc<RwLock<()>>,
    request_timeout: Duration,
}

impl AppState {
    pub fn new(request_timeout: Duration) -> Self {
        Self {
            store_gate: Arc::new(RwLock::new(())),
            request_timeout,
        }
    }

    /// Deadline applied to each request.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Shared access for read-only requests.
    pub async fn read_gate(&self) -> RwLockReadGuard<'_, ()> {
        self.store_gate.read().await
    }

    /// Exclusive access for mutating requests.
    pub async fn write_gate(&self) -> RwLockWriteGuard<'_, ()> {
        self.store_gate.write().await
    }
}
