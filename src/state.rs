//! Application state shared across the web handlers.

use std::sync::Arc;
use std::time::Instant;

use sqlx::PgPool;
use tokio::sync::mpsc;

use crate::catalog::Catalog;
use crate::monitor::scheduler::CheckTrigger;

#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub catalog: Arc<Catalog>,
    /// Handle for requesting an immediate monitor cycle.
    pub check_tx: mpsc::Sender<CheckTrigger>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(db_pool: PgPool, catalog: Arc<Catalog>, check_tx: mpsc::Sender<CheckTrigger>) -> Self {
        Self {
            db_pool,
            catalog,
            check_tx,
            started_at: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
