//! Long-running service lifecycle.

pub mod manager;
pub mod web;

use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// How a service's task ended.
#[derive(Debug)]
pub enum ServiceResult {
    GracefulShutdown,
    /// The work loop returned without being asked to stop.
    NormalCompletion,
    Error(anyhow::Error),
}

/// A long-running component (monitor, digest worker, web server).
#[async_trait::async_trait]
pub trait Service: Send + Sync {
    /// Name used in logs and shutdown reporting.
    fn name(&self) -> &'static str;

    /// The service's main work loop. Runs until shutdown or failure.
    async fn run(&mut self) -> Result<(), anyhow::Error>;

    /// Ask the work loop to stop; must be quick and idempotent.
    async fn shutdown(&mut self) -> Result<(), anyhow::Error>;
}

/// Drives one service until its loop ends or the shared shutdown fires.
pub async fn run_service(
    mut service: Box<dyn Service>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> ServiceResult {
    let name = service.name();
    info!(service = name, "service started");

    let work = async {
        match service.run().await {
            Ok(()) => {
                warn!(service = name, "service completed unexpectedly");
                ServiceResult::NormalCompletion
            }
            Err(e) => {
                error!(service = name, error = ?e, "service failed");
                ServiceResult::Error(e)
            }
        }
    };

    tokio::select! {
        result = work => result,
        _ = shutdown_rx.recv() => {
            let started = std::time::Instant::now();
            match service.shutdown().await {
                Ok(()) => {
                    info!(service = name, elapsed = ?started.elapsed(), "service shut down");
                    ServiceResult::GracefulShutdown
                }
                Err(e) => {
                    error!(service = name, error = ?e, "service shutdown failed");
                    ServiceResult::Error(e)
                }
            }
        }
    }
}
