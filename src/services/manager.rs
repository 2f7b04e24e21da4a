//! Spawns registered services and coordinates their shutdown.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use futures::future::select_all;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::services::{Service, ServiceResult, run_service};

/// A spawned service: its name plus a future that resolves when its task
/// ends, with panics folded into `ServiceResult::Error`.
struct RunningService {
    name: String,
    completion: Pin<Box<dyn Future<Output = ServiceResult> + Send>>,
}

pub struct ServiceManager {
    registered: Vec<(String, Box<dyn Service>)>,
    running: Vec<RunningService>,
    shutdown_tx: broadcast::Sender<()>,
}

impl ServiceManager {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            registered: Vec::new(),
            running: Vec::new(),
            shutdown_tx,
        }
    }

    /// Register a service; it starts on [`spawn_all`](Self::spawn_all).
    pub fn register(&mut self, name: &str, service: Box<dyn Service>) {
        self.registered.push((name.to_string(), service));
    }

    /// Spawn every registered service onto the runtime.
    pub fn spawn_all(&mut self) {
        let names: Vec<String> = self.registered.iter().map(|(n, _)| n.clone()).collect();

        for (name, service) in self.registered.drain(..) {
            let shutdown_rx = self.shutdown_tx.subscribe();
            let handle = tokio::spawn(run_service(service, shutdown_rx));
            let task_name = name.clone();
            let completion = Box::pin(async move {
                match handle.await {
                    Ok(result) => result,
                    Err(e) => ServiceResult::Error(anyhow::anyhow!(
                        "service task '{task_name}' panicked: {e}"
                    )),
                }
            });
            self.running.push(RunningService { name, completion });
        }

        info!(count = names.len(), services = ?names, "services spawned");
    }

    /// Wait until any service's task completes, returning its name and
    /// result. Services are expected to run forever, so a completion here
    /// normally means a failure or a graceful exit after shutdown.
    pub async fn wait_any(&mut self) -> (String, ServiceResult) {
        if self.running.is_empty() {
            return (
                "none".to_string(),
                ServiceResult::Error(anyhow::anyhow!("no services are running")),
            );
        }

        // Polling the completions by reference keeps the losers' progress in
        // place for the next wait or for shutdown.
        let (result, index, _) =
            select_all(self.running.iter_mut().map(|s| &mut s.completion)).await;
        let finished = self.running.swap_remove(index);
        (finished.name, result)
    }

    /// Broadcast shutdown and wait up to `timeout` for every remaining
    /// service. Returns the elapsed time, or the names that did not stop.
    pub async fn shutdown(&mut self, timeout: Duration) -> Result<Duration, Vec<String>> {
        let names: Vec<&str> = self.running.iter().map(|s| s.name.as_str()).collect();
        info!(services = ?names, timeout = ?timeout, "shutting down services");

        let _ = self.shutdown_tx.send(());

        let started = std::time::Instant::now();
        let deadline = tokio::time::Instant::now() + timeout;
        let mut pending = Vec::new();

        for service in self.running.drain(..) {
            match tokio::time::timeout_at(deadline, service.completion).await {
                Ok(ServiceResult::Error(e)) => {
                    warn!(service = service.name, error = ?e, "service failed during shutdown");
                    pending.push(service.name);
                }
                Ok(_) => debug!(service = service.name, "service shutdown complete"),
                Err(_) => {
                    warn!(service = service.name, "service shutdown timed out");
                    pending.push(service.name);
                }
            }
        }

        let elapsed = started.elapsed();
        if pending.is_empty() {
            info!(elapsed = ?elapsed, "all services stopped");
            Ok(elapsed)
        } else {
            warn!(pending = ?pending, elapsed = ?elapsed, "shutdown left services running");
            Err(pending)
        }
    }
}

impl Default for ServiceManager {
    fn default() -> Self {
        Self::new()
    }
}
