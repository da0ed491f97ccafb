//! Worker supervision.
//!
//! Every long-running piece of the bot (telemetry ingest, chat responders,
//! web server) is a [`Worker`]. The [`Supervisor`] starts them together,
//! hands each the same cancellation token, and on the first failure cancels
//! the token so the rest shut down too.

use crate::error::{BotError, Result};
use async_trait::async_trait;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// A long-running task that stops when its shutdown token is cancelled.
///
/// Returning `Err` is fatal: the supervisor cancels every other worker.
/// Per-request failures should be logged inside the worker instead.
#[async_trait]
pub trait Worker: Send + 'static {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Run until `shutdown` is cancelled or an unrecoverable error occurs.
    async fn run(self: Box<Self>, shutdown: CancellationToken) -> Result<()>;
}

/// Starts workers concurrently and waits for all of them to finish.
pub struct Supervisor {
    shutdown: CancellationToken,
    workers: JoinSet<(&'static str, Result<()>)>,
}

impl Supervisor {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            shutdown,
            workers: JoinSet::new(),
        }
    }

    /// Number of workers started so far.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Start a worker on its own task.
    pub fn spawn<W: Worker>(&mut self, worker: W) {
        self.spawn_boxed(Box::new(worker));
    }

    pub fn spawn_boxed(&mut self, worker: Box<dyn Worker>) {
        let name = worker.name();
        let run = AssertUnwindSafe(worker.run(self.shutdown.clone())).catch_unwind();

        info!("Starting worker {}", name);
        self.workers.spawn(async move {
            match run.await {
                Ok(result) => (name, result),
                Err(_) => (
                    name,
                    Err(BotError::WorkerPanicked {
                        worker: name.to_string(),
                    }),
                ),
            }
        });
    }

    /// Wait for every worker to return.
    ///
    /// The first error cancels the shared token; the remaining workers are
    /// still awaited so nothing outlives this call. Returns that first error.
    pub async fn wait(mut self) -> Result<()> {
        let mut first_error = None;

        while let Some(joined) = self.workers.join_next().await {
            let (name, result) = match joined {
                Ok(outcome) => outcome,
                Err(e) => (
                    "unknown",
                    Err(BotError::WorkerPanicked {
                        worker: e.to_string(),
                    }),
                ),
            };

            match result {
                Ok(()) => info!("Worker {} stopped", name),
                Err(e) => {
                    error!("Worker {} failed: {}", name, e);
                    if first_error.is_none() {
                        self.shutdown.cancel();
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Cancel `token` when the process receives SIGINT or SIGTERM.
pub fn cancel_on_shutdown_signal(token: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            _ = shutdown_signal() => {
                info!("Shutdown signal received, stopping workers");
                token.cancel();
            }
            _ = token.cancelled() => {}
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to register SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
