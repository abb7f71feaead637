//! Background side-effect queue.
//!
//! Token requests must not await bookkeeping writes like grant last-used
//! stamps, but detaching them as anonymous fire-and-forget tasks loses
//! their failures. Work is handed to a single worker through a bounded
//! queue with its own shutdown signal; a full queue drops the task loudly
//! instead of blocking the request path.

use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::storage::grant::GrantStore;

/// A deferred side effect.
#[derive(Debug)]
pub enum BackgroundTask {
    /// Record when a grant was last used.
    TouchGrant {
        /// Handle hash of the grant.
        handle_hash: String,
        /// When it was used.
        used_at: OffsetDateTime,
    },
}

/// Handle to the background worker.
pub struct BackgroundTasks {
    sender: mpsc::Sender<BackgroundTask>,
    shutdown: watch::Sender<bool>,
    worker: JoinHandle<()>,
}

impl BackgroundTasks {
    /// Spawns the worker with a bounded queue.
    #[must_use]
    pub fn spawn(grants: Arc<dyn GrantStore>, capacity: usize) -> Self {
        let (sender, mut receiver) = mpsc::channel::<BackgroundTask>(capacity);
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let worker = tokio::spawn(async move {
            loop {
                tokio::select! {
                    task = receiver.recv() => match task {
                        Some(task) => run_task(&*grants, task).await,
                        None => break,
                    },
                    _ = shutdown_rx.changed() => {
                        // Drain whatever is already queued, then stop.
                        receiver.close();
                        while let Some(task) = receiver.recv().await {
                            run_task(&*grants, task).await;
                        }
                        break;
                    }
                }
            }
            debug!("background task worker stopped");
        });

        Self {
            sender,
            shutdown,
            worker,
        }
    }

    /// Enqueues a grant last-used stamp.
    ///
    /// Returns `false` (and logs) when the queue is full or the worker is
    /// gone; the caller proceeds either way.
    pub fn enqueue_touch(&self, handle_hash: impl Into<String>, used_at: OffsetDateTime) -> bool {
        let task = BackgroundTask::TouchGrant {
            handle_hash: handle_hash.into(),
            used_at,
        };
        match self.sender.try_send(task) {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "background task dropped");
                false
            }
        }
    }

    /// Signals shutdown and waits for queued work to drain.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        drop(self.sender);
        let _ = self.worker.await;
    }
}

async fn run_task(grants: &dyn GrantStore, task: BackgroundTask) {
    match task {
        BackgroundTask::TouchGrant {
            handle_hash,
            used_at,
        } => {
            if let Err(err) = grants.touch(&handle_hash, used_at).await {
                warn!(error = %err, "failed to record grant last-used time");
            }
        }
    }
}
