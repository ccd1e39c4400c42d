//! Background upgrade worker
//!
//! Periodically walks every pending record, tries to upgrade its proof and
//! notifies the owner once it is Bitcoin verified. Shutdown goes through a
//! `watch` channel and is honoured while sleeping, between records and while
//! an upgrade is in flight.

use crate::notary::Notary;
use crate::notify::Notifier;
use crate::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Outcome of a single pass over the pending records
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassSummary {
    pub scanned: usize,
    pub upgraded: usize,
    pub pending: usize,
    pub failed: usize,
    /// The pass stopped early because of a shutdown request
    pub cancelled: bool,
}

pub struct UpgradeWorker {
    notary: Arc<Notary>,
    notifier: Arc<dyn Notifier>,
    interval: Duration,
}

impl UpgradeWorker {
    pub fn new(notary: Arc<Notary>, notifier: Arc<dyn Notifier>, interval: Duration) -> Self {
        Self {
            notary,
            notifier,
            interval,
        }
    }

    /// One pass over all pending records
    pub async fn run_once(&self, shutdown: &mut watch::Receiver<bool>) -> PassSummary {
        let mut summary = PassSummary::default();

        let records = match self.notary.pending_records() {
            Ok(records) => records,
            Err(e) => {
                error!(error = %e, "Failed to list pending records");
                return summary;
            }
        };

        for mut record in records {
            if *shutdown.borrow() {
                summary.cancelled = true;
                break;
            }
            summary.scanned += 1;
            let record_id = record.id;

            let outcome = tokio::select! {
                result = self.notary.upgrade_record(&mut record) => result,
                _ = wait_for_shutdown(shutdown) => {
                    debug!(record_id = %record_id, "Upgrade interrupted by shutdown");
                    summary.cancelled = true;
                    break;
                }
            };

            match outcome {
                Ok(true) => {
                    summary.upgraded += 1;
                    let link = self.notary.link(&record);
                    if let Err(e) = self
                        .notifier
                        .notify_user_verified(record.user_id, &record.text, &link)
                        .await
                    {
                        warn!(record_id = %record.id, error = %e, "Failed to notify user");
                    }
                }
                Ok(false) => summary.pending += 1,
                Err(Error::MalformedProof(e)) => {
                    summary.failed += 1;
                    error!(record_id = %record.id, error = %e, "Skipping record with malformed proof");
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!(record_id = %record.id, error = %e, "Failed to upgrade record");
                }
            }
        }

        info!(
            scanned = summary.scanned,
            upgraded = summary.upgraded,
            pending = summary.pending,
            failed = summary.failed,
            "Upgrade pass finished"
        );
        summary
    }

    /// Run passes until shutdown is requested or the sender is dropped
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "Upgrade worker started");

        loop {
            if self.run_once(&mut shutdown).await.cancelled {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = wait_for_shutdown(&mut shutdown) => break,
            }
        }

        info!("Upgrade worker stopped");
    }

    /// Run on a tokio task
    pub fn spawn(self) -> WorkerHandle {
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(self.run(rx));
        WorkerHandle { shutdown: tx, task }
    }
}

/// Resolves once shutdown is requested or the sender is gone
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

pub struct WorkerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    /// Signal the worker and wait for it to stop
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Upgrade worker task failed");
        }
    }
}
