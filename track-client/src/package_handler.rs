//! Durable FIFO package queue with single-flight delivery.
//!
//! [`PackageHandler`] wraps the pure [`PackageQueue`] with persistence and
//! delivery gating. It does not talk to the network: [`send_next`] hands
//! out the package to deliver and the caller reports back through
//! [`on_success`] or [`on_failure`].
//!
//! [`send_next`]: PackageHandler::send_next
//! [`on_success`]: PackageHandler::on_success
//! [`on_failure`]: PackageHandler::on_failure

use std::sync::Arc;
use tokio::time::Instant;
use track_core::{Backoff, FailureOutcome, PackageQueue, QueueError};
use track_types::{ActivityPackage, PackageId};

use crate::error::{StorageError, TrackError};
use crate::storage::{self, Storage, QUEUE};

/// Durable package queue.
pub struct PackageHandler {
    queue: PackageQueue,
    storage: Arc<dyn Storage>,
    backoff: Backoff,
    max_retries: u32,
    paused: bool,
    retry_at: Option<Instant>,
}

impl PackageHandler {
    /// Load the persisted queue (or start empty).
    pub async fn load(
        storage: Arc<dyn Storage>,
        capacity: usize,
        backoff: Backoff,
        max_retries: u32,
    ) -> Result<Self, StorageError> {
        let packages: Vec<ActivityPackage> = storage::load_record(storage.as_ref(), QUEUE)
            .await?
            .unwrap_or_default();

        if !packages.is_empty() {
            tracing::info!(count = packages.len(), "Restored queued packages");
        }

        Ok(Self {
            queue: PackageQueue::from_packages(capacity, packages),
            storage,
            backoff,
            max_retries,
            paused: false,
            retry_at: None,
        })
    }

    /// Append a package and persist the queue before returning.
    ///
    /// If persisting fails the package is taken back out, so memory and
    /// disk agree, and the error is returned.
    pub async fn enqueue(&mut self, package: ActivityPackage) -> Result<(), TrackError> {
        let description = package.describe();
        self.queue.enqueue(package).map_err(|e| match e {
            QueueError::Full { capacity } => TrackError::QueueFull { capacity },
        })?;

        if let Err(e) = self.persist().await {
            self.queue.pop_back();
            tracing::error!(package = %description, error = %e, "Failed to persist queue, package rejected");
            return Err(e.into());
        }

        tracing::debug!(package = %description, queued = self.queue.len(), "Package queued");
        Ok(())
    }

    /// Hand out the head for delivery, if delivery may happen now.
    ///
    /// Returns `None` while paused, while another package is in flight,
    /// while a backoff delay is pending, or when the queue is empty.
    pub fn send_next(&mut self) -> Option<ActivityPackage> {
        if self.paused {
            return None;
        }
        if let Some(at) = self.retry_at {
            if Instant::now() < at {
                return None;
            }
            self.retry_at = None;
        }
        self.queue.begin_next()
    }

    /// Delivery of `id` succeeded: remove it and persist.
    ///
    /// Returns the delivered package, or `None` if `id` was not in flight
    /// (e.g. the queue was cleared meanwhile).
    pub async fn on_success(
        &mut self,
        id: &PackageId,
    ) -> Result<Option<ActivityPackage>, StorageError> {
        let Some(package) = self.queue.complete(id) else {
            return Ok(None);
        };
        self.retry_at = None;
        self.persist().await?;
        Ok(Some(package))
    }

    /// Delivery of `id` failed: retry later or drop it, then persist.
    pub async fn on_failure(
        &mut self,
        id: &PackageId,
        retryable: bool,
    ) -> Result<Option<FailureOutcome>, StorageError> {
        let Some(outcome) = self.queue.fail(id, retryable, self.max_retries) else {
            return Ok(None);
        };

        match &outcome {
            FailureOutcome::Retry { retries } => {
                let delay = self.backoff.delay(*retries);
                self.retry_at = Some(Instant::now() + delay);
                tracing::debug!(
                    retries,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Retry scheduled"
                );
            }
            FailureOutcome::Dropped { .. } => {
                self.retry_at = None;
            }
        }

        self.persist().await?;
        Ok(Some(outcome))
    }

    /// Stop handing out packages. Enqueues still work.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Hand out packages again.
    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// True while paused.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// When the pending backoff delay ends, if one is pending.
    pub fn retry_at(&self) -> Option<Instant> {
        self.retry_at
    }

    /// Persist the current queue.
    pub async fn flush(&self) -> Result<(), StorageError> {
        self.persist().await
    }

    /// Drop every package, queue `package` alone and persist.
    ///
    /// The replacement is persisted before memory changes; on failure the
    /// old queue stays in place. A delivery already in flight is forgotten;
    /// its outcome will be ignored when it arrives.
    pub async fn replace_all(&mut self, package: ActivityPackage) -> Result<(), TrackError> {
        let replacement = vec![package];
        if let Err(e) = storage::store_record(self.storage.as_ref(), QUEUE, &replacement).await {
            tracing::error!(error = %e, "Failed to persist queue, replacement rejected");
            return Err(e.into());
        }

        let dropped = self.queue.len();
        self.queue = PackageQueue::from_packages(self.queue.capacity(), replacement);
        self.retry_at = None;
        if dropped > 0 {
            tracing::info!(dropped, "Dropped queued packages");
        }
        Ok(())
    }

    /// Drop every package and delete the persisted queue.
    pub async fn wipe(&mut self) -> Result<(), StorageError> {
        self.queue.clear();
        self.retry_at = None;
        self.storage.remove(QUEUE).await
    }

    /// Number of queued packages, including one in flight.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// True if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// True while a delivery is outstanding.
    pub fn is_in_flight(&self) -> bool {
        self.queue.is_in_flight()
    }

    /// Queued packages in delivery order.
    pub fn packages(&self) -> Vec<ActivityPackage> {
        self.queue.to_vec()
    }

    async fn persist(&self) -> Result<(), StorageError> {
        storage::store_record(self.storage.as_ref(), QUEUE, &self.queue.to_vec()).await
    }
}

impl std::fmt::Debug for PackageHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageHandler")
            .field("queued", &self.queue.len())
            .field("in_flight", &self.queue.in_flight())
            .field("paused", &self.paused)
            .field("retry_at", &self.retry_at)
            .finish()
    }
}
