//! Concurrency Gate
//!
//! Bounds the number of in-flight generation calls. Permits are owned RAII
//! guards, so a task that errors, panics or is cancelled mid-call still
//! returns its slot.

use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::constants::gate::DEFAULT_CONCURRENCY;
use crate::types::{ForgeError, Result};

#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl Default for ConcurrencyGate {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY)
    }
}

impl ConcurrencyGate {
    /// Gate admitting at most `capacity` tasks (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits currently free
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Wait for a slot; the slot is released when the permit drops
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit> {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ForgeError::GateClosed)
    }

    /// Run one task once a slot is free
    pub async fn run_bounded<T, F>(&self, task: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let _permit = self.acquire().await?;
        task.await
    }

    /// Run all tasks with at most `capacity` active.
    ///
    /// Results are index-aligned with `tasks`; a failing task only fills its
    /// own slot with an error.
    pub async fn gather_bounded<T, F, I>(&self, tasks: I) -> Vec<Result<T>>
    where
        I: IntoIterator<Item = F>,
        F: Future<Output = Result<T>>,
    {
        join_all(tasks.into_iter().map(|task| self.run_bounded(task))).await
    }
}
