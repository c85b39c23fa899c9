//! Worker pool admission
//!
//! A fixed number of permits bounds how many node tasks a conductor runs
//! at once. Admission never queues: a saturated pool is reported as
//! `NoFreeConductorWorker` so the caller can back off.

use ironfly_common::{Error, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::debug;

/// Default number of concurrent tasks per conductor
pub const DEFAULT_POOL_SIZE: usize = 100;

/// Held for the lifetime of an admitted task
#[derive(Debug)]
pub struct WorkerPermit {
    _permit: OwnedSemaphorePermit,
}

#[derive(Debug, Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Free slots right now
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Take a slot or fail immediately with `NoFreeConductorWorker`.
    pub fn try_admit(&self) -> Result<WorkerPermit> {
        match self.semaphore.clone().try_acquire_owned() {
            Ok(permit) => Ok(WorkerPermit { _permit: permit }),
            Err(_) => {
                debug!(size = self.size, "Worker pool exhausted");
                Err(Error::NoFreeConductorWorker)
            }
        }
    }

    /// Run `fut` in the background while holding a slot.
    pub fn spawn_worker<F>(&self, fut: F) -> Result<JoinHandle<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let permit = self.try_admit()?;
        Ok(tokio::spawn(async move {
            let _permit = permit;
            fut.await
        }))
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_SIZE)
    }
}
