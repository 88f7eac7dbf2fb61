//! Open/close gate bounding how many tests are open at once.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::error::{Result, VgcError};

#[derive(Debug, Clone)]
pub struct ConcurrencyManager {
    semaphore: Arc<Semaphore>,
    limit: usize,
}

/// An open test's place in the gate. Held until the test's close or abort
/// completes.
#[derive(Debug)]
pub struct SessionSlot {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyManager {
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn open_sessions(&self) -> usize {
        self.limit.saturating_sub(self.semaphore.available_permits())
    }

    /// Wait for a free slot.
    pub async fn acquire(&self) -> Result<SessionSlot> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| VgcError::Unknown("session gate closed".to_string()))?;
        debug!(open = self.open_sessions(), limit = self.limit, "session slot acquired");
        Ok(SessionSlot { _permit: permit })
    }
}
