//! Global admission gate for renders.
//!
//! A slot is taken before a batch is submitted and is held by a
//! [`RenderLease`] until the render reaches a terminal status, not merely
//! until submission returns.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::error::{Result, VgcError};

#[derive(Debug, Clone)]
pub struct RenderThrottle {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl RenderThrottle {
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

    /// Slots currently held by unreleased leases.
    pub fn in_flight(&self) -> usize {
        self.capacity
            .saturating_sub(self.semaphore.available_permits())
    }

    /// Wait for slots for `renders` renders and hand out one lease per
    /// render.
    ///
    /// A batch larger than the whole gate takes every slot; the leases past
    /// the capacity carry no slot, so held slots never exceed the capacity.
    pub async fn acquire(&self, renders: usize) -> Result<Vec<RenderLease>> {
        let weight = renders.min(self.capacity);
        let permits = u32::try_from(weight)
            .map_err(|_| VgcError::Config(format!("render batch of {renders} is too large")))?;
        self.semaphore
            .clone()
            .acquire_many_owned(permits)
            .await
            .map_err(|_| VgcError::Unknown("render throttle closed".to_string()))?
            .forget();
        debug!(renders, slots = weight, in_flight = self.in_flight(), "render slots acquired");

        Ok((0..renders)
            .map(|index| RenderLease {
                semaphore: self.semaphore.clone(),
                slots: usize::from(index < weight),
            })
            .collect())
    }

    /// Queue `job` behind the gate and run it once slots are available. The
    /// leases are returned with the job's value; if the job fails they are
    /// released immediately.
    pub async fn acquire_and_run<F, Fut, T>(
        &self,
        renders: usize,
        job: F,
    ) -> Result<(T, Vec<RenderLease>)>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let leases = self.acquire(renders).await?;
        let value = job().await?;
        Ok((value, leases))
    }
}

/// One render's claim on the throttle. Releasing (or dropping) it frees the
/// slot.
#[derive(Debug)]
pub struct RenderLease {
    semaphore: Arc<Semaphore>,
    slots: usize,
}

impl RenderLease {
    pub fn release(mut self) {
        self.give_back();
    }

    fn give_back(&mut self) {
        if self.slots > 0 {
            self.semaphore.add_permits(self.slots);
            self.slots = 0;
        }
    }
}

impl Drop for RenderLease {
    fn drop(&mut self) {
        self.give_back();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn leases_hold_slots_until_released() {
        let throttle = RenderThrottle::new(3);
        let mut leases = throttle.acquire(2).await.unwrap();
        assert_eq!(throttle.in_flight(), 2);

        leases.pop().unwrap().release();
        assert_eq!(throttle.in_flight(), 1);
        drop(leases);
        assert_eq!(throttle.in_flight(), 0);
    }

    #[tokio::test]
    async fn oversized_batches_take_the_whole_gate() {
        let throttle = RenderThrottle::new(2);
        let leases = throttle.acquire(5).await.unwrap();
        assert_eq!(leases.len(), 5);
        assert_eq!(throttle.in_flight(), 2);
        drop(leases);
        assert_eq!(throttle.in_flight(), 0);
    }

    #[tokio::test]
    async fn failed_jobs_release_their_slots() {
        let throttle = RenderThrottle::new(1);
        let result = throttle
            .acquire_and_run(1, || async { Err::<(), _>(VgcError::BadRequest) })
            .await;
        assert!(result.is_err());
        assert_eq!(throttle.in_flight(), 0);
    }

    #[tokio::test]
    async fn held_slots_never_exceed_capacity() {
        let throttle = RenderThrottle::new(3);
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..12)
            .map(|i| {
                let throttle = throttle.clone();
                let peak = peak.clone();
                tokio::spawn(async move {
                    let (_, leases) = throttle
                        .acquire_and_run(1 + i % 2, || async { Ok(()) })
                        .await
                        .unwrap();
                    peak.fetch_max(throttle.in_flight(), Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    for lease in leases {
                        lease.release();
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(throttle.in_flight(), 0);
    }
}
