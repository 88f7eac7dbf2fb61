//! Batched render-status polling.
//!
//! Every waiter registers its render ids with one shared loop. Each interval
//! the loop sends a single status query covering the union of outstanding
//! ids and resolves those that reached a terminal status. Timeouts belong to
//! the waiting call: each call measures its own window from when it started.

use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Result, VgcError};
use crate::latch::ErrorLatch;
use crate::service::RenderService;
use crate::types::RenderStatusResult;

type Waiter = oneshot::Sender<Result<RenderStatusResult>>;

pub struct RenderStatusPoller {
    state: Arc<PollState>,
    interval: Duration,
    timeout: Duration,
}

struct PollState {
    service: Arc<dyn RenderService>,
    waiters: Mutex<HashMap<String, Vec<Waiter>>>,
    wake: Notify,
    started: AtomicBool,
    shutdown: CancellationToken,
}

impl RenderStatusPoller {
    pub fn new(service: Arc<dyn RenderService>, interval: Duration, timeout: Duration) -> Self {
        Self {
            state: Arc::new(PollState {
                service,
                waiters: Mutex::new(HashMap::new()),
                wake: Notify::new(),
                started: AtomicBool::new(false),
                shutdown: CancellationToken::new(),
            }),
            interval,
            timeout,
        }
    }

    /// Wait until every id is `rendered` or `error`. Results come back in
    /// the order of `render_ids`; an `error` status is a result, not a
    /// failure, so one failed render does not hold up the others.
    ///
    /// Fails with [`VgcError::RenderTimeout`] naming the ids still pending
    /// once the timeout elapses, or with the latched error as soon as the
    /// latch is set.
    pub async fn wait_for_terminal(
        &self,
        render_ids: &[String],
        latch: &ErrorLatch,
    ) -> Result<Vec<RenderStatusResult>> {
        latch.check()?;
        if render_ids.is_empty() {
            return Ok(Vec::new());
        }

        let deadline = Instant::now() + self.timeout;
        let receivers = self.state.register(render_ids);
        self.ensure_started();

        let mut results: Vec<Option<RenderStatusResult>> = vec![None; render_ids.len()];
        let mut pending: FuturesUnordered<_> = receivers
            .into_iter()
            .enumerate()
            .map(|(index, receiver)| async move { (index, receiver.await) })
            .collect();
        let timeout = tokio::time::sleep_until(deadline);
        tokio::pin!(timeout);

        while !pending.is_empty() {
            tokio::select! {
                Some((index, outcome)) = pending.next() => match outcome {
                    Ok(Ok(status)) => results[index] = Some(status),
                    Ok(Err(err)) => return Err(err),
                    Err(_) => return Err(VgcError::Unknown("render status polling stopped".to_string())),
                },
                _ = &mut timeout => {
                    let still_pending: Vec<String> = render_ids
                        .iter()
                        .zip(&results)
                        .filter(|(_, result)| result.is_none())
                        .map(|(id, _)| id.clone())
                        .collect();
                    warn!(render_ids = ?still_pending, "timed out waiting for render status");
                    return Err(VgcError::RenderTimeout { render_ids: still_pending });
                }
                _ = latch.cancelled() => {
                    debug!(render_ids = ?render_ids, "stopped waiting for render status after an error");
                    return latch.check().map(|_| Vec::new());
                }
            }
        }

        Ok(results.into_iter().flatten().collect())
    }

    fn ensure_started(&self) {
        if !self.state.started.swap(true, Ordering::SeqCst) {
            tokio::spawn(poll_loop(self.state.clone(), self.interval));
        }
    }
}

impl Drop for RenderStatusPoller {
    fn drop(&mut self) {
        self.state.shutdown.cancel();
    }
}

impl PollState {
    fn register(&self, render_ids: &[String]) -> Vec<oneshot::Receiver<Result<RenderStatusResult>>> {
        let mut waiters = self.lock();
        let receivers = render_ids
            .iter()
            .map(|id| {
                let (tx, rx) = oneshot::channel();
                waiters.entry(id.clone()).or_default().push(tx);
                rx
            })
            .collect();
        drop(waiters);
        self.wake.notify_one();
        receivers
    }

    /// Outstanding ids, dropping waiters that stopped listening.
    fn pending_ids(&self) -> Vec<String> {
        let mut waiters = self.lock();
        waiters.retain(|_, senders| {
            senders.retain(|sender| !sender.is_closed());
            !senders.is_empty()
        });
        let mut ids: Vec<String> = waiters.keys().cloned().collect();
        ids.sort();
        ids
    }

    fn resolve(&self, render_id: &str, outcome: Result<RenderStatusResult>) {
        let senders = self.lock().remove(render_id).unwrap_or_default();
        for sender in senders {
            let _ = sender.send(outcome.clone());
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<Waiter>>> {
        // a poisoned map is still structurally valid
        self.waiters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

async fn poll_loop(state: Arc<PollState>, interval: Duration) {
    loop {
        while state.pending_ids().is_empty() {
            tokio::select! {
                _ = state.wake.notified() => {}
                _ = state.shutdown.cancelled() => return,
            }
        }
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = state.shutdown.cancelled() => return,
        }

        let render_ids = state.pending_ids();
        if render_ids.is_empty() {
            continue;
        }
        debug!(count = render_ids.len(), "polling render status");

        match state.service.render_status(&render_ids).await {
            Ok(statuses) if statuses.len() == render_ids.len() => {
                for (render_id, mut status) in render_ids.iter().zip(statuses) {
                    if !status.status.is_terminal() {
                        continue;
                    }
                    debug!(render_id = %render_id, status = ?status.status, "render finished");
                    status.render_id.get_or_insert_with(|| render_id.clone());
                    state.resolve(render_id, Ok(status));
                }
            }
            Ok(statuses) => {
                let err = VgcError::protocol(format!(
                    "render status answered {} of {} ids",
                    statuses.len(),
                    render_ids.len()
                ));
                for render_id in &render_ids {
                    state.resolve(render_id, Err(err.clone()));
                }
            }
            Err(err) => {
                warn!(error = %err, "render status poll failed");
                for render_id in &render_ids {
                    state.resolve(render_id, Err(err.clone()));
                }
            }
        }
    }
}
