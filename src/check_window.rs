//! The per-test check-window pipeline.
//!
//! Each `check_window` call renders once for all of the test's browsers and
//! then runs one job per browser. A job waits for its own render to finish,
//! then for the previous job of the same browser, and only then dispatches
//! its match. Match order per browser therefore equals call order no matter
//! which render the service finishes first.
//!
//! Every job shares the test's [`ErrorLatch`]. The first failure is latched
//! and every later job stops at its next checkpoint.

use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{oneshot, OnceCell};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::css::extract_css_resources_from_cdt;
use crate::error::{Result, VgcError};
use crate::fetch::{FetchResource, Fetcher};
use crate::latch::ErrorLatch;
use crate::match_regions::calculate_match_regions;
use crate::put_resources::PutResources;
use crate::render_batch::RenderBatch;
use crate::render_request::create_render_requests;
use crate::resource_cache::ResourceCache;
use crate::resources::ResourceCollector;
use crate::service::RenderService;
use crate::session::TestSession;
use crate::status_poller::RenderStatusPoller;
use crate::throttle::{RenderLease, RenderThrottle};
use crate::types::{
    BrowserInfo, CheckWindowArgs, MatchLevel, MatchRequest, MatchResult, RenderInfo,
    RenderStatusResult,
};

/// Completion of a test's session opens, awaited by every match dispatch.
pub type SessionOpen = Shared<BoxFuture<'static, Result<()>>>;

type RenderStart = Shared<BoxFuture<'static, Result<Arc<StartedRender>>>>;

/// The process-wide rendering machinery shared by every test of a client.
pub struct RenderEngine {
    service: Arc<dyn RenderService>,
    render_info: OnceCell<RenderInfo>,
    collector: ResourceCollector,
    render_batch: RenderBatch,
    throttle: RenderThrottle,
    poller: RenderStatusPoller,
}

impl RenderEngine {
    pub fn new(
        config: &ClientConfig,
        service: Arc<dyn RenderService>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        let cache = Arc::new(ResourceCache::new());
        let fetch = Arc::new(FetchResource::new(
            fetcher,
            config.fetch_retries,
            config.fetch_retry_backoff,
        ));
        let put_resources = Arc::new(PutResources::new(service.clone(), fetch.clone()));

        Self {
            render_info: OnceCell::new(),
            collector: ResourceCollector::new(cache.clone(), fetch),
            render_batch: RenderBatch::new(service.clone(), put_resources, cache),
            throttle: RenderThrottle::new(config.render_concurrency()),
            poller: RenderStatusPoller::new(
                service.clone(),
                config.render_status_interval,
                config.render_status_timeout,
            ),
            service,
        }
    }

    /// Render info is requested once and shared by every render.
    pub async fn render_info(&self) -> Result<RenderInfo> {
        self.render_info
            .get_or_try_init(|| self.service.render_info())
            .await
            .cloned()
    }

    pub fn resource_cache(&self) -> &Arc<ResourceCache> {
        self.collector.cache()
    }

    pub fn throttle(&self) -> &RenderThrottle {
        &self.throttle
    }

    pub fn poller(&self) -> &RenderStatusPoller {
        &self.poller
    }

    /// Collect resources, build one request per browser and submit them as a
    /// single batch behind the render throttle.
    async fn start_render(
        self: Arc<Self>,
        args: Arc<CheckWindowArgs>,
        browsers: Arc<[BrowserInfo]>,
        latch: ErrorLatch,
    ) -> Result<Arc<StartedRender>> {
        latch.check()?;
        let render_info = self.render_info().await?;
        latch.check()?;

        let mut urls = args.resource_urls.clone();
        urls.extend(extract_css_resources_from_cdt(&args.snapshot, &args.url));
        let mut resources = self
            .collector
            .collect(&args.url, &urls, &args.resource_contents)
            .await?;
        resources.extend(self.collector.collect_frames(&args.url, &args.frames).await?);
        latch.check()?;

        let mut requests = create_render_requests(&args, resources, &browsers, &render_info);
        if let Some(first) = requests.first() {
            let dom = first.dom.as_resource()?;
            self.collector
                .register_dom(&dom, first.dom.resources.keys().cloned().collect());
        }

        let batch = &self.render_batch;
        let pending = &mut requests;
        let submit_latch = latch.clone();
        let (render_ids, leases) = self
            .throttle
            .acquire_and_run(browsers.len(), move || async move {
                submit_latch.check()?;
                batch.submit(pending).await
            })
            .await?;
        if render_ids.len() != browsers.len() {
            return Err(VgcError::protocol(format!(
                "expected {} render ids, got {}",
                browsers.len(),
                render_ids.len()
            )));
        }

        debug!(tag = ?args.tag, browsers = browsers.len(), "check window render started");
        Ok(Arc::new(StartedRender {
            render_ids,
            leases: Mutex::new(leases.into_iter().map(Some).collect()),
        }))
    }
}

/// Render ids of one check-window call plus the throttle leases the jobs
/// release as their renders finish.
struct StartedRender {
    render_ids: Vec<String>,
    leases: Mutex<Vec<Option<RenderLease>>>,
}

impl StartedRender {
    fn take_lease(&self, index: usize) -> Option<RenderLease> {
        self.leases
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get_mut(index)
            .and_then(Option::take)
    }
}

/// FIFO chain of one browser's jobs.
#[derive(Default)]
struct BrowserQueue {
    tail: Mutex<Option<oneshot::Receiver<()>>>,
}

/// A job's place in its browser's queue. Dropping the ticket lets the next
/// job through, whether this one succeeded or not.
struct QueueTicket {
    predecessor: Option<oneshot::Receiver<()>>,
    _done: oneshot::Sender<()>,
}

impl BrowserQueue {
    fn enqueue(&self) -> QueueTicket {
        let (done, next) = oneshot::channel();
        let predecessor = self
            .tail
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .replace(next);
        QueueTicket {
            predecessor,
            _done: done,
        }
    }
}

impl QueueTicket {
    async fn wait_turn(&mut self) {
        if let Some(predecessor) = self.predecessor.take() {
            // a dropped sender means the predecessor settled
            let _ = predecessor.await;
        }
    }
}

struct TestState {
    engine: Arc<RenderEngine>,
    browsers: Arc<[BrowserInfo]>,
    sessions: Vec<Arc<dyn TestSession>>,
    match_level: MatchLevel,
    latch: ErrorLatch,
    aborted: AtomicBool,
    opened: SessionOpen,
}

impl TestState {
    fn halted(&self) -> bool {
        self.latch.is_set() || self.aborted.load(Ordering::SeqCst)
    }
}

/// Job chains and error latch for one open test.
pub struct CheckWindowPipeline {
    test_name: String,
    state: Arc<TestState>,
    queues: Vec<BrowserQueue>,
    jobs: Mutex<Vec<JoinHandle<()>>>,
}

impl CheckWindowPipeline {
    /// `sessions` holds one session per browser, in browser order.
    pub fn new(
        test_name: impl Into<String>,
        engine: Arc<RenderEngine>,
        browsers: Vec<BrowserInfo>,
        match_level: MatchLevel,
        sessions: Vec<Arc<dyn TestSession>>,
        opened: SessionOpen,
    ) -> Self {
        let queues = browsers.iter().map(|_| BrowserQueue::default()).collect();
        Self {
            test_name: test_name.into(),
            state: Arc::new(TestState {
                engine,
                browsers: browsers.into(),
                sessions,
                match_level,
                latch: ErrorLatch::new(),
                aborted: AtomicBool::new(false),
                opened,
            }),
            queues,
            jobs: Mutex::new(Vec::new()),
        }
    }

    pub fn latch(&self) -> &ErrorLatch {
        &self.state.latch
    }

    /// Queue one checkpoint for every browser. Returns immediately; failures
    /// are latched and surface from [`close`](Self::close).
    pub fn check_window(&self, args: CheckWindowArgs) {
        if self.state.halted() {
            debug!(test = %self.test_name, tag = ?args.tag, "skipping check window after an error or abort");
            return;
        }

        let args = Arc::new(args);
        let render: RenderStart = self
            .state
            .engine
            .clone()
            .start_render(
                args.clone(),
                self.state.browsers.clone(),
                self.state.latch.clone(),
            )
            .boxed()
            .shared();

        let mut jobs = self
            .jobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for (index, queue) in self.queues.iter().enumerate() {
            let ticket = queue.enqueue();
            let state = self.state.clone();
            let render = render.clone();
            let args = args.clone();
            jobs.push(tokio::spawn(async move {
                if let Err(err) = run_job(&state, index, render, ticket, &args).await {
                    if state.latch.set(err.clone()) {
                        warn!(
                            browser = %state.browsers[index].label(),
                            tag = ?args.tag,
                            error = %err,
                            "check window failed"
                        );
                    }
                }
            }));
        }
    }

    /// Wait for every pending job, then close every session. The latched
    /// error, if any, wins over close-time errors.
    pub async fn close(&self) -> Result<Vec<Vec<MatchResult>>> {
        self.settle_jobs().await;
        if let Err(err) = self.state.opened.clone().await {
            self.state.latch.set(err);
        }

        let closed = join_all(self.state.sessions.iter().map(|session| session.close())).await;
        self.state.latch.check()?;
        let results = closed.into_iter().collect::<Result<Vec<_>>>()?;
        info!(test = %self.test_name, browsers = results.len(), "test closed");
        Ok(results)
    }

    /// Stop the chain: the job in flight finishes, later ones never start.
    /// Waits for the session opens before aborting the sessions.
    pub async fn abort(&self) -> Result<()> {
        self.state.aborted.store(true, Ordering::SeqCst);
        let opened = self.state.opened.clone().await;
        self.settle_jobs().await;

        if opened.is_ok() {
            let aborted = join_all(self.state.sessions.iter().map(|session| session.abort())).await;
            for err in aborted.into_iter().filter_map(|outcome| outcome.err()) {
                warn!(test = %self.test_name, error = %err, "session abort failed");
            }
        }
        info!(test = %self.test_name, "test aborted");
        Ok(())
    }

    async fn settle_jobs(&self) {
        let jobs = std::mem::take(
            &mut *self
                .jobs
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        for joined in join_all(jobs).await {
            if let Err(err) = joined {
                self.state
                    .latch
                    .set(VgcError::Unknown(format!("check window job panicked: {err}")));
            }
        }
    }
}

async fn run_job(
    state: &TestState,
    index: usize,
    render: RenderStart,
    mut ticket: QueueTicket,
    args: &CheckWindowArgs,
) -> Result<()> {
    let browser = &state.browsers[index];
    if state.halted() {
        debug!(browser = %browser.label(), tag = ?args.tag, "job skipped before render");
        return Ok(());
    }

    let started = render.await?;
    let lease = started.take_lease(index);
    if state.latch.is_set() {
        // nothing will poll this render, so its slot is free now
        if let Some(lease) = lease {
            lease.release();
        }
        debug!(browser = %browser.label(), tag = ?args.tag, "job stopped after render submission");
        return Ok(());
    }
    let render_id = started
        .render_ids
        .get(index)
        .cloned()
        .ok_or_else(|| VgcError::protocol("missing render id for browser"))?;
    debug!(render_id = %render_id, browser = %browser.label(), tag = ?args.tag, "waiting for render");

    let waited = state
        .engine
        .poller
        .wait_for_terminal(std::slice::from_ref(&render_id), &state.latch)
        .await;
    if let Some(lease) = lease {
        lease.release();
    }
    let rendered = rendered_status(waited?, &render_id)?;

    match &rendered.image_location {
        Some(location) => debug!(render_id = %render_id, location = %location, "screenshot available"),
        None => debug!(render_id = %render_id, "screenshot not available"),
    }
    let session = &state.sessions[index];
    if let Some(user_agent) = &rendered.user_agent {
        session.set_inferred_environment(&format!("useragent:{user_agent}"));
    }
    if let Some(device_size) = rendered.device_size {
        session.set_viewport_size(device_size);
    }

    ticket.wait_turn().await;
    if state.halted() {
        debug!(render_id = %render_id, "match skipped after an earlier error or abort");
        return Ok(());
    }
    state.opened.clone().await?;

    let screenshot_url = rendered
        .image_location
        .clone()
        .ok_or_else(|| VgcError::protocol(format!("render {render_id} has no image location")))?;
    let request = MatchRequest {
        tag: args.tag.clone(),
        render_id: render_id.clone(),
        screenshot_url,
        dom_url: rendered.dom_location.clone(),
        regions: calculate_match_regions(args, &rendered.selector_regions),
        match_level: args.match_level.unwrap_or(state.match_level),
    };
    info!(render_id = %render_id, browser = %browser.label(), tag = ?args.tag, "dispatching match");
    session.check_window(request).await?;
    Ok(())
}

fn rendered_status(statuses: Vec<RenderStatusResult>, render_id: &str) -> Result<RenderStatusResult> {
    statuses
        .into_iter()
        .next()
        .ok_or_else(|| VgcError::protocol(format!("no status returned for render {render_id}")))?
        .into_rendered(render_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RenderRequest, Resource, RunningRender};
    use async_trait::async_trait;
    use std::time::Duration;

    /// Service and fetcher for tests that never reach the network.
    struct Offline;

    #[async_trait]
    impl RenderService for Offline {
        async fn render_info(&self) -> Result<RenderInfo> {
            Err(VgcError::Network("offline".into()))
        }

        async fn render_batch(&self, _: &[RenderRequest]) -> Result<Vec<RunningRender>> {
            Err(VgcError::Network("offline".into()))
        }

        async fn put_resource(&self, _: &RunningRender, _: &Resource) -> Result<String> {
            Err(VgcError::Network("offline".into()))
        }

        async fn render_status(&self, _: &[String]) -> Result<Vec<RenderStatusResult>> {
            Err(VgcError::Network("offline".into()))
        }
    }

    #[async_trait]
    impl Fetcher for Offline {
        async fn fetch(&self, _: &str) -> Result<Resource> {
            Err(VgcError::Network("offline".into()))
        }
    }

    #[tokio::test]
    async fn job_latched_after_submission_frees_its_slot_at_once() {
        let engine = Arc::new(RenderEngine::new(
            &ClientConfig::default(),
            Arc::new(Offline),
            Arc::new(Offline),
        ));
        let leases = engine.throttle.acquire(1).await.unwrap();
        let started = Arc::new(StartedRender {
            render_ids: vec!["r-1".into()],
            leases: Mutex::new(leases.into_iter().map(Some).collect()),
        });
        let render: RenderStart = {
            let started = started.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(started)
            }
            .boxed()
            .shared()
        };
        let state = TestState {
            engine: engine.clone(),
            browsers: vec![BrowserInfo::default()].into(),
            sessions: Vec::new(),
            match_level: MatchLevel::default(),
            latch: ErrorLatch::new(),
            aborted: AtomicBool::new(false),
            opened: futures::future::ready(Ok(())).boxed().shared(),
        };
        let queue = BrowserQueue::default();
        let args = CheckWindowArgs::default();

        let latch = state.latch.clone();
        let (outcome, _) = tokio::join!(
            run_job(&state, 0, render.clone(), queue.enqueue(), &args),
            async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                latch.set(VgcError::Unknown("earlier check window failed".into()));
            }
        );

        outcome.unwrap();
        // the started render is still referenced, its slot is not
        assert_eq!(engine.throttle.in_flight(), 0);
        drop((render, started));
    }

    #[tokio::test]
    async fn queue_releases_jobs_in_enqueue_order() {
        let queue = BrowserQueue::default();
        let order = Arc::new(Mutex::new(Vec::new()));

        let tickets: Vec<_> = (0..3).map(|_| queue.enqueue()).collect();
        let mut handles = Vec::new();
        for (index, mut ticket) in tickets.into_iter().enumerate().rev() {
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(5 * (3 - index as u64))).await;
                ticket.wait_turn().await;
                order.lock().unwrap().push(index);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn dropped_ticket_unblocks_the_next_job() {
        let queue = BrowserQueue::default();
        let first = queue.enqueue();
        let mut second = queue.enqueue();
        drop(first);

        tokio::time::timeout(Duration::from_millis(100), second.wait_turn())
            .await
            .unwrap();
    }

    #[test]
    fn error_status_becomes_render_failure() {
        let mut status = RenderStatusResult::with_status(crate::types::RenderStatus::Error);
        status.error = Some("bad css".into());

        let err = rendered_status(vec![status], "r-1").unwrap_err();
        assert_eq!(err.to_string(), "failed to render screenshot");
        assert!(rendered_status(Vec::new(), "r-1").is_err());
    }
}
