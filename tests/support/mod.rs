#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use vgc_lib::{
    BrowserInfo, CheckWindowArgs, ClientConfig, DomSnapshot, Fetcher, GridClient, MatchRequest,
    MatchResult, RenderInfo, RenderRequest, RenderService, RenderStatus, RenderStatusResult,
    ResolvedTestConfig, Resource, Result, RunningRender, SessionDefaults, TestSession, VgcError,
    Viewport,
};

pub const USER_AGENT: &str = "FakeBrowser/1.0";

/// How the fake service finishes renders of one page URL.
#[derive(Debug, Clone, Copy)]
pub enum Plan {
    RenderedAfter(Duration),
    ErrorAfter(Duration),
    Never,
}

#[derive(Default)]
pub struct FakeRenderService {
    pub next_id: AtomicUsize,
    pub plans: Mutex<HashMap<String, Plan>>,
    pub renders: Mutex<HashMap<String, (String, Instant)>>,
    pub reported: Mutex<Vec<String>>,
    pub batches: AtomicUsize,
    pub status_queries: AtomicUsize,
    pub render_info_calls: AtomicUsize,
    pub puts: Mutex<Vec<String>>,
    /// First submission of each render: page URL and resource keys.
    pub requests: Mutex<Vec<(String, Vec<String>)>>,
    pub max_in_progress: AtomicUsize,
    pub ask_for_resources: bool,
    pub always_missing: bool,
    pub fail_batch: Option<VgcError>,
}

impl FakeRenderService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resource keys sent with the first render of `url`.
    pub fn resources_for(&self, url: &str) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .find(|(page, _)| page == url)
            .map(|(_, keys)| keys.clone())
            .unwrap_or_default()
    }

    pub fn plan(&self, url: &str, plan: Plan) {
        self.plans.lock().unwrap().insert(url.to_string(), plan);
    }

    fn plan_for(&self, url: &str) -> Plan {
        self.plans
            .lock()
            .unwrap()
            .get(url)
            .copied()
            .unwrap_or(Plan::RenderedAfter(Duration::ZERO))
    }

    /// Submitted renders whose terminal status has not been reported yet.
    fn in_progress(&self) -> usize {
        let reported = self.reported.lock().unwrap();
        self.renders
            .lock()
            .unwrap()
            .keys()
            .filter(|id| !reported.contains(id))
            .count()
    }
}

#[async_trait]
impl RenderService for FakeRenderService {
    async fn render_info(&self) -> Result<RenderInfo> {
        self.render_info_calls.fetch_add(1, Ordering::SeqCst);
        Ok(RenderInfo {
            service_url: "https://render.test".into(),
            access_token: "token".into(),
            results_url: Some("https://results.test/__random__".into()),
        })
    }

    async fn render_batch(&self, requests: &[RenderRequest]) -> Result<Vec<RunningRender>> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = &self.fail_batch {
            return Err(err.clone());
        }

        let answers = requests
            .iter()
            .map(|request| {
                let resubmitted = request.render_id().is_some();
                let render_id = match request.render_id() {
                    Some(id) => id.to_string(),
                    None => {
                        self.requests.lock().unwrap().push((
                            request.url.clone(),
                            request.resources.keys().cloned().collect(),
                        ));
                        let id = format!("r-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
                        self.renders
                            .lock()
                            .unwrap()
                            .insert(id.clone(), (request.url.clone(), Instant::now()));
                        id
                    }
                };
                let missing = self.always_missing || (self.ask_for_resources && !resubmitted);
                if missing {
                    RunningRender {
                        render_id: Some(render_id),
                        render_status: RenderStatus::NeedMoreResources,
                        need_more_resources: request.resources.keys().cloned().collect(),
                        need_more_dom: true,
                    }
                } else {
                    RunningRender {
                        render_id: Some(render_id),
                        render_status: RenderStatus::Rendering,
                        need_more_resources: Vec::new(),
                        need_more_dom: false,
                    }
                }
            })
            .collect();
        self.max_in_progress
            .fetch_max(self.in_progress(), Ordering::SeqCst);
        Ok(answers)
    }

    async fn put_resource(&self, _render: &RunningRender, resource: &Resource) -> Result<String> {
        self.puts.lock().unwrap().push(resource.upload_key());
        Ok(format!("ack-{}", resource.sha256))
    }

    async fn render_status(&self, render_ids: &[String]) -> Result<Vec<RenderStatusResult>> {
        self.status_queries.fetch_add(1, Ordering::SeqCst);
        let renders = self.renders.lock().unwrap().clone();
        let mut reported = self.reported.lock().unwrap();

        Ok(render_ids
            .iter()
            .map(|id| {
                let Some((url, submitted)) = renders.get(id) else {
                    return RenderStatusResult::with_status(RenderStatus::Error);
                };
                let status = match self.plan_for(url) {
                    Plan::RenderedAfter(delay) if submitted.elapsed() >= delay => {
                        RenderStatus::Rendered
                    }
                    Plan::ErrorAfter(delay) if submitted.elapsed() >= delay => RenderStatus::Error,
                    _ => RenderStatus::Rendering,
                };
                if status.is_terminal() && !reported.contains(id) {
                    reported.push(id.clone());
                }
                let mut result = RenderStatusResult::with_status(status);
                result.render_id = Some(id.clone());
                if status == RenderStatus::Rendered {
                    result.image_location = Some(format!("https://img.test/{id}.png"));
                    result.dom_location = Some(format!("https://dom.test/{id}.json"));
                    result.user_agent = Some(USER_AGENT.into());
                    result.device_size = Some(Viewport {
                        width: 1024,
                        height: 768,
                    });
                }
                if status == RenderStatus::Error {
                    result.error = Some("renderer crashed".into());
                }
                result
            })
            .collect())
    }
}

#[derive(Default)]
pub struct FakeFetcher {
    pub pages: HashMap<String, (String, Vec<u8>)>,
    pub delay: Duration,
    pub fetches: Mutex<HashMap<String, usize>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, content_type: &str, body: &str) -> Self {
        self.pages
            .insert(url.to_string(), (content_type.to_string(), body.as_bytes().to_vec()));
        self
    }

    pub fn fetch_count(&self, url: &str) -> usize {
        self.fetches.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<Resource> {
        *self.fetches.lock().unwrap().entry(url.to_string()).or_default() += 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.pages.get(url) {
            Some((content_type, body)) => Ok(Resource::new(
                url,
                content_type.as_str(),
                Bytes::from(body.clone()),
            )),
            None => Err(VgcError::Network(format!("GET {url} returned status 404"))),
        }
    }
}

/// Records everything the pipeline asks of a session. `events` may be shared
/// between sessions to observe ordering across tests.
pub struct FakeSession {
    pub name: String,
    pub events: Arc<Mutex<Vec<String>>>,
    pub open_delay: Duration,
    pub matches: Mutex<Vec<MatchRequest>>,
    pub environment: Mutex<Option<String>>,
    pub viewport: Mutex<Option<Viewport>>,
    pub device_info: Mutex<Option<String>>,
    pub opened: Mutex<bool>,
    pub aborted: Mutex<bool>,
}

impl FakeSession {
    pub fn new(name: &str) -> Arc<Self> {
        Self::with_events(name, Arc::new(Mutex::new(Vec::new())), Duration::ZERO)
    }

    pub fn with_events(
        name: &str,
        events: Arc<Mutex<Vec<String>>>,
        open_delay: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            events,
            open_delay,
            matches: Mutex::new(Vec::new()),
            environment: Mutex::new(None),
            viewport: Mutex::new(None),
            device_info: Mutex::new(None),
            opened: Mutex::new(false),
            aborted: Mutex::new(false),
        })
    }

    pub fn tags(&self) -> Vec<String> {
        self.matches
            .lock()
            .unwrap()
            .iter()
            .map(|request| request.tag.clone().unwrap_or_default())
            .collect()
    }

    fn event(&self, what: &str) {
        self.events
            .lock()
            .unwrap()
            .push(format!("{what}:{}", self.name));
    }
}

#[async_trait]
impl TestSession for FakeSession {
    async fn open(&self, _config: &ResolvedTestConfig, browser: &BrowserInfo) -> Result<()> {
        self.event("open");
        *self.device_info.lock().unwrap() = Some(browser.device_info());
        if !self.open_delay.is_zero() {
            tokio::time::sleep(self.open_delay).await;
        }
        *self.opened.lock().unwrap() = true;
        Ok(())
    }

    async fn check_window(&self, request: MatchRequest) -> Result<MatchResult> {
        self.event("match");
        let result = MatchResult::from_request(&request, Some(true));
        self.matches.lock().unwrap().push(request);
        Ok(result)
    }

    async fn close(&self) -> Result<Vec<MatchResult>> {
        self.event("close");
        Ok(self
            .matches
            .lock()
            .unwrap()
            .iter()
            .map(|request| MatchResult::from_request(request, Some(true)))
            .collect())
    }

    async fn abort(&self) -> Result<()> {
        self.event("abort");
        *self.aborted.lock().unwrap() = true;
        Ok(())
    }

    fn set_inferred_environment(&self, environment: &str) {
        *self.environment.lock().unwrap() = Some(environment.to_string());
    }

    fn set_viewport_size(&self, viewport: Viewport) {
        *self.viewport.lock().unwrap() = Some(viewport);
    }
}

/// Client config with short intervals for tests.
pub fn config(concurrency: usize, render_concurrency_factor: usize) -> ClientConfig {
    ClientConfig {
        concurrency,
        render_concurrency_factor,
        render_status_interval: Duration::from_millis(10),
        render_status_timeout: Duration::from_secs(5),
        fetch_retries: 1,
        session: SessionDefaults {
            app_name: Some("app".into()),
            ..SessionDefaults::default()
        },
        ..ClientConfig::default()
    }
}

pub fn client(
    config: ClientConfig,
    service: Arc<FakeRenderService>,
    fetcher: Arc<FakeFetcher>,
) -> GridClient {
    GridClient::new(config, service, fetcher).unwrap()
}

pub fn sessions(fakes: &[Arc<FakeSession>]) -> Vec<Arc<dyn TestSession>> {
    fakes
        .iter()
        .map(|fake| fake.clone() as Arc<dyn TestSession>)
        .collect()
}

pub fn check(url: &str, tag: &str) -> CheckWindowArgs {
    CheckWindowArgs::new(url, DomSnapshot::default()).with_tag(tag)
}

pub fn browsers(count: usize) -> Vec<BrowserInfo> {
    (0..count)
        .map(|index| BrowserInfo::desktop(format!("browser-{index}"), 800 + index as u32, 600))
        .collect()
}
