//! The test-session collaborator: whatever performs the visual match for one
//! browser of one test.

use async_trait::async_trait;
use std::sync::Mutex;
use tracing::debug;

use crate::config::ResolvedTestConfig;
use crate::error::{Result, VgcError};
use crate::types::{BrowserInfo, MatchRequest, MatchResult, Viewport};

#[async_trait]
pub trait TestSession: Send + Sync {
    async fn open(&self, config: &ResolvedTestConfig, browser: &BrowserInfo) -> Result<()>;

    async fn check_window(&self, request: MatchRequest) -> Result<MatchResult>;

    /// Finish the session and report every match it performed.
    async fn close(&self) -> Result<Vec<MatchResult>>;

    async fn abort(&self) -> Result<()>;

    /// Environment the render actually ran in, e.g. `useragent:<ua>`.
    fn set_inferred_environment(&self, environment: &str);

    fn set_viewport_size(&self, viewport: Viewport);
}

/// A session that performs no comparison: every checkpoint is recorded with
/// its screenshot location and reported back on close.
#[derive(Debug, Default)]
pub struct RenderOnlySession {
    state: Mutex<RenderOnlyState>,
}

#[derive(Debug, Default)]
struct RenderOnlyState {
    opened: bool,
    closed: bool,
    results: Vec<MatchResult>,
    environment: Option<String>,
    viewport: Option<Viewport>,
    device_info: Option<String>,
}

impl RenderOnlySession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn environment(&self) -> Option<String> {
        self.lock().environment.clone()
    }

    pub fn viewport(&self) -> Option<Viewport> {
        self.lock().viewport
    }

    pub fn device_info(&self) -> Option<String> {
        self.lock().device_info.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RenderOnlyState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl TestSession for RenderOnlySession {
    async fn open(&self, config: &ResolvedTestConfig, browser: &BrowserInfo) -> Result<()> {
        let device_info = browser.device_info();
        debug!(
            test = %config.test_name,
            browser = %browser.label(),
            device = %device_info,
            "render-only session opened"
        );
        let mut state = self.lock();
        state.opened = true;
        state.viewport = browser.viewport();
        state.device_info = Some(device_info);
        Ok(())
    }

    async fn check_window(&self, request: MatchRequest) -> Result<MatchResult> {
        let mut state = self.lock();
        if !state.opened || state.closed {
            return Err(VgcError::session("check_window on a session that is not open"));
        }
        let result = MatchResult::from_request(&request, None);
        state.results.push(result.clone());
        Ok(result)
    }

    async fn close(&self) -> Result<Vec<MatchResult>> {
        let mut state = self.lock();
        state.closed = true;
        Ok(std::mem::take(&mut state.results))
    }

    async fn abort(&self) -> Result<()> {
        self.lock().closed = true;
        Ok(())
    }

    fn set_inferred_environment(&self, environment: &str) {
        self.lock().environment = Some(environment.to_string());
    }

    fn set_viewport_size(&self, viewport: Viewport) {
        self.lock().viewport = Some(viewport);
    }
}
