//! Entry point for callers: a [`GridClient`] opens tests and hands back a
//! [`TestHandle`] per test.

use futures::future::{try_join_all, FutureExt};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

use crate::check_window::{CheckWindowPipeline, RenderEngine, SessionOpen};
use crate::concurrency::{ConcurrencyManager, SessionSlot};
use crate::config::{is_disabled, ClientConfig, ResolvedTestConfig, TestConfig};
use crate::error::{Result, VgcError};
use crate::fetch::{Fetcher, HttpFetcher};
use crate::http_service::HttpRenderService;
use crate::resource_cache::ResourceCache;
use crate::service::RenderService;
use crate::session::TestSession;
use crate::types::{CheckWindowArgs, MatchResult, RenderInfo};

pub struct GridClient {
    config: ClientConfig,
    engine: Arc<RenderEngine>,
    gate: ConcurrencyManager,
    batch_id: String,
}

impl GridClient {
    pub fn new(
        config: ClientConfig,
        service: Arc<dyn RenderService>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self> {
        config.validate()?;
        let engine = Arc::new(RenderEngine::new(&config, service, fetcher));
        let gate = ConcurrencyManager::new(config.concurrency);
        let batch_id = config
            .session
            .batch_id
            .clone()
            .unwrap_or_else(generate_batch_id);
        debug!(
            concurrency = config.concurrency,
            render_concurrency = config.render_concurrency(),
            batch_id = %batch_id,
            "grid client created"
        );
        Ok(Self {
            config,
            engine,
            gate,
            batch_id,
        })
    }

    /// A client talking to the configured server over HTTP.
    pub fn from_config(config: ClientConfig) -> Result<Self> {
        let service = Arc::new(HttpRenderService::new(&config)?);
        let fetcher = Arc::new(HttpFetcher::new(config.fetch_timeout, config.proxy.as_deref())?);
        Self::new(config, service, fetcher)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn batch_id(&self) -> &str {
        &self.batch_id
    }

    pub fn engine(&self) -> &Arc<RenderEngine> {
        &self.engine
    }

    pub fn resource_cache(&self) -> &Arc<ResourceCache> {
        self.engine.resource_cache()
    }

    pub async fn render_info(&self) -> Result<RenderInfo> {
        self.engine.render_info().await
    }

    /// Open a test with one session per browser, in browser order.
    ///
    /// Waits for a free slot in the open/close gate. The sessions open in
    /// the background; check windows may be issued right away. A disabled
    /// test gets a handle whose operations do nothing.
    pub async fn open_test(
        &self,
        test: TestConfig,
        sessions: Vec<Arc<dyn TestSession>>,
    ) -> Result<TestHandle> {
        if is_disabled(&test, &self.config.session) {
            info!(test = ?test.test_name, "test is disabled");
            return Ok(TestHandle { open: None });
        }

        let resolved = Arc::new(ResolvedTestConfig::resolve(
            &test,
            &self.config.session,
            &self.batch_id,
        )?);
        if sessions.len() != resolved.browsers.len() {
            return Err(VgcError::Config(format!(
                "{} browsers configured but {} sessions supplied",
                resolved.browsers.len(),
                sessions.len()
            )));
        }

        let slot = self.gate.acquire().await?;
        info!(app = %resolved.app_name, test = %resolved.test_name, browsers = resolved.browsers.len(), "opening test");

        let opened = open_sessions(resolved.clone(), sessions.clone());
        let pipeline = CheckWindowPipeline::new(
            resolved.test_name.clone(),
            self.engine.clone(),
            resolved.browsers.clone(),
            resolved.match_level,
            sessions,
            opened,
        );
        Ok(TestHandle {
            open: Some(OpenTest {
                pipeline,
                _slot: slot,
            }),
        })
    }
}

/// Start every session open now and share the outcome.
fn open_sessions(config: Arc<ResolvedTestConfig>, sessions: Vec<Arc<dyn TestSession>>) -> SessionOpen {
    let task = tokio::spawn(async move {
        try_join_all(
            sessions
                .iter()
                .zip(&config.browsers)
                .map(|(session, browser)| session.open(&config, browser)),
        )
        .await
        .map(|_| ())
    });
    async move {
        task.await
            .unwrap_or_else(|err| Err(VgcError::Unknown(format!("session open panicked: {err}"))))
    }
    .boxed()
    .shared()
}

fn generate_batch_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default();
    format!("{millis:x}-{}", std::process::id())
}

/// One open test. Dropping the handle without closing it leaves its jobs
/// running but releases its gate slot.
pub struct TestHandle {
    open: Option<OpenTest>,
}

struct OpenTest {
    pipeline: CheckWindowPipeline,
    _slot: SessionSlot,
}

impl TestHandle {
    pub fn is_disabled(&self) -> bool {
        self.open.is_none()
    }

    /// Fire-and-forget. Failures surface from [`close`](Self::close).
    pub fn check_window(&self, args: CheckWindowArgs) {
        match &self.open {
            Some(open) => open.pipeline.check_window(args),
            None => debug!(tag = ?args.tag, "check window ignored on a disabled test"),
        }
    }

    /// Wait for every check window, close the sessions and return one result
    /// list per browser, or the first error the test hit.
    pub async fn close(self) -> Result<Vec<Vec<MatchResult>>> {
        match self.open {
            Some(open) => open.pipeline.close().await,
            None => Ok(Vec::new()),
        }
    }

    pub async fn abort(self) -> Result<()> {
        match self.open {
            Some(open) => open.pipeline.abort().await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_ids_carry_the_process_id() {
        let id = generate_batch_id();
        assert!(id.ends_with(&format!("-{}", std::process::id())));
    }
}
