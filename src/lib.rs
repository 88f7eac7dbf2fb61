//! Visual Grid Client (VGC) Library
//!
//! Client-side orchestration for a remote rendering grid. A test issues
//! check windows against several simulated browsers; the client collects
//! and uploads the page's resources, submits renders behind a global
//! throttle, polls their status in batches and hands each finished render to
//! the test session in the order the checkpoints were issued.
//!
//! # Module Overview
//!
//! - [`client`] - [`GridClient`] and per-test [`TestHandle`]
//! - [`check_window`] - Per-browser job chains and the shared render engine
//! - [`resource_cache`] - Content-addressed cache with dependency edges
//! - [`fetch`] - Retrying, deduplicated resource fetches
//! - [`resources`] - Resource collection, including CSS references
//! - [`render_request`] - Render requests built from a checkpoint
//! - [`put_resources`] / [`render_batch`] - Upload and submission negotiation
//! - [`throttle`] - Render admission gate with explicit leases
//! - [`status_poller`] - Batched render-status polling
//! - [`concurrency`] - Open/close gate for tests
//! - [`config`] - Client and per-test configuration
//! - [`output`] - JSON output schemas
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vgc_lib::{CheckWindowArgs, ClientConfig, DomSnapshot, GridClient, RenderOnlySession};
//! use vgc_lib::{TestConfig, TestSession};
//!
//! # async fn example() -> vgc_lib::Result<()> {
//! let client = GridClient::from_config(ClientConfig::load(None)?)?;
//! let session: Arc<dyn TestSession> = Arc::new(RenderOnlySession::new());
//! let test = client
//!     .open_test(TestConfig::named("shop", "checkout"), vec![session])
//!     .await?;
//!
//! test.check_window(CheckWindowArgs::new("https://shop.test/cart", DomSnapshot::default()));
//! let results = test.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod check_window;
pub mod client;
pub mod concurrency;
pub mod config;
pub mod css;
pub mod error;
pub mod fetch;
pub mod http_service;
pub mod latch;
pub mod match_regions;
pub mod output;
pub mod put_resources;
pub mod render_batch;
pub mod render_request;
pub mod resource_cache;
pub mod resources;
pub mod service;
pub mod session;
pub mod status_poller;
pub mod throttle;
pub mod types;

pub use check_window::{CheckWindowPipeline, RenderEngine};
pub use client::{GridClient, TestHandle};
pub use concurrency::{ConcurrencyManager, SessionSlot};
pub use config::{ClientConfig, Property, ResolvedTestConfig, SessionDefaults, TestConfig};
pub use error::{ErrorCategory, ErrorPayload, Result, VgcError};
pub use fetch::{FetchResource, Fetcher, HttpFetcher};
pub use http_service::HttpRenderService;
pub use latch::ErrorLatch;
pub use match_regions::calculate_match_regions;
pub use output::{
    BrowserResults, CheckOutput, ErrorOutput, RenderInfoOutput, StatusOutput, VgcOutput,
    VGC_OUTPUT_VERSION,
};
pub use put_resources::PutResources;
pub use render_batch::RenderBatch;
pub use render_request::create_render_requests;
pub use resource_cache::ResourceCache;
pub use resources::ResourceCollector;
pub use service::RenderService;
pub use session::{RenderOnlySession, TestSession};
pub use status_poller::RenderStatusPoller;
pub use throttle::{RenderLease, RenderThrottle};
pub use types::{
    BlobResource, BrowserInfo, CdtNode, CheckSettings, CheckWindowArgs, DomSnapshot,
    FloatingRegion, FloatingRegionSpec, FrameSnapshot, MatchLevel, MatchRegions, MatchRequest,
    MatchResult, Region, RegionSpec, RenderDom, RenderInfo, RenderRequest, RenderStatus, RenderStatusResult, Resource,
    RunningRender, ScreenOrientation, SizeMode, Viewport,
};
