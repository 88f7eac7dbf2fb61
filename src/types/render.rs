//! Render request and status types exchanged with the rendering service.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::browser::{BrowserInfo, Viewport};
use super::core::Region;
use super::dom::RenderDom;
use super::resource::Resource;
use crate::error::{Result, VgcError};

/// Status of a render as reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RenderStatus {
    NeedMoreResources,
    NeedMoreDom,
    Rendering,
    Rendered,
    Error,
}

impl RenderStatus {
    /// `Rendered` and `Error` never transition further.
    pub fn is_terminal(self) -> bool {
        matches!(self, RenderStatus::Rendered | RenderStatus::Error)
    }
}

/// Answer to a render submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunningRender {
    #[serde(default)]
    pub render_id: Option<String>,
    pub render_status: RenderStatus,
    #[serde(default)]
    pub need_more_resources: Vec<String>,
    #[serde(default)]
    pub need_more_dom: bool,
}

impl RunningRender {
    pub fn needs_upload(&self) -> bool {
        self.render_status == RenderStatus::NeedMoreResources
            || self.render_status == RenderStatus::NeedMoreDom
            || self.need_more_dom
            || !self.need_more_resources.is_empty()
    }
}

/// Result of a status poll for one render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderStatusResult {
    pub status: RenderStatus,
    #[serde(default)]
    pub render_id: Option<String>,
    #[serde(default)]
    pub image_location: Option<String>,
    #[serde(default)]
    pub dom_location: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub device_size: Option<Viewport>,
    /// Regions found for the selectors sent with the request, in order.
    #[serde(default)]
    pub selector_regions: Vec<Option<Region>>,
    #[serde(default)]
    pub error: Option<String>,
}

impl RenderStatusResult {
    pub fn with_status(status: RenderStatus) -> Self {
        Self {
            status,
            render_id: None,
            image_location: None,
            dom_location: None,
            user_agent: None,
            device_size: None,
            selector_regions: Vec::new(),
            error: None,
        }
    }

    /// Turn an `error` status into [`VgcError::RenderFailed`].
    pub fn into_rendered(self, render_id: &str) -> Result<Self> {
        match self.status {
            RenderStatus::Error => Err(VgcError::RenderFailed {
                render_id: render_id.to_string(),
                message: self.error,
            }),
            _ => Ok(self),
        }
    }
}

/// Connection details handed out by the service once per client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderInfo {
    pub service_url: String,
    pub access_token: String,
    #[serde(default)]
    pub results_url: Option<String>,
}

/// What part of the page is captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SizeMode {
    #[default]
    FullPage,
    Viewport,
    Selector,
    Region,
}

impl SizeMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SizeMode::FullPage => "full-page",
            SizeMode::Viewport => "viewport",
            SizeMode::Selector => "selector",
            SizeMode::Region => "region",
        }
    }
}

/// One render of one checkpoint in one browser.
///
/// Built once and not mutated afterwards, except for attaching the render id
/// assigned by the service.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    pub webhook: Option<String>,
    pub url: String,
    pub dom: RenderDom,
    pub resources: BTreeMap<String, Resource>,
    pub browser: BrowserInfo,
    pub size_mode: SizeMode,
    pub selector: Option<String>,
    pub region: Option<Region>,
    pub script_hooks: Option<serde_json::Value>,
    pub selectors_to_find_regions_for: Vec<String>,
    render_id: Option<String>,
}

impl RenderRequest {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        webhook: Option<String>,
        url: String,
        dom: RenderDom,
        browser: BrowserInfo,
        size_mode: SizeMode,
        selector: Option<String>,
        region: Option<Region>,
        script_hooks: Option<serde_json::Value>,
        selectors_to_find_regions_for: Vec<String>,
    ) -> Self {
        let resources = dom.resources.clone();
        Self {
            webhook,
            url,
            dom,
            resources,
            browser,
            size_mode,
            selector,
            region,
            script_hooks,
            selectors_to_find_regions_for,
            render_id: None,
        }
    }

    pub fn render_id(&self) -> Option<&str> {
        self.render_id.as_deref()
    }

    pub fn assign_render_id(&mut self, render_id: impl Into<String>) {
        self.render_id = Some(render_id.into());
    }
}
