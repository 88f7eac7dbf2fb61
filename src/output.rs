use crate::error::ErrorPayload;
use crate::types::{MatchResult, RenderInfo, RenderStatusResult};
use serde::{Deserialize, Serialize};

/// Schema version for output payloads.
pub const VGC_OUTPUT_VERSION: &str = "0.1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum VgcOutput {
    RenderInfo(RenderInfoOutput),
    Status(StatusOutput),
    Check(CheckOutput),
    Error(ErrorOutput),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderInfoOutput {
    pub version: String,
    pub service_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results_url: Option<String>,
}

impl RenderInfoOutput {
    /// The access token is never printed.
    pub fn new(info: &RenderInfo) -> Self {
        Self {
            version: VGC_OUTPUT_VERSION.to_string(),
            service_url: info.service_url.clone(),
            results_url: info.results_url.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusOutput {
    pub version: String,
    pub statuses: Vec<RenderStatusResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckOutput {
    pub version: String,
    pub app_name: String,
    pub test_name: String,
    pub passed: bool,
    pub browsers: Vec<BrowserResults>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserResults {
    pub browser: String,
    pub width: u32,
    pub height: u32,
    /// Emulated device, when the browser is not a desktop window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    pub results: Vec<MatchResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorOutput {
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub error: ErrorPayload,
}
