use async_trait::async_trait;

use crate::error::Result;
use crate::types::{RenderInfo, RenderRequest, RenderStatusResult, Resource, RunningRender};

/// The remote rendering service, seen from the client.
///
/// Implementations map transport failures to [`crate::VgcError`]; 401, 403
/// and 400 responses become `Auth`, `QuotaOrAccess` and `BadRequest`.
#[async_trait]
pub trait RenderService: Send + Sync {
    /// Connection details for this client. Called once and cached.
    async fn render_info(&self) -> Result<RenderInfo>;

    /// Submit renders. The answer has one entry per request, in order.
    async fn render_batch(&self, requests: &[RenderRequest]) -> Result<Vec<RunningRender>>;

    /// Upload one resource on behalf of `render`. Returns the service's
    /// acknowledgement.
    async fn put_resource(&self, render: &RunningRender, resource: &Resource) -> Result<String>;

    /// Current status of each id, in order.
    async fn render_status(&self, render_ids: &[String]) -> Result<Vec<RenderStatusResult>>;
}
