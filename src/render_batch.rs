//! Render submission and the need-more-resources negotiation.
//!
//! A submission either comes back identified, or asks for missing DOM or
//! resources. Missing content is uploaded and only the renders that asked are
//! resubmitted, once. A second request for more content is a protocol error.

use futures::future::try_join_all;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{Result, VgcError};
use crate::put_resources::PutResources;
use crate::resource_cache::ResourceCache;
use crate::service::RenderService;
use crate::types::{RenderRequest, RunningRender};

pub struct RenderBatch {
    service: Arc<dyn RenderService>,
    put_resources: Arc<PutResources>,
    resource_cache: Arc<ResourceCache>,
}

impl RenderBatch {
    pub fn new(
        service: Arc<dyn RenderService>,
        put_resources: Arc<PutResources>,
        resource_cache: Arc<ResourceCache>,
    ) -> Self {
        Self {
            service,
            put_resources,
            resource_cache,
        }
    }

    /// Submit `requests` and return their render ids in input order. Each
    /// request gets its id attached. Any failure fails the whole batch.
    pub async fn submit(&self, requests: &mut [RenderRequest]) -> Result<Vec<String>> {
        let running = self.send(requests).await?;

        let mut render_ids = Vec::with_capacity(running.len());
        for (request, render) in requests.iter_mut().zip(&running) {
            let render_id = render.render_id.clone().ok_or_else(|| {
                VgcError::protocol("rendering service returned a render without an id")
            })?;
            request.assign_render_id(render_id.as_str());
            render_ids.push(render_id);
        }

        let requests: &[RenderRequest] = requests;
        let pending: Vec<usize> = running
            .iter()
            .enumerate()
            .filter(|(_, render)| render.needs_upload())
            .map(|(index, _)| index)
            .collect();

        if !pending.is_empty() {
            debug!(count = pending.len(), "renders need more content");
            try_join_all(pending.iter().map(|&index| {
                self.put_resources
                    .put_resources(&requests[index].dom, &running[index])
            }))
            .await?;

            let resubmit: Vec<RenderRequest> =
                pending.iter().map(|&index| requests[index].clone()).collect();
            let answers = self.send(&resubmit).await?;
            if let Some(still_missing) = answers.iter().find(|render| render.needs_upload()) {
                return Err(VgcError::protocol(format!(
                    "render {} asked for more content after its upload",
                    still_missing.render_id.as_deref().unwrap_or("<unknown>")
                )));
            }
        }

        // everything a submitted request referenced is now on the service
        for request in requests {
            for (url, resource) in &request.resources {
                self.resource_cache.set_value(url, resource.uploaded());
            }
        }

        info!(render_ids = ?render_ids, "renders submitted");
        Ok(render_ids)
    }

    async fn send(&self, requests: &[RenderRequest]) -> Result<Vec<RunningRender>> {
        let running = self.service.render_batch(requests).await?;
        if running.len() != requests.len() {
            return Err(VgcError::protocol(format!(
                "rendering service answered {} of {} render requests",
                running.len(),
                requests.len()
            )));
        }
        Ok(running)
    }
}
