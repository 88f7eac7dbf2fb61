//! Upload of the DOM and resources a running render reports as missing.

use futures::future::{try_join_all, BoxFuture, FutureExt, Shared};
use std::sync::Arc;
use tracing::debug;

use crate::error::{Result, VgcError};
use crate::fetch::FetchResource;
use crate::resource_cache::ResourceCache;
use crate::service::RenderService;
use crate::types::{RenderDom, RenderStatus, Resource, RunningRender};

type SharedUpload = Shared<BoxFuture<'static, Result<String>>>;

/// Uploads keyed by `{url|dom}_{sha256}`. Concurrent requests for the same
/// key share a single upload, and every caller receives that upload's
/// acknowledgement.
pub struct PutResources {
    service: Arc<dyn RenderService>,
    fetch: Arc<FetchResource>,
    in_flight: ResourceCache<SharedUpload>,
}

impl PutResources {
    pub fn new(service: Arc<dyn RenderService>, fetch: Arc<FetchResource>) -> Self {
        Self {
            service,
            fetch,
            in_flight: ResourceCache::new(),
        }
    }

    /// Upload what `running` is missing. Acknowledgements come back as
    /// `[dom, resources...]`, the resources in the order the render listed
    /// them.
    pub async fn put_resources(&self, dom: &RenderDom, running: &RunningRender) -> Result<Vec<String>> {
        let mut uploads = Vec::with_capacity(running.need_more_resources.len() + 1);
        if running.need_more_dom || running.render_status == RenderStatus::NeedMoreDom {
            uploads.push(dom.as_resource()?);
        }
        for url in &running.need_more_resources {
            uploads.push(self.resolve(dom, url).await?);
        }

        debug!(
            render_id = running.render_id.as_deref().unwrap_or_default(),
            count = uploads.len(),
            "uploading missing resources"
        );
        try_join_all(uploads.into_iter().map(|resource| self.put_once(running, resource))).await
    }

    async fn put_once(&self, running: &RunningRender, resource: Resource) -> Result<String> {
        let key = resource.upload_key();
        let upload = self.in_flight.get_or_insert_with(&key, || {
            let service = self.service.clone();
            let running = running.clone();
            let key = key.clone();
            async move {
                debug!(key = %key, bytes = resource.len(), "put resource");
                service.put_resource(&running, &resource).await
            }
            .boxed()
            .shared()
        });

        let ack = upload.clone().await;
        // settled uploads are not reused: a later render only asks for a
        // resource again if the service no longer has it
        self.in_flight.remove_if(&key, |stored| stored.ptr_eq(&upload));
        ack
    }

    async fn resolve(&self, dom: &RenderDom, url: &str) -> Result<Resource> {
        let Some(known) = dom.resources.get(url) else {
            return Err(VgcError::protocol(format!(
                "render asked for a resource that is not part of the request: {url}"
            )));
        };
        if known.content.is_some() {
            return Ok(known.clone());
        }
        // only the hash was kept after an earlier upload
        if url.starts_with("http://") || url.starts_with("https://") {
            return self.fetch.fetch(url).await;
        }
        Err(VgcError::protocol(format!(
            "content for {url} is no longer available for upload"
        )))
    }
}
