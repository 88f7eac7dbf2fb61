//! Retrying, deduplicating resource fetches.

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{Result, VgcError};
use crate::resource_cache::ResourceCache;
use crate::types::Resource;

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Retrieves a single resource. One call is one attempt; retries live in
/// [`FetchResource`].
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Resource>;
}

/// [`Fetcher`] over plain HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, proxy: Option<&str>) -> Result<Self> {
        let mut builder = Client::builder().timeout(timeout);
        if let Some(proxy) = proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }
        Ok(Self {
            http: builder.build()?,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Resource> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let content = response.bytes().await?;
        Ok(fetched_resource(url, status, content_type.as_deref(), content))
    }
}

/// Whatever the server answered is the resource, error pages included. Only
/// transport failures count as failed fetches.
fn fetched_resource(
    url: &str,
    status: StatusCode,
    content_type: Option<&str>,
    content: Bytes,
) -> Resource {
    if !status.is_success() {
        warn!(url = %url, status = status.as_u16(), "resource answered with an error status");
    }
    Resource::new(
        url,
        content_type.unwrap_or(FALLBACK_CONTENT_TYPE),
        content,
    )
}

type SharedFetch = Shared<BoxFuture<'static, Result<Resource>>>;

/// Fetch-and-cache keyed by absolute URL.
///
/// Concurrent callers for the same URL share one in-flight fetch and every
/// later caller gets the cached result. A fetch that exhausts its retries is
/// evicted so a later call may try again.
pub struct FetchResource {
    fetcher: Arc<dyn Fetcher>,
    cache: ResourceCache<SharedFetch>,
    retries: u32,
    backoff: Duration,
}

impl FetchResource {
    pub fn new(fetcher: Arc<dyn Fetcher>, retries: u32, backoff: Duration) -> Self {
        Self {
            fetcher,
            cache: ResourceCache::new(),
            retries,
            backoff,
        }
    }

    pub async fn fetch(&self, url: &str) -> Result<Resource> {
        let pending = self.cache.get_or_insert_with(url, || {
            fetch_with_retries(self.fetcher.clone(), url.to_string(), self.retries, self.backoff)
                .boxed()
                .shared()
        });

        let result = pending.clone().await;
        if result.is_err() {
            self.cache.remove_if(url, |stored| stored.ptr_eq(&pending));
        }
        result
    }
}

async fn fetch_with_retries(
    fetcher: Arc<dyn Fetcher>,
    url: String,
    retries: u32,
    backoff: Duration,
) -> Result<Resource> {
    let mut attempt = 0;
    loop {
        if attempt == 0 {
            debug!(url = %url, "fetching resource");
        } else {
            debug!(url = %url, "fetching resource (retry {attempt}/{retries})");
        }

        match fetcher.fetch(&url).await {
            Ok(resource) => {
                debug!(url = %url, bytes = resource.len(), "fetched resource");
                return Ok(resource);
            }
            Err(err) if attempt < retries => {
                warn!(url = %url, error = %err, "fetch failed, retrying");
                attempt += 1;
                if !backoff.is_zero() {
                    tokio::time::sleep(backoff).await;
                }
            }
            Err(err) => {
                return Err(VgcError::Fetch {
                    url,
                    retries,
                    message: err.to_string(),
                });
            }
        }
    }
}
