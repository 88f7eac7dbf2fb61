//! Resource collection for one checkpoint.
//!
//! URLs are absolutized against the page URL, caller-supplied blobs are
//! registered as-is, and everything else goes through [`FetchResource`].
//! Stylesheets are scanned for further references, which are fetched too
//! and recorded as dependencies of the stylesheet.
//!
//! Frames are collected like pages and handed back as resources of their
//! parent: the frame's own resources plus its serialized DOM, keyed by the
//! frame URL.
//!
//! Each URL is scanned by one shared future that fetches it and records its
//! dependencies without waiting on them. A collection walks the dependency
//! graph and awaits the scan of every URL it reaches, so overlapping
//! collections see complete results and reference cycles cannot deadlock.

use bytes::Bytes;
use futures::future::{ready, try_join_all, BoxFuture, FutureExt, Shared};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

use crate::css::{absolutize, extract_css_resources_from_cdt, extract_css_urls};
use crate::error::Result;
use crate::fetch::FetchResource;
use crate::resource_cache::ResourceCache;
use crate::types::{BlobResource, FrameSnapshot, RenderDom, Resource};

type SharedScan = Shared<BoxFuture<'static, Result<Vec<String>>>>;

pub struct ResourceCollector {
    cache: Arc<ResourceCache>,
    fetch: Arc<FetchResource>,
    scans: ResourceCache<SharedScan>,
}

impl ResourceCollector {
    pub fn new(cache: Arc<ResourceCache>, fetch: Arc<FetchResource>) -> Self {
        Self {
            cache,
            fetch,
            scans: ResourceCache::new(),
        }
    }

    pub fn cache(&self) -> &Arc<ResourceCache> {
        &self.cache
    }

    /// Collect `urls` and `contents` plus everything they transitively
    /// reference, keyed by absolute URL.
    pub async fn collect(
        &self,
        base_url: &str,
        urls: &[String],
        contents: &HashMap<String, BlobResource>,
    ) -> Result<BTreeMap<String, Resource>> {
        let mut roots: Vec<String> = Vec::new();

        for (url, blob) in contents {
            let Some(absolute) = absolutize(base_url, url) else {
                continue;
            };
            let resource = Resource::new(
                absolute.as_str(),
                blob.content_type.as_str(),
                Bytes::from(blob.value.clone()),
            );
            self.register_blob(&absolute, resource);
            roots.push(absolute);
        }

        for url in urls {
            let Some(absolute) = absolutize(base_url, url) else {
                debug!(url = %url, "skipping unresolvable resource url");
                continue;
            };
            if roots.contains(&absolute) {
                continue;
            }
            if !is_fetchable(&absolute) {
                debug!(url = %absolute, "skipping non-http resource without content");
                continue;
            }
            roots.push(absolute);
        }

        self.await_reachable(&roots).await?;

        let mut collected = BTreeMap::new();
        for root in &roots {
            collected.extend(self.cache.get_with_dependencies(root));
        }
        debug!(
            roots = roots.len(),
            total = collected.len(),
            "collected resources"
        );
        Ok(collected)
    }

    /// Collect every frame in `frames`, nested frames included. Relative
    /// frame URLs resolve against `base_url`.
    pub fn collect_frames<'a>(
        &'a self,
        base_url: &'a str,
        frames: &'a [FrameSnapshot],
    ) -> BoxFuture<'a, Result<BTreeMap<String, Resource>>> {
        async move {
            let mut collected = BTreeMap::new();
            for frame in frames {
                let Some(frame_url) = absolutize(base_url, &frame.url) else {
                    debug!(url = %frame.url, "skipping frame with an unresolvable url");
                    continue;
                };
                let mut urls = frame.resource_urls.clone();
                urls.extend(extract_css_resources_from_cdt(&frame.snapshot, &frame_url));
                let mut resources = self
                    .collect(&frame_url, &urls, &frame.resource_contents)
                    .await?;
                resources.extend(self.collect_frames(&frame_url, &frame.frames).await?);

                let document = RenderDom::new(frame.snapshot.clone(), resources.clone())
                    .as_frame_resource(&frame_url)?;
                debug!(url = %frame_url, resources = resources.len(), "collected frame");
                collected.extend(resources);
                collected.insert(frame_url, document);
            }
            Ok(collected)
        }
        .boxed()
    }

    /// Record a serialized DOM in the cache with its resources as
    /// dependencies. Returns the cache key.
    pub fn register_dom(&self, dom: &Resource, dependencies: Vec<String>) -> String {
        let key = dom.upload_key();
        self.cache.set_value(&key, dom.clone());
        self.cache.set_dependencies(&key, dependencies);
        key
    }

    /// Store caller-supplied content under `url`. Its scan is complete at
    /// once, so a stylesheet that references the blob does not fetch it.
    fn register_blob(&self, url: &str, resource: Resource) {
        self.cache.set_value(url, resource.clone());
        let dependencies = record_dependencies(&self.cache, url, &resource);
        self.scans.set_value(url, ready(Ok(dependencies)).boxed().shared());
    }

    /// Await the scan of every URL reachable from `roots`, level by level.
    async fn await_reachable(&self, roots: &[String]) -> Result<()> {
        let mut seen: HashSet<String> = roots.iter().cloned().collect();
        let mut frontier: Vec<String> = roots.to_vec();

        while !frontier.is_empty() {
            let level = std::mem::take(&mut frontier);
            let found = try_join_all(level.into_iter().map(|url| self.scanned(url))).await?;
            for dependency in found.into_iter().flatten() {
                let scannable = is_fetchable(&dependency) || self.scans.contains(&dependency);
                if scannable && seen.insert(dependency.clone()) {
                    frontier.push(dependency);
                }
            }
        }
        Ok(())
    }

    async fn scanned(&self, url: String) -> Result<Vec<String>> {
        let scan = self.scans.get_or_insert_with(&url, || {
            scan_url(self.cache.clone(), self.fetch.clone(), url.clone())
                .boxed()
                .shared()
        });

        let result = scan.clone().await;
        if result.is_err() {
            self.scans.remove_if(&url, |stored| stored.ptr_eq(&scan));
        }
        result
    }
}

/// Fetch `url` into the cache and return its dependencies.
async fn scan_url(
    cache: Arc<ResourceCache>,
    fetch: Arc<FetchResource>,
    url: String,
) -> Result<Vec<String>> {
    let resource = fetch.fetch(&url).await?;
    cache.set_value(&url, resource.clone());
    Ok(record_dependencies(&cache, &url, &resource))
}

fn record_dependencies(cache: &ResourceCache, url: &str, resource: &Resource) -> Vec<String> {
    if !resource.is_css() {
        return Vec::new();
    }
    let Some(content) = &resource.content else {
        return Vec::new();
    };
    let css = String::from_utf8_lossy(content);
    let dependencies: Vec<String> = extract_css_urls(&css)
        .iter()
        .filter_map(|reference| absolutize(url, reference))
        .filter(|dependency| is_fetchable(dependency) || cache.contains(dependency))
        .collect();
    if !dependencies.is_empty() {
        debug!(url = %url, count = dependencies.len(), "stylesheet dependencies");
        cache.set_dependencies(url, dependencies.clone());
    }
    dependencies
}

fn is_fetchable(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}
