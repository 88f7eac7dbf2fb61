//! [`RenderService`] over HTTP.
//!
//! Render info comes from the client's server; every other call goes to the
//! service URL the render info names, authenticated with its access token.

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::OnceCell;
use tracing::debug;
use url::Url;

use crate::config::ClientConfig;
use crate::error::{Result, VgcError};
use crate::service::RenderService;
use crate::types::{
    Region, RenderInfo, RenderRequest, RenderStatusResult, Resource, ResourceDescriptor,
    RunningRender, ScreenOrientation,
};

const API_KEY_HEADER: &str = "X-Api-Key";
const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

#[derive(Debug)]
pub struct HttpRenderService {
    http: Client,
    server_url: Url,
    api_key: Option<String>,
    render_info: OnceCell<RenderInfo>,
}

impl HttpRenderService {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let mut builder = Client::builder().timeout(config.fetch_timeout);
        if let Some(proxy) = &config.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy.as_str())?);
        }
        Ok(Self {
            http: builder.build()?,
            server_url: Url::parse(&config.server_url)?,
            api_key: config.api_key.clone(),
            render_info: OnceCell::new(),
        })
    }

    async fn session(&self) -> Result<&RenderInfo> {
        self.render_info
            .get_or_try_init(|| self.fetch_render_info())
            .await
    }

    async fn fetch_render_info(&self) -> Result<RenderInfo> {
        let api_key = self.api_key.as_deref().ok_or(VgcError::Auth)?;
        let url = endpoint(&self.server_url, "renderinfo")?;
        debug!(url = %url, "requesting render info");
        let request = self.http.get(url).header(API_KEY_HEADER, api_key);
        send_json(request).await
    }

    async fn render_endpoint(&self, path: &str) -> Result<(Url, &str)> {
        let info = self.session().await?;
        let base = Url::parse(&info.service_url)?;
        Ok((endpoint(&base, path)?, info.access_token.as_str()))
    }
}

#[async_trait]
impl RenderService for HttpRenderService {
    async fn render_info(&self) -> Result<RenderInfo> {
        self.session().await.cloned()
    }

    async fn render_batch(&self, requests: &[RenderRequest]) -> Result<Vec<RunningRender>> {
        let doms = requests
            .iter()
            .map(|request| request.dom.as_resource())
            .collect::<Result<Vec<_>>>()?;
        let body: Vec<WireRenderRequest<'_>> = requests
            .iter()
            .zip(&doms)
            .map(|(request, dom)| WireRenderRequest::new(request, dom))
            .collect();

        let (url, token) = self.render_endpoint("render").await?;
        debug!(url = %url, renders = body.len(), "submitting render batch");
        send_json(
            self.http
                .post(url)
                .header(AUTH_TOKEN_HEADER, token)
                .json(&body),
        )
        .await
    }

    async fn put_resource(&self, render: &RunningRender, resource: &Resource) -> Result<String> {
        let content = resource.content.clone().ok_or_else(|| {
            VgcError::protocol(format!(
                "resource {} has no content to upload",
                resource.url.as_deref().unwrap_or("dom")
            ))
        })?;
        let (mut url, token) = self
            .render_endpoint(&format!("resources/sha256/{}", resource.sha256))
            .await?;
        if let Some(render_id) = &render.render_id {
            url.query_pairs_mut().append_pair("render-id", render_id);
        }
        debug!(url = %url, bytes = content.len(), "uploading resource");

        let request = self
            .http
            .put(url)
            .header(AUTH_TOKEN_HEADER, token)
            .header(CONTENT_TYPE, resource.content_type.as_str())
            .body(content);
        let ack = send_text(request).await?;
        Ok(if ack.trim().is_empty() {
            resource.sha256.clone()
        } else {
            ack
        })
    }

    async fn render_status(&self, render_ids: &[String]) -> Result<Vec<RenderStatusResult>> {
        let (url, token) = self.render_endpoint("render-status").await?;
        send_json(
            self.http
                .post(url)
                .header(AUTH_TOKEN_HEADER, token)
                .json(render_ids),
        )
        .await
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireRenderRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    webhook: Option<&'a str>,
    url: &'a str,
    dom: ResourceDescriptor<'a>,
    resources: BTreeMap<&'a str, ResourceDescriptor<'a>>,
    browser: WireBrowser<'a>,
    render_info: WireRenderInfo<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    script_hooks: Option<&'a Value>,
    selectors_to_find_regions_for: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    render_id: Option<&'a str>,
    send_dom: bool,
}

#[derive(Serialize)]
struct WireBrowser<'a> {
    name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireRenderInfo<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    emulation_info: Option<WireEmulation<'a>>,
    size_mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    selector: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    region: Option<&'a Region>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireEmulation<'a> {
    device_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    screen_orientation: Option<&'static str>,
}

impl<'a> WireRenderRequest<'a> {
    fn new(request: &'a RenderRequest, dom: &'a Resource) -> Self {
        let viewport = request.browser.viewport();
        Self {
            webhook: request.webhook.as_deref(),
            url: &request.url,
            dom: ResourceDescriptor::of(dom),
            resources: request
                .resources
                .iter()
                .map(|(url, resource)| (url.as_str(), ResourceDescriptor::of(resource)))
                .collect(),
            browser: WireBrowser {
                name: &request.browser.name,
            },
            render_info: WireRenderInfo {
                width: viewport.map(|size| size.width),
                height: viewport.map(|size| size.height),
                emulation_info: request.browser.device_name.as_deref().map(|device_name| {
                    WireEmulation {
                        device_name,
                        screen_orientation: request
                            .browser
                            .screen_orientation
                            .map(ScreenOrientation::as_str),
                    }
                }),
                size_mode: request.size_mode.as_str(),
                selector: request.selector.as_deref(),
                region: request.region.as_ref(),
            },
            script_hooks: request.script_hooks.as_ref(),
            selectors_to_find_regions_for: &request.selectors_to_find_regions_for,
            render_id: request.render_id(),
            send_dom: true,
        }
    }
}

/// `path` resolved under `base`, keeping any path prefix `base` carries.
fn endpoint(base: &Url, path: &str) -> Result<Url> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    Ok(base.join(path.trim_start_matches('/'))?)
}

async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
    let body = send_text(request).await?;
    serde_json::from_str(&body).map_err(VgcError::from)
}

async fn send_text(request: RequestBuilder) -> Result<String> {
    let response = request.send().await?;
    let status = response.status();
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);

    let body = response.text().await.unwrap_or_default();
    if status.is_success() {
        return Ok(body);
    }
    Err(VgcError::from_status(
        status,
        error_message(status, &body, retry_after.as_deref()),
    ))
}

fn error_message(status: StatusCode, body: &str, retry_after: Option<&str>) -> String {
    let fallback = format!("rendering service returned status {}", status.as_u16());
    let parsed = serde_json::from_str::<Value>(body).ok();
    let from_body = parsed
        .as_ref()
        .and_then(|value| value.get("message").or_else(|| value.get("error")))
        .and_then(Value::as_str)
        .map(str::to_owned);

    match (status, retry_after, from_body) {
        (StatusCode::TOO_MANY_REQUESTS, Some(retry), Some(msg)) => {
            format!("{msg} (rate limited, retry after {retry}s)")
        }
        (StatusCode::TOO_MANY_REQUESTS, Some(retry), None) => {
            format!("rate limited by the rendering service, retry after {retry}s")
        }
        (_, _, Some(msg)) => msg,
        _ => fallback,
    }
}
