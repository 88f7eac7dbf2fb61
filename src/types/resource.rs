use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Content type of serialized DOM payloads.
pub const DOM_CONTENT_TYPE: &str = "x-applitools-html/cdt";

/// A content-addressed resource: a fetched asset, a caller-supplied blob, or
/// a serialized DOM.
///
/// `content` is `None` once the resource is known to be present on the
/// rendering service and only its hash needs to be referenced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub url: Option<String>,
    pub content_type: String,
    pub content: Option<Bytes>,
    pub sha256: String,
}

impl Resource {
    pub fn new(url: impl Into<String>, content_type: impl Into<String>, content: Bytes) -> Self {
        Self {
            url: Some(url.into()),
            content_type: content_type.into(),
            sha256: sha256_hex(&content),
            content: Some(content),
        }
    }

    pub fn dom(content_type: impl Into<String>, content: Bytes) -> Self {
        Self {
            url: None,
            content_type: content_type.into(),
            sha256: sha256_hex(&content),
            content: Some(content),
        }
    }

    /// Key used to deduplicate uploads: `{url}_{sha256}`, or `dom_{sha256}`.
    pub fn upload_key(&self) -> String {
        format!("{}_{}", self.url.as_deref().unwrap_or("dom"), self.sha256)
    }

    pub fn is_css(&self) -> bool {
        self.content_type
            .split(';')
            .next()
            .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("text/css"))
    }

    /// The reference kept after upload. Stylesheets keep their content so
    /// their dependencies can still be discovered.
    pub fn uploaded(&self) -> Self {
        Self {
            url: self.url.clone(),
            content_type: self.content_type.clone(),
            content: if self.is_css() {
                self.content.clone()
            } else {
                None
            },
            sha256: self.sha256.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.content.as_ref().map_or(0, Bytes::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Resource content supplied by the caller instead of being fetched
/// (e.g. `blob:` URLs captured from the page).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobResource {
    pub url: String,
    #[serde(rename = "type")]
    pub content_type: String,
    #[serde(with = "byte_value")]
    pub value: Vec<u8>,
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Blob values travel as plain byte arrays in JSON/YAML manifests.
mod byte_value {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        #[derive(serde::Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Bytes(Vec<u8>),
        }
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(text) => text.into_bytes(),
            Raw::Bytes(bytes) => bytes,
        })
    }
}
