//! DOM snapshot types for captured pages.
//!
//! A snapshot is the flattened node list produced by the page serializer
//! ("cdt" format): every node carries its children as indexes into the list.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::resource::{Resource, DOM_CONTENT_TYPE};
use crate::error::Result;

pub const ELEMENT_NODE: u32 = 1;
pub const TEXT_NODE: u32 = 3;

/// A flattened DOM snapshot of a page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomSnapshot {
    pub nodes: Vec<CdtNode>,
}

/// A single node of the snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CdtNode {
    pub node_type: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_value: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<CdtAttribute>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub child_node_indexes: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CdtAttribute {
    pub name: String,
    pub value: String,
}

impl CdtNode {
    pub fn element(name: &str) -> Self {
        Self {
            node_type: ELEMENT_NODE,
            node_name: Some(name.to_ascii_uppercase()),
            ..Self::default()
        }
    }

    pub fn text(value: &str) -> Self {
        Self {
            node_type: TEXT_NODE,
            node_value: Some(value.to_string()),
            ..Self::default()
        }
    }

    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.attributes.push(CdtAttribute {
            name: name.to_string(),
            value: value.to_string(),
        });
        self
    }

    pub fn with_children(mut self, children: Vec<usize>) -> Self {
        self.child_node_indexes = children;
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| attr.name.eq_ignore_ascii_case(name))
            .map(|attr| attr.value.as_str())
    }

    pub fn is_element(&self, name: &str) -> bool {
        self.node_type == ELEMENT_NODE
            && self
                .node_name
                .as_deref()
                .is_some_and(|n| n.eq_ignore_ascii_case(name))
    }
}

impl DomSnapshot {
    pub fn new(nodes: Vec<CdtNode>) -> Self {
        Self { nodes }
    }
}

/// The DOM payload of a render request: the snapshot plus every resource it
/// references, keyed by absolute URL.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderDom {
    pub snapshot: DomSnapshot,
    pub resources: BTreeMap<String, Resource>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DomDocument<'a> {
    resources: BTreeMap<&'a str, ResourceDescriptor<'a>>,
    dom_nodes: &'a [CdtNode],
}

/// Reference to a resource by content hash, as embedded in DOM payloads and
/// render requests.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescriptor<'a> {
    pub hash_format: &'static str,
    pub hash: &'a str,
    pub content_type: &'a str,
}

impl<'a> ResourceDescriptor<'a> {
    pub fn of(resource: &'a Resource) -> Self {
        Self {
            hash_format: "sha256",
            hash: &resource.sha256,
            content_type: &resource.content_type,
        }
    }
}

impl RenderDom {
    pub fn new(snapshot: DomSnapshot, resources: BTreeMap<String, Resource>) -> Self {
        Self {
            snapshot,
            resources,
        }
    }

    /// Serialize the DOM into an uploadable resource. The payload is
    /// deterministic, so identical DOMs share a content hash.
    pub fn as_resource(&self) -> Result<Resource> {
        Ok(Resource::dom(DOM_CONTENT_TYPE, self.document()?))
    }

    /// The same payload as [`as_resource`](Self::as_resource), keyed by the
    /// URL a frame was loaded from so the parent page can reference it.
    pub fn as_frame_resource(&self, url: &str) -> Result<Resource> {
        Ok(Resource::new(url, DOM_CONTENT_TYPE, self.document()?))
    }

    fn document(&self) -> Result<Bytes> {
        let document = DomDocument {
            resources: self
                .resources
                .iter()
                .map(|(url, resource)| (url.as_str(), ResourceDescriptor::of(resource)))
                .collect(),
            dom_nodes: &self.snapshot.nodes,
        };
        Ok(serde_json::to_vec(&document)?.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_parses_cdt_json() {
        let json = r#"[
            {"nodeType": 9, "childNodeIndexes": [1]},
            {"nodeType": 1, "nodeName": "LINK", "attributes": [{"name": "rel", "value": "stylesheet"}, {"name": "href", "value": "main.css"}]}
        ]"#;
        let snapshot: DomSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.nodes.len(), 2);
        assert_eq!(snapshot.nodes[0].child_node_indexes, vec![1]);
        assert!(snapshot.nodes[1].is_element("link"));
        assert_eq!(snapshot.nodes[1].attribute("HREF"), Some("main.css"));
    }

    #[test]
    fn identical_doms_share_a_hash() {
        let css = Resource::new("https://a.test/main.css", "text/css", "body{}".into());
        let resources = BTreeMap::from([(css.url.clone().unwrap(), css)]);
        let snapshot = DomSnapshot::new(vec![CdtNode::element("div")]);

        let a = RenderDom::new(snapshot.clone(), resources.clone()).as_resource().unwrap();
        let b = RenderDom::new(snapshot, resources).as_resource().unwrap();

        assert_eq!(a.sha256, b.sha256);
        assert_eq!(a.content_type, DOM_CONTENT_TYPE);
        assert!(a.url.is_none());
        assert_eq!(a.upload_key(), format!("dom_{}", a.sha256));
    }

    #[test]
    fn dom_payload_references_resources_by_hash() {
        let css = Resource::new("https://a.test/main.css", "text/css", "body{}".into());
        let hash = css.sha256.clone();
        let dom = RenderDom::new(
            DomSnapshot::default(),
            BTreeMap::from([(css.url.clone().unwrap(), css)]),
        );
        let resource = dom.as_resource().unwrap();
        let body: serde_json::Value =
            serde_json::from_slice(resource.content.as_deref().unwrap()).unwrap();

        assert_eq!(
            body["resources"]["https://a.test/main.css"]["hash"],
            serde_json::Value::String(hash)
        );
        assert_eq!(body["domNodes"], serde_json::json!([]));
    }
}
