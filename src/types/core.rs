//! Checkpoint types shared by the pipeline and the test sessions.
//!
//! - [`Region`] - a rectangle in screenshot coordinates
//! - [`CheckSettings`] - regions the comparison should treat specially
//! - [`CheckWindowArgs`] - everything a single checkpoint carries
//! - [`FrameSnapshot`] - a nested frame captured with its own resources
//! - [`MatchRequest`] / [`MatchResult`] - what a session compares and reports

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::dom::DomSnapshot;
use super::render::SizeMode;
use super::resource::BlobResource;

/// How strictly a screenshot is compared with its baseline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchLevel {
    None,
    Layout,
    Content,
    #[default]
    Strict,
    Exact,
}

/// Rectangle in screenshot pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Region {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(left: i32, top: i32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Shift into the coordinate space whose origin is `origin`, clamping at zero.
    pub fn relative_to(self, origin: Region) -> Self {
        Self {
            left: (self.left - origin.left).max(0),
            top: (self.top - origin.top).max(0),
            ..self
        }
    }
}

/// A region given either literally or by a selector resolved at render time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RegionSpec {
    Selector { selector: String },
    Rect(Region),
}

impl RegionSpec {
    pub fn selector(&self) -> Option<&str> {
        match self {
            RegionSpec::Selector { selector } => Some(selector),
            RegionSpec::Rect(_) => None,
        }
    }
}

/// Maximum distances a floating region may move without counting as a diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FloatingOffsets {
    #[serde(default)]
    pub max_up_offset: u32,
    #[serde(default)]
    pub max_down_offset: u32,
    #[serde(default)]
    pub max_left_offset: u32,
    #[serde(default)]
    pub max_right_offset: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FloatingRegionSpec {
    #[serde(flatten)]
    pub region: RegionSpec,
    #[serde(flatten)]
    pub offsets: FloatingOffsets,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FloatingRegion {
    #[serde(flatten)]
    pub region: Region,
    #[serde(flatten)]
    pub offsets: FloatingOffsets,
}

/// Per-checkpoint comparison settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckSettings {
    #[serde(default)]
    pub ignore: Vec<RegionSpec>,
    #[serde(default)]
    pub layout: Vec<RegionSpec>,
    #[serde(default)]
    pub strict: Vec<RegionSpec>,
    #[serde(default)]
    pub content: Vec<RegionSpec>,
    #[serde(default)]
    pub floating: Vec<FloatingRegionSpec>,
}

/// Regions resolved into screenshot coordinates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRegions {
    pub ignore: Vec<Region>,
    pub layout: Vec<Region>,
    pub strict: Vec<Region>,
    pub content: Vec<Region>,
    pub floating: Vec<FloatingRegion>,
}

/// What a test session is asked to compare for one checkpoint in one browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRequest {
    pub tag: Option<String>,
    pub render_id: String,
    pub screenshot_url: String,
    pub dom_url: Option<String>,
    pub regions: MatchRegions,
    #[serde(default)]
    pub match_level: MatchLevel,
}

/// Outcome of one comparison, as reported by the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub tag: Option<String>,
    pub render_id: String,
    pub screenshot_location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dom_location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub as_expected: Option<bool>,
}

impl MatchResult {
    pub fn from_request(request: &MatchRequest, as_expected: Option<bool>) -> Self {
        Self {
            tag: request.tag.clone(),
            render_id: request.render_id.clone(),
            screenshot_location: request.screenshot_url.clone(),
            dom_location: request.dom_url.clone(),
            as_expected,
        }
    }
}

/// One checkpoint: the captured page and how to render and compare it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckWindowArgs {
    pub url: String,
    #[serde(default)]
    pub snapshot: DomSnapshot,
    /// Resource URLs discovered in the page, possibly relative to `url`.
    #[serde(default)]
    pub resource_urls: Vec<String>,
    /// Resources supplied directly, keyed by URL.
    #[serde(default)]
    pub resource_contents: HashMap<String, BlobResource>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub size_mode: SizeMode,
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default)]
    pub region: Option<Region>,
    #[serde(default)]
    pub script_hooks: Option<serde_json::Value>,
    #[serde(default)]
    pub settings: CheckSettings,
    /// Overrides the test's match level for this checkpoint only.
    #[serde(default)]
    pub match_level: Option<MatchLevel>,
    #[serde(default)]
    pub frames: Vec<FrameSnapshot>,
}

/// An iframe captured alongside its page. The frame is rendered from its
/// own snapshot, which is uploaded as a resource of the page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameSnapshot {
    /// Frame document URL, possibly relative to the parent's URL.
    pub url: String,
    #[serde(default, alias = "cdt")]
    pub snapshot: DomSnapshot,
    #[serde(default)]
    pub resource_urls: Vec<String>,
    #[serde(default)]
    pub resource_contents: HashMap<String, BlobResource>,
    #[serde(default)]
    pub frames: Vec<FrameSnapshot>,
}

impl CheckWindowArgs {
    pub fn new(url: impl Into<String>, snapshot: DomSnapshot) -> Self {
        Self {
            url: url.into(),
            snapshot,
            ..Self::default()
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_match_level(mut self, level: MatchLevel) -> Self {
        self.match_level = Some(level);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_specs_parse_untagged() {
        let settings: CheckSettings = serde_json::from_str(
            r#"{
                "ignore": [{"selector": ".ad"}, {"left": 1, "top": 2, "width": 3, "height": 4}],
                "floating": [{"selector": ".menu", "maxUpOffset": 5}]
            }"#,
        )
        .unwrap();

        assert_eq!(settings.ignore[0].selector(), Some(".ad"));
        assert_eq!(settings.ignore[1], RegionSpec::Rect(Region::new(1, 2, 3, 4)));
        assert_eq!(settings.floating[0].region.selector(), Some(".menu"));
        assert_eq!(settings.floating[0].offsets.max_up_offset, 5);
        assert_eq!(settings.floating[0].offsets.max_left_offset, 0);
    }

    #[test]
    fn frames_nest_and_accept_cdt_snapshots() {
        let args: CheckWindowArgs = serde_json::from_str(
            r#"{
                "url": "https://a.test/outer.html",
                "matchLevel": "layout",
                "frames": [{
                    "url": "inner.html",
                    "cdt": [{"nodeType": 1, "nodeName": "BODY"}],
                    "resourceUrls": ["inner.css"],
                    "frames": [{"url": "deepest.html"}]
                }]
            }"#,
        )
        .unwrap();

        assert_eq!(args.match_level, Some(MatchLevel::Layout));
        let frame = &args.frames[0];
        assert_eq!(frame.snapshot.nodes.len(), 1);
        assert_eq!(frame.resource_urls, vec!["inner.css"]);
        assert_eq!(frame.frames[0].url, "deepest.html");
    }

    #[test]
    fn relative_to_clamps_at_zero() {
        let origin = Region::new(10, 20, 100, 100);
        assert_eq!(
            Region::new(15, 5, 4, 4).relative_to(origin),
            Region::new(5, 0, 4, 4)
        );
    }
}
