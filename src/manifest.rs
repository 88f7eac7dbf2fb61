//! YAML manifest for `vgc check`.
//!
//! ```yaml
//! app_name: shop
//! test_name: checkout
//! browsers:
//!   - { name: chrome, width: 1024, height: 768 }
//! checks:
//!   - url: https://shop.test/cart
//!     dom: cart.cdt.json
//!     tag: cart
//!     resource_urls: [/styles/site.css]
//!     match_level: layout
//!     frames:
//!       - { url: /ads/frame.html, dom: ad.cdt.json }
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};

use vgc_lib::{
    BrowserInfo, CheckSettings, CheckWindowArgs, DomSnapshot, FrameSnapshot, MatchLevel, Region,
    SizeMode, VgcError,
};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub app_name: Option<String>,
    #[serde(default)]
    pub test_name: Option<String>,
    #[serde(default)]
    pub browsers: Option<Vec<BrowserInfo>>,
    pub checks: Vec<ManifestCheck>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestCheck {
    pub url: String,
    /// Path to the DOM snapshot JSON, relative to the manifest.
    #[serde(default)]
    pub dom: Option<PathBuf>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub resource_urls: Vec<String>,
    #[serde(default)]
    pub size_mode: SizeMode,
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default)]
    pub region: Option<Region>,
    #[serde(default)]
    pub settings: CheckSettings,
    #[serde(default)]
    pub match_level: Option<MatchLevel>,
    #[serde(default)]
    pub frames: Vec<ManifestFrame>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestFrame {
    pub url: String,
    #[serde(default)]
    pub dom: Option<PathBuf>,
    #[serde(default)]
    pub resource_urls: Vec<String>,
    #[serde(default)]
    pub frames: Vec<ManifestFrame>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self, VgcError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            VgcError::Config(format!("Failed to read manifest {}: {e}", path.display()))
        })?;
        let manifest: Manifest = serde_yaml::from_str(&text).map_err(|e| {
            VgcError::Config(format!("Failed to parse manifest {}: {e}", path.display()))
        })?;
        if manifest.checks.is_empty() {
            return Err(VgcError::Config(format!(
                "Manifest {} lists no checks",
                path.display()
            )));
        }
        Ok(manifest)
    }

    /// Test name: the manifest's own, else the manifest file stem.
    pub fn test_name_or_stem(&self, path: &Path) -> Option<String> {
        self.test_name.clone().or_else(|| {
            path.file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
        })
    }
}

impl ManifestCheck {
    /// Build check-window arguments, reading DOM snapshots relative to
    /// `base_dir`.
    pub fn to_args(&self, base_dir: &Path) -> Result<CheckWindowArgs, VgcError> {
        Ok(CheckWindowArgs {
            url: self.url.clone(),
            snapshot: read_snapshot(base_dir, self.dom.as_deref())?,
            resource_urls: self.resource_urls.clone(),
            tag: self.tag.clone(),
            size_mode: self.size_mode,
            selector: self.selector.clone(),
            region: self.region,
            settings: self.settings.clone(),
            match_level: self.match_level,
            frames: frames_to_snapshots(base_dir, &self.frames)?,
            ..CheckWindowArgs::default()
        })
    }
}

fn frames_to_snapshots(
    base_dir: &Path,
    frames: &[ManifestFrame],
) -> Result<Vec<FrameSnapshot>, VgcError> {
    frames
        .iter()
        .map(|frame| {
            Ok(FrameSnapshot {
                url: frame.url.clone(),
                snapshot: read_snapshot(base_dir, frame.dom.as_deref())?,
                resource_urls: frame.resource_urls.clone(),
                frames: frames_to_snapshots(base_dir, &frame.frames)?,
                ..FrameSnapshot::default()
            })
        })
        .collect()
}

fn read_snapshot(base_dir: &Path, dom: Option<&Path>) -> Result<DomSnapshot, VgcError> {
    let Some(dom) = dom else {
        return Ok(DomSnapshot::default());
    };
    let path = base_dir.join(dom);
    let text = std::fs::read_to_string(&path).map_err(|e| {
        VgcError::Config(format!("Failed to read DOM snapshot {}: {e}", path.display()))
    })?;
    serde_json::from_str(&text)
        .map_err(|e| VgcError::Config(format!("Invalid DOM snapshot {}: {e}", path.display())))
}
