pub mod browser;
pub mod core;
pub mod dom;
pub mod render;
pub mod resource;

pub use browser::{BrowserInfo, ScreenOrientation, Viewport, EMULATION_PREFIX};
pub use self::core::{
    CheckSettings, CheckWindowArgs, FloatingOffsets, FloatingRegion, FloatingRegionSpec,
    FrameSnapshot, MatchLevel, MatchRegions, MatchRequest, MatchResult, Region, RegionSpec,
};
pub use dom::{CdtAttribute, CdtNode, DomSnapshot, RenderDom, ResourceDescriptor};
pub use render::{
    RenderInfo, RenderRequest, RenderStatus, RenderStatusResult, RunningRender, SizeMode,
};
pub use resource::{sha256_hex, BlobResource, Resource, DOM_CONTENT_TYPE};
