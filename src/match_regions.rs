//! Resolution of selector-based check regions into screenshot coordinates.
//!
//! Selectors are sent with the render request in a fixed order and the
//! service answers with one region per selector, in the same order. The
//! target selector (selector size mode) always comes first; its region is
//! the location of the captured image within the page.

use tracing::warn;

use crate::types::{
    CheckSettings, CheckWindowArgs, FloatingRegion, MatchRegions, Region, RegionSpec, SizeMode,
};

fn target_selector(args: &CheckWindowArgs) -> Option<&str> {
    match args.size_mode {
        SizeMode::Selector => args.selector.as_deref(),
        _ => None,
    }
}

fn region_selectors(settings: &CheckSettings) -> impl Iterator<Item = &str> {
    settings
        .ignore
        .iter()
        .chain(&settings.layout)
        .chain(&settings.strict)
        .chain(&settings.content)
        .chain(settings.floating.iter().map(|floating| &floating.region))
        .filter_map(RegionSpec::selector)
}

/// Selectors whose regions the service must report, in wire order.
pub fn collect_region_selectors(args: &CheckWindowArgs) -> Vec<String> {
    target_selector(args)
        .into_iter()
        .chain(region_selectors(&args.settings))
        .map(str::to_string)
        .collect()
}

/// Replace every selector entry of the check settings with the region the
/// service reported for it. Literal regions keep their place and value.
pub fn calculate_match_regions(
    args: &CheckWindowArgs,
    selector_regions: &[Option<Region>],
) -> MatchRegions {
    let (image_offset, mut found) = match target_selector(args) {
        Some(_) => (
            selector_regions.first().copied().flatten(),
            selector_regions.iter().skip(1),
        ),
        None => (None, selector_regions.iter().skip(0)),
    };

    let mut resolve = |spec: &RegionSpec| -> Option<Region> {
        match spec {
            RegionSpec::Rect(region) => Some(*region),
            RegionSpec::Selector { selector } => match found.next().copied().flatten() {
                Some(region) => Some(match image_offset {
                    Some(offset) => region.relative_to(offset),
                    None => region,
                }),
                None => {
                    warn!(selector = %selector, "no region reported for selector");
                    None
                }
            },
        }
    };

    let settings = &args.settings;
    let ignore = settings.ignore.iter().filter_map(&mut resolve).collect();
    let layout = settings.layout.iter().filter_map(&mut resolve).collect();
    let strict = settings.strict.iter().filter_map(&mut resolve).collect();
    let content = settings.content.iter().filter_map(&mut resolve).collect();
    let floating = settings
        .floating
        .iter()
        .filter_map(|floating| {
            resolve(&floating.region).map(|region| FloatingRegion {
                region,
                offsets: floating.offsets,
            })
        })
        .collect();

    MatchRegions {
        ignore,
        layout,
        strict,
        content,
        floating,
    }
}
