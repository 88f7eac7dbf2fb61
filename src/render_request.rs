use std::collections::BTreeMap;

use crate::match_regions::collect_region_selectors;
use crate::types::{BrowserInfo, CheckWindowArgs, RenderDom, RenderInfo, RenderRequest, Resource};

/// Build one render request per browser for a single checkpoint.
///
/// Pure: no I/O and no shared state. Requests come back in browser order,
/// which is the order render ids are reported in.
pub fn create_render_requests(
    args: &CheckWindowArgs,
    resources: BTreeMap<String, Resource>,
    browsers: &[BrowserInfo],
    render_info: &RenderInfo,
) -> Vec<RenderRequest> {
    let dom = RenderDom::new(args.snapshot.clone(), resources);
    let selectors = collect_region_selectors(args);

    browsers
        .iter()
        .map(|browser| {
            RenderRequest::new(
                render_info.results_url.clone(),
                args.url.clone(),
                dom.clone(),
                browser.clone(),
                args.size_mode,
                args.selector.clone(),
                args.region,
                args.script_hooks.clone(),
                selectors.clone(),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CdtNode, DomSnapshot, RegionSpec, SizeMode};

    fn render_info() -> RenderInfo {
        RenderInfo {
            service_url: "https://render.test".into(),
            access_token: "token".into(),
            results_url: Some("https://results.test/__random__".into()),
        }
    }

    #[test]
    fn one_request_per_browser_in_order() {
        let mut args = CheckWindowArgs::new(
            "https://a.test/page",
            DomSnapshot::new(vec![CdtNode::element("body")]),
        );
        args.size_mode = SizeMode::Selector;
        args.selector = Some("#hero".into());
        args.settings.ignore = vec![RegionSpec::Selector {
            selector: ".ad".into(),
        }];
        let css = Resource::new("https://a.test/a.css", "text/css", "a{}".into());
        let resources = BTreeMap::from([("https://a.test/a.css".to_string(), css)]);
        let browsers = vec![
            "chrome:800x600".parse::<BrowserInfo>().unwrap(),
            "firefox:1024x768".parse::<BrowserInfo>().unwrap(),
        ];

        let requests = create_render_requests(&args, resources, &browsers, &render_info());

        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].browser.name, "chrome");
        assert_eq!(requests[1].browser.name, "firefox");
        for request in &requests {
            assert_eq!(request.url, "https://a.test/page");
            assert_eq!(request.webhook.as_deref(), Some("https://results.test/__random__"));
            assert_eq!(request.selectors_to_find_regions_for, vec!["#hero", ".ad"]);
            assert_eq!(request.resources.len(), 1);
            assert!(request.render_id().is_none());
        }
        assert_eq!(
            requests[0].dom.as_resource().unwrap().sha256,
            requests[1].dom.as_resource().unwrap().sha256
        );
    }

    #[test]
    fn no_browsers_means_no_requests() {
        let args = CheckWindowArgs::new("https://a.test", DomSnapshot::default());
        assert!(create_render_requests(&args, BTreeMap::new(), &[], &render_info()).is_empty());
    }
}
