mod support;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use support::FakeFetcher;
use vgc_lib::{
    DomSnapshot, FetchResource, RenderDom, Resource, ResourceCache, ResourceCollector,
};

fn collector(fetcher: Arc<FakeFetcher>) -> ResourceCollector {
    let fetch = Arc::new(FetchResource::new(fetcher, 0, Duration::ZERO));
    ResourceCollector::new(Arc::new(ResourceCache::new()), fetch)
}

#[tokio::test]
async fn dom_entry_returns_itself_and_its_resources_once() {
    let fetcher = Arc::new(
        FakeFetcher::new()
            .with("https://site.test/a.css", "text/css", ".a { color: red }")
            .with("https://site.test/b.png", "image/png", "b")
            .with("https://site.test/c.js", "application/javascript", "c()"),
    );
    let collector = collector(fetcher.clone());

    let urls: Vec<String> = ["a.css", "b.png", "c.js"].map(String::from).to_vec();
    let collected = collector
        .collect("https://site.test/", &urls, &HashMap::new())
        .await
        .unwrap();
    assert_eq!(collected.len(), 3);

    let embedded: BTreeMap<String, Resource> = collected
        .into_iter()
        .filter(|(url, _)| !url.ends_with("c.js"))
        .collect();
    let dom = RenderDom::new(DomSnapshot::default(), embedded.clone())
        .as_resource()
        .unwrap();
    let key = collector.register_dom(&dom, embedded.keys().cloned().collect());

    let found = collector.cache().get_with_dependencies(&key);
    assert_eq!(
        found.keys().map(String::as_str).collect::<Vec<_>>(),
        vec![
            key.as_str(),
            "https://site.test/a.css",
            "https://site.test/b.png",
        ]
    );
    assert_eq!(fetcher.fetch_count("https://site.test/a.css"), 1);
}

#[tokio::test]
async fn stylesheet_cycles_terminate() {
    let fetcher = Arc::new(
        FakeFetcher::new()
            .with("https://site.test/one.css", "text/css", "@import 'two.css';")
            .with("https://site.test/two.css", "text/css", "@import url(one.css);"),
    );
    let collector = collector(fetcher.clone());

    let collected = collector
        .collect("https://site.test/", &["one.css".to_string()], &HashMap::new())
        .await
        .unwrap();

    assert_eq!(collected.len(), 2);
    assert_eq!(fetcher.fetch_count("https://site.test/one.css"), 1);
    assert_eq!(fetcher.fetch_count("https://site.test/two.css"), 1);
}

#[tokio::test]
async fn concurrent_fetches_of_one_url_hit_the_network_once() {
    let fetcher = Arc::new(FakeFetcher {
        delay: Duration::from_millis(20),
        ..FakeFetcher::new().with("https://site.test/logo.png", "image/png", "logo")
    });
    let fetch = FetchResource::new(fetcher.clone(), 0, Duration::ZERO);

    let results =
        futures::future::join_all((0..10).map(|_| fetch.fetch("https://site.test/logo.png"))).await;

    assert_eq!(fetcher.fetch_count("https://site.test/logo.png"), 1);
    let first = results[0].clone().unwrap();
    assert!(results.iter().all(|result| result.as_ref() == Ok(&first)));
}

#[tokio::test]
async fn overlapping_collections_both_see_stylesheet_references() {
    let fetcher = Arc::new(FakeFetcher {
        delay: Duration::from_millis(30),
        ..FakeFetcher::new()
            .with("https://a.test/main.css", "text/css", ".a { background: url(a.png) }")
            .with("https://a.test/a.png", "image/png", "png")
    });
    let collector = collector(fetcher.clone());
    let urls = vec!["https://a.test/main.css".to_string()];
    let none = HashMap::new();

    // the second collection starts while a.png is still in flight
    let later = async {
        tokio::time::sleep(Duration::from_millis(45)).await;
        collector.collect("https://a.test/", &urls, &none).await
    };
    let (first, second) = tokio::join!(collector.collect("https://a.test/", &urls, &none), later);

    let expected = vec!["https://a.test/a.png", "https://a.test/main.css"];
    for collected in [first.unwrap(), second.unwrap()] {
        assert_eq!(collected.keys().map(String::as_str).collect::<Vec<_>>(), expected);
    }
    assert_eq!(fetcher.fetch_count("https://a.test/a.png"), 1);
    assert_eq!(fetcher.fetch_count("https://a.test/main.css"), 1);
}

#[tokio::test]
async fn string_literals_in_stylesheets_are_not_fetched() {
    let fetcher = Arc::new(
        FakeFetcher::new()
            .with(
                "https://a.test/main.css",
                "text/css",
                r#".a::before { content: "see url(fake.png) here" } .b { background: url(real.png) }"#,
            )
            .with("https://a.test/real.png", "image/png", "png"),
    );
    let collector = collector(fetcher.clone());

    let collected = collector
        .collect("https://a.test/", &["main.css".to_string()], &HashMap::new())
        .await
        .unwrap();

    assert_eq!(collected.len(), 2);
    assert_eq!(fetcher.fetch_count("https://a.test/fake.png"), 0);
}
