mod common;

use chrono::Utc;
use common::{article, init_tracing, serve, serve_conditional, ScriptedSource};
use content_pipeline::{
    Aggregator, ContentPolicy, FetchConfig, PipelineError, RssFeedSource, Source,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn sources(list: Vec<Arc<common::ScriptedSource>>) -> Vec<Arc<dyn Source>> {
    list.into_iter().map(|s| s as Arc<dyn Source>).collect()
}

#[tokio::test]
async fn test_failing_source_does_not_abort_batch() {
    init_tracing();

    let a = ScriptedSource::ok(
        "a",
        vec![
            article("a", "1", "Robot arms", "", 1),
            article("a", "2", "Robot legs", "", 2),
        ],
    );
    let b = ScriptedSource::failing("b");
    let c = ScriptedSource::ok("c", vec![article("c", "1", "Automation at ports", "", 1)]);

    let aggregator = Aggregator::new(sources(vec![a, b, c]), &FetchConfig::default());
    let outcome = aggregator.fetch_all().await;

    let urls: Vec<&str> = outcome.articles.iter().map(|a| a.url.as_str()).collect();
    assert_eq!(
        urls,
        vec![
            "https://a.example.com/1",
            "https://a.example.com/2",
            "https://c.example.com/1"
        ]
    );
    assert_eq!(outcome.errors.len(), 1);
    assert!(matches!(
        &outcome.errors[0],
        PipelineError::SourceFetch { source_name, .. } if source_name == "b"
    ));
}

#[tokio::test]
async fn test_all_sources_failing_yields_empty_set() {
    init_tracing();

    let aggregator = Aggregator::new(
        sources(vec![ScriptedSource::failing("a"), ScriptedSource::failing("b")]),
        &FetchConfig::default(),
    );
    let outcome = aggregator.fetch_all().await;

    assert!(outcome.articles.is_empty());
    assert_eq!(outcome.errors.len(), 2);
}

#[tokio::test]
async fn test_slow_source_times_out() {
    init_tracing();

    let fast = ScriptedSource::ok("fast", vec![article("fast", "1", "Robot news", "", 1)]);
    let slow = ScriptedSource::slow(
        "slow",
        vec![article("slow", "1", "Late robot news", "", 1)],
        Duration::from_secs(5),
    );

    let aggregator = Aggregator::new(sources(vec![fast, slow]), &FetchConfig::default())
        .with_source_timeout(Duration::from_millis(100));
    let outcome = aggregator.fetch_all().await;

    assert_eq!(outcome.articles.len(), 1);
    assert_eq!(outcome.articles[0].source, "fast");
    assert!(matches!(outcome.errors[0], PipelineError::SourceTimeout { .. }));
}

#[tokio::test]
async fn test_sources_are_fetched_concurrently() {
    init_tracing();

    let slow: Vec<_> = (0..4)
        .map(|i| {
            ScriptedSource::slow(
                &format!("s{}", i),
                vec![article(&format!("s{}", i), "1", "Robot", "", 1)],
                Duration::from_millis(300),
            )
        })
        .collect();

    let aggregator = Aggregator::new(sources(slow), &FetchConfig::default());
    let started = std::time::Instant::now();
    let outcome = aggregator.fetch_all().await;

    assert_eq!(outcome.articles.len(), 4);
    assert!(started.elapsed() < Duration::from_millis(1000));
}

#[tokio::test]
async fn test_content_policy_runs_before_anything_else() {
    init_tracing();

    let a = ScriptedSource::ok(
        "a",
        vec![
            article("a", "1", "Military robots take over", "", 1),
            article("a", "2", "Роботы-сапёры", "Разминирование после обстрела", 1),
            article("a", "3", "Warehouse robots", "Sorting parcels", 1),
        ],
    );

    let aggregator = Aggregator::new(sources(vec![a.clone()]), &FetchConfig::default());
    let outcome = aggregator.fetch_all().await;
    assert_eq!(outcome.articles.len(), 1);
    assert_eq!(outcome.blocked, 2);

    let lenient = Aggregator::new(sources(vec![a]), &FetchConfig::default())
        .with_policy(ContentPolicy::new(["casino"]));
    assert_eq!(lenient.fetch_all().await.articles.len(), 3);
}

#[tokio::test]
async fn test_cross_source_duplicates_pass_through_unless_enabled() {
    init_tracing();

    let mut first = article("a", "story", "Robot story", "", 1);
    first.url = "https://www.news.example.com/story/".to_string();
    let mut second = article("b", "story", "Robot story", "", 1);
    second.url = "https://news.example.com/story".to_string();

    let a = ScriptedSource::ok("a", vec![first]);
    let b = ScriptedSource::ok("b", vec![second]);

    let default = Aggregator::new(sources(vec![a.clone(), b.clone()]), &FetchConfig::default());
    assert_eq!(default.fetch_all().await.articles.len(), 2);

    let config = FetchConfig {
        dedupe_across_sources: true,
        ..Default::default()
    };
    let outcome = Aggregator::new(sources(vec![a, b]), &config).fetch_all().await;
    assert_eq!(outcome.articles.len(), 1);
    assert_eq!(outcome.articles[0].source, "a");
    assert_eq!(outcome.duplicates, 1);
}

const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Local Robot Feed</title>
    <item>
      <title>Robot learns to cook</title>
      <link>https://local.example.com/cook</link>
      <description>A kitchen robot.</description>
    </item>
    <item>
      <title>No link here</title>
    </item>
  </channel>
</rss>"#;

#[tokio::test]
async fn test_rss_feed_source_over_http() {
    init_tracing();

    let addr = serve(FEED, "application/rss+xml").await;
    let source =
        RssFeedSource::from_config(format!("http://{}/feed.xml", addr), FetchConfig::default())
            .unwrap();

    assert_eq!(source.name(), "RSS Feed (127.0.0.1)");
    let articles = source.fetch_articles().await.unwrap();

    assert_eq!(articles.len(), 1);
    assert_eq!(articles[0].title, "Robot learns to cook");
    assert_eq!(articles[0].source, "Local Robot Feed");
    assert_eq!(source.name(), "Local Robot Feed");
}

#[tokio::test]
async fn test_configured_title_names_the_source() {
    init_tracing();

    let addr = serve(FEED, "application/rss+xml").await;
    let source =
        RssFeedSource::from_config(format!("http://{}/feed.xml", addr), FetchConfig::default())
            .unwrap()
            .with_title("Robots Weekly");

    assert_eq!(source.name(), "Robots Weekly");
    let articles = source.fetch_articles().await.unwrap();
    assert_eq!(articles[0].source, "Robots Weekly");
}

#[tokio::test]
async fn test_not_modified_feed_still_drops_expired_items() {
    init_tracing();

    // Just inside the 72h window on the first pull, outside it a few seconds later
    let aging = Utc::now() - chrono::Duration::hours(72) + chrono::Duration::seconds(3);
    let feed = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Local Robot Feed</title>
    <item>
      <title>Aging robot story</title>
      <link>https://local.example.com/aging</link>
      <pubDate>{}</pubDate>
    </item>
    <item>
      <title>Fresh robot story</title>
      <link>https://local.example.com/fresh</link>
      <pubDate>{}</pubDate>
    </item>
  </channel>
</rss>"#,
        aging.to_rfc2822(),
        Utc::now().to_rfc2822()
    );

    let (addr, not_modified) = serve_conditional(feed, "application/rss+xml", "\"v1\"").await;
    let source =
        RssFeedSource::from_config(format!("http://{}/feed.xml", addr), FetchConfig::default())
            .unwrap();

    assert_eq!(source.fetch_articles().await.unwrap().len(), 2);

    tokio::time::sleep(Duration::from_secs(4)).await;
    let articles = source.fetch_articles().await.unwrap();

    assert_eq!(not_modified.load(Ordering::SeqCst), 1);
    assert_eq!(articles.len(), 1);
    assert_eq!(articles[0].title, "Fresh robot story");
}
