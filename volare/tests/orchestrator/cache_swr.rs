use std::time::Duration;

use volare_mock::{MockSource, itinerary_json};
use volare_types::config::CacheTtlConfig;
use volare_types::coverage::{PopularityTable, RoutePopularity};
use volare_types::reports::CacheState;
use volare_types::source::{RouteTier, SourceKind};

use crate::helpers;

fn swr_volare(source: std::sync::Arc<MockSource>) -> volare::Volare {
    let mut cfg = helpers::test_config();
    cfg.cache = CacheTtlConfig {
        top_fresh: Duration::from_millis(100),
        top_stale: Duration::from_secs(30),
        ..CacheTtlConfig::default()
    };
    let mut adapter = cfg.adapter("aggregator");
    adapter.rate_limit = None;
    cfg.adapters.insert("aggregator".to_string(), adapter);

    volare::Volare::builder()
        .config(cfg)
        .with_source(source)
        .popularity_table(PopularityTable::new(vec![RoutePopularity {
            origin: helpers::code("ICN"),
            destination: helpers::code("NRT"),
            tier: RouteTier::Top,
        }]))
        .build()
        .unwrap()
}

#[tokio::test]
async fn stale_entries_serve_immediately_and_refresh_once_in_the_background() {
    let date = helpers::future_date(70);
    let source = MockSource::builder()
        .name("aggregator")
        .kind(SourceKind::AggregatorApi)
        .returns(vec![itinerary_json(
            "KE",
            901,
            "ICN",
            "NRT",
            date,
            420_000,
            "KRW",
            "agg.example",
        )])
        .build();
    let volare = swr_volare(source.clone());
    let query = helpers::query_krw(70);

    assert_eq!(
        volare.search(&query).await.unwrap().cache_state,
        CacheState::Miss
    );
    assert_eq!(
        volare.search(&query).await.unwrap().cache_state,
        CacheState::Fresh
    );
    assert_eq!(source.calls(), 1);

    // Age the entry past its fresh TTL.
    tokio::time::sleep(Duration::from_millis(150)).await;

    // Two quick stale hits: both serve immediately, only one background
    // refresh is enqueued.
    let first = volare.search(&query).await.unwrap();
    let second = volare.search(&query).await.unwrap();
    assert_eq!(first.cache_state, CacheState::Stale);
    assert!(first.background_refresh);
    assert_eq!(second.cache_state, CacheState::Stale);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(source.calls(), 2);

    // The refreshed entry is fresh again.
    assert_eq!(
        volare.search(&query).await.unwrap().cache_state,
        CacheState::Fresh
    );
}
