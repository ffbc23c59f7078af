use std::time::{Duration, Instant};

use volare_mock::{MockSource, itinerary_json};
use volare_types::reports::CacheState;
use volare_types::source::SourceKind;

use crate::helpers;

#[tokio::test]
async fn fast_source_answers_first_and_stragglers_improve_the_cache() {
    let date = helpers::future_date(42);
    let fast = MockSource::builder()
        .name("metasearch")
        .kind(SourceKind::Metasearch)
        .delay(Duration::from_millis(50))
        .returns(vec![itinerary_json(
            "KE",
            901,
            "ICN",
            "NRT",
            date,
            420_000,
            "KRW",
            "meta.example",
        )])
        .build();
    let slow = MockSource::builder()
        .name("aggregator")
        .kind(SourceKind::AggregatorApi)
        .delay(Duration::from_millis(800))
        .returns(vec![itinerary_json(
            "OZ",
            102,
            "ICN",
            "NRT",
            date,
            455_000,
            "KRW",
            "agg.example",
        )])
        .build();

    let volare = helpers::volare_with(vec![fast.clone(), slow.clone()]);
    let query = helpers::query_krw(42);

    let started = Instant::now();
    let report = volare.search(&query).await.unwrap();
    let elapsed = started.elapsed();

    // First useful result at ~50 ms plus the 100 ms grace window; well
    // before the slow source finishes.
    assert!(elapsed < Duration::from_millis(600), "took {elapsed:?}");
    assert!(report.partial);
    assert_eq!(report.offers.len(), 1);
    assert_eq!(report.source_mix.get("metasearch"), Some(&1));
    assert!(!report.source_mix.contains_key("aggregator"));

    // Let the straggler finish and swap in the completed entry.
    tokio::time::sleep(Duration::from_millis(1200)).await;
    let again = volare.search(&query).await.unwrap();
    assert_eq!(again.cache_state, CacheState::Fresh);
    assert!(!again.partial);
    assert_eq!(again.offers.len(), 2);
    assert_eq!(again.source_mix.get("aggregator"), Some(&1));
    // No re-crawl happened for the second read.
    assert_eq!(fast.calls(), 1);
    assert_eq!(slow.calls(), 1);
}
