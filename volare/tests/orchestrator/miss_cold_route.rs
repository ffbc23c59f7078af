use volare_mock::{MockSource, itinerary_json};
use volare_types::reports::CacheState;
use volare_types::source::SourceKind;

use crate::helpers;

#[tokio::test]
async fn cold_popular_route_invokes_both_primaries_and_caches_fresh() {
    let date = helpers::future_date(40);
    let meta = MockSource::builder()
        .name("metasearch")
        .kind(SourceKind::Metasearch)
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
    let agg = MockSource::builder()
        .name("aggregator")
        .kind(SourceKind::AggregatorApi)
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

    let volare = helpers::volare_with(vec![meta.clone(), agg.clone()]);
    let query = helpers::query_krw(40);

    let report = volare.search(&query).await.unwrap();
    assert_eq!(report.cache_state, CacheState::Miss);
    assert_eq!(report.offers.len(), 2);
    assert_eq!(report.source_mix.get("metasearch"), Some(&1));
    assert_eq!(report.source_mix.get("aggregator"), Some(&1));
    assert_eq!(meta.calls(), 1);
    assert_eq!(agg.calls(), 1);

    // The same query comes straight from the fresh entry.
    let again = volare.search(&query).await.unwrap();
    assert_eq!(again.cache_state, CacheState::Fresh);
    assert_eq!(meta.calls(), 1);
    assert_eq!(agg.calls(), 1);

    // Every successful fan-out records one history observation.
    let rows = volare.prediction_data(
        helpers::code("ICN"),
        helpers::code("NRT"),
        date,
        date,
    );
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].sample_count, 2);
    assert_eq!(rows[0].min_price, rust_decimal::Decimal::from(420_000));
}

#[tokio::test]
async fn concurrent_cold_searches_share_one_crawl() {
    let date = helpers::future_date(41);
    let meta = MockSource::builder()
        .name("metasearch")
        .kind(SourceKind::Metasearch)
        .delay(std::time::Duration::from_millis(50))
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

    let volare = helpers::volare_with(vec![meta.clone()]);
    let query = helpers::query_krw(41);

    let (a, b) = tokio::join!(volare.search(&query), volare.search(&query));
    assert_eq!(a.unwrap().offers.len(), 1);
    assert_eq!(b.unwrap().offers.len(), 1);
    // Single-flight: the second caller subscribed to the first's crawl.
    assert_eq!(meta.calls(), 1);
}
