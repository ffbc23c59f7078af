use rust_decimal::Decimal;
use volare_mock::{MockSource, itinerary_json};
use volare_types::source::SourceKind;

use crate::helpers;

#[tokio::test]
async fn same_flight_across_sources_merges_into_one_offer() {
    let date = helpers::future_date(43);
    // Both sources quote KE901 on the same date; the aggregator is
    // cheaper and, being higher trust here, also wins segment metadata.
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
            "KE",
            901,
            "ICN",
            "NRT",
            date,
            415_000,
            "KRW",
            "agg.example",
        )])
        .build();

    let volare = helpers::volare_with(vec![meta, agg]);
    let report = volare.search(&helpers::query_krw(43)).await.unwrap();

    assert_eq!(report.offers.len(), 1);
    let offer = &report.offers[0];
    assert_eq!(offer.prices().len(), 2);
    assert_eq!(
        offer.lowest_price().converted.amount,
        Decimal::from(415_000)
    );
    let urls: Vec<&str> = offer
        .prices()
        .iter()
        .map(|p| p.booking_url.as_str())
        .collect();
    assert!(urls.iter().any(|u| u.contains("meta.example")));
    assert!(urls.iter().any(|u| u.contains("agg.example")));
    assert_eq!(report.source_mix.get("metasearch"), Some(&1));
    assert_eq!(report.source_mix.get("aggregator"), Some(&1));
}
