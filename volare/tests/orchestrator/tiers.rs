use std::time::Duration;

use volare_mock::{MockSource, itinerary_json};
use volare_types::coverage::{CoverageRule, CoverageTable};
use volare_types::geo::{CarrierCode, Region};
use volare_types::source::SourceKind;

use crate::helpers;

#[tokio::test]
async fn fallback_runs_only_when_the_other_tiers_come_up_empty() {
    let date = helpers::future_date(80);
    let empty_primary = MockSource::builder()
        .name("metasearch")
        .kind(SourceKind::Metasearch)
        .build();
    let browser = MockSource::builder()
        .name("browser-5j")
        .kind(SourceKind::BrowserAutomation)
        .returns(vec![itinerary_json(
            "5J",
            189,
            "ICN",
            "NRT",
            date,
            310_000,
            "KRW",
            "carrier.example",
        )])
        .build();

    let volare = helpers::volare_with(vec![empty_primary.clone(), browser.clone()]);
    let report = volare.search(&helpers::query_krw(80)).await.unwrap();

    assert_eq!(empty_primary.calls(), 1);
    assert_eq!(browser.calls(), 1);
    assert_eq!(report.offers.len(), 1);
    assert_eq!(report.source_mix.get("browser-5j"), Some(&1));
}

#[tokio::test]
async fn fallback_stays_idle_when_primaries_deliver() {
    let date = helpers::future_date(81);
    let primary = MockSource::builder()
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
    let browser = MockSource::builder()
        .name("browser-5j")
        .kind(SourceKind::BrowserAutomation)
        .delay(Duration::from_millis(10))
        .build();

    let volare = helpers::volare_with(vec![primary.clone(), browser.clone()]);
    let report = volare.search(&helpers::query_krw(81)).await.unwrap();

    assert_eq!(report.offers.len(), 1);
    assert_eq!(browser.calls(), 0);
}

#[tokio::test]
async fn coverage_expected_carrier_forces_its_source_primary() {
    let date = helpers::future_date(82);
    // A carrier-direct source that would otherwise sit in the fallback
    // tier; the coverage table expects its carrier on the route.
    let direct = MockSource::builder()
        .name("browser-7c")
        .kind(SourceKind::BrowserAutomation)
        .serves("7C")
        .returns(vec![itinerary_json(
            "7C",
            1101,
            "ICN",
            "NRT",
            date,
            89_000,
            "KRW",
            "jejuair.example",
        )])
        .build();
    let primary = MockSource::builder()
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

    let coverage = CoverageTable::new().with_rule(CoverageRule {
        origin: Some(Region::NortheastAsia),
        destination: Some(Region::NortheastAsia),
        cabin: None,
        expected_carriers: vec![CarrierCode::parse("7C").unwrap()],
    });

    let volare = helpers::builder_with(vec![primary, direct.clone()])
        .coverage_table(coverage)
        .build()
        .unwrap();
    let report = volare.search(&helpers::query_krw(82)).await.unwrap();

    // Forced primary: invoked alongside the metasearch, not after it.
    assert_eq!(direct.calls(), 1);
    assert_eq!(report.offers.len(), 2);
    assert_eq!(report.source_mix.get("browser-7c"), Some(&1));
}
