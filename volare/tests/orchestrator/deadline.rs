use std::time::{Duration, Instant};

use volare_core::error::VolareError;
use volare_mock::{MockSource, itinerary_json};
use volare_types::config::ExecutorConfig;
use volare_types::source::SourceKind;

use crate::helpers;

fn short_deadline_config(names: &[&str]) -> volare_types::config::VolareConfig {
    let mut cfg = helpers::test_config();
    cfg.executor = ExecutorConfig {
        interactive_deadline: Duration::from_millis(250),
        first_response_grace: Duration::from_millis(50),
        fallback_after: Duration::from_millis(100),
        ..helpers::test_executor_config()
    };
    for name in names {
        let mut adapter = cfg.adapter(name);
        adapter.rate_limit = None;
        adapter.timeout = Duration::from_secs(10);
        cfg.adapters.insert((*name).to_string(), adapter);
    }
    cfg
}

#[tokio::test]
async fn all_sources_stuck_at_the_deadline_is_a_timeout() {
    let stuck = MockSource::builder()
        .name("metasearch")
        .kind(SourceKind::Metasearch)
        .delay(Duration::from_secs(30))
        .build();

    let volare = volare::Volare::builder()
        .config(short_deadline_config(&["metasearch"]))
        .with_source(stuck)
        .build()
        .unwrap();

    let started = Instant::now();
    let err = volare.search(&helpers::query_krw(60)).await.unwrap_err();
    assert!(matches!(err, VolareError::RequestTimeout));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn accumulated_offers_survive_deadline_exhaustion() {
    let date = helpers::future_date(61);
    // The first result lands so close to the deadline that the grace
    // window crosses it: the deadline, not the grace, ends the request.
    let quick = MockSource::builder()
        .name("aggregator")
        .kind(SourceKind::AggregatorApi)
        .delay(Duration::from_millis(150))
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
    let stuck = MockSource::builder()
        .name("metasearch")
        .kind(SourceKind::Metasearch)
        .delay(Duration::from_secs(30))
        .build();

    let mut cfg = short_deadline_config(&["metasearch", "aggregator"]);
    cfg.executor.first_response_grace = Duration::from_millis(200);
    let volare = volare::Volare::builder()
        .config(cfg)
        .with_source(stuck)
        .with_source(quick)
        .build()
        .unwrap();

    let report = volare.search(&helpers::query_krw(61)).await.unwrap();
    assert!(report.partial);
    assert_eq!(report.offers.len(), 1);
    assert_eq!(report.source_mix.get("aggregator"), Some(&1));
}
