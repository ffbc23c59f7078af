use std::time::Duration;

use volare_core::error::VolareError;
use volare_mock::{MockSource, itinerary_json};
use volare_types::config::CircuitConfig;
use volare_types::health::CircuitState;
use volare_types::source::{SourceKey, SourceKind};

use crate::helpers;

#[tokio::test]
async fn bot_challenged_source_opens_skips_and_probes_after_cooldown() {
    let date = helpers::future_date(50);
    let challenged = MockSource::builder()
        .name("metasearch")
        .kind(SourceKind::Metasearch)
        .fails_with(|| VolareError::BotChallenge {
            source_name: "metasearch".to_string(),
            detail: "captcha wall".to_string(),
        })
        .build();
    let healthy = MockSource::builder()
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

    let mut cfg = helpers::test_config();
    cfg.circuit = CircuitConfig {
        failure_threshold: 3,
        window: Duration::from_secs(60),
        cooldown: Duration::from_millis(300),
    };
    for name in ["metasearch", "aggregator"] {
        let mut adapter = cfg.adapter(name);
        adapter.rate_limit = None;
        cfg.adapters.insert(name.to_string(), adapter);
    }
    let volare = volare::Volare::builder()
        .config(cfg)
        .with_source(challenged.clone())
        .with_source(healthy.clone())
        .build()
        .unwrap();

    // Three distinct queries, three challenged failures: the breaker
    // opens on the third.
    for days in [50u64, 51, 52] {
        let report = volare.search(&helpers::query_krw(days)).await.unwrap();
        assert!(report.offers.iter().all(|o| {
            o.prices().iter().all(|p| p.source != "metasearch")
        }));
    }
    assert_eq!(challenged.calls(), 3);
    let health = volare.source_health();
    let (_, snap) = health
        .iter()
        .find(|(k, _)| *k == SourceKey::new("metasearch"))
        .unwrap();
    assert_eq!(snap.circuit, CircuitState::Open);

    // While open the source is skipped entirely.
    let report = volare.search(&helpers::query_krw(53)).await.unwrap();
    assert!(!report.source_mix.contains_key("metasearch"));
    assert_eq!(challenged.calls(), 3);

    // After the cooldown one half-open probe goes out.
    tokio::time::sleep(Duration::from_millis(400)).await;
    let _ = volare.search(&helpers::query_krw(54)).await.unwrap();
    assert_eq!(challenged.calls(), 4);
}
