use volare_core::adapter::FareSource;
use volare_core::error::VolareError;
use volare_core::evasion::{EvasionPolicy, EvasionStrategy};
use volare_mock::MockSource;
use volare_types::source::SourceKind;

use crate::helpers;

#[tokio::test]
async fn classified_challenges_advance_the_declared_strategy_ladder() {
    let challenged = MockSource::builder()
        .name("metasearch")
        .kind(SourceKind::Metasearch)
        .evasion(EvasionPolicy::new(
            vec![
                EvasionStrategy::MaskedTls,
                EvasionStrategy::ConsentCookies,
                EvasionStrategy::WarmupRequest,
            ],
            25,
        ))
        .fails_with(|| VolareError::BotChallenge {
            source_name: "metasearch".to_string(),
            detail: "captcha wall".to_string(),
        })
        .build();

    let volare = helpers::volare_with(vec![challenged.clone()]);
    assert_eq!(challenged.evasion().unwrap().level(), 0);

    // Each challenged crawl climbs one rung; the ladder saturates at the
    // last strategy rather than wrapping.
    let _ = volare.search(&helpers::query_krw(90)).await;
    assert_eq!(challenged.evasion().unwrap().level(), 1);
    let _ = volare.search(&helpers::query_krw(91)).await;
    assert_eq!(challenged.evasion().unwrap().level(), 2);
    let _ = volare.search(&helpers::query_krw(92)).await;
    assert_eq!(challenged.evasion().unwrap().level(), 2);
    assert_eq!(
        challenged.evasion().unwrap().current(),
        EvasionStrategy::WarmupRequest
    );
}
