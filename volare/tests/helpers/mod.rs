#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{Days, NaiveDate, Utc};

use volare::{Volare, VolareBuilder};
use volare_core::adapter::FareSource;
use volare_types::config::{ExecutorConfig, VolareConfig};
use volare_types::geo::AirportCode;
use volare_types::money::Currency;
use volare_types::query::Query;

pub fn code(s: &str) -> AirportCode {
    AirportCode::parse(s).unwrap()
}

pub fn future_date(days_out: u64) -> NaiveDate {
    Utc::now()
        .date_naive()
        .checked_add_days(Days::new(days_out))
        .unwrap()
}

/// ICN to NRT in KRW, departing `days_out` days from now. Vary `days_out`
/// to get distinct cache keys.
pub fn query_krw(days_out: u64) -> Query {
    Query::builder(code("ICN"), code("NRT"), future_date(days_out))
        .currency(Currency::KRW)
        .build()
        .unwrap()
}

/// Executor tuning tight enough for tests: short grace and fallback
/// windows, the default four-second interactive deadline.
pub fn test_executor_config() -> ExecutorConfig {
    ExecutorConfig {
        interactive_deadline: Duration::from_secs(4),
        background_deadline: Duration::from_secs(10),
        first_response_grace: Duration::from_millis(100),
        fallback_after: Duration::from_millis(300),
        event_buffer: 64,
    }
}

pub fn test_config() -> VolareConfig {
    VolareConfig {
        executor: test_executor_config(),
        store_currency: Currency::KRW,
        ..VolareConfig::default()
    }
}

/// Orchestrator over the given sources with the test config. Rate limits
/// are disabled by default so call counts are deterministic; tests that
/// exercise buckets opt in through adapter configs.
pub fn builder_with(sources: Vec<Arc<dyn FareSource>>) -> VolareBuilder {
    let mut cfg = test_config();
    for source in &sources {
        let mut adapter = cfg.adapter(source.name());
        adapter.rate_limit = None;
        cfg.adapters.insert(source.name().to_string(), adapter);
    }
    let mut builder = Volare::builder().config(cfg);
    for source in sources {
        builder = builder.with_source(source);
    }
    builder
}

pub fn volare_with(sources: Vec<Arc<dyn FareSource>>) -> Volare {
    builder_with(sources).build().unwrap()
}
