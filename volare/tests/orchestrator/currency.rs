use std::sync::Arc;

use rust_decimal::Decimal;
use volare_mock::{MockSource, itinerary_json};
use volare_types::money::{Currency, FxTable, Money};
use volare_types::source::SourceKind;

use crate::helpers;

#[tokio::test]
async fn foreign_prices_convert_at_the_stamped_rate_and_keep_the_original() {
    let date = helpers::future_date(44);
    let source = MockSource::builder()
        .name("aggregator")
        .kind(SourceKind::AggregatorApi)
        .returns(vec![itinerary_json(
            "CI",
            160,
            "ICN",
            "NRT",
            date,
            9_141,
            "TWD",
            "agg.example",
        )])
        .build();

    let fx = FxTable::new(
        Currency::USD,
        helpers::future_date(0),
        [
            (Currency::KRW, Decimal::from(1400)),
            (Currency::TWD, Decimal::from(32)),
        ],
    );
    let volare = helpers::builder_with(vec![source])
        .fx_table(Arc::new(fx))
        .build()
        .unwrap();

    let report = volare.search(&helpers::query_krw(44)).await.unwrap();
    let price = report.offers[0].lowest_price();
    // 9141 TWD -> USD -> KRW at the stamped daily rate.
    assert_eq!(price.converted.currency, Currency::KRW);
    assert_eq!(price.converted.amount, "399918.75".parse().unwrap());
    // The original amount and currency stay on the price entry.
    assert_eq!(price.amount, Money::new(Decimal::from(9_141), Currency::TWD));
}
