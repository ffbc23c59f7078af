//! Pure normalization of raw payloads into canonical offers.
//!
//! `(RawOffer, source metadata, context) -> Offer` with no side effects:
//! timezone resolution goes through the airport directory, currency
//! conversion through the stamped FX table, so merged outputs are
//! reproducible given the same inputs.

use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::VolareError;
use crate::raw::{GdsRecord, MetasearchItinerary, RawOffer, RawPayload};
use volare_types::geo::{AirportCode, AirportDirectory, CarrierCode};
use volare_types::money::{Currency, FxTable, Money};
use volare_types::offer::{Offer, Price, Segment};
use volare_types::query::{Cabin, Query};
use volare_types::source::TrustScore;

/// Read-only inputs normalization depends on. Borrowed per fan-out so
/// every offer in one crawl is converted at the same FX stamp.
#[derive(Debug, Clone, Copy)]
pub struct NormalizeContext<'a> {
    /// Airport/airline directory for timezone and code resolution.
    pub airports: &'a AirportDirectory,
    /// Stamped daily FX table.
    pub fx: &'a FxTable,
    /// The query being answered; supplies the target currency and the
    /// cabin assumed when an upstream omits it.
    pub query: &'a Query,
}

/// Map an upstream cabin label onto the canonical cabin enum.
///
/// Tolerant of booking-class letters and the usual spelling variants;
/// `None` for labels no upstream vocabulary covers.
#[must_use]
pub fn map_cabin(label: &str) -> Option<Cabin> {
    let trimmed = label.trim();
    match trimmed.to_ascii_uppercase().as_str() {
        "ECONOMY" | "ECO" | "Y" | "M" | "COACH" => Some(Cabin::Economy),
        "PREMIUM_ECONOMY" | "PREMIUM-ECONOMY" | "PREMIUM ECONOMY" | "W" | "PE" => {
            Some(Cabin::PremiumEconomy)
        }
        "BUSINESS" | "BIZ" | "C" | "J" => Some(Cabin::Business),
        "FIRST" | "F" | "P" => Some(Cabin::First),
        _ => None,
    }
}

/// Normalize one raw offer, dispatching on the payload shape.
///
/// # Errors
/// `Parse` errors; `unusable: true` marks payloads whose root structure
/// (or price currency) is broken.
pub fn normalize_offer(
    source: &str,
    trust: TrustScore,
    raw: &RawOffer,
    ncx: &NormalizeContext<'_>,
) -> Result<Offer, VolareError> {
    match &raw.payload {
        RawPayload::Metasearch(it) => metasearch_offer(source, trust, raw, it, ncx),
        RawPayload::Aggregator(body) | RawPayload::Official(body) => {
            json_itinerary_offer(source, trust, raw, body, ncx)
        }
        RawPayload::Tenant { tenant, body } => tenant_offer(source, trust, raw, tenant, body, ncx),
        RawPayload::Airline { endpoint, body } => {
            mobile_journey_offer(source, trust, raw, endpoint, body, ncx)
        }
        RawPayload::Browser { captured_from, body } => {
            // Intercepted XHR bodies are the airline mobile shape; keep the
            // capture URL in parse errors for operator triage.
            mobile_journey_offer(source, trust, raw, captured_from, body, ncx)
        }
        RawPayload::Gds(rec) => gds_offer(source, trust, raw, rec, ncx),
    }
}

fn airport(source: &str, code: &str) -> Result<AirportCode, VolareError> {
    AirportCode::parse(code)
        .ok_or_else(|| VolareError::parse_recoverable(source, format!("bad airport code {code:?}")))
}

fn carrier(source: &str, code: &str) -> Result<CarrierCode, VolareError> {
    CarrierCode::parse(code)
        .ok_or_else(|| VolareError::parse_recoverable(source, format!("bad carrier code {code:?}")))
}

fn currency(source: &str, code: &str) -> Result<Currency, VolareError> {
    if code.is_empty() {
        // A price without a currency is not a price; treat the payload as
        // unusable rather than guess.
        return Err(VolareError::parse_unusable(source, "price currency missing"));
    }
    Currency::parse(code)
        .map_err(|_| VolareError::parse_unusable(source, format!("bad currency {code:?}")))
}

/// Resolve a local wall-clock time at an airport to UTC.
fn local_to_utc(
    source: &str,
    ncx: &NormalizeContext<'_>,
    code: AirportCode,
    local: &str,
) -> Result<DateTime<Utc>, VolareError> {
    let naive = NaiveDateTime::parse_from_str(local, "%Y-%m-%d %H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(local, "%Y-%m-%dT%H:%M:%S"))
        .map_err(|e| {
            VolareError::parse_recoverable(source, format!("bad local time {local:?}: {e}"))
        })?;
    let airport = ncx
        .airports
        .airport(code)
        .ok_or_else(|| VolareError::parse_recoverable(source, format!("unknown airport {code}")))?;
    let tz: Tz = airport.tz.parse().map_err(|_| {
        VolareError::parse_recoverable(source, format!("unknown timezone {:?}", airport.tz))
    })?;
    naive
        .and_local_timezone(tz)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| {
            VolareError::parse_recoverable(source, format!("nonexistent local time {local:?}"))
        })
}

fn utc_instant(source: &str, value: &str) -> Result<DateTime<Utc>, VolareError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| VolareError::parse_recoverable(source, format!("bad instant {value:?}: {e}")))
}

fn resolve_carriers(
    source: &str,
    marketing: &str,
    operating: Option<&str>,
) -> Result<(CarrierCode, Option<CarrierCode>, bool), VolareError> {
    let marketing = carrier(source, marketing)?;
    match operating {
        Some(op) if !op.is_empty() => Ok((marketing.clone(), Some(carrier(source, op)?), false)),
        // Operating carrier missing upstream: fall back to the marketing
        // carrier and flag it in provenance.
        _ => Ok((marketing.clone(), Some(marketing), true)),
    }
}

fn build_price(
    source: &str,
    trust: TrustScore,
    raw: &RawOffer,
    amount: Money,
    includes_baggage: bool,
    includes_meal: bool,
    fare_class: Option<String>,
    booking_url: String,
    ncx: &NormalizeContext<'_>,
) -> Result<Price, VolareError> {
    let converted = ncx.fx.convert(amount, ncx.query.currency)?;
    Ok(Price {
        source: source.to_string(),
        trust,
        amount,
        converted,
        includes_baggage,
        includes_meal,
        fare_class,
        booking_url,
        fetched_at: raw.fetched_at,
    })
}

fn metasearch_offer(
    source: &str,
    trust: TrustScore,
    raw: &RawOffer,
    it: &MetasearchItinerary,
    ncx: &NormalizeContext<'_>,
) -> Result<Offer, VolareError> {
    if it.legs.is_empty() {
        return Err(VolareError::parse_unusable(source, "itinerary has no legs"));
    }
    let cur = currency(source, &it.currency)?;
    let mut segments = Vec::with_capacity(it.legs.len());
    for leg in &it.legs {
        let origin = airport(source, &leg.origin)?;
        let destination = airport(source, &leg.destination)?;
        let (marketing, operating, assumed) =
            resolve_carriers(source, &leg.carrier, leg.operating_carrier.as_deref())?;
        segments.push(Segment {
            marketing_carrier: marketing,
            operating_carrier: operating,
            operating_assumed: assumed,
            flight_number: leg.flight_number,
            origin,
            destination,
            depart_utc: local_to_utc(source, ncx, origin, &leg.depart_local)?,
            arrive_utc: local_to_utc(source, ncx, destination, &leg.arrive_local)?,
            aircraft: leg.aircraft.clone(),
            cabin: map_cabin(&leg.cabin).unwrap_or(ncx.query.cabin),
        });
    }
    let amount = Money::new(Decimal::new(it.price_minor, minor_unit_scale(cur)), cur);
    let price = build_price(
        source,
        trust,
        raw,
        amount,
        false,
        false,
        None,
        format!("https://meta.example/book/{}", it.booking_token),
        ncx,
    )?;
    Offer::new(segments, vec![price]).map_err(VolareError::from)
}

/// Decimal places of the minor unit for a currency. Zero-decimal
/// currencies keep integral amounts.
fn minor_unit_scale(cur: Currency) -> u32 {
    if cur == Currency::KRW || cur == Currency::JPY {
        0
    } else {
        2
    }
}

/// Wire shape shared by aggregator and official-API itineraries.
#[derive(Debug, Deserialize)]
struct JsonItinerary {
    segments: Vec<JsonSegment>,
    price: JsonPrice,
    deep_link: String,
    #[serde(default)]
    baggage_included: bool,
    #[serde(default)]
    meal_included: bool,
    #[serde(default)]
    fare_brand: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JsonSegment {
    carrier: String,
    #[serde(default)]
    operating_carrier: Option<String>,
    flight_number: u16,
    origin: String,
    destination: String,
    /// RFC 3339 with offset.
    departure: String,
    /// RFC 3339 with offset.
    arrival: String,
    #[serde(default)]
    aircraft: Option<String>,
    #[serde(default)]
    cabin: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JsonPrice {
    amount: String,
    #[serde(default)]
    currency: String,
}

fn json_itinerary_offer(
    source: &str,
    trust: TrustScore,
    raw: &RawOffer,
    body: &serde_json::Value,
    ncx: &NormalizeContext<'_>,
) -> Result<Offer, VolareError> {
    let it: JsonItinerary = serde_json::from_value(body.clone())
        .map_err(|e| VolareError::parse_unusable(source, format!("itinerary shape: {e}")))?;
    let cur = currency(source, &it.price.currency)?;
    let amount = it
        .price
        .amount
        .parse::<Decimal>()
        .map_err(|e| VolareError::parse_recoverable(source, format!("bad amount: {e}")))?;
    let mut segments = Vec::with_capacity(it.segments.len());
    for seg in &it.segments {
        let (marketing, operating, assumed) =
            resolve_carriers(source, &seg.carrier, seg.operating_carrier.as_deref())?;
        segments.push(Segment {
            marketing_carrier: marketing,
            operating_carrier: operating,
            operating_assumed: assumed,
            flight_number: seg.flight_number,
            origin: airport(source, &seg.origin)?,
            destination: airport(source, &seg.destination)?,
            depart_utc: utc_instant(source, &seg.departure)?,
            arrive_utc: utc_instant(source, &seg.arrival)?,
            aircraft: seg.aircraft.clone(),
            cabin: seg
                .cabin
                .as_deref()
                .and_then(map_cabin)
                .unwrap_or(ncx.query.cabin),
        });
    }
    let price = build_price(
        source,
        trust,
        raw,
        Money::new(amount, cur),
        it.baggage_included,
        it.meal_included,
        it.fare_brand,
        it.deep_link,
        ncx,
    )?;
    Offer::new(segments, vec![price]).map_err(VolareError::from)
}

/// Wire shape of the shared-tenant endpoint. One record per flight; the
/// tenant tag names the brand and therefore the marketing carrier.
#[derive(Debug, Deserialize)]
struct TenantRecord {
    flt: u16,
    dep: String,
    arr: String,
    /// Scheduled departure, RFC 3339 with offset.
    std: String,
    /// Scheduled arrival, RFC 3339 with offset.
    sta: String,
    fare: TenantFare,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TenantFare {
    amt: i64,
    #[serde(default)]
    cur: String,
    #[serde(default)]
    cls: Option<String>,
}

fn tenant_offer(
    source: &str,
    trust: TrustScore,
    raw: &RawOffer,
    tenant: &str,
    body: &serde_json::Value,
    ncx: &NormalizeContext<'_>,
) -> Result<Offer, VolareError> {
    let rec: TenantRecord = serde_json::from_value(body.clone())
        .map_err(|e| VolareError::parse_unusable(source, format!("tenant {tenant} shape: {e}")))?;
    let cur = currency(source, &rec.fare.cur)?;
    let marketing = carrier(source, tenant)?;
    let origin = airport(source, &rec.dep)?;
    let destination = airport(source, &rec.arr)?;
    let segment = Segment {
        marketing_carrier: marketing.clone(),
        operating_carrier: Some(marketing.clone()),
        operating_assumed: false,
        flight_number: rec.flt,
        origin,
        destination,
        depart_utc: utc_instant(source, &rec.std)?,
        arrive_utc: utc_instant(source, &rec.sta)?,
        aircraft: None,
        cabin: rec
            .fare
            .cls
            .as_deref()
            .and_then(map_cabin)
            .unwrap_or(ncx.query.cabin),
    };
    let booking_url = rec.url.unwrap_or_else(|| {
        format!(
            "https://book.{}.example/{}{}",
            tenant.to_ascii_lowercase(),
            marketing,
            rec.flt
        )
    });
    let price = build_price(
        source,
        trust,
        raw,
        Money::new(Decimal::from(rec.fare.amt), cur),
        false,
        false,
        rec.fare.cls,
        booking_url,
        ncx,
    )?;
    Offer::new(vec![segment], vec![price]).map_err(VolareError::from)
}

/// Wire shape of the airline mobile APIs (reverse-engineered endpoints and
/// browser-intercepted XHRs share it).
#[derive(Debug, Deserialize)]
struct MobileJourney {
    journey: Vec<MobileLeg>,
    #[serde(rename = "totalFare")]
    total_fare: String,
    #[serde(default)]
    currency: String,
    #[serde(rename = "bookingUrl")]
    booking_url: String,
    #[serde(default, rename = "bagIncluded")]
    bag_included: bool,
    #[serde(default, rename = "mealIncluded")]
    meal_included: bool,
}

#[derive(Debug, Deserialize)]
struct MobileLeg {
    #[serde(rename = "carrierCode")]
    carrier_code: String,
    #[serde(default, rename = "operatingCarrier")]
    operating_carrier: Option<String>,
    #[serde(rename = "flightNumber")]
    flight_number: u16,
    #[serde(rename = "from")]
    from: String,
    #[serde(rename = "to")]
    to: String,
    /// RFC 3339 with offset.
    #[serde(rename = "departureTime")]
    departure_time: String,
    /// RFC 3339 with offset.
    #[serde(rename = "arrivalTime")]
    arrival_time: String,
    #[serde(default)]
    equipment: Option<String>,
    #[serde(default, rename = "cabinClass")]
    cabin_class: Option<String>,
}

fn mobile_journey_offer(
    source: &str,
    trust: TrustScore,
    raw: &RawOffer,
    origin_label: &str,
    body: &serde_json::Value,
    ncx: &NormalizeContext<'_>,
) -> Result<Offer, VolareError> {
    let journey: MobileJourney = serde_json::from_value(body.clone()).map_err(|e| {
        VolareError::parse_unusable(source, format!("journey shape ({origin_label}): {e}"))
    })?;
    let cur = currency(source, &journey.currency)?;
    let amount = journey
        .total_fare
        .parse::<Decimal>()
        .map_err(|e| VolareError::parse_recoverable(source, format!("bad fare: {e}")))?;
    let mut segments = Vec::with_capacity(journey.journey.len());
    for leg in &journey.journey {
        let (marketing, operating, assumed) =
            resolve_carriers(source, &leg.carrier_code, leg.operating_carrier.as_deref())?;
        segments.push(Segment {
            marketing_carrier: marketing,
            operating_carrier: operating,
            operating_assumed: assumed,
            flight_number: leg.flight_number,
            origin: airport(source, &leg.from)?,
            destination: airport(source, &leg.to)?,
            depart_utc: utc_instant(source, &leg.departure_time)?,
            arrive_utc: utc_instant(source, &leg.arrival_time)?,
            aircraft: leg.equipment.clone(),
            cabin: leg
                .cabin_class
                .as_deref()
                .and_then(map_cabin)
                .unwrap_or(ncx.query.cabin),
        });
    }
    let price = build_price(
        source,
        trust,
        raw,
        Money::new(amount, cur),
        journey.bag_included,
        journey.meal_included,
        None,
        journey.booking_url,
        ncx,
    )?;
    Offer::new(segments, vec![price]).map_err(VolareError::from)
}

fn gds_offer(
    source: &str,
    trust: TrustScore,
    raw: &RawOffer,
    rec: &GdsRecord,
    ncx: &NormalizeContext<'_>,
) -> Result<Offer, VolareError> {
    if rec.segments.is_empty() {
        return Err(VolareError::parse_unusable(source, "record has no segments"));
    }
    let cur = currency(source, &rec.currency)?;
    let amount = rec
        .total
        .parse::<Decimal>()
        .map_err(|e| VolareError::parse_recoverable(source, format!("bad total: {e}")))?;
    let mut segments = Vec::with_capacity(rec.segments.len());
    for seg in &rec.segments {
        let (marketing, operating, assumed) = resolve_carriers(
            source,
            &seg.marketing_carrier,
            seg.operating_carrier.as_deref(),
        )?;
        segments.push(Segment {
            marketing_carrier: marketing,
            operating_carrier: operating,
            operating_assumed: assumed,
            flight_number: seg.flight_number,
            origin: airport(source, &seg.origin)?,
            destination: airport(source, &seg.destination)?,
            depart_utc: utc_instant(source, &seg.depart_utc)?,
            arrive_utc: utc_instant(source, &seg.arrive_utc)?,
            aircraft: seg.aircraft.clone(),
            cabin: map_cabin(&seg.booking_class).unwrap_or(ncx.query.cabin),
        });
    }
    let price = build_price(
        source,
        trust,
        raw,
        Money::new(amount, cur),
        rec.baggage_included,
        false,
        Some(rec.fare_basis.clone()),
        rec.booking_url.clone(),
        ncx,
    )?;
    Offer::new(segments, vec![price]).map_err(VolareError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::MetasearchLeg;
    use chrono::NaiveDate;
    use serde_json::json;
    use volare_types::source::SourceKey;

    fn ctx_parts() -> (AirportDirectory, FxTable) {
        let airports = AirportDirectory::with_seed();
        let fx = FxTable::new(
            Currency::USD,
            NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            [
                (Currency::KRW, Decimal::from(1400)),
                (Currency::TWD, Decimal::from(32)),
            ],
        );
        (airports, fx)
    }

    fn query() -> Query {
        Query::builder(
            AirportCode::parse("ICN").unwrap(),
            AirportCode::parse("NRT").unwrap(),
            NaiveDate::from_ymd_opt(2026, 4, 15).unwrap(),
        )
        .currency(Currency::KRW)
        .build_against(NaiveDate::from_ymd_opt(2026, 3, 1).unwrap())
        .unwrap()
    }

    fn meta_leg() -> MetasearchLeg {
        MetasearchLeg {
            carrier: "KE".into(),
            operating_carrier: None,
            flight_number: 901,
            origin: "ICN".into(),
            destination: "NRT".into(),
            depart_local: "2026-04-15 10:00".into(),
            arrive_local: "2026-04-15 12:20".into(),
            aircraft: Some("B789".into()),
            cabin: "ECONOMY".into(),
        }
    }

    #[test]
    fn metasearch_times_resolve_through_airport_timezones() {
        let (airports, fx) = ctx_parts();
        let query = query();
        let ncx = NormalizeContext {
            airports: &airports,
            fx: &fx,
            query: &query,
        };
        let raw = RawOffer::new(
            SourceKey::new("metasearch"),
            RawPayload::Metasearch(MetasearchItinerary {
                legs: vec![meta_leg()],
                price_minor: 420_000,
                currency: "KRW".into(),
                booking_token: "tok".into(),
            }),
        );
        let offer = normalize_offer("metasearch", TrustScore::METASEARCH, &raw, &ncx).unwrap();
        let seg = &offer.segments()[0];
        // 10:00 KST is 01:00 UTC; 12:20 JST is 03:20 UTC.
        assert_eq!(seg.depart_utc.to_rfc3339(), "2026-04-15T01:00:00+00:00");
        assert_eq!(seg.arrive_utc.to_rfc3339(), "2026-04-15T03:20:00+00:00");
        assert!(seg.operating_assumed);
        assert_eq!(seg.operating_carrier, Some(seg.marketing_carrier.clone()));
        assert_eq!(offer.lowest_price().converted.amount, Decimal::from(420_000));
    }

    #[test]
    fn missing_currency_is_unusable() {
        let (airports, fx) = ctx_parts();
        let query = query();
        let ncx = NormalizeContext {
            airports: &airports,
            fx: &fx,
            query: &query,
        };
        let raw = RawOffer::new(
            SourceKey::new("metasearch"),
            RawPayload::Metasearch(MetasearchItinerary {
                legs: vec![meta_leg()],
                price_minor: 420_000,
                currency: String::new(),
                booking_token: "tok".into(),
            }),
        );
        let err = normalize_offer("metasearch", TrustScore::METASEARCH, &raw, &ncx).unwrap_err();
        assert!(matches!(err, VolareError::Parse { unusable: true, .. }));
    }

    #[test]
    fn aggregator_prices_convert_at_the_stamped_rate() {
        let (airports, fx) = ctx_parts();
        let query = query();
        let ncx = NormalizeContext {
            airports: &airports,
            fx: &fx,
            query: &query,
        };
        let raw = RawOffer::new(
            SourceKey::new("aggregator"),
            RawPayload::Aggregator(json!({
                "segments": [{
                    "carrier": "CI",
                    "flight_number": 160,
                    "origin": "TPE",
                    "destination": "ICN",
                    "departure": "2026-04-15T08:00:00+08:00",
                    "arrival": "2026-04-15T11:25:00+09:00",
                    "cabin": "Y",
                }],
                "price": { "amount": "9141", "currency": "TWD" },
                "deep_link": "https://agg.example/b/1",
            })),
        );
        let offer = normalize_offer("aggregator", TrustScore::AGGREGATOR, &raw, &ncx).unwrap();
        let price = offer.lowest_price();
        // Original amount and currency preserved alongside the conversion.
        assert_eq!(price.amount, Money::new(Decimal::from(9141), Currency::TWD));
        assert_eq!(price.converted.currency, Currency::KRW);
        assert_eq!(price.converted.amount, "399918.75".parse().unwrap());
    }

    #[test]
    fn tenant_dispatch_stamps_the_brand_carrier() {
        let (airports, fx) = ctx_parts();
        let query = query();
        let ncx = NormalizeContext {
            airports: &airports,
            fx: &fx,
            query: &query,
        };
        let raw = RawOffer::new(
            SourceKey::new("tenant"),
            RawPayload::Tenant {
                tenant: "7C".into(),
                body: json!({
                    "flt": 1101,
                    "dep": "ICN",
                    "arr": "NRT",
                    "std": "2026-04-15T09:30:00+09:00",
                    "sta": "2026-04-15T11:50:00+09:00",
                    "fare": { "amt": 89000, "cur": "KRW", "cls": "Y" },
                }),
            },
        );
        let offer = normalize_offer("tenant", TrustScore::DIRECT_AIRLINE, &raw, &ncx).unwrap();
        assert_eq!(offer.segments()[0].marketing_carrier.as_str(), "7C");
        assert!(!offer.segments()[0].operating_assumed);
        assert!(offer.lowest_price().booking_url.contains("7c"));
    }

    #[test]
    fn broken_root_shape_is_unusable() {
        let (airports, fx) = ctx_parts();
        let query = query();
        let ncx = NormalizeContext {
            airports: &airports,
            fx: &fx,
            query: &query,
        };
        let raw = RawOffer::new(
            SourceKey::new("aggregator"),
            RawPayload::Aggregator(json!({ "totally": "different" })),
        );
        let err = normalize_offer("aggregator", TrustScore::AGGREGATOR, &raw, &ncx).unwrap_err();
        assert!(matches!(err, VolareError::Parse { unusable: true, .. }));
    }

    #[test]
    fn cabin_mapping_handles_booking_classes() {
        assert_eq!(map_cabin("economy"), Some(Cabin::Economy));
        assert_eq!(map_cabin("J"), Some(Cabin::Business));
        assert_eq!(map_cabin("premium economy"), Some(Cabin::PremiumEconomy));
        assert_eq!(map_cabin("F"), Some(Cabin::First));
        assert_eq!(map_cabin("steerage"), None);
    }
}
