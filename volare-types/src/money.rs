//! Decimal money amounts, ISO-4217 currency codes, and stamped FX tables.

use std::collections::HashMap;
use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by money construction and conversion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    /// The currency code is not three ASCII uppercase letters.
    #[error("invalid currency code: {0:?}")]
    InvalidCurrency(String),
    /// The FX table has no rate for the requested currency.
    #[error("no fx rate for {0}")]
    MissingRate(Currency),
    /// Arithmetic produced a non-representable amount.
    #[error("money arithmetic overflow")]
    Overflow,
}

/// ISO-4217 alphabetic currency code.
///
/// Stored inline as three uppercase ASCII letters so it is `Copy` and cheap
/// to hash in cache keys and fingerprints.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Currency([u8; 3]);

impl Currency {
    /// South Korean won.
    pub const KRW: Self = Self(*b"KRW");
    /// US dollar.
    pub const USD: Self = Self(*b"USD");
    /// Euro.
    pub const EUR: Self = Self(*b"EUR");
    /// Japanese yen.
    pub const JPY: Self = Self(*b"JPY");
    /// New Taiwan dollar.
    pub const TWD: Self = Self(*b"TWD");

    /// Parse a three-letter alphabetic code, normalizing to uppercase.
    ///
    /// # Errors
    /// Returns `MoneyError::InvalidCurrency` unless the input is exactly
    /// three ASCII letters.
    pub fn parse(code: &str) -> Result<Self, MoneyError> {
        let bytes = code.as_bytes();
        if bytes.len() != 3 || !bytes.iter().all(u8::is_ascii_alphabetic) {
            return Err(MoneyError::InvalidCurrency(code.to_string()));
        }
        let mut out = [0u8; 3];
        for (o, b) in out.iter_mut().zip(bytes) {
            *o = b.to_ascii_uppercase();
        }
        Ok(Self(out))
    }

    /// The code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        // Validated ASCII at construction.
        std::str::from_utf8(&self.0).unwrap_or("???")
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Currency({})", self.as_str())
    }
}

impl Serialize for Currency {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Currency {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// A decimal amount tagged with its currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    /// Decimal amount in `currency` units.
    pub amount: Decimal,
    /// Currency the amount is denominated in.
    pub currency: Currency,
}

impl Money {
    /// Construct a money value.
    #[must_use]
    pub const fn new(amount: Decimal, currency: Currency) -> Self {
        Self { amount, currency }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.currency)
    }
}

/// Daily FX rates stamped with their publication date.
///
/// Rates are expressed as units of the quoted currency per one unit of
/// `base`. The table is immutable once built so normalization stays
/// deterministic for a given crawl: every price converted during one
/// fan-out uses the same stamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FxTable {
    /// Base currency the rates are quoted against.
    pub base: Currency,
    /// Date the rates were published.
    pub stamped_on: NaiveDate,
    rates: HashMap<Currency, Decimal>,
}

impl FxTable {
    /// Build a table from `(currency, units-per-base)` pairs.
    ///
    /// The base currency is always present with rate 1.
    #[must_use]
    pub fn new(
        base: Currency,
        stamped_on: NaiveDate,
        rates: impl IntoIterator<Item = (Currency, Decimal)>,
    ) -> Self {
        let mut map: HashMap<Currency, Decimal> = rates.into_iter().collect();
        map.insert(base, Decimal::ONE);
        Self {
            base,
            stamped_on,
            rates: map,
        }
    }

    /// A table that can only convert the base currency to itself.
    #[must_use]
    pub fn identity(base: Currency, stamped_on: NaiveDate) -> Self {
        Self::new(base, stamped_on, [])
    }

    /// Units of `currency` per one unit of the base currency, if known.
    #[must_use]
    pub fn rate(&self, currency: Currency) -> Option<Decimal> {
        self.rates.get(&currency).copied()
    }

    /// Convert `money` into `target` at the stamped rates.
    ///
    /// # Errors
    /// `MoneyError::MissingRate` when either currency is absent from the
    /// table, `MoneyError::Overflow` if the arithmetic does not fit.
    pub fn convert(&self, money: Money, target: Currency) -> Result<Money, MoneyError> {
        if money.currency == target {
            return Ok(money);
        }
        let from = self
            .rate(money.currency)
            .ok_or(MoneyError::MissingRate(money.currency))?;
        let to = self.rate(target).ok_or(MoneyError::MissingRate(target))?;
        let in_base = money.amount.checked_div(from).ok_or(MoneyError::Overflow)?;
        let amount = in_base.checked_mul(to).ok_or(MoneyError::Overflow)?;
        Ok(Money::new(amount, target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn table() -> FxTable {
        FxTable::new(
            Currency::USD,
            NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            [
                (Currency::KRW, dec("1400")),
                (Currency::TWD, dec("32")),
                (Currency::JPY, dec("150")),
            ],
        )
    }

    #[test]
    fn currency_parse_normalizes_case() {
        assert_eq!(Currency::parse("krw").unwrap(), Currency::KRW);
        assert!(Currency::parse("KR").is_err());
        assert!(Currency::parse("KRWX").is_err());
        assert!(Currency::parse("K1W").is_err());
    }

    #[test]
    fn convert_through_base() {
        let fx = table();
        let twd = Money::new(dec("9141"), Currency::TWD);
        let krw = fx.convert(twd, Currency::KRW).unwrap();
        assert_eq!(krw.currency, Currency::KRW);
        // 9141 / 32 * 1400
        assert_eq!(krw.amount, dec("399918.75"));
    }

    #[test]
    fn convert_same_currency_is_identity() {
        let fx = table();
        let m = Money::new(dec("420000"), Currency::KRW);
        assert_eq!(fx.convert(m, Currency::KRW).unwrap(), m);
    }

    #[test]
    fn missing_rate_is_reported() {
        let fx = table();
        let m = Money::new(dec("10"), Currency::parse("GBP").unwrap());
        assert!(matches!(
            fx.convert(m, Currency::KRW),
            Err(MoneyError::MissingRate(_))
        ));
    }
}
