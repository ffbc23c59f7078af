//! IATA code newtypes and the embedded airport/airline directory.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Three-letter IATA airport/city code, stored inline so it is `Copy`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AirportCode([u8; 3]);

impl AirportCode {
    /// Parse a three-letter code, normalizing to uppercase.
    #[must_use]
    pub fn parse(code: &str) -> Option<Self> {
        let bytes = code.as_bytes();
        if bytes.len() != 3 || !bytes.iter().all(u8::is_ascii_alphabetic) {
            return None;
        }
        let mut out = [0u8; 3];
        for (o, b) in out.iter_mut().zip(bytes) {
            *o = b.to_ascii_uppercase();
        }
        Some(Self(out))
    }

    /// The code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("???")
    }
}

impl fmt::Display for AirportCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for AirportCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AirportCode({})", self.as_str())
    }
}

impl Serialize for AirportCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AirportCode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid airport code: {s:?}")))
    }
}

/// IATA airline designator (two or three alphanumeric characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CarrierCode(String);

impl CarrierCode {
    /// Parse a designator, normalizing to uppercase.
    #[must_use]
    pub fn parse(code: &str) -> Option<Self> {
        let len = code.len();
        if !(2..=3).contains(&len) || !code.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return None;
        }
        Some(Self(code.to_ascii_uppercase()))
    }

    /// The designator as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CarrierCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Coarse geographic region used by the route coverage table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Region {
    /// Korea, Japan, China, Taiwan, Hong Kong, Macau.
    NortheastAsia,
    /// ASEAN countries.
    SoutheastAsia,
    /// Indian subcontinent.
    SouthAsia,
    /// Europe including the UK.
    Europe,
    /// USA and Canada.
    NorthAmerica,
    /// Central and South America.
    LatinAmerica,
    /// Australia, New Zealand, Pacific islands.
    Oceania,
    /// Gulf states and the Levant.
    MiddleEast,
    /// The African continent.
    Africa,
}

/// One airport record in the directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Airport {
    /// IATA code.
    pub code: AirportCode,
    /// City served.
    pub city: String,
    /// ISO country code.
    pub country: String,
    /// IANA timezone name, resolved by the normalizer via chrono-tz.
    pub tz: String,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
    /// Region bucket for coverage lookups.
    pub region: Region,
}

/// Business model of an airline, used by routing heuristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum AirlineKind {
    /// Full-service network carrier.
    FullService,
    /// Low-cost carrier.
    LowCost,
    /// Regional/commuter carrier.
    Regional,
}

/// One airline record in the directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Airline {
    /// IATA designator.
    pub code: CarrierCode,
    /// Marketing name.
    pub name: String,
    /// Alliance membership, if any.
    pub alliance: Option<String>,
    /// Business model.
    pub kind: AirlineKind,
}

/// Lookup directory for airports and airlines.
///
/// Ships with an embedded seed covering the routes exercised in tests and
/// examples; deployments extend it with `insert_airport`/`insert_airline`
/// from their own reference data before building the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct AirportDirectory {
    airports: HashMap<AirportCode, Airport>,
    airlines: HashMap<CarrierCode, Airline>,
}

macro_rules! seed_airport {
    ($dir:ident, $code:literal, $city:literal, $country:literal, $tz:literal, $lat:expr, $lon:expr, $region:ident) => {
        $dir.insert_airport(Airport {
            code: AirportCode::parse($code).expect("seed code"),
            city: $city.to_string(),
            country: $country.to_string(),
            tz: $tz.to_string(),
            lat: $lat,
            lon: $lon,
            region: Region::$region,
        });
    };
}

macro_rules! seed_airline {
    ($dir:ident, $code:literal, $name:literal, $alliance:expr, $kind:ident) => {
        $dir.insert_airline(Airline {
            code: CarrierCode::parse($code).expect("seed code"),
            name: $name.to_string(),
            alliance: $alliance.map(str::to_string),
            kind: AirlineKind::$kind,
        });
    };
}

impl AirportDirectory {
    /// Empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory pre-populated with the embedded seed table.
    #[must_use]
    pub fn with_seed() -> Self {
        let mut dir = Self::new();
        seed_airport!(dir, "ICN", "Seoul", "KR", "Asia/Seoul", 37.4602, 126.4407, NortheastAsia);
        seed_airport!(dir, "GMP", "Seoul", "KR", "Asia/Seoul", 37.5583, 126.7906, NortheastAsia);
        seed_airport!(dir, "NRT", "Tokyo", "JP", "Asia/Tokyo", 35.7719, 140.3928, NortheastAsia);
        seed_airport!(dir, "HND", "Tokyo", "JP", "Asia/Tokyo", 35.5494, 139.7798, NortheastAsia);
        seed_airport!(dir, "KIX", "Osaka", "JP", "Asia/Tokyo", 34.4347, 135.2441, NortheastAsia);
        seed_airport!(dir, "TPE", "Taipei", "TW", "Asia/Taipei", 25.0777, 121.2328, NortheastAsia);
        seed_airport!(dir, "HKG", "Hong Kong", "HK", "Asia/Hong_Kong", 22.3080, 113.9185, NortheastAsia);
        seed_airport!(dir, "PVG", "Shanghai", "CN", "Asia/Shanghai", 31.1443, 121.8083, NortheastAsia);
        seed_airport!(dir, "BKK", "Bangkok", "TH", "Asia/Bangkok", 13.6900, 100.7501, SoutheastAsia);
        seed_airport!(dir, "SIN", "Singapore", "SG", "Asia/Singapore", 1.3644, 103.9915, SoutheastAsia);
        seed_airport!(dir, "DAD", "Da Nang", "VN", "Asia/Ho_Chi_Minh", 16.0439, 108.1994, SoutheastAsia);
        seed_airport!(dir, "CEB", "Cebu", "PH", "Asia/Manila", 10.3075, 123.9789, SoutheastAsia);
        seed_airport!(dir, "LHR", "London", "GB", "Europe/London", 51.4700, -0.4543, Europe);
        seed_airport!(dir, "CDG", "Paris", "FR", "Europe/Paris", 49.0097, 2.5479, Europe);
        seed_airport!(dir, "FRA", "Frankfurt", "DE", "Europe/Berlin", 50.0379, 8.5622, Europe);
        seed_airport!(dir, "JFK", "New York", "US", "America/New_York", 40.6413, -73.7781, NorthAmerica);
        seed_airport!(dir, "LAX", "Los Angeles", "US", "America/Los_Angeles", 33.9416, -118.4085, NorthAmerica);
        seed_airport!(dir, "SFO", "San Francisco", "US", "America/Los_Angeles", 37.6213, -122.3790, NorthAmerica);
        seed_airport!(dir, "SYD", "Sydney", "AU", "Australia/Sydney", -33.9399, 151.1753, Oceania);
        seed_airport!(dir, "DXB", "Dubai", "AE", "Asia/Dubai", 25.2532, 55.3657, MiddleEast);

        seed_airline!(dir, "KE", "Korean Air", Some("SkyTeam"), FullService);
        seed_airline!(dir, "OZ", "Asiana Airlines", Some("Star Alliance"), FullService);
        seed_airline!(dir, "7C", "Jeju Air", None, LowCost);
        seed_airline!(dir, "LJ", "Jin Air", None, LowCost);
        seed_airline!(dir, "TW", "T'way Air", None, LowCost);
        seed_airline!(dir, "BX", "Air Busan", None, LowCost);
        seed_airline!(dir, "RS", "Air Seoul", None, LowCost);
        seed_airline!(dir, "ZE", "Eastar Jet", None, LowCost);
        seed_airline!(dir, "YP", "Air Premia", None, LowCost);
        seed_airline!(dir, "NH", "All Nippon Airways", Some("Star Alliance"), FullService);
        seed_airline!(dir, "JL", "Japan Airlines", Some("oneworld"), FullService);
        seed_airline!(dir, "MM", "Peach Aviation", None, LowCost);
        seed_airline!(dir, "CI", "China Airlines", Some("SkyTeam"), FullService);
        seed_airline!(dir, "BR", "EVA Air", Some("Star Alliance"), FullService);
        seed_airline!(dir, "CX", "Cathay Pacific", Some("oneworld"), FullService);
        seed_airline!(dir, "SQ", "Singapore Airlines", Some("Star Alliance"), FullService);
        seed_airline!(dir, "TG", "Thai Airways", Some("Star Alliance"), FullService);
        seed_airline!(dir, "VJ", "VietJet Air", None, LowCost);
        seed_airline!(dir, "5J", "Cebu Pacific", None, LowCost);
        seed_airline!(dir, "EK", "Emirates", None, FullService);
        dir
    }

    /// Register or replace an airport record.
    pub fn insert_airport(&mut self, airport: Airport) {
        self.airports.insert(airport.code, airport);
    }

    /// Register or replace an airline record.
    pub fn insert_airline(&mut self, airline: Airline) {
        self.airlines.insert(airline.code.clone(), airline);
    }

    /// Look up an airport by code.
    #[must_use]
    pub fn airport(&self, code: AirportCode) -> Option<&Airport> {
        self.airports.get(&code)
    }

    /// Look up an airline by designator.
    #[must_use]
    pub fn airline(&self, code: &CarrierCode) -> Option<&Airline> {
        self.airlines.get(code)
    }

    /// Region bucket for an airport, if known.
    #[must_use]
    pub fn region_of(&self, code: AirportCode) -> Option<Region> {
        self.airports.get(&code).map(|a| a.region)
    }

    /// Number of airports in the directory.
    #[must_use]
    pub fn airport_count(&self) -> usize {
        self.airports.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_directory_resolves_codes() {
        let dir = AirportDirectory::with_seed();
        let icn = AirportCode::parse("icn").unwrap();
        assert_eq!(dir.airport(icn).unwrap().tz, "Asia/Seoul");
        assert_eq!(dir.region_of(icn), Some(Region::NortheastAsia));
        let ke = CarrierCode::parse("ke").unwrap();
        assert_eq!(dir.airline(&ke).unwrap().name, "Korean Air");
    }

    #[test]
    fn carrier_code_rejects_garbage() {
        assert!(CarrierCode::parse("K").is_none());
        assert!(CarrierCode::parse("KREW").is_none());
        assert!(CarrierCode::parse("7C").is_some());
    }
}
