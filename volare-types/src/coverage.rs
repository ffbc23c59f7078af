//! Route coverage and popularity tables.
//!
//! The coverage table is hand-maintained reference data: for a route class
//! it records which carriers are expected to fly it, so the router can force
//! carrier-specific sources into the primary tier. Rules are matched by
//! specificity (more populated selector fields win); ties go to the rule
//! defined last.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::geo::{AirportCode, CarrierCode, Region};
use crate::query::Cabin;
use crate::source::RouteTier;

/// One coverage rule: a selector plus the carriers expected on matching
/// routes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageRule {
    /// Origin region constraint, `None` matches any.
    pub origin: Option<Region>,
    /// Destination region constraint, `None` matches any.
    pub destination: Option<Region>,
    /// Cabin constraint, `None` matches any.
    pub cabin: Option<Cabin>,
    /// Carriers expected to serve matching routes.
    pub expected_carriers: Vec<CarrierCode>,
}

impl CoverageRule {
    fn specificity(&self) -> (u8, u8, u8, u8) {
        let o = u8::from(self.origin.is_some());
        let d = u8::from(self.destination.is_some());
        let c = u8::from(self.cabin.is_some());
        (o + d + c, o, d, c)
    }

    fn matches(&self, origin: Region, destination: Region, cabin: Cabin) -> bool {
        self.origin.is_none_or(|o| o == origin)
            && self.destination.is_none_or(|d| d == destination)
            && self.cabin.is_none_or(|c| c == cabin)
    }
}

/// Ordered set of coverage rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageTable {
    rules: Vec<CoverageRule>,
}

impl CoverageTable {
    /// Empty table: no carrier enrichment anywhere.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule. Later rules of equal specificity win.
    pub fn add_rule(&mut self, rule: CoverageRule) {
        self.rules.push(rule);
    }

    /// Builder-style [`CoverageTable::add_rule`].
    #[must_use]
    pub fn with_rule(mut self, rule: CoverageRule) -> Self {
        self.add_rule(rule);
        self
    }

    /// Carriers expected for a route class, from the best-matching rule.
    /// Empty when no rule matches.
    #[must_use]
    pub fn expected_carriers(
        &self,
        origin: Region,
        destination: Region,
        cabin: Cabin,
    ) -> &[CarrierCode] {
        let mut best: Option<(&CoverageRule, (u8, u8, u8, u8), usize)> = None;
        for (idx, rule) in self.rules.iter().enumerate() {
            if !rule.matches(origin, destination, cabin) {
                continue;
            }
            let spec = rule.specificity();
            match &best {
                None => best = Some((rule, spec, idx)),
                Some((_, bspec, bidx)) => {
                    if spec > *bspec || (spec == *bspec && idx > *bidx) {
                        best = Some((rule, spec, idx));
                    }
                }
            }
        }
        best.map_or(&[], |(rule, _, _)| rule.expected_carriers.as_slice())
    }

    /// Iterate all rules, for validation.
    pub fn iter_rules(&self) -> impl Iterator<Item = &CoverageRule> {
        self.rules.iter()
    }
}

/// Popularity assignment of one route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutePopularity {
    /// Origin airport.
    pub origin: AirportCode,
    /// Destination airport.
    pub destination: AirportCode,
    /// Tier of the route.
    pub tier: RouteTier,
}

/// Route popularity table: unlisted routes are long-tail.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PopularityTable {
    routes: Vec<RoutePopularity>,
    #[serde(skip)]
    index: HashMap<(AirportCode, AirportCode), RouteTier>,
}

impl PopularityTable {
    /// Build a table from route assignments.
    #[must_use]
    pub fn new(routes: Vec<RoutePopularity>) -> Self {
        let index = routes
            .iter()
            .map(|r| ((r.origin, r.destination), r.tier))
            .collect();
        Self { routes, index }
    }

    /// Tier for a route; unlisted routes are [`RouteTier::LongTail`].
    #[must_use]
    pub fn route_tier(&self, origin: AirportCode, destination: AirportCode) -> RouteTier {
        // Serde skips the index; rebuild-by-scan keeps deserialized tables
        // correct without a custom Deserialize impl.
        if self.index.len() == self.routes.len() {
            return self
                .index
                .get(&(origin, destination))
                .copied()
                .unwrap_or(RouteTier::LongTail);
        }
        self.routes
            .iter()
            .find(|r| r.origin == origin && r.destination == destination)
            .map_or(RouteTier::LongTail, |r| r.tier)
    }

    /// Routes in the top tier, in table order; the refresh scheduler seeds
    /// from these.
    pub fn top_routes(&self) -> impl Iterator<Item = &RoutePopularity> {
        self.routes.iter().filter(|r| r.tier == RouteTier::Top)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn carrier(s: &str) -> CarrierCode {
        CarrierCode::parse(s).unwrap()
    }

    #[test]
    fn most_specific_rule_wins() {
        let table = CoverageTable::new()
            .with_rule(CoverageRule {
                origin: Some(Region::NortheastAsia),
                destination: None,
                cabin: None,
                expected_carriers: vec![carrier("KE")],
            })
            .with_rule(CoverageRule {
                origin: Some(Region::NortheastAsia),
                destination: Some(Region::NortheastAsia),
                cabin: None,
                expected_carriers: vec![carrier("KE"), carrier("7C"), carrier("NH")],
            });
        let got = table.expected_carriers(
            Region::NortheastAsia,
            Region::NortheastAsia,
            Cabin::Economy,
        );
        assert_eq!(got.len(), 3);
        let got = table.expected_carriers(Region::NortheastAsia, Region::Europe, Cabin::Economy);
        assert_eq!(got, &[carrier("KE")]);
    }

    #[test]
    fn later_rule_breaks_specificity_ties() {
        let table = CoverageTable::new()
            .with_rule(CoverageRule {
                origin: Some(Region::Europe),
                destination: None,
                cabin: None,
                expected_carriers: vec![carrier("BA")],
            })
            .with_rule(CoverageRule {
                origin: Some(Region::Europe),
                destination: None,
                cabin: None,
                expected_carriers: vec![carrier("AF")],
            });
        let got = table.expected_carriers(Region::Europe, Region::Oceania, Cabin::Business);
        assert_eq!(got, &[carrier("AF")]);
    }

    #[test]
    fn unlisted_routes_are_long_tail() {
        let icn = AirportCode::parse("ICN").unwrap();
        let nrt = AirportCode::parse("NRT").unwrap();
        let syd = AirportCode::parse("SYD").unwrap();
        let table = PopularityTable::new(vec![RoutePopularity {
            origin: icn,
            destination: nrt,
            tier: RouteTier::Top,
        }]);
        assert_eq!(table.route_tier(icn, nrt), RouteTier::Top);
        assert_eq!(table.route_tier(icn, syd), RouteTier::LongTail);
        assert_eq!(table.top_routes().count(), 1);
    }
}
