use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Identifier wrapper for bookable units.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnitId(pub String);

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier wrapper for the property a unit belongs to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PropertyId(pub String);

/// WGS84 coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    const EARTH_RADIUS_KM: f64 = 6371.0088;

    /// Great-circle distance in kilometres.
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let d_lat = lat2 - lat1;
        let d_lon = (other.lon - self.lon).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        2.0 * Self::EARTH_RADIUS_KM * a.sqrt().asin()
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lon)
    }
}

/// Value held in a unit's open attribute map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<AttributeValue>),
}

/// Searchable projection of one active unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitIndexRecord {
    pub unit_id: UnitId,
    pub property_id: PropertyId,
    pub name: String,
    pub city: String,
    pub property_type_id: String,
    pub location: GeoPoint,
    pub capacity: u32,
    pub base_price: u64,
    pub currency: String,
    #[serde(default)]
    pub rating: Option<f32>,
    #[serde(default)]
    pub amenities: BTreeSet<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// Half-open night range `[start, end)`; `end` is the first night not covered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateSpan {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateSpan {
    pub fn overlaps(&self, other: &DateSpan) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn covers_night(&self, night: NaiveDate) -> bool {
        self.start <= night && night < self.end
    }

    pub fn nights(&self) -> i64 {
        (self.end - self.start).num_days().max(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockSource {
    Booking,
    Maintenance,
}

/// A reservation or hold that makes a unit unavailable for every night it covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityBlockRecord {
    pub block_id: String,
    pub unit_id: UnitId,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub source: BlockSource,
}

impl AvailabilityBlockRecord {
    pub fn span(&self) -> DateSpan {
        DateSpan {
            start: self.start,
            end: self.end,
        }
    }
}

/// Nightly price override for a unit across `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePeriodRecord {
    pub period_id: String,
    pub unit_id: UnitId,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub nightly_price: u64,
    pub currency: String,
    /// Recency marker, larger is newer.
    pub priority: u64,
}

impl PricePeriodRecord {
    pub fn span(&self) -> DateSpan {
        DateSpan {
            start: self.start,
            end: self.end,
        }
    }
}

/// Requested stay; check-out is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StayRange {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

impl StayRange {
    pub fn span(&self) -> DateSpan {
        DateSpan {
            start: self.check_in,
            end: self.check_out,
        }
    }

    /// Every night of the stay, in order.
    pub fn nights(&self) -> impl Iterator<Item = NaiveDate> {
        let check_out = self.check_out;
        self.check_in
            .iter_days()
            .take_while(move |night| *night < check_out)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PriceBounds {
    #[serde(default)]
    pub min: Option<u64>,
    #[serde(default)]
    pub max: Option<u64>,
}

impl PriceBounds {
    pub fn contains(&self, price: u64) -> bool {
        self.min.map_or(true, |min| price >= min) && self.max.map_or(true, |max| price <= max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoFilter {
    pub point: GeoPoint,
    #[serde(default)]
    pub radius_km: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Contains,
}

/// Predicate over a single key of the dynamic attribute map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributePredicate {
    pub key: String,
    pub op: AttributeOp,
    pub value: AttributeValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Recommended,
    PriceAsc,
    PriceDesc,
    RatingDesc,
    DistanceAsc,
}

/// Structured search filters. Every filter is optional.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub property_type_id: Option<String>,
    #[serde(default)]
    pub stay: Option<StayRange>,
    #[serde(default)]
    pub guests: Option<u32>,
    #[serde(default)]
    pub amenities: Option<BTreeSet<String>>,
    #[serde(default)]
    pub min_rating: Option<f32>,
    #[serde(default)]
    pub price: Option<PriceBounds>,
    #[serde(default)]
    pub attributes: Option<Vec<AttributePredicate>>,
    #[serde(default)]
    pub geo: Option<GeoFilter>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
    #[serde(default)]
    pub sort: SortOrder,
    #[serde(default)]
    pub allow_relaxation: Option<bool>,
}

impl SearchRequest {
    pub fn relaxation_allowed(&self) -> bool {
        self.allow_relaxation.unwrap_or(true)
    }

    /// Amenities filter, treating an empty set as absent.
    pub fn requested_amenities(&self) -> Option<&BTreeSet<String>> {
        self.amenities.as_ref().filter(|set| !set.is_empty())
    }

    pub fn requested_attributes(&self) -> Option<&[AttributePredicate]> {
        self.attributes
            .as_deref()
            .filter(|predicates| !predicates.is_empty())
    }

    pub fn requested_price(&self) -> Option<&PriceBounds> {
        self.price
            .as_ref()
            .filter(|bounds| bounds.min.is_some() || bounds.max.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, d).expect("valid date")
    }

    #[test]
    fn adjacent_spans_do_not_overlap() {
        let first = DateSpan {
            start: day(1),
            end: day(4),
        };
        let second = DateSpan {
            start: day(4),
            end: day(6),
        };
        assert!(!first.overlaps(&second));
        assert!(!second.overlaps(&first));
        assert!(first.covers_night(day(3)));
        assert!(!first.covers_night(day(4)));
    }

    #[test]
    fn stay_nights_exclude_check_out() {
        let stay = StayRange {
            check_in: day(1),
            check_out: day(4),
        };
        let nights: Vec<_> = stay.nights().collect();
        assert_eq!(nights, vec![day(1), day(2), day(3)]);
    }

    #[test]
    fn haversine_distance_is_symmetric_and_zero_on_self() {
        let sanaa = GeoPoint {
            lat: 15.3694,
            lon: 44.1910,
        };
        let aden = GeoPoint {
            lat: 12.7855,
            lon: 45.0187,
        };
        assert!(sanaa.distance_km(&sanaa).abs() < 1e-9);
        let there = sanaa.distance_km(&aden);
        let back = aden.distance_km(&sanaa);
        assert!((there - back).abs() < 1e-9);
        assert!((280.0..320.0).contains(&there), "distance was {there}");
    }

    #[test]
    fn request_deserializes_with_defaults() {
        let request: SearchRequest =
            serde_json::from_str(r#"{"city":"Sanaa","amenities":["pool"]}"#).expect("parses");
        assert_eq!(request.city.as_deref(), Some("Sanaa"));
        assert_eq!(request.sort, SortOrder::Recommended);
        assert!(request.relaxation_allowed());
        assert!(request.stay.is_none());
    }
}
