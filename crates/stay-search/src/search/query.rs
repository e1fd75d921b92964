use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::Serialize;

use super::domain::{
    AttributeOp, AttributePredicate, AttributeValue, GeoPoint, PriceBounds, SearchRequest,
    StayRange, UnitIndexRecord,
};
use super::relaxation::RelaxationLevel;

/// Filter groups the relaxation ladder may drop, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterGroup {
    /// Amenities, rating, dynamic attributes and price range.
    Soft,
    Dates,
    Location,
}

/// One conjunctive clause of the units query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnitPredicate {
    City { city: String },
    PropertyType { property_type_id: String },
    MinCapacity { guests: u32 },
    HasAmenities { amenities: BTreeSet<String> },
    MinRating { rating: f32 },
    BasePriceBetween { bounds: PriceBounds },
    Attribute { predicate: AttributePredicate },
    WithinRadius { center: GeoPoint, radius_km: f64 },
}

impl UnitPredicate {
    /// Indexed field the predicate reads.
    pub fn field(&self) -> &'static str {
        match self {
            UnitPredicate::City { .. } => "city",
            UnitPredicate::PropertyType { .. } => "property_type_id",
            UnitPredicate::MinCapacity { .. } => "capacity",
            UnitPredicate::HasAmenities { .. } => "amenities",
            UnitPredicate::MinRating { .. } => "rating",
            UnitPredicate::BasePriceBetween { .. } => "base_price",
            UnitPredicate::Attribute { .. } => "attributes",
            UnitPredicate::WithinRadius { .. } => "location",
        }
    }

    pub fn matches(&self, unit: &UnitIndexRecord) -> bool {
        match self {
            UnitPredicate::City { city } => unit.city.eq_ignore_ascii_case(city),
            UnitPredicate::PropertyType { property_type_id } => {
                unit.property_type_id == *property_type_id
            }
            UnitPredicate::MinCapacity { guests } => unit.capacity >= *guests,
            UnitPredicate::HasAmenities { amenities } => amenities.is_subset(&unit.amenities),
            UnitPredicate::MinRating { rating } => unit.rating.is_some_and(|r| r >= *rating),
            UnitPredicate::BasePriceBetween { bounds } => bounds.contains(unit.base_price),
            UnitPredicate::Attribute { predicate } => evaluate_attribute(predicate, unit),
            UnitPredicate::WithinRadius { center, radius_km } => {
                center.distance_km(&unit.location) <= *radius_km
            }
        }
    }
}

/// Conjunction of predicates; an empty query matches every active unit.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct UnitsQuery {
    pub predicates: Vec<UnitPredicate>,
}

impl UnitsQuery {
    pub fn matches(&self, unit: &UnitIndexRecord) -> bool {
        self.predicates.iter().all(|predicate| predicate.matches(unit))
    }

    pub fn fields(&self) -> BTreeSet<&'static str> {
        self.predicates.iter().map(UnitPredicate::field).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionMode {
    /// Subtract units with an overlapping block.
    Exclude,
    /// Keep them, but report the overlapping blocks.
    Annotate,
}

/// Availability query: any block intersecting `[check_in, check_out)` hits its unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExclusionQuery {
    pub stay: StayRange,
    pub mode: ExclusionMode,
}

/// Output of the compiler for one relaxation level.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledSearch {
    pub level: RelaxationLevel,
    pub units: UnitsQuery,
    pub exclusion: Option<ExclusionQuery>,
}

impl CompiledSearch {
    /// True when both compiled searches would hit the index identically.
    pub fn same_plan(&self, other: &CompiledSearch) -> bool {
        self.units == other.units && self.exclusion == other.exclusion
    }
}

/// Reasons a request is rejected before touching the index.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("check_out ({check_out}) must be after check_in ({check_in})")]
    EmptyStay {
        check_in: chrono::NaiveDate,
        check_out: chrono::NaiveDate,
    },
    #[error("stay of {nights} nights exceeds the maximum of {max}")]
    StayTooLong { nights: i64, max: u32 },
    #[error("price.min ({min}) exceeds price.max ({max})")]
    InvertedPriceRange { min: u64, max: u64 },
    #[error("geo radius must be a positive number of kilometres")]
    InvalidRadius,
    #[error("geo point is outside valid latitude/longitude bounds")]
    InvalidGeoPoint,
    #[error("guests must be at least 1")]
    ZeroGuests,
    #[error("min_rating must be between 0 and 5")]
    InvalidRating,
    #[error("page numbering starts at 1")]
    ZeroPage,
    #[error("page_size must be at least 1")]
    ZeroPageSize,
    #[error("attribute predicate key must not be empty")]
    EmptyAttributeKey,
}

/// Reject malformed requests. Runs before any index round trip.
pub fn validate(request: &SearchRequest) -> Result<(), ValidationError> {
    if let Some(stay) = request.stay {
        if stay.check_out <= stay.check_in {
            return Err(ValidationError::EmptyStay {
                check_in: stay.check_in,
                check_out: stay.check_out,
            });
        }
    }

    if let Some(PriceBounds {
        min: Some(min),
        max: Some(max),
    }) = request.price
    {
        if min > max {
            return Err(ValidationError::InvertedPriceRange { min, max });
        }
    }

    if let Some(geo) = &request.geo {
        if !geo.point.is_valid() {
            return Err(ValidationError::InvalidGeoPoint);
        }
        if let Some(radius) = geo.radius_km {
            if !radius.is_finite() || radius <= 0.0 {
                return Err(ValidationError::InvalidRadius);
            }
        }
    }

    if request.guests == Some(0) {
        return Err(ValidationError::ZeroGuests);
    }
    if let Some(rating) = request.min_rating {
        if !(0.0..=5.0).contains(&rating) {
            return Err(ValidationError::InvalidRating);
        }
    }
    if request.page == Some(0) {
        return Err(ValidationError::ZeroPage);
    }
    if request.page_size == Some(0) {
        return Err(ValidationError::ZeroPageSize);
    }
    if request
        .attributes
        .iter()
        .flatten()
        .any(|predicate| predicate.key.trim().is_empty())
    {
        return Err(ValidationError::EmptyAttributeKey);
    }

    Ok(())
}

/// Reject stays longer than `max_nights`. Runs before any index round trip.
pub fn check_stay_length(request: &SearchRequest, max_nights: u32) -> Result<(), ValidationError> {
    match request.stay {
        Some(stay) if stay.span().nights() > i64::from(max_nights) => {
            Err(ValidationError::StayTooLong {
                nights: stay.span().nights(),
                max: max_nights,
            })
        }
        _ => Ok(()),
    }
}

/// Compile `request` into index queries, omitting every group `level` has dropped.
///
/// Absent filters produce no predicate at all.
pub fn compile(
    request: &SearchRequest,
    level: RelaxationLevel,
) -> Result<CompiledSearch, ValidationError> {
    validate(request)?;

    let mut predicates = Vec::new();

    if !level.drops(FilterGroup::Location) {
        if let Some(city) = request.city.as_ref().filter(|c| !c.trim().is_empty()) {
            predicates.push(UnitPredicate::City {
                city: city.trim().to_string(),
            });
        }
    }
    if let Some(property_type_id) = &request.property_type_id {
        predicates.push(UnitPredicate::PropertyType {
            property_type_id: property_type_id.clone(),
        });
    }
    if let Some(guests) = request.guests {
        predicates.push(UnitPredicate::MinCapacity { guests });
    }

    if !level.drops(FilterGroup::Soft) {
        if let Some(amenities) = request.requested_amenities() {
            predicates.push(UnitPredicate::HasAmenities {
                amenities: amenities.clone(),
            });
        }
        if let Some(rating) = request.min_rating {
            predicates.push(UnitPredicate::MinRating { rating });
        }
        if let Some(bounds) = request.requested_price() {
            predicates.push(UnitPredicate::BasePriceBetween { bounds: *bounds });
        }
        for predicate in request.requested_attributes().unwrap_or_default() {
            predicates.push(UnitPredicate::Attribute {
                predicate: predicate.clone(),
            });
        }
    }

    if !level.drops(FilterGroup::Location) {
        if let Some(geo) = &request.geo {
            if let Some(radius_km) = geo.radius_km {
                predicates.push(UnitPredicate::WithinRadius {
                    center: geo.point,
                    radius_km,
                });
            }
        }
    }

    let exclusion = request.stay.map(|stay| ExclusionQuery {
        stay,
        mode: if level.drops(FilterGroup::Dates) {
            ExclusionMode::Annotate
        } else {
            ExclusionMode::Exclude
        },
    });

    Ok(CompiledSearch {
        level,
        units: UnitsQuery { predicates },
        exclusion,
    })
}

/// Generic evaluator for dynamic attribute predicates. A missing key never matches.
pub fn evaluate_attribute(predicate: &AttributePredicate, unit: &UnitIndexRecord) -> bool {
    let Some(actual) = unit.attributes.get(&predicate.key) else {
        return false;
    };
    let expected = &predicate.value;

    match predicate.op {
        AttributeOp::Eq => values_equal(actual, expected),
        AttributeOp::Ne => !values_equal(actual, expected),
        AttributeOp::Gt => compare(actual, expected) == Some(Ordering::Greater),
        AttributeOp::Gte => matches!(
            compare(actual, expected),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        AttributeOp::Lt => compare(actual, expected) == Some(Ordering::Less),
        AttributeOp::Lte => matches!(
            compare(actual, expected),
            Some(Ordering::Less | Ordering::Equal)
        ),
        AttributeOp::In => match expected {
            AttributeValue::List(options) => {
                options.iter().any(|option| values_equal(actual, option))
            }
            single => values_equal(actual, single),
        },
        AttributeOp::Contains => match actual {
            AttributeValue::List(items) => items.iter().any(|item| values_equal(item, expected)),
            AttributeValue::Text(text) => match expected {
                AttributeValue::Text(needle) => {
                    text.to_lowercase().contains(&needle.to_lowercase())
                }
                _ => false,
            },
            _ => false,
        },
    }
}

fn values_equal(left: &AttributeValue, right: &AttributeValue) -> bool {
    match (left, right) {
        (AttributeValue::Text(a), AttributeValue::Text(b)) => a.eq_ignore_ascii_case(b),
        (AttributeValue::Number(a), AttributeValue::Number(b)) => (a - b).abs() < f64::EPSILON,
        (AttributeValue::Bool(a), AttributeValue::Bool(b)) => a == b,
        (AttributeValue::List(a), AttributeValue::List(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        _ => false,
    }
}

fn compare(left: &AttributeValue, right: &AttributeValue) -> Option<Ordering> {
    match (left, right) {
        (AttributeValue::Number(a), AttributeValue::Number(b)) => a.partial_cmp(b),
        (AttributeValue::Text(a), AttributeValue::Text(b)) => Some(a.cmp(b)),
        _ => None,
    }
}
