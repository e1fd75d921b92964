use std::cmp::Ordering;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::domain::{PricePeriodRecord, StayRange, UnitIndexRecord};

/// Where a night's price came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateSource {
    Base,
    Period(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NightlyRate {
    pub night: NaiveDate,
    pub price: u64,
    pub source: RateSource,
}

/// Total stay price with its per-night breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub total: u64,
    pub nights: u32,
    pub currency: String,
    pub nightly: Vec<NightlyRate>,
}

/// Ordering between two periods covering the same night; `Greater` means `a` wins.
///
/// Highest priority first, then the narrower range, then the later start, then the
/// greatest period id, so exactly one period wins every night.
pub fn period_precedence(a: &PricePeriodRecord, b: &PricePeriodRecord) -> Ordering {
    a.priority
        .cmp(&b.priority)
        .then_with(|| b.span().nights().cmp(&a.span().nights()))
        .then_with(|| a.start.cmp(&b.start))
        .then_with(|| a.period_id.cmp(&b.period_id))
}

/// Period that prices `night`, if any covers it.
pub fn winning_period<'a>(
    night: NaiveDate,
    periods: &'a [PricePeriodRecord],
) -> Option<&'a PricePeriodRecord> {
    periods
        .iter()
        .filter(|period| period.span().covers_night(night))
        .max_by(|a, b| period_precedence(a, b))
}

/// Resolve the total price of `stay` for `unit`, night by night.
///
/// Nights no period covers fall back to the unit's base price. Periods quoted in another
/// currency are skipped. The total saturates at `u64::MAX`.
pub fn resolve_stay_price(
    unit: &UnitIndexRecord,
    stay: StayRange,
    periods: &[PricePeriodRecord],
) -> PriceQuote {
    let (usable, foreign): (Vec<&PricePeriodRecord>, Vec<&PricePeriodRecord>) = periods
        .iter()
        .filter(|period| period.unit_id == unit.unit_id)
        .partition(|period| period.currency.eq_ignore_ascii_case(&unit.currency));
    if !foreign.is_empty() {
        debug!(
            unit_id = %unit.unit_id,
            skipped = foreign.len(),
            "ignoring price periods quoted in a foreign currency"
        );
    }
    let usable: Vec<PricePeriodRecord> = usable.into_iter().cloned().collect();

    let nightly: Vec<NightlyRate> = stay
        .nights()
        .map(|night| match winning_period(night, &usable) {
            Some(period) => NightlyRate {
                night,
                price: period.nightly_price,
                source: RateSource::Period(period.period_id.clone()),
            },
            None => NightlyRate {
                night,
                price: unit.base_price,
                source: RateSource::Base,
            },
        })
        .collect();

    PriceQuote {
        total: nightly
            .iter()
            .fold(0u64, |total, rate| total.saturating_add(rate.price)),
        nights: nightly.len() as u32,
        currency: unit.currency.clone(),
        nightly,
    }
}

/// Quote used when the request carries no stay: the base nightly price alone.
pub fn base_quote(unit: &UnitIndexRecord) -> PriceQuote {
    PriceQuote {
        total: unit.base_price,
        nights: 0,
        currency: unit.currency.clone(),
        nightly: Vec::new(),
    }
}
