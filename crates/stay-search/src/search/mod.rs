//! Availability-aware search and dynamic pricing.
//!
//! A request flows through the query compiler, the atomic executor (units query minus
//! blocked units in one store operation), the relaxation ladder when too few units match,
//! a batched pricing pass, and finally ranking and pagination.

pub mod assembler;
pub mod domain;
mod error;
pub mod executor;
pub mod index;
pub mod pricing;
pub mod query;
pub mod relaxation;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use assembler::{Pagination, SearchNotice, SearchResponse, SearchResult};
pub use domain::{
    AttributeOp, AttributePredicate, AttributeValue, AvailabilityBlockRecord, BlockSource,
    GeoFilter, GeoPoint, PriceBounds, PricePeriodRecord, PropertyId, SearchRequest, SortOrder,
    StayRange, UnitId, UnitIndexRecord,
};
pub use error::SearchError;
pub use index::{
    apply_event, InMemoryIndexStore, IndexError, IndexEvent, IndexFixture, IndexMaintainer,
    IndexStore,
};
pub use pricing::{resolve_stay_price, PriceQuote};
pub use query::{compile, ValidationError};
pub use relaxation::{FilterDimension, FilterMismatch, RelaxationLevel};
pub use router::search_router;
pub use service::StaySearchService;
