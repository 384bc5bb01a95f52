//! Gather side of scatter-gather
//!
//! Replies are grouped by correlation key. After every append the release
//! strategy decides whether the group is complete; a complete group is removed
//! and aggregated into a single result message. Late replies for a released key
//! are dropped, never re-aggregated.

mod error;
mod gatherer;
mod group;
mod strategy;

pub use error::GatherError;
pub use gatherer::{Gatherer, GathererSettings};
pub use group::ReplyGroup;
pub use strategy::{
    AggregateFn, AggregationFunction, CollectPayloads, CorrelationStrategy, CountRelease, HeaderCorrelation, KeyFn,
    PredicateRelease, ReleaseStrategy, SequenceSizeRelease,
};
