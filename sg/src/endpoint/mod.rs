//! Scatter-gather endpoint
//!
//! Per request the endpoint moves through these phases:
//!
//! ```text
//! Init -> Scattered -> Gathering -> Completed -> Delivered
//!                                \-> TimedOut  -> Failed (requires-reply)
//! ```
//!
//! Replies flow back through the reply channel stamped on every scattered copy.
//! Unless a dedicated gather channel is configured, that is an internal channel
//! that hands each reply straight to the gatherer.

mod builder;
mod context;
mod core;
mod error;
mod gather_channel;

pub use builder::ScatterGatherBuilder;
pub use context::RequestContext;
pub use self::core::ScatterGather;
pub use error::ScatterGatherError;
