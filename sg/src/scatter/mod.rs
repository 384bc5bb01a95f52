//! Scatter side of scatter-gather
//!
//! Two mutually exclusive distributions:
//! - **Auction:** broadcast an identical copy through a publish-subscribe channel
//! - **Distribution:** route to a filtered, ordered recipient list

mod distributor;
mod error;
mod recipient;

pub use distributor::{Distribution, DistributionMode, Distributor};
pub use error::ScatterError;
pub use recipient::{Recipient, RecipientList, Selector, Transformer};
