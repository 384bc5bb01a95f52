//! Diagnostic events
//!
//! Every significant step of a scatter-gather request emits an [`SgEvent`] on a
//! broadcast [`EventBus`]. Nothing in the endpoint depends on anyone listening;
//! late-reply drops in particular are only observable here and in the logs.
//!
//! ```rust,ignore
//! let bus = create_event_bus();
//! let mut rx = bus.subscribe();
//! while let Ok(event) = rx.recv().await {
//!     println!("{}: {:?}", event.event_type(), event.correlation_id());
//! }
//! ```

mod bus;
mod types;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus, EventEmitter, create_event_bus};
pub use types::{EventLogEntry, RequestPhase, SgEvent};
