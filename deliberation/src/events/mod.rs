//! Progress event plumbing.
//!
//! All progress signals flow through a single injectable publisher, so
//! parallel and sequential execution are equally observable by
//! construction: a deliberator holds a pre-tagged `EventBridge` and never
//! touches delivery mechanics.

pub mod bus;
pub mod types;

pub use bus::{EventBridge, EventBus, EventBusExt, EventFilter, FilteredReceiver, SharedEventBus};
pub use types::DeliberationEvent;
