//! Best-effort notification fan-out.
//!
//! State changes are published to interested parties (the customer, the business, the claimed
//! rider) through a stateless pub-sub channel. Publishing is fire-and-forget: the order and rider
//! mutations commit first, and a failed or slow subscriber can never roll them back.
mod channel;
mod event_types;
mod hooks;

pub use channel::{EventHandler, EventProducer, Handler};
pub use event_types::*;
pub use hooks::{EventHandlers, EventHooks, EventProducers};
