//! The public engine API.
//!
//! [`OrderFlowApi`] drives the order lifecycle (creation, negotiation, confirmation, payment,
//! fulfilment) and [`DispatchEngine`] holds the tiered rider-assignment algorithm. Both are generic
//! over the backend traits so tests and alternative stores can slot in.
mod dispatch;
mod order_flow_api;

pub use dispatch::DispatchEngine;
pub use order_flow_api::OrderFlowApi;
