//! # Backend contracts
//!
//! This module defines the interface contracts that storage and collaborator backends must expose
//! for the dispatch engine to run on top of them.
//!
//! * [`MarketplaceDatabase`] is the transactional store for orders, riders and users. All state
//!   transitions it performs are conditional updates — a caller states the prior state it expects,
//!   and a mismatch is reported rather than overwritten. This is what makes order transitions
//!   serialize and rider claims race-safe.
//! * [`RiderSearch`] answers proximity queries over rider positions (the GeoIndex). It is split
//!   from the store contract so that dispatch can degrade gracefully when only the geo backend is
//!   unhealthy.
//! * [`ChatGateway`] is the boundary to the chat subsystem: offer messages and chat membership are
//!   read through it, never written.
mod chat_gateway;
mod marketplace_database;
mod rider_search;

pub use chat_gateway::ChatGateway;
pub use marketplace_database::{ClaimOutcome, MarketplaceDatabase, MarketplaceError};
pub use rider_search::{RiderSearch, RiderSearchError};
