//! # Pronto delivery engine
//!
//! The core marketplace logic for the Pronto delivery platform. Customers negotiate orders with
//! businesses over chat, pay, and have the order delivered by a rider claimed from the pool of
//! available riders closest to the business.
//!
//! The major pieces are:
//!
//! * The [`api`] module, which provides the high-level workflows. [`OrderFlowApi`] carries an order
//!   through its whole lifecycle (offer acceptance, item negotiation, payment confirmation,
//!   delivery) and [`DispatchEngine`] finds and claims riders for paid orders.
//! * The [`traits`] module, defining the backend seams: [`MarketplaceDatabase`] for transactional
//!   storage, [`RiderSearch`] for proximity queries, and [`ChatGateway`] for resolving offers.
//! * The [`sqlite`] module (behind the default `sqlite` feature), a [`SqliteDatabase`]
//!   implementation of all three traits.
//! * The [`events`] module, a pub-sub system for order lifecycle notifications.
//!
//! Every state transition in the engine is a conditional update: callers racing to advance the same
//! order, or to claim the same rider, serialize in the store and exactly one wins.

pub mod api;
pub mod config;
pub mod db_types;
pub mod events;
pub mod offers;
pub mod traits;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;

pub use api::{DispatchEngine, OrderFlowApi};
pub use config::DispatchConfig;
pub use offers::AcceptOffer;
pub use traits::{ChatGateway, ClaimOutcome, MarketplaceDatabase, MarketplaceError, RiderSearch, RiderSearchError};
