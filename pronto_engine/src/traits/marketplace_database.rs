use pdp_common::Coordinates;
use thiserror::Error;

use crate::db_types::{NewOrder, NewOrderItem, Order, OrderStatusType, RiderStatus, User};

/// Result of an attempt to atomically bind a rider to an order.
#[derive(Debug, Clone)]
pub enum ClaimOutcome {
    /// The rider was claimed and the order advanced to `RiderAssigned` in the same transaction.
    Assigned(Order),
    /// The rider was no longer `Available` when the claim executed. A lost race, not an error;
    /// the caller should move on to the next candidate.
    RiderUnavailable,
    /// The order already has a rider (a concurrent dispatch won). Carries the current order.
    OrderAlreadyAssigned(Order),
}

/// The transactional store behind the dispatch engine.
///
/// Every mutation that moves an order or rider between states is a conditional (compare-and-set)
/// update: the implementation must only apply the change if the record is still in the expected
/// prior state, and must report a mismatch rather than clobbering concurrent writers.
#[allow(async_fn_in_trait)]
pub trait MarketplaceDatabase: Clone {
    /// The URL of the backing store.
    fn url(&self) -> &str;

    /// Stores a new order in a single atomic transaction.
    ///
    /// When the order carries an `offer_message_id`, the call is idempotent over
    /// `(chat_id, offer_message_id)`: if an order for that offer already exists it is returned
    /// unchanged and the second element is `false`. Orders without an offer reference always
    /// insert.
    async fn insert_order(&self, order: NewOrder) -> Result<(Order, bool), MarketplaceError>;

    /// Fetches an order with its line items loaded.
    async fn fetch_order(&self, order_id: i64) -> Result<Option<Order>, MarketplaceError>;

    /// Fetches the order created for the given accepted offer, if any.
    async fn fetch_order_for_offer(
        &self,
        chat_id: i64,
        offer_message_id: i64,
    ) -> Result<Option<Order>, MarketplaceError>;

    /// Replaces the order's line items, recomputes `total_amount` from the new items and advances
    /// the status to `Negotiating`, all in one transaction.
    ///
    /// Permitted only while the status is in the negotiable range (`Draft`, `PendingBusiness`,
    /// `Negotiating`); otherwise fails with [`MarketplaceError::InvalidStateTransition`].
    async fn replace_order_items(
        &self,
        order_id: i64,
        items: Vec<NewOrderItem>,
    ) -> Result<Order, MarketplaceError>;

    /// Moves the order to `new_status` if, and only if, its current status is one of `expected`.
    ///
    /// The guard and the write are a single atomic unit, so concurrent callers racing to advance
    /// the same order serialize: exactly one wins, the rest see `InvalidStateTransition` naming
    /// the state the order actually had.
    async fn transition_order(
        &self,
        order_id: i64,
        expected: &[OrderStatusType],
        new_status: OrderStatusType,
    ) -> Result<Order, MarketplaceError>;

    /// The confirm edge: moves the order to `AwaitingPayment` iff its status is one of `expected`
    /// and it has at least one line item and a positive total.
    ///
    /// The items/total requirement is part of the same atomic guard as the status check — a
    /// concurrent item replacement cannot land between them. Fails with
    /// [`MarketplaceError::InvalidOrderState`] when only the items/total requirement is unmet.
    async fn confirm_order(&self, order_id: i64, expected: &[OrderStatusType]) -> Result<Order, MarketplaceError>;

    /// Confirms payment for the order: `AwaitingPayment → PaymentConfirmed`, recording the payment
    /// method and transaction id and setting `confirmed_at`.
    ///
    /// Idempotent: if the order is already past `AwaitingPayment` with the same `transaction_id`,
    /// the existing order is returned with `false` for the second element. Returns `true` only for
    /// the invocation that actually performed the transition.
    async fn confirm_order_payment(
        &self,
        order_id: i64,
        method: &str,
        transaction_id: &str,
    ) -> Result<(Order, bool), MarketplaceError>;

    /// Atomically claims `rider_id` for `order_id`.
    ///
    /// The rider's status is set to `Busy` only if it is currently `Available`, and the order moves
    /// `PaymentConfirmed → RiderAssigned` only if it has no rider yet. Both updates commit as one
    /// transaction; see [`ClaimOutcome`] for the three possible results. A rider must never be
    /// observable as claimed by two orders.
    async fn claim_rider_for_order(&self, order_id: i64, rider_id: i64) -> Result<ClaimOutcome, MarketplaceError>;

    /// Marks the order delivered: `InTransit → Delivered`, sets `delivered_at` and releases the
    /// assigned rider back to `Available`, in one transaction.
    async fn deliver_order(&self, order_id: i64) -> Result<Order, MarketplaceError>;

    /// Cancels the order from any non-terminal state and releases its rider, if one was assigned.
    async fn cancel_order(&self, order_id: i64) -> Result<Order, MarketplaceError>;

    /// Rider check-in / check-out. Fails with [`MarketplaceError::NotARider`] for non-rider users.
    async fn update_rider_status(&self, rider_id: i64, status: RiderStatus) -> Result<User, MarketplaceError>;

    /// Records the rider's latest reported position.
    async fn update_rider_location(&self, rider_id: i64, location: Coordinates) -> Result<User, MarketplaceError>;

    /// Resolves a user reference to an eagerly-loaded snapshot.
    async fn fetch_user(&self, user_id: i64) -> Result<Option<User>, MarketplaceError>;

    /// Order history for a customer, newest first.
    async fn orders_for_customer(&self, customer_id: i64) -> Result<Vec<Order>, MarketplaceError>;

    /// Order history for a business, newest first.
    async fn orders_for_business(&self, business_id: i64) -> Result<Vec<Order>, MarketplaceError>;

    /// Orders assigned to a rider, newest first.
    async fn orders_for_rider(&self, rider_id: i64) -> Result<Vec<Order>, MarketplaceError>;

    /// Closes the backing store.
    async fn close(&mut self) -> Result<(), MarketplaceError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum MarketplaceError {
    #[error("Internal database error: {0}")]
    DatabaseError(String),
    #[error("The requested user {0} does not exist")]
    UserNotFound(i64),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(i64),
    #[error("The requested chat {0} does not exist")]
    ChatNotFound(i64),
    #[error("The requested message {0} does not exist")]
    MessageNotFound(i64),
    #[error("Cannot move order from {current} to {attempted}")]
    InvalidStateTransition { current: OrderStatusType, attempted: OrderStatusType },
    #[error("Order is not in a usable state: {0}")]
    InvalidOrderState(String),
    #[error("Invalid offer: {0}")]
    InvalidOffer(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Missing configuration or data: {0}")]
    PreconditionFailed(String),
    #[error("User {0} is not a rider")]
    NotARider(i64),
}

impl From<sqlx::Error> for MarketplaceError {
    fn from(e: sqlx::Error) -> Self {
        MarketplaceError::DatabaseError(e.to_string())
    }
}
