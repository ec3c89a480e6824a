use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use pdp_common::{Coordinates, Money};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

/// Payment method stamped on orders created from an accepted chat offer.
pub const DEFAULT_PAYMENT_METHOD: &str = "UPI_ON_DELIVERY";

#[derive(Debug, Clone, Error)]
#[error("Invalid value: {0}")]
pub struct ConversionError(String);

//--------------------------------------  OrderStatusType  -----------------------------------------------------------
/// The order lifecycle.
///
/// Orders only ever move forward along the chain below, or sideways to `Cancelled` from any
/// non-terminal state. There are no backward transitions; items are frozen once the order reaches
/// `PaymentConfirmed`.
///
/// `Draft → PendingBusiness → Negotiating → AwaitingPayment → PaymentConfirmed → RiderAssigned → InTransit → Delivered`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum OrderStatusType {
    /// The order exists but the business has not engaged with it yet.
    Draft,
    /// The customer has asked the business to fill in line items.
    PendingBusiness,
    /// Line items are being negotiated over chat.
    Negotiating,
    /// Both sides agreed; waiting for the customer to pay.
    AwaitingPayment,
    /// Payment received. The order is ready for dispatch.
    PaymentConfirmed,
    /// A rider has been claimed for this order.
    RiderAssigned,
    /// The rider has picked up the order.
    InTransit,
    /// The order was handed to the customer.
    Delivered,
    /// The order was cancelled before delivery.
    Cancelled,
}

impl OrderStatusType {
    /// The position of this status in the forward chain. `Cancelled` has no position.
    fn phase(&self) -> Option<u8> {
        use OrderStatusType::*;
        match self {
            Draft => Some(0),
            PendingBusiness => Some(1),
            Negotiating => Some(2),
            AwaitingPayment => Some(3),
            PaymentConfirmed => Some(4),
            RiderAssigned => Some(5),
            InTransit => Some(6),
            Delivered => Some(7),
            Cancelled => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatusType::Delivered | OrderStatusType::Cancelled)
    }

    /// Line items (and thus the total) may only change while negotiation is still open.
    pub fn items_mutable(&self) -> bool {
        matches!(self, OrderStatusType::Draft | OrderStatusType::PendingBusiness | OrderStatusType::Negotiating)
    }

    /// Every status, in forward-chain order, `Cancelled` last.
    pub const ALL: [OrderStatusType; 9] = [
        OrderStatusType::Draft,
        OrderStatusType::PendingBusiness,
        OrderStatusType::Negotiating,
        OrderStatusType::AwaitingPayment,
        OrderStatusType::PaymentConfirmed,
        OrderStatusType::RiderAssigned,
        OrderStatusType::InTransit,
        OrderStatusType::Delivered,
        OrderStatusType::Cancelled,
    ];

    /// Whether the edge `self → next` is in the allowed transition set.
    ///
    /// Besides the single-step forward edges, confirmation may take a draft order straight to
    /// `AwaitingPayment` without passing through the negotiation states.
    pub fn can_transition_to(&self, next: OrderStatusType) -> bool {
        if next == OrderStatusType::Cancelled {
            return !self.is_terminal();
        }
        if *self == OrderStatusType::Draft && next == OrderStatusType::AwaitingPayment {
            return true;
        }
        match (self.phase(), next.phase()) {
            (Some(from), Some(to)) => to == from + 1,
            _ => false,
        }
    }

    /// The statuses from which `next` may legally be reached. The persisted transition guards are
    /// built from this list, so the edge set has a single definition.
    pub fn sources_of(next: OrderStatusType) -> Vec<OrderStatusType> {
        Self::ALL.iter().copied().filter(|s| s.can_transition_to(next)).collect()
    }

    /// True once the order has reached (or passed) `PaymentConfirmed` on the forward chain.
    pub fn is_paid(&self) -> bool {
        matches!(self.phase(), Some(p) if p >= 4)
    }
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatusType::Draft => "Draft",
            OrderStatusType::PendingBusiness => "PendingBusiness",
            OrderStatusType::Negotiating => "Negotiating",
            OrderStatusType::AwaitingPayment => "AwaitingPayment",
            OrderStatusType::PaymentConfirmed => "PaymentConfirmed",
            OrderStatusType::RiderAssigned => "RiderAssigned",
            OrderStatusType::InTransit => "InTransit",
            OrderStatusType::Delivered => "Delivered",
            OrderStatusType::Cancelled => "Cancelled",
        };
        write!(f, "{s}")
    }
}

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Draft" => Ok(Self::Draft),
            "PendingBusiness" => Ok(Self::PendingBusiness),
            "Negotiating" => Ok(Self::Negotiating),
            "AwaitingPayment" => Ok(Self::AwaitingPayment),
            "PaymentConfirmed" => Ok(Self::PaymentConfirmed),
            "RiderAssigned" => Ok(Self::RiderAssigned),
            "InTransit" => Ok(Self::InTransit),
            "Delivered" => Ok(Self::Delivered),
            "Cancelled" => Ok(Self::Cancelled),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

//--------------------------------------    RiderStatus    -----------------------------------------------------------
/// Rider duty status. `Available` riders are the dispatch pool; the claim that flips a rider to
/// `Busy` is a conditional update, so two orders can never hold the same rider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum RiderStatus {
    Offline,
    Available,
    Busy,
}

impl Display for RiderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiderStatus::Offline => write!(f, "Offline"),
            RiderStatus::Available => write!(f, "Available"),
            RiderStatus::Busy => write!(f, "Busy"),
        }
    }
}

impl FromStr for RiderStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Offline" => Ok(Self::Offline),
            "Available" => Ok(Self::Available),
            "Busy" => Ok(Self::Busy),
            s => Err(ConversionError(format!("Invalid rider status: {s}"))),
        }
    }
}

//--------------------------------------      UserRole     -----------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum UserRole {
    Customer,
    Business,
    Rider,
}

impl Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserRole::Customer => write!(f, "Customer"),
            UserRole::Business => write!(f, "Business"),
            UserRole::Rider => write!(f, "Rider"),
        }
    }
}

//--------------------------------------    MessageType    -----------------------------------------------------------
/// Declared type of a chat message. Only `OrderProposal` messages carry an offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum MessageType {
    Text,
    OrderProposal,
    System,
}

impl Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageType::Text => write!(f, "Text"),
            MessageType::OrderProposal => write!(f, "OrderProposal"),
            MessageType::System => write!(f, "System"),
        }
    }
}

//--------------------------------------        User       -----------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub rider_status: Option<RiderStatus>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// The user's last reported position, if any.
    pub fn location(&self) -> Option<Coordinates> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => Some(Coordinates::new(lat, lng)),
            _ => None,
        }
    }
}

//--------------------------------------      NewUser      -----------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub rider_status: Option<RiderStatus>,
    pub location: Option<Coordinates>,
}

impl NewUser {
    pub fn new<S: Into<String>>(name: S, email: S, role: UserRole) -> Self {
        let rider_status = matches!(role, UserRole::Rider).then_some(RiderStatus::Offline);
        Self { name: name.into(), email: email.into(), role, rider_status, location: None }
    }

    pub fn with_location(mut self, location: Coordinates) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_rider_status(mut self, status: RiderStatus) -> Self {
        self.rider_status = Some(status);
        self
    }
}

//--------------------------------------     OrderItem     -----------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub name: String,
    pub quantity: i64,
    pub unit_price: Money,
    pub notes: Option<String>,
}

impl OrderItem {
    pub fn subtotal(&self) -> Money {
        self.unit_price * self.quantity
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub name: String,
    pub quantity: i64,
    pub unit_price: Money,
    pub notes: Option<String>,
}

impl NewOrderItem {
    pub fn new<S: Into<String>>(name: S, quantity: i64, unit_price: Money) -> Self {
        Self { name: name.into(), quantity, unit_price, notes: None }
    }

    pub fn with_notes<S: Into<String>>(mut self, notes: S) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn subtotal(&self) -> Money {
        self.unit_price * self.quantity
    }
}

//--------------------------------------        Order      -----------------------------------------------------------
/// The central aggregate. References to customer, business, rider and chat are by id; line items are
/// owned and loaded explicitly by the backend alongside the row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub customer_id: i64,
    pub business_id: i64,
    pub rider_id: Option<i64>,
    pub chat_id: i64,
    pub offer_message_id: Option<i64>,
    pub status: OrderStatusType,
    pub total_amount: Money,
    pub delivery_address: String,
    pub delivery_lat: f64,
    pub delivery_lng: f64,
    pub payment_method: Option<String>,
    pub payment_transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    #[sqlx(skip)]
    pub items: Vec<OrderItem>,
}

impl Order {
    pub fn delivery_location(&self) -> Coordinates {
        Coordinates::new(self.delivery_lat, self.delivery_lng)
    }

    pub fn has_items(&self) -> bool {
        !self.items.is_empty()
    }

    /// Sum of `quantity × unit_price` over the loaded items. `total_amount` must always agree with
    /// this once items are present.
    pub fn items_total(&self) -> Money {
        self.items.iter().map(OrderItem::subtotal).sum()
    }
}

//--------------------------------------      NewOrder     -----------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub customer_id: i64,
    pub business_id: i64,
    pub chat_id: i64,
    /// Set when the order originates from an accepted chat offer. Together with `chat_id` this keys
    /// the idempotency guarantee: one offer, one order.
    pub offer_message_id: Option<i64>,
    pub delivery_address: String,
    pub delivery_location: Coordinates,
    pub total_amount: Money,
    pub payment_method: Option<String>,
}

impl NewOrder {
    pub fn new<S: Into<String>>(
        customer_id: i64,
        business_id: i64,
        chat_id: i64,
        delivery_address: S,
        delivery_location: Coordinates,
    ) -> Self {
        Self {
            customer_id,
            business_id,
            chat_id,
            offer_message_id: None,
            delivery_address: delivery_address.into(),
            delivery_location,
            total_amount: Money::default(),
            payment_method: None,
        }
    }

    pub fn for_offer(mut self, offer_message_id: i64, amount: Money) -> Self {
        self.offer_message_id = Some(offer_message_id);
        self.total_amount = amount;
        self.payment_method = Some(DEFAULT_PAYMENT_METHOD.to_string());
        self
    }
}

//--------------------------------------    ChatRecord     -----------------------------------------------------------
/// Read-only projection of a chat between one customer and one business.
#[derive(Debug, Clone, FromRow)]
pub struct ChatRecord {
    pub id: i64,
    pub customer_id: i64,
    pub business_id: i64,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------    ChatMessage    -----------------------------------------------------------
/// Read-only projection of a chat message. Offers are `OrderProposal` messages whose structured
/// `metadata` carries the proposed amount as JSON.
#[derive(Debug, Clone, FromRow)]
pub struct ChatMessage {
    pub id: i64,
    pub chat_id: i64,
    pub sender_id: i64,
    pub message_type: MessageType,
    pub content: String,
    pub metadata: Option<String>,
    pub sent_at: DateTime<Utc>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn forward_edges_only() {
        use OrderStatusType::*;
        let chain =
            [Draft, PendingBusiness, Negotiating, AwaitingPayment, PaymentConfirmed, RiderAssigned, InTransit, Delivered];
        for pair in chain.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {} must be allowed", pair[0], pair[1]);
            assert!(!pair[1].can_transition_to(pair[0]), "{} -> {} must be rejected", pair[1], pair[0]);
        }
        // No skipping states past the confirm edge
        assert!(!Draft.can_transition_to(PaymentConfirmed));
        assert!(!PendingBusiness.can_transition_to(AwaitingPayment));
        assert!(!PaymentConfirmed.can_transition_to(InTransit));
        // Terminal states go nowhere
        assert!(!Delivered.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Draft));
    }

    #[test]
    fn cancellation_from_any_non_terminal_state() {
        use OrderStatusType::*;
        for status in [Draft, PendingBusiness, Negotiating, AwaitingPayment, PaymentConfirmed, RiderAssigned, InTransit]
        {
            assert!(status.can_transition_to(Cancelled), "{status} -> Cancelled must be allowed");
        }
    }

    #[test]
    fn items_frozen_after_payment() {
        use OrderStatusType::*;
        assert!(Draft.items_mutable());
        assert!(PendingBusiness.items_mutable());
        assert!(Negotiating.items_mutable());
        for status in [AwaitingPayment, PaymentConfirmed, RiderAssigned, InTransit, Delivered, Cancelled] {
            assert!(!status.items_mutable(), "{status} must freeze items");
        }
    }

    #[test]
    fn confirmation_may_skip_negotiation() {
        use OrderStatusType::*;
        assert!(Draft.can_transition_to(AwaitingPayment));
        assert!(Negotiating.can_transition_to(AwaitingPayment));
        assert_eq!(OrderStatusType::sources_of(AwaitingPayment), vec![Draft, Negotiating]);
        assert_eq!(OrderStatusType::sources_of(InTransit), vec![RiderAssigned]);
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in OrderStatusType::ALL {
            assert_eq!(status.to_string().parse::<OrderStatusType>().unwrap(), status);
        }
        assert!("Unknown".parse::<OrderStatusType>().is_err());
    }

    #[test]
    fn item_subtotals() {
        let item = NewOrderItem::new("Burger", 2, Money::from_major(120));
        assert_eq!(item.subtotal(), Money::from_major(240));
    }
}
