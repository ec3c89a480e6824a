use serde::{Deserialize, Serialize};

use crate::db_types::{Order, OrderStatusType};

/// A new order exists (created directly or from an accepted offer).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCreatedEvent {
    pub order: Order,
}

impl OrderCreatedEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// An order moved along its lifecycle. Carries the edge so subscribers don't need to diff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatusChangedEvent {
    pub order: Order,
    pub old_status: OrderStatusType,
    pub new_status: OrderStatusType,
}

impl OrderStatusChangedEvent {
    pub fn new(order: Order, old_status: OrderStatusType) -> Self {
        let new_status = order.status;
        Self { order, old_status, new_status }
    }
}

/// A rider was claimed for an order. Both the rider and the customer are interested parties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiderAssignedEvent {
    pub order: Order,
    pub rider_id: i64,
}

impl RiderAssignedEvent {
    pub fn new(order: Order, rider_id: i64) -> Self {
        Self { order, rider_id }
    }
}
