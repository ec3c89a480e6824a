use std::fmt::Debug;

use log::*;
use pdp_common::Coordinates;

use crate::{
    api::DispatchEngine,
    config::DispatchConfig,
    db_types::{NewOrder, NewOrderItem, Order, OrderStatusType, RiderStatus, User},
    events::{EventProducers, OrderCreatedEvent, OrderStatusChangedEvent},
    offers::{self, AcceptOffer},
    traits::{ChatGateway, MarketplaceDatabase, MarketplaceError, RiderSearch},
};

/// `OrderFlowApi` is the primary API for driving orders through their lifecycle, from accepted chat
/// offer to delivery, including the dispatch side effect of payment confirmation.
pub struct OrderFlowApi<B> {
    db: B,
    dispatch: DispatchEngine<B>,
    producers: EventProducers,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B: Clone> OrderFlowApi<B> {
    pub fn new(db: B, config: DispatchConfig, producers: EventProducers) -> Self {
        let dispatch = DispatchEngine::new(db.clone(), config, producers.clone());
        Self { db, dispatch, producers }
    }
}

impl<B> OrderFlowApi<B>
where B: MarketplaceDatabase + RiderSearch + ChatGateway
{
    /// Converts an accepted chat offer into an order in `Draft`, with `total_amount` preset from
    /// the offer and the default payment method.
    ///
    /// Safe to retry: accepting the same `(chat_id, offer_message_id)` twice returns the order the
    /// first acceptance created. Dispatch is *not* triggered here — it only runs once payment is
    /// confirmed.
    pub async fn accept_offer(&self, request: AcceptOffer) -> Result<Order, MarketplaceError> {
        let message = self
            .db
            .fetch_offer_message(request.offer_message_id)
            .await?
            .ok_or(MarketplaceError::MessageNotFound(request.offer_message_id))?;
        let chat =
            self.db.fetch_chat(message.chat_id).await?.ok_or(MarketplaceError::ChatNotFound(message.chat_id))?;
        let offer = offers::resolve_offer(&message, &chat, &request)?;
        let new_order = NewOrder::new(
            request.customer_id,
            chat.business_id,
            request.chat_id,
            request.delivery_address,
            request.delivery_location,
        )
        .for_offer(request.offer_message_id, offer.amount);
        let (order, created) = self.db.insert_order(new_order).await?;
        if created {
            debug!(
                "🔄️📦️ Offer message {} in chat {} accepted. Order #{} created at {}.",
                request.offer_message_id, request.chat_id, order.id, order.total_amount
            );
            self.call_order_created_hook(&order).await;
        } else {
            debug!(
                "🔄️📦️ Offer message {} was already accepted. Returning existing order #{}.",
                request.offer_message_id, order.id
            );
        }
        Ok(order)
    }

    /// Creates an order directly (no originating offer) in `Draft`. All references must resolve.
    pub async fn create_order(
        &self,
        customer_id: i64,
        business_id: i64,
        chat_id: i64,
        delivery_address: String,
        delivery_location: Coordinates,
    ) -> Result<Order, MarketplaceError> {
        let _customer =
            self.db.fetch_user(customer_id).await?.ok_or(MarketplaceError::UserNotFound(customer_id))?;
        let _business =
            self.db.fetch_user(business_id).await?.ok_or(MarketplaceError::UserNotFound(business_id))?;
        let _chat = self.db.fetch_chat(chat_id).await?.ok_or(MarketplaceError::ChatNotFound(chat_id))?;
        let new_order = NewOrder::new(customer_id, business_id, chat_id, delivery_address, delivery_location);
        let (order, _) = self.db.insert_order(new_order).await?;
        debug!("🔄️📦️ Order #{} created in Draft for customer {customer_id}", order.id);
        self.call_order_created_hook(&order).await;
        Ok(order)
    }

    /// Replaces the order's line items and recomputes the total. The status advances to
    /// `Negotiating` if it isn't already there; permitted only in the negotiable range.
    pub async fn set_order_items(&self, order_id: i64, items: Vec<NewOrderItem>) -> Result<Order, MarketplaceError> {
        let before = self.fetch_existing(order_id).await?;
        let order = self.db.replace_order_items(order_id, items).await?;
        debug!("🔄️📦️ Order #{order_id} items replaced. New total is {}.", order.total_amount);
        if before.status != order.status {
            self.call_status_hook(&order, before.status).await;
        }
        Ok(order)
    }

    /// `Draft | Negotiating → AwaitingPayment`. The order must have items and a positive total;
    /// the store enforces that requirement inside the same atomic guard as the status check, so a
    /// concurrent item change cannot race the confirmation.
    pub async fn confirm_order(&self, order_id: i64) -> Result<Order, MarketplaceError> {
        let before = self.fetch_existing(order_id).await?;
        let expected = OrderStatusType::sources_of(OrderStatusType::AwaitingPayment);
        let confirmed = self.db.confirm_order(order_id, &expected).await?;
        debug!("🔄️📦️ Order #{order_id} confirmed and awaiting payment");
        self.call_status_hook(&confirmed, before.status).await;
        Ok(confirmed)
    }

    /// `AwaitingPayment → PaymentConfirmed`, then dispatch.
    ///
    /// Idempotent: re-invoking with the transaction id of an already-confirmed payment returns the
    /// existing order without re-dispatching. Dispatch runs exactly once per confirmation; a
    /// dispatch attempt that finds no rider leaves the order at `PaymentConfirmed` and is not an
    /// error.
    pub async fn confirm_payment(
        &self,
        order_id: i64,
        method: &str,
        transaction_id: &str,
    ) -> Result<Order, MarketplaceError> {
        let (order, newly_confirmed) = self.db.confirm_order_payment(order_id, method, transaction_id).await?;
        if !newly_confirmed {
            debug!("🔄️💰️ Payment [{transaction_id}] was already confirmed for order #{order_id}. No-op.");
            return Ok(order);
        }
        debug!("🔄️💰️ Payment [{transaction_id}] confirmed for order #{order_id}. Dispatching.");
        self.call_status_hook(&order, OrderStatusType::AwaitingPayment).await;
        match self.dispatch.assign_rider(&order).await? {
            Some(assigned) => Ok(assigned),
            None => Ok(order),
        }
    }

    /// `RiderAssigned → InTransit`.
    pub async fn mark_in_transit(&self, order_id: i64) -> Result<Order, MarketplaceError> {
        let expected = OrderStatusType::sources_of(OrderStatusType::InTransit);
        let order = self.db.transition_order(order_id, &expected, OrderStatusType::InTransit).await?;
        debug!("🔄️📦️ Order #{order_id} is in transit");
        self.call_status_hook(&order, OrderStatusType::RiderAssigned).await;
        Ok(order)
    }

    /// `InTransit → Delivered`. Sets `delivered_at` and releases the rider back to `Available`.
    pub async fn mark_delivered(&self, order_id: i64) -> Result<Order, MarketplaceError> {
        let order = self.db.deliver_order(order_id).await?;
        debug!("🔄️📦️ Order #{order_id} delivered; rider released");
        self.call_status_hook(&order, OrderStatusType::InTransit).await;
        Ok(order)
    }

    /// Cancels the order from any non-terminal state, releasing the rider if one was assigned.
    pub async fn cancel_order(&self, order_id: i64) -> Result<Order, MarketplaceError> {
        let before = self.fetch_existing(order_id).await?;
        let order = self.db.cancel_order(order_id).await?;
        debug!("🔄️📦️ Order #{order_id} cancelled (was {})", before.status);
        self.call_status_hook(&order, before.status).await;
        Ok(order)
    }

    /// Rider check-in / check-out. Releasing a rider mid-assignment is the backend's concern; this
    /// simply records the duty status the rider reported.
    pub async fn update_rider_status(&self, rider_id: i64, status: RiderStatus) -> Result<User, MarketplaceError> {
        let rider = self.db.update_rider_status(rider_id, status).await?;
        trace!("🛵️ Rider {rider_id} is now {status}");
        Ok(rider)
    }

    /// Records the rider's latest position for proximity queries.
    pub async fn update_rider_location(&self, rider_id: i64, location: Coordinates) -> Result<User, MarketplaceError> {
        let rider = self.db.update_rider_location(rider_id, location).await?;
        trace!("🛵️ Rider {rider_id} reported position {location}");
        Ok(rider)
    }

    /// Fetches an order with items loaded, failing if it does not exist.
    pub async fn order(&self, order_id: i64) -> Result<Order, MarketplaceError> {
        self.fetch_existing(order_id).await
    }

    pub async fn orders_for_customer(&self, customer_id: i64) -> Result<Vec<Order>, MarketplaceError> {
        self.db.orders_for_customer(customer_id).await
    }

    pub async fn orders_for_business(&self, business_id: i64) -> Result<Vec<Order>, MarketplaceError> {
        self.db.orders_for_business(business_id).await
    }

    pub async fn orders_for_rider(&self, rider_id: i64) -> Result<Vec<Order>, MarketplaceError> {
        self.db.orders_for_rider(rider_id).await
    }

    async fn fetch_existing(&self, order_id: i64) -> Result<Order, MarketplaceError> {
        self.db.fetch_order(order_id).await?.ok_or(MarketplaceError::OrderNotFound(order_id))
    }

    async fn call_order_created_hook(&self, order: &Order) {
        for emitter in &self.producers.order_created_producer {
            let event = OrderCreatedEvent::new(order.clone());
            emitter.publish_event(event).await;
        }
    }

    async fn call_status_hook(&self, order: &Order, old_status: OrderStatusType) {
        for emitter in &self.producers.order_status_producer {
            let event = OrderStatusChangedEvent::new(order.clone(), old_status);
            emitter.publish_event(event).await;
        }
    }

    pub fn dispatch(&self) -> &DispatchEngine<B> {
        &self.dispatch
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut B {
        &mut self.db
    }
}
