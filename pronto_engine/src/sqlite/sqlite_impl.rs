use log::{debug, error};
use pdp_common::Coordinates;
use sqlx::SqlitePool;

use crate::{
    db_types::{ChatMessage, ChatRecord, NewOrder, NewOrderItem, Order, OrderStatusType, RiderStatus, User},
    sqlite::db::{self, orders::OrderParty},
    traits::{ChatGateway, ClaimOutcome, MarketplaceDatabase, MarketplaceError, RiderSearch, RiderSearchError},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl std::fmt::Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SqliteDatabase ({})", self.url)
    }
}

impl SqliteDatabase {
    /// Creates a new connection pool using the URL from `PRONTO_DATABASE_URL`, or the default.
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db::db_url();
        Self::new_with_url(&url, max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = db::new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl MarketplaceDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_order(&self, order: NewOrder) -> Result<(Order, bool), MarketplaceError> {
        let mut tx = self.pool.begin().await?;
        let (order, created) = db::orders::idempotent_insert(order, &mut tx).await?;
        tx.commit().await?;
        if created {
            debug!("🗃️ Order #{} created for customer {}", order.id, order.customer_id);
        } else {
            debug!("🗃️ Order insert matched existing order #{}. Nothing was done", order.id);
        }
        Ok((order, created))
    }

    async fn fetch_order(&self, order_id: i64) -> Result<Option<Order>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        let order = db::orders::fetch_order(order_id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_for_offer(
        &self,
        chat_id: i64,
        offer_message_id: i64,
    ) -> Result<Option<Order>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        let order = db::orders::fetch_order_for_offer(chat_id, offer_message_id, &mut conn).await?;
        Ok(order)
    }

    async fn replace_order_items(
        &self,
        order_id: i64,
        items: Vec<NewOrderItem>,
    ) -> Result<Order, MarketplaceError> {
        let mut tx = self.pool.begin().await?;
        let order = db::orders::replace_items(order_id, &items, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order #{order_id} items replaced. New total: {}", order.total_amount);
        Ok(order)
    }

    async fn transition_order(
        &self,
        order_id: i64,
        expected: &[OrderStatusType],
        new_status: OrderStatusType,
    ) -> Result<Order, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        let order = db::orders::transition(order_id, expected, new_status, &mut conn).await?;
        debug!("🗃️ Order #{order_id} moved to {new_status}");
        Ok(order)
    }

    async fn confirm_order(&self, order_id: i64, expected: &[OrderStatusType]) -> Result<Order, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        let order = db::orders::set_awaiting_payment(order_id, expected, &mut conn).await?;
        debug!("🗃️ Order #{order_id} confirmed and awaiting payment");
        Ok(order)
    }

    async fn confirm_order_payment(
        &self,
        order_id: i64,
        method: &str,
        transaction_id: &str,
    ) -> Result<(Order, bool), MarketplaceError> {
        let mut tx = self.pool.begin().await?;
        let (order, newly_confirmed) = db::orders::confirm_payment(order_id, method, transaction_id, &mut tx).await?;
        tx.commit().await?;
        if newly_confirmed {
            debug!("🗃️ Payment of {} confirmed for order #{order_id} ({transaction_id})", order.total_amount);
        } else {
            debug!("🗃️ Payment for order #{order_id} was already confirmed. Nothing was done");
        }
        Ok((order, newly_confirmed))
    }

    async fn claim_rider_for_order(&self, order_id: i64, rider_id: i64) -> Result<ClaimOutcome, MarketplaceError> {
        let mut tx = self.pool.begin().await?;
        if !db::riders::claim_available(rider_id, &mut tx).await? {
            tx.rollback().await?;
            debug!("🗃️ Rider {rider_id} was not available for order #{order_id}");
            return Ok(ClaimOutcome::RiderUnavailable);
        }
        match db::orders::bind_rider(order_id, rider_id, &mut tx).await? {
            Some(order) => {
                tx.commit().await?;
                debug!("🗃️ Rider {rider_id} claimed for order #{order_id}");
                Ok(ClaimOutcome::Assigned(order))
            },
            None => {
                // Undo the rider claim before reporting why the order side refused.
                tx.rollback().await?;
                let existing = self.fetch_order(order_id).await?.ok_or(MarketplaceError::OrderNotFound(order_id))?;
                if existing.rider_id.is_some() {
                    debug!("🗃️ Order #{order_id} already has a rider. Claim for {rider_id} dropped");
                    Ok(ClaimOutcome::OrderAlreadyAssigned(existing))
                } else {
                    Err(MarketplaceError::InvalidStateTransition {
                        current: existing.status,
                        attempted: OrderStatusType::RiderAssigned,
                    })
                }
            },
        }
    }

    async fn deliver_order(&self, order_id: i64) -> Result<Order, MarketplaceError> {
        let mut tx = self.pool.begin().await?;
        let order = db::orders::set_delivered(order_id, &mut tx).await?;
        if let Some(rider_id) = order.rider_id {
            db::riders::release(rider_id, &mut tx).await?;
        }
        tx.commit().await?;
        debug!("🗃️ Order #{order_id} delivered");
        Ok(order)
    }

    async fn cancel_order(&self, order_id: i64) -> Result<Order, MarketplaceError> {
        let mut tx = self.pool.begin().await?;
        let order = db::orders::set_cancelled(order_id, &mut tx).await?;
        if let Some(rider_id) = order.rider_id {
            db::riders::release(rider_id, &mut tx).await?;
        }
        tx.commit().await?;
        debug!("🗃️ Order #{order_id} cancelled");
        Ok(order)
    }

    async fn update_rider_status(&self, rider_id: i64, status: RiderStatus) -> Result<User, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        let user = db::riders::update_status(rider_id, status, &mut conn).await?;
        debug!("🗃️ Rider {rider_id} is now {status}");
        Ok(user)
    }

    async fn update_rider_location(&self, rider_id: i64, location: Coordinates) -> Result<User, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        let user = db::riders::update_location(rider_id, location, &mut conn).await?;
        Ok(user)
    }

    async fn fetch_user(&self, user_id: i64) -> Result<Option<User>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        let user = db::users::fetch_user(user_id, &mut conn).await?;
        Ok(user)
    }

    async fn orders_for_customer(&self, customer_id: i64) -> Result<Vec<Order>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        let orders = db::orders::orders_for(OrderParty::Customer, customer_id, &mut conn).await?;
        Ok(orders)
    }

    async fn orders_for_business(&self, business_id: i64) -> Result<Vec<Order>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        let orders = db::orders::orders_for(OrderParty::Business, business_id, &mut conn).await?;
        Ok(orders)
    }

    async fn orders_for_rider(&self, rider_id: i64) -> Result<Vec<Order>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        let orders = db::orders::orders_for(OrderParty::Rider, rider_id, &mut conn).await?;
        Ok(orders)
    }

    async fn close(&mut self) -> Result<(), MarketplaceError> {
        self.pool.close().await;
        Ok(())
    }
}

impl RiderSearch for SqliteDatabase {
    async fn nearest_available_riders(
        &self,
        origin: Coordinates,
        radius_degrees: f64,
        limit: usize,
    ) -> Result<Vec<i64>, RiderSearchError> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            error!("🛵️ Could not acquire a connection for the proximity query. {e}");
            RiderSearchError::Backend(e.to_string())
        })?;
        let ids = db::riders::nearest_available(origin, radius_degrees, limit, &mut conn).await?;
        Ok(ids)
    }

    async fn any_available_riders(&self, limit: usize) -> Result<Vec<i64>, RiderSearchError> {
        let mut conn = self.pool.acquire().await.map_err(|e| RiderSearchError::Backend(e.to_string()))?;
        let ids = db::riders::any_available(limit, &mut conn).await?;
        Ok(ids)
    }
}

impl ChatGateway for SqliteDatabase {
    async fn fetch_offer_message(&self, message_id: i64) -> Result<Option<ChatMessage>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        let message = db::chats::fetch_message(message_id, &mut conn).await?;
        Ok(message)
    }

    async fn fetch_chat(&self, chat_id: i64) -> Result<Option<ChatRecord>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        let chat = db::chats::fetch_chat(chat_id, &mut conn).await?;
        Ok(chat)
    }
}
