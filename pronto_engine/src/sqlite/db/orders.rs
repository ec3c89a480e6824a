use log::debug;
use pdp_common::Money;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewOrder, NewOrderItem, Order, OrderItem, OrderStatusType},
    traits::MarketplaceError,
};

/// Inserts the order, returning `false` in the second parameter if an order for the same
/// `(chat_id, offer_message_id)` already exists.
///
/// The insert races through `ON CONFLICT DO NOTHING` against the unique index rather than a
/// read-then-write, so two concurrent acceptances of the same offer cannot both insert. Orders
/// without an offer reference never conflict (SQLite treats the NULL column as distinct).
pub async fn idempotent_insert(
    order: NewOrder,
    conn: &mut SqliteConnection,
) -> Result<(Order, bool), MarketplaceError> {
    let inserted: Option<Order> = sqlx::query_as(
        r#"
            INSERT INTO orders (
                customer_id,
                business_id,
                chat_id,
                offer_message_id,
                total_amount,
                delivery_address,
                delivery_lat,
                delivery_lng,
                payment_method
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (chat_id, offer_message_id) DO NOTHING
            RETURNING *;
        "#,
    )
    .bind(order.customer_id)
    .bind(order.business_id)
    .bind(order.chat_id)
    .bind(order.offer_message_id)
    .bind(order.total_amount)
    .bind(&order.delivery_address)
    .bind(order.delivery_location.latitude)
    .bind(order.delivery_location.longitude)
    .bind(&order.payment_method)
    .fetch_optional(&mut *conn)
    .await?;
    match inserted {
        Some(new_order) => {
            debug!("📝️ Order #{} inserted for chat {}", new_order.id, new_order.chat_id);
            Ok((new_order, true))
        },
        None => {
            // The offer was already consumed; hand back the order it produced.
            let message_id = order.offer_message_id.ok_or_else(|| {
                MarketplaceError::DatabaseError("Order insert conflicted without an offer reference".to_string())
            })?;
            let existing = fetch_order_for_offer(order.chat_id, message_id, conn).await?.ok_or_else(|| {
                MarketplaceError::DatabaseError(format!(
                    "Offer {message_id} conflicted on insert but no order could be fetched for it"
                ))
            })?;
            Ok((existing, false))
        },
    }
}

/// Fetches an order by id with its line items loaded.
pub async fn fetch_order(order_id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    let order: Option<Order> =
        sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(order_id).fetch_optional(&mut *conn).await?;
    match order {
        Some(mut order) => {
            load_items(&mut order, conn).await?;
            Ok(Some(order))
        },
        None => Ok(None),
    }
}

/// Fetches the order created by accepting the given offer, if any.
pub async fn fetch_order_for_offer(
    chat_id: i64,
    offer_message_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order: Option<Order> =
        sqlx::query_as("SELECT * FROM orders WHERE chat_id = $1 AND offer_message_id = $2")
            .bind(chat_id)
            .bind(offer_message_id)
            .fetch_optional(&mut *conn)
            .await?;
    match order {
        Some(mut order) => {
            load_items(&mut order, conn).await?;
            Ok(Some(order))
        },
        None => Ok(None),
    }
}

pub async fn load_items(order: &mut Order, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    let items: Vec<OrderItem> = sqlx::query_as("SELECT * FROM order_items WHERE order_id = $1 ORDER BY id ASC")
        .bind(order.id)
        .fetch_all(conn)
        .await?;
    order.items = items;
    Ok(())
}

/// Replaces the order's line items and recomputes the total in one pass.
///
/// The status guard, total update and status advance are a single conditional UPDATE, so a
/// concurrent confirmation freezing the items cannot interleave with the replacement. Run inside a
/// transaction together with the item rewrite.
pub async fn replace_items(
    order_id: i64,
    items: &[NewOrderItem],
    conn: &mut SqliteConnection,
) -> Result<Order, MarketplaceError> {
    let total: Money = items.iter().map(NewOrderItem::subtotal).sum();
    let updated: Option<Order> = sqlx::query_as(
        r#"
            UPDATE orders
            SET status = 'Negotiating', total_amount = $1, updated_at = CURRENT_TIMESTAMP
            WHERE id = $2 AND status IN ('Draft', 'PendingBusiness', 'Negotiating')
            RETURNING *;
        "#,
    )
    .bind(total)
    .bind(order_id)
    .fetch_optional(&mut *conn)
    .await?;
    let mut order = match updated {
        Some(order) => order,
        None => {
            return Err(items_rejection(order_id, conn).await);
        },
    };
    sqlx::query("DELETE FROM order_items WHERE order_id = $1").bind(order_id).execute(&mut *conn).await?;
    for item in items {
        sqlx::query(
            "INSERT INTO order_items (order_id, name, quantity, unit_price, notes) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(order_id)
        .bind(&item.name)
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind(&item.notes)
        .execute(&mut *conn)
        .await?;
    }
    load_items(&mut order, conn).await?;
    debug!("📝️ Order #{order_id} now has {} item(s) totalling {}", order.items.len(), order.total_amount);
    Ok(order)
}

async fn items_rejection(order_id: i64, conn: &mut SqliteConnection) -> MarketplaceError {
    match fetch_order(order_id, conn).await {
        Ok(Some(order)) => MarketplaceError::InvalidStateTransition {
            current: order.status,
            attempted: OrderStatusType::Negotiating,
        },
        Ok(None) => MarketplaceError::OrderNotFound(order_id),
        Err(e) => e.into(),
    }
}

/// Moves the order to `new_status` iff its current status is one of `expected`. The guard and the
/// write are one statement; the loser of a concurrent race sees the state the order actually has.
pub async fn transition(
    order_id: i64,
    expected: &[OrderStatusType],
    new_status: OrderStatusType,
    conn: &mut SqliteConnection,
) -> Result<Order, MarketplaceError> {
    let guard = expected.iter().map(|s| format!("'{s}'")).collect::<Vec<_>>().join(",");
    let sql = format!(
        "UPDATE orders SET status = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 AND status IN ({guard}) \
         RETURNING *"
    );
    let updated: Option<Order> =
        sqlx::query_as(&sql).bind(new_status.to_string()).bind(order_id).fetch_optional(&mut *conn).await?;
    match updated {
        Some(mut order) => {
            load_items(&mut order, conn).await?;
            Ok(order)
        },
        None => Err(transition_rejection(order_id, new_status, conn).await),
    }
}

/// The confirm edge: moves the order to `AwaitingPayment` iff its status is one of `expected`
/// *and* it still has at least one line item and a positive total. The items requirement sits
/// inside the same conditional UPDATE as the status guard, so an item change racing the
/// confirmation cannot slip an empty order through.
pub async fn set_awaiting_payment(
    order_id: i64,
    expected: &[OrderStatusType],
    conn: &mut SqliteConnection,
) -> Result<Order, MarketplaceError> {
    let guard = expected.iter().map(|s| format!("'{s}'")).collect::<Vec<_>>().join(",");
    let sql = format!(
        "UPDATE orders SET status = 'AwaitingPayment', updated_at = CURRENT_TIMESTAMP \
         WHERE id = $1 AND status IN ({guard}) AND total_amount > 0 \
         AND EXISTS (SELECT 1 FROM order_items WHERE order_id = orders.id) \
         RETURNING *"
    );
    let updated: Option<Order> = sqlx::query_as(&sql).bind(order_id).fetch_optional(&mut *conn).await?;
    match updated {
        Some(mut order) => {
            load_items(&mut order, conn).await?;
            Ok(order)
        },
        None => Err(confirm_rejection(order_id, expected, conn).await),
    }
}

async fn confirm_rejection(
    order_id: i64,
    expected: &[OrderStatusType],
    conn: &mut SqliteConnection,
) -> MarketplaceError {
    match fetch_order(order_id, conn).await {
        Ok(Some(order)) if !expected.contains(&order.status) => MarketplaceError::InvalidStateTransition {
            current: order.status,
            attempted: OrderStatusType::AwaitingPayment,
        },
        Ok(Some(_)) => MarketplaceError::InvalidOrderState(format!(
            "Order #{order_id} cannot be confirmed without items and a positive total"
        )),
        Ok(None) => MarketplaceError::OrderNotFound(order_id),
        Err(e) => e.into(),
    }
}

async fn transition_rejection(
    order_id: i64,
    attempted: OrderStatusType,
    conn: &mut SqliteConnection,
) -> MarketplaceError {
    match fetch_order(order_id, conn).await {
        Ok(Some(order)) => MarketplaceError::InvalidStateTransition { current: order.status, attempted },
        Ok(None) => MarketplaceError::OrderNotFound(order_id),
        Err(e) => e.into(),
    }
}

/// `AwaitingPayment → PaymentConfirmed` with payment details and `confirmed_at`, or the idempotent
/// no-op when the same transaction id was already confirmed. The second element is `true` only for
/// the call that performed the transition.
pub async fn confirm_payment(
    order_id: i64,
    method: &str,
    transaction_id: &str,
    conn: &mut SqliteConnection,
) -> Result<(Order, bool), MarketplaceError> {
    let updated: Option<Order> = sqlx::query_as(
        r#"
            UPDATE orders
            SET status = 'PaymentConfirmed',
                payment_method = $1,
                payment_transaction_id = $2,
                confirmed_at = CURRENT_TIMESTAMP,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $3 AND status = 'AwaitingPayment'
            RETURNING *;
        "#,
    )
    .bind(method)
    .bind(transaction_id)
    .bind(order_id)
    .fetch_optional(&mut *conn)
    .await?;
    if let Some(mut order) = updated {
        load_items(&mut order, conn).await?;
        return Ok((order, true));
    }
    let existing = fetch_order(order_id, conn).await?.ok_or(MarketplaceError::OrderNotFound(order_id))?;
    if existing.status.is_paid() && existing.payment_transaction_id.as_deref() == Some(transaction_id) {
        return Ok((existing, false));
    }
    Err(MarketplaceError::InvalidStateTransition {
        current: existing.status,
        attempted: OrderStatusType::PaymentConfirmed,
    })
}

/// The order-side half of the rider claim: binds the rider and advances to `RiderAssigned` only if
/// the order is still unassigned and payment-confirmed. `None` means a concurrent dispatch (or a
/// state change) got there first.
pub async fn bind_rider(
    order_id: i64,
    rider_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let updated: Option<Order> = sqlx::query_as(
        r#"
            UPDATE orders
            SET rider_id = $1, status = 'RiderAssigned', updated_at = CURRENT_TIMESTAMP
            WHERE id = $2 AND status = 'PaymentConfirmed' AND rider_id IS NULL
            RETURNING *;
        "#,
    )
    .bind(rider_id)
    .bind(order_id)
    .fetch_optional(&mut *conn)
    .await?;
    match updated {
        Some(mut order) => {
            load_items(&mut order, conn).await?;
            Ok(Some(order))
        },
        None => Ok(None),
    }
}

/// `InTransit → Delivered`, stamping `delivered_at`. Rider release is the caller's half of the
/// transaction.
pub async fn set_delivered(order_id: i64, conn: &mut SqliteConnection) -> Result<Order, MarketplaceError> {
    let updated: Option<Order> = sqlx::query_as(
        r#"
            UPDATE orders
            SET status = 'Delivered', delivered_at = CURRENT_TIMESTAMP, updated_at = CURRENT_TIMESTAMP
            WHERE id = $1 AND status = 'InTransit'
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .fetch_optional(&mut *conn)
    .await?;
    match updated {
        Some(mut order) => {
            load_items(&mut order, conn).await?;
            Ok(order)
        },
        None => Err(transition_rejection(order_id, OrderStatusType::Delivered, conn).await),
    }
}

/// Cancels from any non-terminal state. Rider release is the caller's half of the transaction.
pub async fn set_cancelled(order_id: i64, conn: &mut SqliteConnection) -> Result<Order, MarketplaceError> {
    let updated: Option<Order> = sqlx::query_as(
        r#"
            UPDATE orders
            SET status = 'Cancelled', updated_at = CURRENT_TIMESTAMP
            WHERE id = $1 AND status NOT IN ('Delivered', 'Cancelled')
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .fetch_optional(&mut *conn)
    .await?;
    match updated {
        Some(mut order) => {
            load_items(&mut order, conn).await?;
            Ok(order)
        },
        None => Err(transition_rejection(order_id, OrderStatusType::Cancelled, conn).await),
    }
}

/// Order history for one side of the marketplace, newest first.
pub async fn orders_for(
    column: OrderParty,
    user_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, sqlx::Error> {
    let sql = format!("SELECT * FROM orders WHERE {} = $1 ORDER BY created_at DESC, id DESC", column.column());
    let mut orders: Vec<Order> = sqlx::query_as(&sql).bind(user_id).fetch_all(&mut *conn).await?;
    for order in &mut orders {
        load_items(order, conn).await?;
    }
    Ok(orders)
}

#[derive(Debug, Clone, Copy)]
pub enum OrderParty {
    Customer,
    Business,
    Rider,
}

impl OrderParty {
    fn column(&self) -> &'static str {
        match self {
            OrderParty::Customer => "customer_id",
            OrderParty::Business => "business_id",
            OrderParty::Rider => "rider_id",
        }
    }
}
