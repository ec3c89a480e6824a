use std::sync::{
    atomic::{AtomicI32, Ordering},
    Arc,
};

use log::*;
use pdp_common::{Coordinates, Money};
use pronto_engine::{
    db_types::{ChatMessage, ChatRecord, NewOrder, NewOrderItem, Order, OrderStatusType, RiderStatus, User},
    events::{EventHandlers, EventHooks, EventProducers},
    ChatGateway,
    ClaimOutcome,
    DispatchConfig,
    MarketplaceDatabase,
    MarketplaceError,
    OrderFlowApi,
    RiderSearch,
    RiderSearchError,
    SqliteDatabase,
};
use sqlx::{migrate::MigrateDatabase, Sqlite};
use tokio::time::{sleep, Duration};

use crate::support::{
    prepare_env::{prepare_test_env, random_db_path},
    seed,
};

mod support;

const BANGALORE: Coordinates = Coordinates { latitude: 12.9716, longitude: 77.5946 };

async fn setup_with(config: DispatchConfig, producers: EventProducers) -> OrderFlowApi<SqliteDatabase> {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    OrderFlowApi::new(db, config, producers)
}

async fn setup() -> OrderFlowApi<SqliteDatabase> {
    setup_with(DispatchConfig::default(), EventProducers::default()).await
}

async fn tear_down(mut api: OrderFlowApi<SqliteDatabase>) {
    if let Err(e) = api.db_mut().close().await {
        error!("Failed to close database: {e}");
    }
    Sqlite::drop_database(api.db().url()).await.unwrap();
}

/// A point roughly `meters` north of `origin`.
fn north_of(origin: Coordinates, meters: f64) -> Coordinates {
    Coordinates::new(origin.latitude + Coordinates::meters_to_degrees(meters), origin.longitude)
}

/// Seeds an order at `AwaitingPayment` for the given business, ready for payment and dispatch.
async fn order_awaiting_payment(api: &OrderFlowApi<SqliteDatabase>, business_location: Option<Coordinates>) -> i64 {
    let customer = seed::customer(api.db(), "Asha").await;
    let business = match business_location {
        Some(loc) => seed::business(api.db(), "Biryani House", loc).await,
        None => seed::customer(api.db(), "Locationless Business").await,
    };
    let chat = seed::chat(api.db(), &customer, &business).await;
    let order = api
        .create_order(customer.id, business.id, chat.id, "12 Cross Rd".to_string(), BANGALORE)
        .await
        .expect("Error creating order");
    api.set_order_items(order.id, vec![NewOrderItem::new("Thali", 1, Money::from_major(250))])
        .await
        .expect("Error setting items");
    api.confirm_order(order.id).await.expect("Error confirming order");
    order.id
}

#[tokio::test]
async fn the_nearest_available_rider_is_claimed() {
    let api = setup().await;
    let near = seed::rider(api.db(), "Near", RiderStatus::Available, Some(north_of(BANGALORE, 500.0))).await;
    let far = seed::rider(api.db(), "Far", RiderStatus::Available, Some(north_of(BANGALORE, 3_000.0))).await;
    let order_id = order_awaiting_payment(&api, Some(BANGALORE)).await;

    let order = api.confirm_payment(order_id, "UPI", "txn-001").await.expect("Error confirming payment");
    assert_eq!(order.status, OrderStatusType::RiderAssigned);
    assert_eq!(order.rider_id, Some(near.id));
    let far_now = api.db().fetch_user(far.id).await.unwrap().unwrap();
    assert_eq!(far_now.rider_status, Some(RiderStatus::Available));
    tear_down(api).await;
}

#[tokio::test]
async fn busy_and_offline_riders_are_never_claimed() {
    let api = setup().await;
    seed::rider(api.db(), "Busy", RiderStatus::Busy, Some(north_of(BANGALORE, 200.0))).await;
    seed::rider(api.db(), "Offline", RiderStatus::Offline, Some(north_of(BANGALORE, 300.0))).await;
    let available = seed::rider(api.db(), "OnDuty", RiderStatus::Available, Some(north_of(BANGALORE, 4_000.0))).await;
    let order_id = order_awaiting_payment(&api, Some(BANGALORE)).await;

    let order = api.confirm_payment(order_id, "UPI", "txn-001").await.expect("Error confirming payment");
    assert_eq!(order.rider_id, Some(available.id));
    tear_down(api).await;
}

#[tokio::test]
async fn riders_without_a_position_are_reached_through_the_fallback_tier() {
    let api = setup().await;
    let unlocated = seed::rider(api.db(), "NoGps", RiderStatus::Available, None).await;
    let order_id = order_awaiting_payment(&api, Some(BANGALORE)).await;

    let order = api.confirm_payment(order_id, "UPI", "txn-001").await.expect("Error confirming payment");
    assert_eq!(order.status, OrderStatusType::RiderAssigned);
    assert_eq!(order.rider_id, Some(unlocated.id));
    tear_down(api).await;
}

#[tokio::test]
async fn riders_outside_the_radius_are_reached_through_the_fallback_tier() {
    let api = setup_with(DispatchConfig::default().with_radius(1_000.0), EventProducers::default()).await;
    // Well past the 1km preference radius
    let distant = seed::rider(api.db(), "Distant", RiderStatus::Available, Some(north_of(BANGALORE, 3_000.0))).await;
    let order_id = order_awaiting_payment(&api, Some(BANGALORE)).await;

    let order = api.confirm_payment(order_id, "UPI", "txn-001").await.expect("Error confirming payment");
    assert_eq!(order.rider_id, Some(distant.id));
    tear_down(api).await;
}

#[tokio::test]
async fn no_available_rider_leaves_the_order_payment_confirmed() {
    let api = setup().await;
    seed::rider(api.db(), "OffShift", RiderStatus::Offline, Some(BANGALORE)).await;
    let order_id = order_awaiting_payment(&api, Some(BANGALORE)).await;

    let order = api.confirm_payment(order_id, "UPI", "txn-001").await.expect("Error confirming payment");
    assert_eq!(order.status, OrderStatusType::PaymentConfirmed, "No rider is a normal outcome, not an error");
    assert!(order.rider_id.is_none());
    assert!(order.confirmed_at.is_some());
    tear_down(api).await;
}

#[tokio::test]
async fn a_business_without_a_location_cannot_be_dispatched() {
    let api = setup().await;
    seed::rider(api.db(), "Dev", RiderStatus::Available, Some(BANGALORE)).await;
    let order_id = order_awaiting_payment(&api, None).await;

    let err = api.confirm_payment(order_id, "UPI", "txn-001").await.unwrap_err();
    assert!(matches!(err, MarketplaceError::PreconditionFailed(_)), "got {err}");
    // The payment itself committed before dispatch was attempted
    let order = api.order(order_id).await.unwrap();
    assert_eq!(order.status, OrderStatusType::PaymentConfirmed);
    tear_down(api).await;
}

#[tokio::test]
async fn a_checked_in_rider_becomes_dispatchable() {
    let api = setup().await;
    let rider = seed::rider(api.db(), "Dev", RiderStatus::Offline, None).await;
    api.update_rider_location(rider.id, north_of(BANGALORE, 800.0)).await.expect("Error updating location");
    api.update_rider_status(rider.id, RiderStatus::Available).await.expect("Error checking in");
    let order_id = order_awaiting_payment(&api, Some(BANGALORE)).await;

    let order = api.confirm_payment(order_id, "UPI", "txn-001").await.expect("Error confirming payment");
    assert_eq!(order.rider_id, Some(rider.id));

    // Non-riders are rejected by the rider endpoints
    let customer = seed::customer(api.db(), "Asha2").await;
    let err = api.update_rider_status(customer.id, RiderStatus::Available).await.unwrap_err();
    assert!(matches!(err, MarketplaceError::NotARider(_)), "got {err}");
    tear_down(api).await;
}

#[tokio::test]
async fn two_orders_competing_for_one_rider_never_share_them() {
    let api = setup().await;
    let rider = seed::rider(api.db(), "Solo", RiderStatus::Available, Some(BANGALORE)).await;
    let first = order_awaiting_payment(&api, Some(BANGALORE)).await;
    let second = order_awaiting_payment(&api, Some(BANGALORE)).await;

    let (a, b) = tokio::join!(
        api.confirm_payment(first, "UPI", "txn-a"),
        api.confirm_payment(second, "UPI", "txn-b"),
    );
    let a = a.expect("Error confirming first payment");
    let b = b.expect("Error confirming second payment");

    let winners = [&a, &b].iter().filter(|o| o.rider_id == Some(rider.id)).count();
    assert_eq!(winners, 1, "Exactly one order may claim the rider");
    let loser = if a.rider_id.is_some() { &b } else { &a };
    assert_eq!(loser.status, OrderStatusType::PaymentConfirmed);
    assert!(loser.rider_id.is_none());
    let rider_now = api.db().fetch_user(rider.id).await.unwrap().unwrap();
    assert_eq!(rider_now.rider_status, Some(RiderStatus::Busy));
    tear_down(api).await;
}

/// A backend whose proximity queries always fail, standing in for an unhealthy geo index.
/// Everything else delegates to the real store.
#[derive(Clone)]
struct FaultyGeoBackend {
    inner: SqliteDatabase,
}

impl MarketplaceDatabase for FaultyGeoBackend {
    fn url(&self) -> &str {
        self.inner.url()
    }

    async fn insert_order(&self, order: NewOrder) -> Result<(Order, bool), MarketplaceError> {
        self.inner.insert_order(order).await
    }

    async fn fetch_order(&self, order_id: i64) -> Result<Option<Order>, MarketplaceError> {
        self.inner.fetch_order(order_id).await
    }

    async fn fetch_order_for_offer(
        &self,
        chat_id: i64,
        offer_message_id: i64,
    ) -> Result<Option<Order>, MarketplaceError> {
        self.inner.fetch_order_for_offer(chat_id, offer_message_id).await
    }

    async fn replace_order_items(&self, order_id: i64, items: Vec<NewOrderItem>) -> Result<Order, MarketplaceError> {
        self.inner.replace_order_items(order_id, items).await
    }

    async fn transition_order(
        &self,
        order_id: i64,
        expected: &[OrderStatusType],
        new_status: OrderStatusType,
    ) -> Result<Order, MarketplaceError> {
        self.inner.transition_order(order_id, expected, new_status).await
    }

    async fn confirm_order(&self, order_id: i64, expected: &[OrderStatusType]) -> Result<Order, MarketplaceError> {
        self.inner.confirm_order(order_id, expected).await
    }

    async fn confirm_order_payment(
        &self,
        order_id: i64,
        method: &str,
        transaction_id: &str,
    ) -> Result<(Order, bool), MarketplaceError> {
        self.inner.confirm_order_payment(order_id, method, transaction_id).await
    }

    async fn claim_rider_for_order(&self, order_id: i64, rider_id: i64) -> Result<ClaimOutcome, MarketplaceError> {
        self.inner.claim_rider_for_order(order_id, rider_id).await
    }

    async fn deliver_order(&self, order_id: i64) -> Result<Order, MarketplaceError> {
        self.inner.deliver_order(order_id).await
    }

    async fn cancel_order(&self, order_id: i64) -> Result<Order, MarketplaceError> {
        self.inner.cancel_order(order_id).await
    }

    async fn update_rider_status(&self, rider_id: i64, status: RiderStatus) -> Result<User, MarketplaceError> {
        self.inner.update_rider_status(rider_id, status).await
    }

    async fn update_rider_location(&self, rider_id: i64, location: Coordinates) -> Result<User, MarketplaceError> {
        self.inner.update_rider_location(rider_id, location).await
    }

    async fn fetch_user(&self, user_id: i64) -> Result<Option<User>, MarketplaceError> {
        self.inner.fetch_user(user_id).await
    }

    async fn orders_for_customer(&self, customer_id: i64) -> Result<Vec<Order>, MarketplaceError> {
        self.inner.orders_for_customer(customer_id).await
    }

    async fn orders_for_business(&self, business_id: i64) -> Result<Vec<Order>, MarketplaceError> {
        self.inner.orders_for_business(business_id).await
    }

    async fn orders_for_rider(&self, rider_id: i64) -> Result<Vec<Order>, MarketplaceError> {
        self.inner.orders_for_rider(rider_id).await
    }

    async fn close(&mut self) -> Result<(), MarketplaceError> {
        self.inner.close().await
    }
}

impl RiderSearch for FaultyGeoBackend {
    async fn nearest_available_riders(
        &self,
        _origin: Coordinates,
        _radius_degrees: f64,
        _limit: usize,
    ) -> Result<Vec<i64>, RiderSearchError> {
        Err(RiderSearchError::Backend("Proximity index is offline".to_string()))
    }

    async fn any_available_riders(&self, limit: usize) -> Result<Vec<i64>, RiderSearchError> {
        self.inner.any_available_riders(limit).await
    }
}

impl ChatGateway for FaultyGeoBackend {
    async fn fetch_offer_message(&self, message_id: i64) -> Result<Option<ChatMessage>, MarketplaceError> {
        self.inner.fetch_offer_message(message_id).await
    }

    async fn fetch_chat(&self, chat_id: i64) -> Result<Option<ChatRecord>, MarketplaceError> {
        self.inner.fetch_chat(chat_id).await
    }
}

#[tokio::test]
async fn a_failing_proximity_backend_degrades_to_the_fallback_tier() {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let inner = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    let mut api = OrderFlowApi::new(FaultyGeoBackend { inner }, DispatchConfig::default(), EventProducers::default());

    let rider = seed::rider(&api.db().inner, "Dev", RiderStatus::Available, Some(BANGALORE)).await;
    let customer = seed::customer(&api.db().inner, "Asha").await;
    let business = seed::business(&api.db().inner, "Biryani House", BANGALORE).await;
    let chat = seed::chat(&api.db().inner, &customer, &business).await;
    let order = api
        .create_order(customer.id, business.id, chat.id, "12 Cross Rd".to_string(), BANGALORE)
        .await
        .expect("Error creating order");
    api.set_order_items(order.id, vec![NewOrderItem::new("Thali", 1, Money::from_major(250))])
        .await
        .expect("Error setting items");
    api.confirm_order(order.id).await.expect("Error confirming order");

    let order = api.confirm_payment(order.id, "UPI", "txn-001").await.expect("Error confirming payment");
    assert_eq!(order.status, OrderStatusType::RiderAssigned, "A broken geo index must not fail dispatch");
    assert_eq!(order.rider_id, Some(rider.id));

    if let Err(e) = api.db_mut().close().await {
        error!("Failed to close database: {e}");
    }
    Sqlite::drop_database(&url).await.unwrap();
}

#[tokio::test]
async fn the_rider_assigned_hook_fires_once_per_assignment() {
    let calls = Arc::new(AtomicI32::new(0));
    let calls_copy = Arc::clone(&calls);
    let mut hooks = EventHooks::default();
    hooks.on_rider_assigned(move |event| {
        info!("🪝️ Rider {} assigned to order #{}", event.rider_id, event.order.id);
        calls_copy.fetch_add(1, Ordering::SeqCst);
        Box::pin(async {})
    });
    let handlers = EventHandlers::new(10, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;

    let api = setup_with(DispatchConfig::default(), producers).await;
    seed::rider(api.db(), "Dev", RiderStatus::Available, Some(BANGALORE)).await;
    let order_id = order_awaiting_payment(&api, Some(BANGALORE)).await;
    let order = api.confirm_payment(order_id, "UPI", "txn-001").await.expect("Error confirming payment");
    assert_eq!(order.status, OrderStatusType::RiderAssigned);
    // Same transaction id again: no second dispatch, no second event
    api.confirm_payment(order_id, "UPI", "txn-001").await.expect("Error re-confirming payment");

    sleep(Duration::from_millis(100)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    tear_down(api).await;
}
