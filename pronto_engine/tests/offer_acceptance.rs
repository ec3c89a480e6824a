use log::*;
use pdp_common::{Coordinates, Money};
use pronto_engine::{
    db_types::OrderStatusType,
    events::EventProducers,
    offers::AcceptOffer,
    DispatchConfig,
    MarketplaceDatabase,
    MarketplaceError,
    OrderFlowApi,
    SqliteDatabase,
};
use sqlx::{migrate::MigrateDatabase, Sqlite};

use crate::support::{
    prepare_env::{prepare_test_env, random_db_path},
    seed,
};

mod support;

const BANGALORE: Coordinates = Coordinates { latitude: 12.9716, longitude: 77.5946 };

async fn setup() -> OrderFlowApi<SqliteDatabase> {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    OrderFlowApi::new(db, DispatchConfig::default(), EventProducers::default())
}

async fn tear_down(mut api: OrderFlowApi<SqliteDatabase>) {
    if let Err(e) = api.db_mut().close().await {
        error!("Failed to close database: {e}");
    }
    Sqlite::drop_database(api.db().url()).await.unwrap();
}

fn accept_request(chat_id: i64, offer_message_id: i64, customer_id: i64) -> AcceptOffer {
    AcceptOffer {
        chat_id,
        offer_message_id,
        customer_id,
        delivery_address: "12 Cross Rd, Indiranagar".to_string(),
        delivery_location: BANGALORE,
    }
}

#[tokio::test]
async fn accepting_an_offer_creates_a_draft_order() {
    let api = setup().await;
    let customer = seed::customer(api.db(), "Asha").await;
    let business = seed::business(api.db(), "Biryani House", BANGALORE).await;
    let chat = seed::chat(api.db(), &customer, &business).await;
    let offer = seed::offer_message(api.db(), &chat, r#"{"amount": 450.0}"#).await;

    let order = api.accept_offer(accept_request(chat.id, offer.id, customer.id)).await.expect("Error accepting offer");
    assert_eq!(order.status, OrderStatusType::Draft);
    assert_eq!(order.total_amount, Money::from_cents(45_000));
    assert_eq!(order.customer_id, customer.id);
    assert_eq!(order.business_id, business.id);
    assert_eq!(order.offer_message_id, Some(offer.id));
    assert_eq!(order.payment_method.as_deref(), Some("UPI_ON_DELIVERY"));
    assert!(order.rider_id.is_none(), "Acceptance must not trigger dispatch");
    tear_down(api).await;
}

#[tokio::test]
async fn accepting_the_same_offer_twice_returns_the_first_order() {
    let api = setup().await;
    let customer = seed::customer(api.db(), "Asha").await;
    let business = seed::business(api.db(), "Biryani House", BANGALORE).await;
    let chat = seed::chat(api.db(), &customer, &business).await;
    let offer = seed::offer_message(api.db(), &chat, r#"{"amount": 450.0}"#).await;

    let first = api.accept_offer(accept_request(chat.id, offer.id, customer.id)).await.expect("Error accepting offer");
    let second = api.accept_offer(accept_request(chat.id, offer.id, customer.id)).await.expect("Error re-accepting");
    assert_eq!(first.id, second.id);
    assert_eq!(api.orders_for_customer(customer.id).await.unwrap().len(), 1);
    // The offer key resolves back to the one order it produced
    let linked = api
        .db()
        .fetch_order_for_offer(chat.id, offer.id)
        .await
        .expect("Error fetching order for offer")
        .expect("The accepted offer should resolve to an order");
    assert_eq!(linked.id, first.id);
    assert_eq!(linked.total_amount, Money::from_cents(45_000));
    tear_down(api).await;
}

#[tokio::test]
async fn a_missing_message_is_reported_as_not_found() {
    let api = setup().await;
    let customer = seed::customer(api.db(), "Asha").await;
    let business = seed::business(api.db(), "Biryani House", BANGALORE).await;
    let chat = seed::chat(api.db(), &customer, &business).await;

    let err = api.accept_offer(accept_request(chat.id, 9999, customer.id)).await.unwrap_err();
    assert!(matches!(err, MarketplaceError::MessageNotFound(9999)), "got {err}");
    tear_down(api).await;
}

#[tokio::test]
async fn a_plain_text_message_is_not_an_offer() {
    let api = setup().await;
    let customer = seed::customer(api.db(), "Asha").await;
    let business = seed::business(api.db(), "Biryani House", BANGALORE).await;
    let chat = seed::chat(api.db(), &customer, &business).await;
    let msg = seed::text_message(api.db(), &chat, business.id, "It will cost 450").await;

    let err = api.accept_offer(accept_request(chat.id, msg.id, customer.id)).await.unwrap_err();
    assert!(matches!(err, MarketplaceError::InvalidOffer(_)), "got {err}");
    assert!(api.orders_for_customer(customer.id).await.unwrap().is_empty());
    tear_down(api).await;
}

#[tokio::test]
async fn only_the_chat_customer_may_accept_an_offer() {
    let api = setup().await;
    let customer = seed::customer(api.db(), "Asha").await;
    let interloper = seed::customer(api.db(), "Ravi").await;
    let business = seed::business(api.db(), "Biryani House", BANGALORE).await;
    let chat = seed::chat(api.db(), &customer, &business).await;
    let offer = seed::offer_message(api.db(), &chat, r#"{"amount": 450.0}"#).await;

    let err = api.accept_offer(accept_request(chat.id, offer.id, interloper.id)).await.unwrap_err();
    assert!(matches!(err, MarketplaceError::Forbidden(_)), "got {err}");
    tear_down(api).await;
}

#[tokio::test]
async fn malformed_offer_metadata_is_rejected_without_panicking() {
    let api = setup().await;
    let customer = seed::customer(api.db(), "Asha").await;
    let business = seed::business(api.db(), "Biryani House", BANGALORE).await;
    let chat = seed::chat(api.db(), &customer, &business).await;

    for metadata in ["not json", r#"{"amount": "lots"}"#, r#"{"price": 450.0}"#, r#"{"amount": -1}"#] {
        let offer = seed::offer_message(api.db(), &chat, metadata).await;
        let err = api.accept_offer(accept_request(chat.id, offer.id, customer.id)).await.unwrap_err();
        assert!(matches!(err, MarketplaceError::InvalidOffer(_)), "metadata {metadata:?} gave {err}");
    }
    tear_down(api).await;
}
