//! Helpers that plant the users, chats and offer messages the engine expects to find.

use pdp_common::Coordinates;
use pronto_engine::{
    db_types::{ChatMessage, ChatRecord, MessageType, NewUser, RiderStatus, User, UserRole},
    sqlite::db::{chats, users},
    SqliteDatabase,
};

pub async fn customer(db: &SqliteDatabase, name: &str) -> User {
    insert(db, NewUser::new(name.to_string(), email_for(name), UserRole::Customer)).await
}

pub async fn business(db: &SqliteDatabase, name: &str, location: Coordinates) -> User {
    insert(db, NewUser::new(name.to_string(), email_for(name), UserRole::Business).with_location(location)).await
}

pub async fn rider(db: &SqliteDatabase, name: &str, status: RiderStatus, location: Option<Coordinates>) -> User {
    let mut user = NewUser::new(name.to_string(), email_for(name), UserRole::Rider).with_rider_status(status);
    if let Some(loc) = location {
        user = user.with_location(loc);
    }
    insert(db, user).await
}

pub async fn chat(db: &SqliteDatabase, customer: &User, business: &User) -> ChatRecord {
    let mut conn = db.pool().acquire().await.expect("Error acquiring connection");
    chats::insert_chat(customer.id, business.id, &mut conn).await.expect("Error inserting chat")
}

/// An `OrderProposal` message whose metadata is the raw JSON string supplied by the caller.
pub async fn offer_message(db: &SqliteDatabase, chat: &ChatRecord, metadata: &str) -> ChatMessage {
    message(db, chat, chat.business_id, MessageType::OrderProposal, "Here is my offer", Some(metadata)).await
}

pub async fn text_message(db: &SqliteDatabase, chat: &ChatRecord, sender_id: i64, content: &str) -> ChatMessage {
    message(db, chat, sender_id, MessageType::Text, content, None).await
}

async fn message(
    db: &SqliteDatabase,
    chat: &ChatRecord,
    sender_id: i64,
    message_type: MessageType,
    content: &str,
    metadata: Option<&str>,
) -> ChatMessage {
    let mut conn = db.pool().acquire().await.expect("Error acquiring connection");
    chats::insert_message(chat.id, sender_id, message_type, content, metadata, &mut conn)
        .await
        .expect("Error inserting message")
}

async fn insert(db: &SqliteDatabase, user: NewUser) -> User {
    let mut conn = db.pool().acquire().await.expect("Error acquiring connection");
    users::insert_user(user, &mut conn).await.expect("Error inserting user")
}

fn email_for(name: &str) -> String {
    let slug = name.to_lowercase().replace(' ', ".");
    format!("{slug}.{}@pronto.test", rand::random::<u32>())
}
