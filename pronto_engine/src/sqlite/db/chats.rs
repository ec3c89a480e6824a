use sqlx::SqliteConnection;

use crate::db_types::{ChatMessage, ChatRecord, MessageType};

pub async fn fetch_chat(chat_id: i64, conn: &mut SqliteConnection) -> Result<Option<ChatRecord>, sqlx::Error> {
    let chat = sqlx::query_as("SELECT * FROM chats WHERE id = $1").bind(chat_id).fetch_optional(conn).await?;
    Ok(chat)
}

pub async fn fetch_message(message_id: i64, conn: &mut SqliteConnection) -> Result<Option<ChatMessage>, sqlx::Error> {
    let message =
        sqlx::query_as("SELECT * FROM messages WHERE id = $1").bind(message_id).fetch_optional(conn).await?;
    Ok(message)
}

pub async fn insert_chat(
    customer_id: i64,
    business_id: i64,
    conn: &mut SqliteConnection,
) -> Result<ChatRecord, sqlx::Error> {
    let chat = sqlx::query_as("INSERT INTO chats (customer_id, business_id) VALUES ($1, $2) RETURNING *")
        .bind(customer_id)
        .bind(business_id)
        .fetch_one(conn)
        .await?;
    Ok(chat)
}

pub async fn insert_message(
    chat_id: i64,
    sender_id: i64,
    message_type: MessageType,
    content: &str,
    metadata: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<ChatMessage, sqlx::Error> {
    let message = sqlx::query_as(
        r#"
            INSERT INTO messages (chat_id, sender_id, message_type, content, metadata)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(chat_id)
    .bind(sender_id)
    .bind(message_type.to_string())
    .bind(content)
    .bind(metadata)
    .fetch_one(conn)
    .await?;
    Ok(message)
}
