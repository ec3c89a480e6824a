use crate::{
    db_types::{ChatMessage, ChatRecord},
    traits::MarketplaceError,
};

/// Read-only boundary to the chat subsystem.
///
/// The engine never writes chat state; it only resolves offer messages and chat membership while
/// converting an accepted offer into an order.
#[allow(async_fn_in_trait)]
pub trait ChatGateway: Clone {
    /// Fetches a chat message by id. Returns `None` if the message does not exist.
    async fn fetch_offer_message(&self, message_id: i64) -> Result<Option<ChatMessage>, MarketplaceError>;

    /// Fetches the chat header (customer and business references) by id.
    async fn fetch_chat(&self, chat_id: i64) -> Result<Option<ChatRecord>, MarketplaceError>;
}
