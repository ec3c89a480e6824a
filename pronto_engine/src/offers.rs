//! Chat-offer to order bridge.
//!
//! An offer is a priced proposal embedded in an `OrderProposal` chat message. Accepting one is the
//! only way a negotiation becomes an order, and it must survive client retries: the caller pairs
//! [`resolve_offer`] with the idempotent insert on the store, keyed by `(chat_id, offer_message_id)`.
//!
//! Validation is fail-fast and every rejection is a named error. Malformed or non-numeric metadata
//! is treated exactly like a missing amount — a bad payload from the chat subsystem must never
//! panic the engine.

use pdp_common::{Coordinates, Money};

use crate::{
    db_types::{ChatMessage, ChatRecord, MessageType},
    traits::MarketplaceError,
};

/// Parameters for accepting an offer. The acting customer is explicit — there is no ambient
/// "current user" anywhere in the engine.
#[derive(Debug, Clone)]
pub struct AcceptOffer {
    pub chat_id: i64,
    pub offer_message_id: i64,
    pub customer_id: i64,
    pub delivery_address: String,
    pub delivery_location: Coordinates,
}

/// A validated offer, ready to seed an order's `total_amount`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedOffer {
    pub amount: Money,
}

/// Validates that `message` is an offer the requesting customer may accept, in order, failing on
/// the first violation:
///
/// 1. the message is an `OrderProposal` — plain chat text is not an offer;
/// 2. the message belongs to the chat named in the request;
/// 3. the chat's customer is the acting customer;
/// 4. the structured metadata contains a numeric `amount` strictly greater than zero.
///
/// Message existence (the step before all of these) is the caller's job, since only the caller
/// talks to the [`crate::traits::ChatGateway`].
pub fn resolve_offer(
    message: &ChatMessage,
    chat: &ChatRecord,
    request: &AcceptOffer,
) -> Result<ResolvedOffer, MarketplaceError> {
    if message.message_type != MessageType::OrderProposal {
        return Err(MarketplaceError::InvalidOffer(format!(
            "Message {} is a {} message, not an order proposal",
            message.id, message.message_type
        )));
    }
    if message.chat_id != request.chat_id {
        return Err(MarketplaceError::InvalidOffer(format!(
            "Message {} does not belong to chat {}",
            message.id, request.chat_id
        )));
    }
    if chat.customer_id != request.customer_id {
        return Err(MarketplaceError::Forbidden(format!(
            "Only the chat customer may accept offers in chat {}",
            chat.id
        )));
    }
    match parse_offer_amount(message.metadata.as_deref()) {
        Some(amount) if amount.is_positive() => Ok(ResolvedOffer { amount }),
        _ => Err(MarketplaceError::InvalidOffer(format!(
            "Message {} does not carry a positive offer amount",
            message.id
        ))),
    }
}

/// Extracts the `amount` field from an offer message's JSON metadata.
///
/// Anything that is not a JSON object with a finite numeric `amount` yields `None`.
pub fn parse_offer_amount(metadata: Option<&str>) -> Option<Money> {
    let metadata = metadata?.trim();
    if metadata.is_empty() {
        return None;
    }
    let root: serde_json::Value = serde_json::from_str(metadata).ok()?;
    let amount = root.get("amount")?.as_f64()?;
    Money::try_from(amount).ok()
}
