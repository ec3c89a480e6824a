use log::*;
use pdp_common::Coordinates;

use crate::{
    config::DispatchConfig,
    db_types::{Order, OrderStatusType},
    events::{EventProducers, RiderAssignedEvent},
    traits::{ClaimOutcome, MarketplaceDatabase, MarketplaceError, RiderSearch},
};

/// The rider-dispatch algorithm.
///
/// Given an order that has just reached `PaymentConfirmed`, claims exactly one available rider and
/// advances the order to `RiderAssigned`, or leaves the order where it is when no rider can be
/// claimed. "No rider" is a normal outcome of a dispatch attempt, never an error.
///
/// Two tiers of candidates are tried in turn:
/// 1. `Available` riders with a known position inside the configured radius of the business,
///    nearest first.
/// 2. Any `Available` rider, ascending id — this catches riders who checked in but whose app has
///    not reported a position yet, and keeps fallback assignment deterministic.
///
/// Every claim is a compare-and-set on the rider's status; a lost race simply moves on to the next
/// candidate. The claim and the order transition commit as one transaction in the backend.
pub struct DispatchEngine<B> {
    db: B,
    config: DispatchConfig,
    producers: EventProducers,
}

impl<B> DispatchEngine<B> {
    pub fn new(db: B, config: DispatchConfig, producers: EventProducers) -> Self {
        Self { db, config, producers }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }
}

impl<B> DispatchEngine<B>
where B: MarketplaceDatabase + RiderSearch
{
    /// Attempts to assign a rider to `order`.
    ///
    /// Returns `Ok(Some(order))` when a rider holds the order afterwards (claimed now, or already
    /// claimed by a concurrent dispatch), and `Ok(None)` when no rider could be claimed — in which
    /// case the order remains at `PaymentConfirmed` and a later, externally triggered attempt can
    /// safely call this again.
    ///
    /// Fails with [`MarketplaceError::PreconditionFailed`] when the business has no registered
    /// location, since no proximity query can be formed and leaving the order silently undispatched
    /// would hide a configuration error.
    pub async fn assign_rider(&self, order: &Order) -> Result<Option<Order>, MarketplaceError> {
        if order.rider_id.is_some() {
            debug!("🛵️ Order #{} already has a rider. Nothing to dispatch.", order.id);
            return Ok(Some(order.clone()));
        }
        if order.status != OrderStatusType::PaymentConfirmed {
            return Err(MarketplaceError::InvalidOrderState(format!(
                "Order #{} is {}; only payment-confirmed orders are dispatched",
                order.id, order.status
            )));
        }
        let business = self
            .db
            .fetch_user(order.business_id)
            .await?
            .ok_or(MarketplaceError::UserNotFound(order.business_id))?;
        let origin = business.location().ok_or_else(|| {
            MarketplaceError::PreconditionFailed(format!(
                "Business {} has no registered location; order #{} cannot be dispatched",
                business.id, order.id
            ))
        })?;

        let radius_degrees = Coordinates::meters_to_degrees(self.config.assignment_radius_m);
        let nearby = match self.db.nearest_available_riders(origin, radius_degrees, self.config.max_candidates).await {
            Ok(ids) => ids,
            Err(e) => {
                // A broken geo backend degrades dispatch, it must not fail it. The unfiltered
                // tier below still gets a chance to find someone.
                warn!("🛵️ Proximity search failed for order #{}: {e}. Skipping the proximity tier.", order.id);
                Vec::new()
            },
        };
        trace!("🛵️ {} proximity candidates for order #{}", nearby.len(), order.id);
        if let Some(assigned) = self.try_claim(order, &nearby).await? {
            return Ok(Some(assigned));
        }

        let fallback = match self.db.any_available_riders(self.config.max_candidates).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!("🛵️ Fallback rider query failed for order #{}: {e}. No rider will be assigned.", order.id);
                Vec::new()
            },
        };
        trace!("🛵️ {} fallback candidates for order #{}", fallback.len(), order.id);
        if let Some(assigned) = self.try_claim(order, &fallback).await? {
            return Ok(Some(assigned));
        }

        debug!("🛵️ No rider could be claimed for order #{}. It remains at {}.", order.id, order.status);
        Ok(None)
    }

    /// Walks the candidate list, claiming the first rider that is still available. Lost races move
    /// on to the next candidate; a concurrent dispatch that already bound the order short-circuits.
    async fn try_claim(&self, order: &Order, candidates: &[i64]) -> Result<Option<Order>, MarketplaceError> {
        for &rider_id in candidates {
            match self.db.claim_rider_for_order(order.id, rider_id).await? {
                ClaimOutcome::Assigned(assigned) => {
                    debug!("🛵️ Rider {rider_id} claimed for order #{}", order.id);
                    self.call_rider_assigned_hook(&assigned, rider_id).await;
                    return Ok(Some(assigned));
                },
                ClaimOutcome::RiderUnavailable => {
                    trace!("🛵️ Rider {rider_id} was taken before the claim landed. Trying the next candidate.");
                },
                ClaimOutcome::OrderAlreadyAssigned(existing) => {
                    debug!("🛵️ Order #{} was assigned by a concurrent dispatch. Standing down.", order.id);
                    return Ok(Some(existing));
                },
            }
        }
        Ok(None)
    }

    async fn call_rider_assigned_hook(&self, order: &Order, rider_id: i64) {
        for emitter in &self.producers.rider_assigned_producer {
            let event = RiderAssignedEvent::new(order.clone(), rider_id);
            emitter.publish_event(event).await;
        }
    }
}
