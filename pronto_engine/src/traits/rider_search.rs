use pdp_common::Coordinates;
use thiserror::Error;

/// Proximity queries over rider positions — the GeoIndex.
///
/// Results are read-only snapshots: a rider returned as available here may already be claimed by a
/// concurrent dispatch by the time a claim executes. Correctness rests entirely on the conditional
/// claim in [`crate::traits::MarketplaceDatabase::claim_rider_for_order`], never on these reads.
#[allow(async_fn_in_trait)]
pub trait RiderSearch: Clone {
    /// Ids of `Available` riders with a known position within `radius_degrees` of `origin`,
    /// ordered by ascending distance. May be empty.
    async fn nearest_available_riders(
        &self,
        origin: Coordinates,
        radius_degrees: f64,
        limit: usize,
    ) -> Result<Vec<i64>, RiderSearchError>;

    /// Ids of `Available` riders regardless of position, ordered by ascending id so that fallback
    /// assignment stays deterministic. May be empty.
    async fn any_available_riders(&self, limit: usize) -> Result<Vec<i64>, RiderSearchError>;
}

/// Failures of the geo backend are kept separate from store errors so that dispatch can degrade
/// (fall through to the unfiltered tier) instead of failing the whole attempt.
#[derive(Debug, Clone, Error)]
pub enum RiderSearchError {
    #[error("Rider search backend failure: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for RiderSearchError {
    fn from(e: sqlx::Error) -> Self {
        RiderSearchError::Backend(e.to_string())
    }
}
