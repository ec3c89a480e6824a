use log::trace;
use pdp_common::Coordinates;
use sqlx::SqliteConnection;

use crate::{
    db_types::{RiderStatus, User},
    sqlite::db::users,
    traits::MarketplaceError,
};

/// Ids of `Available` riders with a reported position within `radius_degrees` of `origin`, nearest
/// first. Distance is squared planar degrees; ties break on ascending id to keep results stable.
pub async fn nearest_available(
    origin: Coordinates,
    radius_degrees: f64,
    limit: usize,
    conn: &mut SqliteConnection,
) -> Result<Vec<i64>, sqlx::Error> {
    let ids: Vec<i64> = sqlx::query_scalar(
        r#"
            SELECT id FROM users
            WHERE role = 'Rider'
              AND rider_status = 'Available'
              AND latitude IS NOT NULL
              AND longitude IS NOT NULL
              AND ((latitude - $1) * (latitude - $1) + (longitude - $2) * (longitude - $2)) <= $3
            ORDER BY ((latitude - $1) * (latitude - $1) + (longitude - $2) * (longitude - $2)) ASC, id ASC
            LIMIT $4;
        "#,
    )
    .bind(origin.latitude)
    .bind(origin.longitude)
    .bind(radius_degrees * radius_degrees)
    .bind(limit as i64)
    .fetch_all(conn)
    .await?;
    trace!("🛵️ Proximity query around {origin} returned {} rider(s)", ids.len());
    Ok(ids)
}

/// Ids of all `Available` riders, ascending id, position or not. The deterministic order keeps
/// fallback assignment reproducible.
pub async fn any_available(limit: usize, conn: &mut SqliteConnection) -> Result<Vec<i64>, sqlx::Error> {
    let ids: Vec<i64> = sqlx::query_scalar(
        "SELECT id FROM users WHERE role = 'Rider' AND rider_status = 'Available' ORDER BY id ASC LIMIT $1",
    )
    .bind(limit as i64)
    .fetch_all(conn)
    .await?;
    Ok(ids)
}

/// The claim: flips the rider to `Busy` only if they are still `Available`. Returns `false` when
/// the rider was taken (or went offline) in the meantime — a lost race, not an error.
pub async fn claim_available(rider_id: i64, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE users SET rider_status = 'Busy', updated_at = CURRENT_TIMESTAMP WHERE id = $1 AND role = 'Rider' \
         AND rider_status = 'Available'",
    )
    .bind(rider_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Releases a rider back into the dispatch pool after delivery or cancellation. Only flips riders
/// that are actually `Busy`; a rider who checked out mid-delivery stays `Offline`.
pub async fn release(rider_id: i64, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE users SET rider_status = 'Available', updated_at = CURRENT_TIMESTAMP WHERE id = $1 AND role = \
         'Rider' AND rider_status = 'Busy'",
    )
    .bind(rider_id)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn update_status(
    rider_id: i64,
    status: RiderStatus,
    conn: &mut SqliteConnection,
) -> Result<User, MarketplaceError> {
    let updated: Option<User> = sqlx::query_as(
        "UPDATE users SET rider_status = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 AND role = 'Rider' \
         RETURNING *",
    )
    .bind(status.to_string())
    .bind(rider_id)
    .fetch_optional(&mut *conn)
    .await?;
    match updated {
        Some(user) => Ok(user),
        None => match users::fetch_user(rider_id, conn).await? {
            Some(_) => Err(MarketplaceError::NotARider(rider_id)),
            None => Err(MarketplaceError::UserNotFound(rider_id)),
        },
    }
}

pub async fn update_location(
    rider_id: i64,
    location: Coordinates,
    conn: &mut SqliteConnection,
) -> Result<User, MarketplaceError> {
    let updated: Option<User> = sqlx::query_as(
        "UPDATE users SET latitude = $1, longitude = $2, updated_at = CURRENT_TIMESTAMP WHERE id = $3 AND role = \
         'Rider' RETURNING *",
    )
    .bind(location.latitude)
    .bind(location.longitude)
    .bind(rider_id)
    .fetch_optional(&mut *conn)
    .await?;
    match updated {
        Some(user) => Ok(user),
        None => match users::fetch_user(rider_id, conn).await? {
            Some(_) => Err(MarketplaceError::NotARider(rider_id)),
            None => Err(MarketplaceError::UserNotFound(rider_id)),
        },
    }
}
