use sqlx::SqliteConnection;

use crate::{
    db_types::{NewUser, User},
    traits::MarketplaceError,
};

pub async fn fetch_user(user_id: i64, conn: &mut SqliteConnection) -> Result<Option<User>, sqlx::Error> {
    let user = sqlx::query_as("SELECT * FROM users WHERE id = $1").bind(user_id).fetch_optional(conn).await?;
    Ok(user)
}

pub async fn insert_user(user: NewUser, conn: &mut SqliteConnection) -> Result<User, MarketplaceError> {
    let (latitude, longitude) = match user.location {
        Some(loc) => (Some(loc.latitude), Some(loc.longitude)),
        None => (None, None),
    };
    let user = sqlx::query_as(
        r#"
            INSERT INTO users (name, email, role, rider_status, latitude, longitude)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(user.name)
    .bind(user.email)
    .bind(user.role.to_string())
    .bind(user.rider_status.map(|s| s.to_string()))
    .bind(latitude)
    .bind(longitude)
    .fetch_one(conn)
    .await?;
    Ok(user)
}
