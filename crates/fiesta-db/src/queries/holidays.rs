//! Database query functions for the `holidays` table.
//!
//! Every function takes any Postgres executor so it can run either directly
//! on the pool or inside a caller's transaction.

use anyhow::{Context, Result};
use sqlx::PgExecutor;
use sqlx::types::Json;

use crate::models::{GuestDocument, Holiday};

/// Fields for a new holiday row.
#[derive(Debug, Clone, Default)]
pub struct NewHoliday<'a> {
    pub theme: &'a str,
    pub details: &'a str,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location_address: Option<&'a str>,
}

/// A partial update. `None` leaves the column as it is.
#[derive(Debug, Clone, Default)]
pub struct HolidayChanges<'a> {
    pub theme: Option<&'a str>,
    pub details: Option<&'a str>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location_address: Option<&'a str>,
}

/// Insert a holiday with empty `pending` and `confirmed` buckets.
pub async fn insert_holiday<'e>(executor: impl PgExecutor<'e>, new: &NewHoliday<'_>) -> Result<Holiday> {
    let holiday = sqlx::query_as::<_, Holiday>(
        "INSERT INTO holidays (theme, details, latitude, longitude, location_address, guests, guests_count) \
         VALUES ($1, $2, $3, $4, $5, $6, 0) \
         RETURNING *",
    )
    .bind(new.theme)
    .bind(new.details)
    .bind(new.latitude)
    .bind(new.longitude)
    .bind(new.location_address)
    .bind(Json(GuestDocument::with_default_buckets()))
    .fetch_one(executor)
    .await
    .context("failed to insert holiday")?;

    Ok(holiday)
}

/// Fetch a holiday by ID.
pub async fn get_holiday<'e>(executor: impl PgExecutor<'e>, id: i32) -> Result<Option<Holiday>> {
    let holiday = sqlx::query_as::<_, Holiday>("SELECT * FROM holidays WHERE id = $1")
        .bind(id)
        .fetch_optional(executor)
        .await
        .context("failed to fetch holiday")?;

    Ok(holiday)
}

/// Fetch a holiday and take a row lock on it until the enclosing
/// transaction ends. Outside a transaction the lock is released at once.
pub async fn lock_holiday<'e>(executor: impl PgExecutor<'e>, id: i32) -> Result<Option<Holiday>> {
    let holiday = sqlx::query_as::<_, Holiday>("SELECT * FROM holidays WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(executor)
        .await
        .with_context(|| format!("failed to lock holiday {id}"))?;

    Ok(holiday)
}

/// A page of holidays in insertion order.
pub async fn list_holidays<'e>(
    executor: impl PgExecutor<'e>,
    offset: i64,
    limit: i64,
) -> Result<Vec<Holiday>> {
    let holidays =
        sqlx::query_as::<_, Holiday>("SELECT * FROM holidays ORDER BY id OFFSET $1 LIMIT $2")
            .bind(offset)
            .bind(limit)
            .fetch_all(executor)
            .await
            .context("failed to list holidays")?;

    Ok(holidays)
}

/// Apply the supplied fields and refresh `updated_at`.
///
/// Returns `None` when no holiday has this ID.
pub async fn update_holiday<'e>(
    executor: impl PgExecutor<'e>,
    id: i32,
    changes: &HolidayChanges<'_>,
) -> Result<Option<Holiday>> {
    let holiday = sqlx::query_as::<_, Holiday>(
        "UPDATE holidays \
         SET theme = COALESCE($2, theme), \
             details = COALESCE($3, details), \
             latitude = COALESCE($4, latitude), \
             longitude = COALESCE($5, longitude), \
             location_address = COALESCE($6, location_address), \
             updated_at = now() \
         WHERE id = $1 \
         RETURNING *",
    )
    .bind(id)
    .bind(changes.theme)
    .bind(changes.details)
    .bind(changes.latitude)
    .bind(changes.longitude)
    .bind(changes.location_address)
    .fetch_optional(executor)
    .await
    .context("failed to update holiday")?;

    Ok(holiday)
}

/// Overwrite the guest document and the stored guest count.
pub async fn save_guest_document<'e>(
    executor: impl PgExecutor<'e>,
    id: i32,
    guests: &GuestDocument,
    guests_count: i32,
) -> Result<()> {
    let result = sqlx::query(
        "UPDATE holidays SET guests = $1, guests_count = $2, updated_at = now() WHERE id = $3",
    )
    .bind(Json(guests))
    .bind(guests_count)
    .bind(id)
    .execute(executor)
    .await
    .context("failed to save guest document")?;

    if result.rows_affected() == 0 {
        anyhow::bail!("holiday {id} not found");
    }

    Ok(())
}

/// Delete a holiday (its guest rows cascade). Returns whether a row existed.
pub async fn delete_holiday<'e>(executor: impl PgExecutor<'e>, id: i32) -> Result<bool> {
    let result = sqlx::query("DELETE FROM holidays WHERE id = $1")
        .bind(id)
        .execute(executor)
        .await
        .context("failed to delete holiday")?;

    Ok(result.rows_affected() > 0)
}
