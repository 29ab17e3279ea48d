//! Database query functions for the `guests` table.

use anyhow::{Context, Result};
use sqlx::PgExecutor;

use crate::models::Guest;

/// Insert a guest row for `holiday_id`.
pub async fn insert_guest<'e>(
    executor: impl PgExecutor<'e>,
    holiday_id: i32,
    name: &str,
    telegram_id: Option<&str>,
    status: &str,
) -> Result<Guest> {
    let guest = sqlx::query_as::<_, Guest>(
        "INSERT INTO guests (holiday_id, name, telegram_id, status) \
         VALUES ($1, $2, $3, $4) \
         RETURNING *",
    )
    .bind(holiday_id)
    .bind(name)
    .bind(telegram_id)
    .bind(status)
    .fetch_one(executor)
    .await
    .with_context(|| format!("failed to insert guest {name:?}"))?;

    Ok(guest)
}

/// Fetch a guest by ID.
pub async fn get_guest<'e>(executor: impl PgExecutor<'e>, id: i32) -> Result<Option<Guest>> {
    let guest = sqlx::query_as::<_, Guest>("SELECT * FROM guests WHERE id = $1")
        .bind(id)
        .fetch_optional(executor)
        .await
        .context("failed to fetch guest")?;

    Ok(guest)
}

/// All guest rows of a holiday, in insertion order.
pub async fn list_guests_for_holiday<'e>(
    executor: impl PgExecutor<'e>,
    holiday_id: i32,
) -> Result<Vec<Guest>> {
    let guests =
        sqlx::query_as::<_, Guest>("SELECT * FROM guests WHERE holiday_id = $1 ORDER BY id")
            .bind(holiday_id)
            .fetch_all(executor)
            .await
            .context("failed to list guests")?;

    Ok(guests)
}

/// Set a guest's status and refresh `updated_at`.
pub async fn set_guest_status<'e>(
    executor: impl PgExecutor<'e>,
    id: i32,
    status: &str,
) -> Result<Guest> {
    let guest = sqlx::query_as::<_, Guest>(
        "UPDATE guests SET status = $1, updated_at = now() WHERE id = $2 RETURNING *",
    )
    .bind(status)
    .bind(id)
    .fetch_optional(executor)
    .await
    .context("failed to update guest status")?;

    guest.with_context(|| format!("guest {id} not found"))
}

/// Delete a guest row. Returns whether a row existed.
pub async fn delete_guest<'e>(executor: impl PgExecutor<'e>, id: i32) -> Result<bool> {
    let result = sqlx::query("DELETE FROM guests WHERE id = $1")
        .bind(id)
        .execute(executor)
        .await
        .context("failed to delete guest")?;

    Ok(result.rows_affected() > 0)
}
