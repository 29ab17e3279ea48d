//! Holiday service layer.
//!
//! Each write runs in its own transaction; a failed commit rolls back and
//! surfaces as [`ServiceError::Storage`](crate::ServiceError::Storage).

use anyhow::Context;
use sqlx::PgPool;
use tracing::info;

use fiesta_db::models::Holiday;
use fiesta_db::queries::holidays as holiday_queries;
use fiesta_db::queries::holidays::{HolidayChanges, NewHoliday};

use crate::error::ServiceResult;

/// Create a holiday with empty `pending` and `confirmed` guest buckets.
pub async fn create_holiday(pool: &PgPool, new: &NewHoliday<'_>) -> ServiceResult<Holiday> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;
    let holiday = holiday_queries::insert_holiday(&mut *tx, new).await?;
    tx.commit().await.context("failed to commit new holiday")?;

    info!(holiday_id = holiday.id, theme = %holiday.theme, "holiday created");
    Ok(holiday)
}

/// Point lookup. A missing holiday is `Ok(None)`.
pub async fn get_holiday(pool: &PgPool, id: i32) -> ServiceResult<Option<Holiday>> {
    Ok(holiday_queries::get_holiday(pool, id).await?)
}

/// A page of holidays in insertion order.
pub async fn list_holidays(pool: &PgPool, offset: i64, limit: i64) -> ServiceResult<Vec<Holiday>> {
    Ok(holiday_queries::list_holidays(pool, offset, limit).await?)
}

/// Apply only the supplied fields and refresh `updated_at`.
///
/// Returns `Ok(None)` when no holiday has this ID.
pub async fn update_holiday(
    pool: &PgPool,
    id: i32,
    changes: &HolidayChanges<'_>,
) -> ServiceResult<Option<Holiday>> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;
    let Some(holiday) = holiday_queries::update_holiday(&mut *tx, id, changes).await? else {
        return Ok(None);
    };
    tx.commit().await.context("failed to commit holiday update")?;

    info!(holiday_id = id, "holiday updated");
    Ok(Some(holiday))
}

/// Delete a holiday together with its guest rows.
///
/// Returns `false` when there was nothing to delete.
pub async fn delete_holiday(pool: &PgPool, id: i32) -> ServiceResult<bool> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;
    let deleted = holiday_queries::delete_holiday(&mut *tx, id).await?;
    tx.commit().await.context("failed to commit holiday deletion")?;

    if deleted {
        info!(holiday_id = id, "holiday deleted");
    }
    Ok(deleted)
}
