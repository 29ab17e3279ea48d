//! Guest service layer.
//!
//! Every operation that touches a holiday's guest document first locks the
//! holiday row (`SELECT .. FOR UPDATE`), so concurrent guest mutations on
//! one holiday run one after another instead of overwriting each other's
//! document. Dropping a transaction without committing rolls it back.

use anyhow::Context;
use sqlx::PgPool;
use tracing::{info, warn};

use fiesta_db::models::{Guest, GuestDocument, GuestSummary, STATUS_PENDING};
use fiesta_db::queries::{guests as guest_queries, holidays as holiday_queries};

use crate::error::{ServiceError, ServiceResult};

/// Fields for a new guest.
#[derive(Debug, Clone)]
pub struct NewGuest<'a> {
    pub name: &'a str,
    pub telegram_id: Option<&'a str>,
    pub status: &'a str,
}

impl<'a> NewGuest<'a> {
    /// A pending guest with no contact id.
    pub fn pending(name: &'a str) -> Self {
        Self {
            name,
            telegram_id: None,
            status: STATUS_PENDING,
        }
    }
}

fn guest_count(guests: &GuestDocument) -> anyhow::Result<i32> {
    i32::try_from(guests.total()).context("guest count does not fit in an INTEGER column")
}

/// Add a guest row and append its summary to the holiday's document.
///
/// Fails with [`ServiceError::HolidayNotFound`] when the holiday does not
/// exist, in which case nothing is written.
pub async fn add_guest(pool: &PgPool, holiday_id: i32, new: &NewGuest<'_>) -> ServiceResult<Guest> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    let Some(holiday) = holiday_queries::lock_holiday(&mut *tx, holiday_id).await? else {
        return Err(ServiceError::HolidayNotFound(holiday_id));
    };

    let guest =
        guest_queries::insert_guest(&mut *tx, holiday_id, new.name, new.telegram_id, new.status)
            .await?;

    let mut guests = holiday.guests.0;
    guests.push(new.status, GuestSummary::new(new.name, new.telegram_id))?;
    let count = guest_count(&guests)?;
    holiday_queries::save_guest_document(&mut *tx, holiday_id, &guests, count).await?;

    tx.commit().await.context("failed to commit new guest")?;

    info!(holiday_id, guest_id = guest.id, status = %guest.status, guests_count = count, "guest added");
    Ok(guest)
}

/// Point lookup. A missing guest is `Ok(None)`.
pub async fn get_guest(pool: &PgPool, id: i32) -> ServiceResult<Option<Guest>> {
    Ok(guest_queries::get_guest(pool, id).await?)
}

/// All guest rows of a holiday, in insertion order.
pub async fn list_guests(pool: &PgPool, holiday_id: i32) -> ServiceResult<Vec<Guest>> {
    Ok(guest_queries::list_guests_for_holiday(pool, holiday_id).await?)
}

/// Move a guest to `new_status`.
///
/// The guest's summary moves from the old bucket to the end of the new one,
/// so re-applying the current status sends it to the end of its bucket.
/// When no summary with the guest's name sits in the old bucket the document
/// is left as it is and only the row changes. `guests_count` is not touched:
/// a move never changes the total.
///
/// Returns `Ok(None)` when the guest does not exist.
pub async fn update_status(
    pool: &PgPool,
    guest_id: i32,
    new_status: &str,
) -> ServiceResult<Option<Guest>> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    let Some(guest) = locked_guest(&mut tx, guest_id).await? else {
        return Ok(None);
    };

    match holiday_queries::get_holiday(&mut *tx, guest.holiday_id).await? {
        Some(holiday) => {
            let mut guests = holiday.guests.0;
            if guests.move_by_name(&guest.status, new_status, &guest.name)? {
                holiday_queries::save_guest_document(
                    &mut *tx,
                    holiday.id,
                    &guests,
                    holiday.guests_count,
                )
                .await?;
            } else {
                warn!(
                    guest_id,
                    holiday_id = holiday.id,
                    name = %guest.name,
                    status = %guest.status,
                    "guest missing from its status bucket; document left unchanged"
                );
            }
        }
        None => warn!(guest_id, holiday_id = guest.holiday_id, "holiday missing; document not updated"),
    }

    let updated = guest_queries::set_guest_status(&mut *tx, guest_id, new_status).await?;
    tx.commit().await.context("failed to commit guest status change")?;

    info!(guest_id, from = %guest.status, to = %updated.status, "guest status changed");
    Ok(Some(updated))
}

/// Delete a guest row and its summary, then recount the holiday's guests.
///
/// Returns `false`, writing nothing, when the guest does not exist.
pub async fn remove_guest(pool: &PgPool, guest_id: i32) -> ServiceResult<bool> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    let Some(guest) = locked_guest(&mut tx, guest_id).await? else {
        return Ok(false);
    };

    if let Some(holiday) = holiday_queries::get_holiday(&mut *tx, guest.holiday_id).await? {
        let mut guests = holiday.guests.0;
        if guests.take_first_by_name(&guest.status, &guest.name).is_none() {
            warn!(
                guest_id,
                holiday_id = holiday.id,
                name = %guest.name,
                "guest missing from its status bucket; recounting only"
            );
        }
        let count = guest_count(&guests)?;
        holiday_queries::save_guest_document(&mut *tx, holiday.id, &guests, count).await?;
    }

    guest_queries::delete_guest(&mut *tx, guest_id).await?;
    tx.commit().await.context("failed to commit guest removal")?;

    info!(guest_id, holiday_id = guest.holiday_id, "guest removed");
    Ok(true)
}

/// Read a guest with its holiday locked.
///
/// The holiday is locked first (matching [`add_guest`]'s lock order), then
/// the guest is read again so the returned row cannot change underneath the
/// caller until the transaction ends.
async fn locked_guest(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    guest_id: i32,
) -> ServiceResult<Option<Guest>> {
    let Some(guest) = guest_queries::get_guest(&mut **tx, guest_id).await? else {
        return Ok(None);
    };
    holiday_queries::lock_holiday(&mut **tx, guest.holiday_id).await?;
    Ok(guest_queries::get_guest(&mut **tx, guest_id).await?)
}
