//! Holiday record management: create, read, page, partially update, delete.

pub mod service;

pub use fiesta_db::queries::holidays::{HolidayChanges, NewHoliday};
pub use service::{create_holiday, delete_holiday, get_holiday, list_holidays, update_holiday};
