//! Domain services for fiesta: holiday records, guest lists and the
//! assistant relay behind the Telegram bot.

pub mod error;
pub mod guest;
pub mod holiday;
pub mod relay;

pub use error::{ServiceError, ServiceResult};
