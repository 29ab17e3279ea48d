//! Guest list management.
//!
//! Guest rows are authoritative; each holiday also carries a guest document
//! (summaries grouped by status, matched to rows by name) and a
//! `guests_count`. The service keeps the three in step inside one
//! transaction per operation.

pub mod service;

pub use service::{NewGuest, add_guest, get_guest, list_guests, remove_guest, update_status};
