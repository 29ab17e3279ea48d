pub mod guests;
pub mod holidays;
pub mod restaurants;
