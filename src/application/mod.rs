pub mod calendar;
pub mod occurrence;
