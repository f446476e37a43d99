pub mod availability;
pub mod catalog;
pub mod lifecycle;
pub mod messaging;
pub mod reminders;
pub mod scheduling;
pub mod tokens;
