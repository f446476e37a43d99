pub mod availability;
pub mod booking;
pub mod company;
pub mod reminder;

pub use availability::{Blockout, Slot, WeeklyAvailability};
pub use booking::{Booking, BookingStatus, BookingSummary, CustomerInfo, TokenKind};
pub use company::{Company, Resource, ResourceKind, Service};
pub use reminder::{Channel, ReminderConfig, ReminderLog, ReminderLogStatus, TimeUnit};
