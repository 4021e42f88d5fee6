pub mod domain;
pub mod ports;
pub mod rating;
pub mod schedule;

pub use domain::{
    AuthSession, Booking, BookingDetails, BookingStatus, ContactInfo, Recurrence,
    RecurrenceOutcome, Slot, Tutor, User, UserCredentials, UserRole,
};
pub use ports::{
    Clock, CoreError, CoreResult, MarketplaceStore, NewTutorProfile, Notifier, SlotChanges,
    SlotFilter, SystemClock, TutorFilter,
};
