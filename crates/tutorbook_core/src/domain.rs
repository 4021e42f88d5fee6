//! crates/tutorbook_core/src/domain.rs
//!
//! Defines the pure, core data structures for the marketplace.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use uuid::Uuid;

//=========================================================================================
// Users and Authentication
//=========================================================================================

/// The role a user account holds. The core only ever compares identities for
/// authorization, but the role is carried so callers can gate routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserRole {
    Student,
    Tutor,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Student => "STUDENT",
            UserRole::Tutor => "TUTOR",
            UserRole::Admin => "ADMIN",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "STUDENT" => Some(UserRole::Student),
            "TUTOR" => Some(UserRole::Tutor),
            "ADMIN" => Some(UserRole::Admin),
            _ => None,
        }
    }
}

/// Represents a user account - used throughout the app.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
}

// Only used internally for login/signup - contains sensitive data.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub email: String,
    pub hashed_password: String,
    pub role: UserRole,
}

// Represents a browser login session (auth cookie).
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub id: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

//=========================================================================================
// Tutors
//=========================================================================================

/// A tutor profile. Exactly one per user; `rating` and `total_reviews` form
/// the rolling aggregate recomputed on every rating submission.
#[derive(Debug, Clone)]
pub struct Tutor {
    pub id: Uuid,
    pub user_id: Uuid,
    pub bio: String,
    pub subjects: Vec<String>,
    pub hourly_rate: f64,
    pub rating: f64,
    pub total_reviews: i64,
    pub is_active: bool,
}

//=========================================================================================
// Slots
//=========================================================================================

/// The recurrence pattern attached to a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recurrence {
    None,
    Daily,
    Weekly,
    Monthly,
}

impl Recurrence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recurrence::None => "NONE",
            Recurrence::Daily => "DAILY",
            Recurrence::Weekly => "WEEKLY",
            Recurrence::Monthly => "MONTHLY",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "NONE" => Some(Recurrence::None),
            "DAILY" => Some(Recurrence::Daily),
            "WEEKLY" => Some(Recurrence::Weekly),
            "MONTHLY" => Some(Recurrence::Monthly),
            _ => None,
        }
    }
}

/// A tutor-published, bookable time interval. Intervals are half-open
/// `[start_time, end_time)`; no two slots of the same tutor may overlap.
#[derive(Debug, Clone)]
pub struct Slot {
    pub id: Uuid,
    pub tutor_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: i64,
    pub is_booked: bool,
    pub recurrence: Recurrence,
    pub recurrence_end: Option<DateTime<Utc>>,
}

//=========================================================================================
// Bookings
//=========================================================================================

/// Booking lifecycle. CANCELLED and COMPLETED are terminal; the only legal
/// edges are PENDING -> CONFIRMED, PENDING -> CANCELLED,
/// CONFIRMED -> CANCELLED and CONFIRMED -> COMPLETED.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Cancelled => "CANCELLED",
            BookingStatus::Completed => "COMPLETED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(BookingStatus::Pending),
            "CONFIRMED" => Some(BookingStatus::Confirmed),
            "CANCELLED" => Some(BookingStatus::Cancelled),
            "COMPLETED" => Some(BookingStatus::Completed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Cancelled | BookingStatus::Completed)
    }

    /// Whether `self -> next` is a legal edge of the state machine.
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (BookingStatus::Pending, BookingStatus::Confirmed)
                | (BookingStatus::Pending, BookingStatus::Cancelled)
                | (BookingStatus::Confirmed, BookingStatus::Cancelled)
                | (BookingStatus::Confirmed, BookingStatus::Completed)
        )
    }
}

/// A reservation linking one student to one slot. `tutor_id` is denormalized
/// from the slot's tutor and fixed at creation.
#[derive(Debug, Clone)]
pub struct Booking {
    pub id: Uuid,
    pub slot_id: Uuid,
    pub student_id: Uuid,
    pub tutor_id: Uuid,
    pub subject: String,
    pub notes: Option<String>,
    pub status: BookingStatus,
    pub cancellation_reason: Option<String>,
    pub rating: Option<i64>,
    pub review: Option<String>,
    pub reminder_sent: bool,
    pub created_at: DateTime<Utc>,
}

/// Name and address of one party of a booking, as handed to the notifier.
#[derive(Debug, Clone)]
pub struct ContactInfo {
    pub name: String,
    pub email: String,
}

/// A booking together with its slot and the contact details of both parties,
/// fully populated so the notifier never has to query anything.
#[derive(Debug, Clone)]
pub struct BookingDetails {
    pub booking: Booking,
    pub slot: Slot,
    pub student: ContactInfo,
    pub tutor: ContactInfo,
}

/// Outcome of a recurring-slot batch request. Partial success is the
/// designed behavior: colliding occurrences are skipped, never fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecurrenceOutcome {
    pub created: u32,
    pub skipped: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_have_no_outgoing_edges() {
        for next in [
            BookingStatus::Pending,
            BookingStatus::Confirmed,
            BookingStatus::Cancelled,
            BookingStatus::Completed,
        ] {
            assert!(!BookingStatus::Cancelled.can_transition_to(next));
            assert!(!BookingStatus::Completed.can_transition_to(next));
        }
    }

    #[test]
    fn confirmed_can_cancel_or_complete() {
        assert!(BookingStatus::Confirmed.can_transition_to(BookingStatus::Cancelled));
        assert!(BookingStatus::Confirmed.can_transition_to(BookingStatus::Completed));
        assert!(!BookingStatus::Confirmed.can_transition_to(BookingStatus::Pending));
    }

    #[test]
    fn enums_round_trip_through_strings() {
        for status in [
            BookingStatus::Pending,
            BookingStatus::Confirmed,
            BookingStatus::Cancelled,
            BookingStatus::Completed,
        ] {
            assert_eq!(BookingStatus::parse(status.as_str()), Some(status));
        }
        for rec in [
            Recurrence::None,
            Recurrence::Daily,
            Recurrence::Weekly,
            Recurrence::Monthly,
        ] {
            assert_eq!(Recurrence::parse(rec.as_str()), Some(rec));
        }
        assert_eq!(BookingStatus::parse("DONE"), None);
    }
}
