//! crates/tutorbook_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the
//! core to be independent of specific external implementations like databases
//! or SMTP servers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    AuthSession, Booking, BookingDetails, Recurrence, RecurrenceOutcome, Slot, Tutor, User,
    UserCredentials, UserRole,
};

//=========================================================================================
// Core Error and Result Types
//=========================================================================================

/// The error taxonomy of the booking core. Every variant except [`Storage`]
/// is a caller-fault condition surfaced synchronously and never retried by
/// the core; `Storage` is the one transient kind, covering store and
/// transaction failures after a complete rollback.
///
/// [`Storage`]: CoreError::Storage
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("end time must be after start time")]
    InvalidRange,
    #[error("cannot use a time slot in the past")]
    PastSlot,
    #[error("slot overlaps with an existing slot")]
    OverlapConflict,
    #[error("{0} not found")]
    NotFound(String),
    #[error("forbidden")]
    Forbidden,
    #[error("cannot modify a booked slot")]
    SlotLocked,
    #[error("slot is already booked")]
    SlotAlreadyBooked,
    #[error("booking is already cancelled")]
    AlreadyCancelled,
    #[error("booking is already completed")]
    AlreadyCompleted,
    #[error("booking has already been rated")]
    AlreadyRated,
    #[error("booking is not confirmed")]
    NotConfirmed,
    #[error("only completed bookings can be rated")]
    NotCompleted,
    #[error("rating must be an integer between 1 and 5")]
    InvalidRating,
    #[error("email is already registered")]
    EmailTaken,
    #[error("tutor profile already exists")]
    ProfileExists,
    #[error("unauthorized")]
    Unauthorized,
    #[error("storage error: {0}")]
    Storage(String),
}

/// A convenience type alias for `Result<T, CoreError>`.
pub type CoreResult<T> = Result<T, CoreError>;

//=========================================================================================
// Store Parameter Structs
//=========================================================================================

/// Profile fields supplied when a user creates their tutor profile.
#[derive(Debug, Clone)]
pub struct NewTutorProfile {
    pub bio: String,
    pub subjects: Vec<String>,
    pub hourly_rate: f64,
}

/// Optional field updates for an unbooked slot. `None` leaves a field alone.
#[derive(Debug, Clone, Default)]
pub struct SlotChanges {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i64>,
}

/// Filters for the availability query. With `available_only` set, booked
/// slots and slots that have already started are excluded.
#[derive(Debug, Clone, Default)]
pub struct SlotFilter {
    pub tutor_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub available_only: bool,
}

/// Filters for tutor discovery: case-insensitive substring match on any of
/// the tutor's subjects, and an hourly-rate ceiling.
#[derive(Debug, Clone, Default)]
pub struct TutorFilter {
    pub subject: Option<String>,
    pub max_hourly_rate: Option<f64>,
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// The persistence port: slot lifecycle, the booking transaction engine and
/// the reminder bookkeeping, plus the user/tutor records they hang off.
///
/// The three booking mutations (`create_booking`, `cancel_booking`,
/// `rate_booking`) must each execute as a single atomic transaction: under
/// concurrent callers there is never partial visibility of the slot flip
/// versus the booking row, and of two concurrent `create_booking` calls for
/// one slot at most one succeeds while the rest observe `SlotAlreadyBooked`.
#[async_trait]
pub trait MarketplaceStore: Send + Sync {
    // --- User Management ---
    async fn create_user(
        &self,
        email: &str,
        hashed_password: &str,
        first_name: &str,
        last_name: &str,
        role: UserRole,
    ) -> CoreResult<User>;

    async fn get_user(&self, user_id: Uuid) -> CoreResult<User>;

    async fn get_user_by_email(&self, email: &str) -> CoreResult<UserCredentials>;

    // --- Auth Sessions ---
    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> CoreResult<AuthSession>;

    async fn validate_auth_session(&self, session_id: &str) -> CoreResult<Uuid>;

    async fn delete_auth_session(&self, session_id: &str) -> CoreResult<()>;

    // --- Tutor Profiles ---
    async fn create_tutor_profile(
        &self,
        user_id: Uuid,
        profile: NewTutorProfile,
    ) -> CoreResult<Tutor>;

    async fn get_tutor(&self, tutor_id: Uuid) -> CoreResult<Tutor>;

    async fn get_tutor_by_user(&self, user_id: Uuid) -> CoreResult<Tutor>;

    async fn list_active_tutors(&self, filter: TutorFilter) -> CoreResult<Vec<Tutor>>;

    // --- Slot Store ---
    /// Inserts a single unbooked slot after range, past-time and per-tutor
    /// overlap validation.
    async fn create_slot(
        &self,
        tutor_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        duration_minutes: Option<i64>,
    ) -> CoreResult<Slot>;

    /// Expands a recurrence template and inserts each occurrence that does
    /// not collide with a slot already in the store (including occurrences
    /// inserted earlier in the same batch). Colliding occurrences are
    /// skipped, never fatal.
    async fn create_recurring_slots(
        &self,
        tutor_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        pattern: Recurrence,
        recurrence_end: Option<DateTime<Utc>>,
        max_count: u32,
    ) -> CoreResult<RecurrenceOutcome>;

    async fn update_slot(
        &self,
        slot_id: Uuid,
        requester_id: Uuid,
        changes: SlotChanges,
    ) -> CoreResult<Slot>;

    async fn delete_slot(&self, slot_id: Uuid, requester_id: Uuid) -> CoreResult<()>;

    async fn query_slots(&self, filter: SlotFilter) -> CoreResult<Vec<Slot>>;

    async fn list_slots_for_tutor(&self, tutor_id: Uuid) -> CoreResult<Vec<Slot>>;

    // --- Booking Transaction Engine ---
    /// Atomically flips the slot to booked and inserts a CONFIRMED booking.
    async fn create_booking(
        &self,
        student_id: Uuid,
        slot_id: Uuid,
        subject: &str,
        notes: Option<&str>,
    ) -> CoreResult<BookingDetails>;

    /// Atomically cancels the booking and frees its slot for rebooking.
    /// Allowed for the student who made it or the tutor who owns the slot.
    async fn cancel_booking(
        &self,
        requester_id: Uuid,
        booking_id: Uuid,
        reason: Option<&str>,
    ) -> CoreResult<BookingDetails>;

    /// Marks a confirmed booking COMPLETED. Allowed for the owning tutor.
    async fn complete_booking(&self, requester_id: Uuid, booking_id: Uuid)
        -> CoreResult<Booking>;

    /// Records a 1-5 rating on a completed booking and recomputes the
    /// tutor's aggregate rating from all rated bookings.
    async fn rate_booking(
        &self,
        student_id: Uuid,
        booking_id: Uuid,
        rating: i64,
        review: Option<&str>,
    ) -> CoreResult<Booking>;

    async fn list_bookings_for_user(&self, user_id: Uuid) -> CoreResult<Vec<Booking>>;

    // --- Reminder Bookkeeping ---
    /// CONFIRMED bookings without a sent reminder whose slot starts within
    /// `[from, to]`, fully populated for the notifier.
    async fn due_reminders(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> CoreResult<Vec<BookingDetails>>;

    async fn mark_reminder_sent(&self, booking_id: Uuid) -> CoreResult<()>;
}

/// The notification port. The core passes a fully populated
/// [`BookingDetails`] and treats the call as opaque; failures are logged by
/// the caller and never escalated or retried.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn booking_confirmed(&self, details: &BookingDetails) -> CoreResult<()>;
    async fn booking_cancelled(&self, details: &BookingDetails) -> CoreResult<()>;
    async fn session_reminder(&self, details: &BookingDetails) -> CoreResult<()>;
}

/// Injectable clock so past-slot checks and the reminder window are
/// deterministic under test.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The production clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
