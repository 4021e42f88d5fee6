//! services/api/src/adapters/store.rs
//!
//! This module contains the SQLite adapter, the concrete implementation of
//! the `MarketplaceStore` port from the `core` crate. It owns the slot
//! lifecycle (with per-tutor overlap enforcement) and the booking
//! transaction engine, using `sqlx` with explicit transactions.
//!
//! The double-book race is closed inside the booking transaction with a
//! guarded write: `UPDATE slots SET is_booked = 1 WHERE id = ? AND
//! is_booked = 0`, issued as the transaction's first statement so the write
//! lock is held before anything is read. SQLite admits a single writer at a
//! time, so of two concurrent bookings for one slot exactly one sees a row
//! flip; the other waits on the lock, observes zero rows affected and fails
//! with `SlotAlreadyBooked`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqliteConnection, SqlitePool};
use std::sync::Arc;
use uuid::Uuid;

use tutorbook_core::domain::{
    AuthSession, Booking, BookingDetails, BookingStatus, ContactInfo, Recurrence,
    RecurrenceOutcome, Slot, Tutor, User, UserCredentials, UserRole,
};
use tutorbook_core::ports::{
    Clock, CoreError, CoreResult, MarketplaceStore, NewTutorProfile, SlotChanges, SlotFilter,
    TutorFilter,
};
use tutorbook_core::{rating, schedule};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A SQLite-backed store that implements the `MarketplaceStore` port.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteStore {
    /// Creates a new `SqliteStore` with an injected clock.
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn storage(e: sqlx::Error) -> CoreError {
    CoreError::Storage(e.to_string())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(
        e.as_database_error().map(|d| d.kind()),
        Some(sqlx::error::ErrorKind::UniqueViolation)
    )
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    email: String,
    first_name: String,
    last_name: String,
    role: String,
}

impl UserRecord {
    fn to_domain(self) -> CoreResult<User> {
        let role = UserRole::parse(&self.role)
            .ok_or_else(|| CoreError::Storage(format!("unknown user role '{}'", self.role)))?;
        Ok(User {
            id: self.id,
            email: self.email,
            first_name: self.first_name,
            last_name: self.last_name,
            role,
        })
    }
}

#[derive(FromRow)]
struct SlotRecord {
    id: Uuid,
    tutor_id: Uuid,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    duration_minutes: i64,
    is_booked: bool,
    recurrence: String,
    recurrence_end: Option<DateTime<Utc>>,
}

impl SlotRecord {
    fn to_domain(self) -> CoreResult<Slot> {
        let recurrence = Recurrence::parse(&self.recurrence).ok_or_else(|| {
            CoreError::Storage(format!("unknown recurrence '{}'", self.recurrence))
        })?;
        Ok(Slot {
            id: self.id,
            tutor_id: self.tutor_id,
            start_time: self.start_time,
            end_time: self.end_time,
            duration_minutes: self.duration_minutes,
            is_booked: self.is_booked,
            recurrence,
            recurrence_end: self.recurrence_end,
        })
    }
}

#[derive(FromRow)]
struct BookingRecord {
    id: Uuid,
    slot_id: Uuid,
    student_id: Uuid,
    tutor_id: Uuid,
    subject: String,
    notes: Option<String>,
    status: String,
    cancellation_reason: Option<String>,
    rating: Option<i64>,
    review: Option<String>,
    reminder_sent: bool,
    created_at: DateTime<Utc>,
}

impl BookingRecord {
    fn to_domain(self) -> CoreResult<Booking> {
        let status = BookingStatus::parse(&self.status)
            .ok_or_else(|| CoreError::Storage(format!("unknown booking status '{}'", self.status)))?;
        Ok(Booking {
            id: self.id,
            slot_id: self.slot_id,
            student_id: self.student_id,
            tutor_id: self.tutor_id,
            subject: self.subject,
            notes: self.notes,
            status,
            cancellation_reason: self.cancellation_reason,
            rating: self.rating,
            review: self.review,
            reminder_sent: self.reminder_sent,
            created_at: self.created_at,
        })
    }
}

const SLOT_COLUMNS: &str =
    "id, tutor_id, start_time, end_time, duration_minutes, is_booked, recurrence, recurrence_end";

/// The fat join handing the notifier a fully populated booking: booking,
/// slot, and both parties' contact details in one row.
const DETAILS_QUERY: &str = "\
    SELECT b.id, b.slot_id, b.student_id, b.tutor_id, b.subject, b.notes, b.status, \
           b.cancellation_reason, b.rating, b.review, b.reminder_sent, b.created_at, \
           s.start_time, s.end_time, s.duration_minutes, s.is_booked, s.recurrence, \
           s.recurrence_end, \
           st.first_name AS student_first_name, st.last_name AS student_last_name, \
           st.email AS student_email, \
           tu.first_name AS tutor_first_name, tu.last_name AS tutor_last_name, \
           tu.email AS tutor_email \
    FROM bookings b \
    JOIN slots s ON s.id = b.slot_id \
    JOIN users st ON st.id = b.student_id \
    JOIN tutors t ON t.id = b.tutor_id \
    JOIN users tu ON tu.id = t.user_id";

fn details_from_row(row: &SqliteRow) -> CoreResult<BookingDetails> {
    let status_raw: String = row.try_get("status").map_err(storage)?;
    let status = BookingStatus::parse(&status_raw)
        .ok_or_else(|| CoreError::Storage(format!("unknown booking status '{status_raw}'")))?;
    let recurrence_raw: String = row.try_get("recurrence").map_err(storage)?;
    let recurrence = Recurrence::parse(&recurrence_raw)
        .ok_or_else(|| CoreError::Storage(format!("unknown recurrence '{recurrence_raw}'")))?;

    let booking = Booking {
        id: row.try_get("id").map_err(storage)?,
        slot_id: row.try_get("slot_id").map_err(storage)?,
        student_id: row.try_get("student_id").map_err(storage)?,
        tutor_id: row.try_get("tutor_id").map_err(storage)?,
        subject: row.try_get("subject").map_err(storage)?,
        notes: row.try_get("notes").map_err(storage)?,
        status,
        cancellation_reason: row.try_get("cancellation_reason").map_err(storage)?,
        rating: row.try_get("rating").map_err(storage)?,
        review: row.try_get("review").map_err(storage)?,
        reminder_sent: row.try_get("reminder_sent").map_err(storage)?,
        created_at: row.try_get("created_at").map_err(storage)?,
    };
    let slot = Slot {
        id: booking.slot_id,
        tutor_id: booking.tutor_id,
        start_time: row.try_get("start_time").map_err(storage)?,
        end_time: row.try_get("end_time").map_err(storage)?,
        duration_minutes: row.try_get("duration_minutes").map_err(storage)?,
        is_booked: row.try_get("is_booked").map_err(storage)?,
        recurrence,
        recurrence_end: row.try_get("recurrence_end").map_err(storage)?,
    };
    let student = ContactInfo {
        name: format!(
            "{} {}",
            row.try_get::<String, _>("student_first_name").map_err(storage)?,
            row.try_get::<String, _>("student_last_name").map_err(storage)?
        ),
        email: row.try_get("student_email").map_err(storage)?,
    };
    let tutor = ContactInfo {
        name: format!(
            "{} {}",
            row.try_get::<String, _>("tutor_first_name").map_err(storage)?,
            row.try_get::<String, _>("tutor_last_name").map_err(storage)?
        ),
        email: row.try_get("tutor_email").map_err(storage)?,
    };

    Ok(BookingDetails {
        booking,
        slot,
        student,
        tutor,
    })
}

//=========================================================================================
// Internal Helpers
//=========================================================================================

impl SqliteStore {
    /// True if any slot of `tutor_id` overlaps `[start, end)` under
    /// half-open semantics. Runs against the pool, outside any transaction;
    /// batch creation keeps it consistent by inserting each occurrence
    /// before checking the next.
    async fn overlap_exists(
        &self,
        tutor_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> CoreResult<bool> {
        let row = sqlx::query(
            "SELECT 1 FROM slots WHERE tutor_id = ? AND start_time < ? AND end_time > ? LIMIT 1",
        )
        .bind(tutor_id)
        .bind(end)
        .bind(start)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;
        Ok(row.is_some())
    }

    async fn insert_slot(
        &self,
        tutor_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        duration_minutes: i64,
        recurrence: Recurrence,
        recurrence_end: Option<DateTime<Utc>>,
    ) -> CoreResult<Slot> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO slots (id, tutor_id, start_time, end_time, duration_minutes, \
             is_booked, recurrence, recurrence_end) VALUES (?, ?, ?, ?, ?, 0, ?, ?)",
        )
        .bind(id)
        .bind(tutor_id)
        .bind(start)
        .bind(end)
        .bind(duration_minutes)
        .bind(recurrence.as_str())
        .bind(recurrence_end)
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        Ok(Slot {
            id,
            tutor_id,
            start_time: start,
            end_time: end,
            duration_minutes,
            is_booked: false,
            recurrence,
            recurrence_end,
        })
    }

    /// Loads a slot together with the user id of the tutor who owns it, for
    /// the ownership checks on update and delete.
    async fn slot_with_owner(&self, slot_id: Uuid) -> CoreResult<(Slot, Uuid)> {
        let row = sqlx::query(
            "SELECT s.id, s.tutor_id, s.start_time, s.end_time, s.duration_minutes, \
             s.is_booked, s.recurrence, s.recurrence_end, t.user_id AS owner_id \
             FROM slots s JOIN tutors t ON t.id = s.tutor_id WHERE s.id = ?",
        )
        .bind(slot_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?
        .ok_or_else(|| CoreError::NotFound("slot".to_string()))?;

        let owner_id: Uuid = row.try_get("owner_id").map_err(storage)?;
        let recurrence_raw: String = row.try_get("recurrence").map_err(storage)?;
        let recurrence = Recurrence::parse(&recurrence_raw)
            .ok_or_else(|| CoreError::Storage(format!("unknown recurrence '{recurrence_raw}'")))?;
        let slot = Slot {
            id: row.try_get("id").map_err(storage)?,
            tutor_id: row.try_get("tutor_id").map_err(storage)?,
            start_time: row.try_get("start_time").map_err(storage)?,
            end_time: row.try_get("end_time").map_err(storage)?,
            duration_minutes: row.try_get("duration_minutes").map_err(storage)?,
            is_booked: row.try_get("is_booked").map_err(storage)?,
            recurrence,
            recurrence_end: row.try_get("recurrence_end").map_err(storage)?,
        };
        Ok((slot, owner_id))
    }

    /// Loads a booking together with the owning tutor's user id, inside the
    /// given transaction.
    async fn booking_with_owner(
        conn: &mut SqliteConnection,
        booking_id: Uuid,
    ) -> CoreResult<(Booking, Uuid)> {
        let row = sqlx::query(
            "SELECT b.id, b.slot_id, b.student_id, b.tutor_id, b.subject, b.notes, b.status, \
             b.cancellation_reason, b.rating, b.review, b.reminder_sent, b.created_at, \
             t.user_id AS owner_id \
             FROM bookings b JOIN tutors t ON t.id = b.tutor_id WHERE b.id = ?",
        )
        .bind(booking_id)
        .fetch_optional(conn)
        .await
        .map_err(storage)?
        .ok_or_else(|| CoreError::NotFound("booking".to_string()))?;

        let owner_id: Uuid = row.try_get("owner_id").map_err(storage)?;
        let status_raw: String = row.try_get("status").map_err(storage)?;
        let status = BookingStatus::parse(&status_raw)
            .ok_or_else(|| CoreError::Storage(format!("unknown booking status '{status_raw}'")))?;
        let booking = Booking {
            id: row.try_get("id").map_err(storage)?,
            slot_id: row.try_get("slot_id").map_err(storage)?,
            student_id: row.try_get("student_id").map_err(storage)?,
            tutor_id: row.try_get("tutor_id").map_err(storage)?,
            subject: row.try_get("subject").map_err(storage)?,
            notes: row.try_get("notes").map_err(storage)?,
            status,
            cancellation_reason: row.try_get("cancellation_reason").map_err(storage)?,
            rating: row.try_get("rating").map_err(storage)?,
            review: row.try_get("review").map_err(storage)?,
            reminder_sent: row.try_get("reminder_sent").map_err(storage)?,
            created_at: row.try_get("created_at").map_err(storage)?,
        };
        Ok((booking, owner_id))
    }

    async fn booking_details(
        conn: &mut SqliteConnection,
        booking_id: Uuid,
    ) -> CoreResult<BookingDetails> {
        let row = sqlx::query(&format!("{DETAILS_QUERY} WHERE b.id = ?"))
            .bind(booking_id)
            .fetch_optional(conn)
            .await
            .map_err(storage)?
            .ok_or_else(|| CoreError::NotFound("booking".to_string()))?;
        details_from_row(&row)
    }

    async fn subjects_for_tutor(&self, tutor_id: Uuid) -> CoreResult<Vec<String>> {
        let rows = sqlx::query(
            "SELECT subject FROM tutor_subjects WHERE tutor_id = ? ORDER BY position ASC",
        )
        .bind(tutor_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        rows.iter()
            .map(|r| r.try_get::<String, _>("subject").map_err(storage))
            .collect()
    }

    fn tutor_from_row(row: &SqliteRow, subjects: Vec<String>) -> CoreResult<Tutor> {
        Ok(Tutor {
            id: row.try_get("id").map_err(storage)?,
            user_id: row.try_get("user_id").map_err(storage)?,
            bio: row.try_get("bio").map_err(storage)?,
            subjects,
            hourly_rate: row.try_get("hourly_rate").map_err(storage)?,
            rating: row.try_get("rating").map_err(storage)?,
            total_reviews: row.try_get("total_reviews").map_err(storage)?,
            is_active: row.try_get("is_active").map_err(storage)?,
        })
    }
}

//=========================================================================================
// `MarketplaceStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl MarketplaceStore for SqliteStore {
    // --- User Management ---

    async fn create_user(
        &self,
        email: &str,
        hashed_password: &str,
        first_name: &str,
        last_name: &str,
        role: UserRole,
    ) -> CoreResult<User> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO users (id, email, hashed_password, first_name, last_name, role, \
             created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(email)
        .bind(hashed_password)
        .bind(first_name)
        .bind(last_name)
        .bind(role.as_str())
        .bind(self.clock.now())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                CoreError::EmailTaken
            } else {
                storage(e)
            }
        })?;

        Ok(User {
            id,
            email: email.to_string(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            role,
        })
    }

    async fn get_user(&self, user_id: Uuid) -> CoreResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT id, email, first_name, last_name, role FROM users WHERE id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?
        .ok_or_else(|| CoreError::NotFound("user".to_string()))?;
        record.to_domain()
    }

    async fn get_user_by_email(&self, email: &str) -> CoreResult<UserCredentials> {
        let row = sqlx::query(
            "SELECT id, email, hashed_password, role FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?
        .ok_or_else(|| CoreError::NotFound("user".to_string()))?;

        let role_raw: String = row.try_get("role").map_err(storage)?;
        let role = UserRole::parse(&role_raw)
            .ok_or_else(|| CoreError::Storage(format!("unknown user role '{role_raw}'")))?;
        Ok(UserCredentials {
            user_id: row.try_get("id").map_err(storage)?,
            email: row.try_get("email").map_err(storage)?,
            hashed_password: row.try_get("hashed_password").map_err(storage)?,
            role,
        })
    }

    // --- Auth Sessions ---

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> CoreResult<AuthSession> {
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES (?, ?, ?)")
            .bind(session_id)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(AuthSession {
            id: session_id.to_string(),
            user_id,
            expires_at,
        })
    }

    async fn validate_auth_session(&self, session_id: &str) -> CoreResult<Uuid> {
        let row = sqlx::query("SELECT user_id, expires_at FROM auth_sessions WHERE id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?
            .ok_or(CoreError::Unauthorized)?;

        let expires_at: DateTime<Utc> = row.try_get("expires_at").map_err(storage)?;
        if expires_at < self.clock.now() {
            return Err(CoreError::Unauthorized);
        }
        row.try_get("user_id").map_err(storage)
    }

    async fn delete_auth_session(&self, session_id: &str) -> CoreResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(())
    }

    // --- Tutor Profiles ---

    async fn create_tutor_profile(
        &self,
        user_id: Uuid,
        profile: NewTutorProfile,
    ) -> CoreResult<Tutor> {
        let id = Uuid::new_v4();
        let mut tx = self.pool.begin().await.map_err(storage)?;

        sqlx::query(
            "INSERT INTO tutors (id, user_id, bio, hourly_rate, rating, total_reviews, \
             is_active) VALUES (?, ?, ?, ?, 0, 0, 1)",
        )
        .bind(id)
        .bind(user_id)
        .bind(&profile.bio)
        .bind(profile.hourly_rate)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                CoreError::ProfileExists
            } else {
                storage(e)
            }
        })?;

        for (position, subject) in profile.subjects.iter().enumerate() {
            sqlx::query(
                "INSERT INTO tutor_subjects (tutor_id, subject, position) VALUES (?, ?, ?)",
            )
            .bind(id)
            .bind(subject)
            .bind(position as i64)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        }

        tx.commit().await.map_err(storage)?;

        Ok(Tutor {
            id,
            user_id,
            bio: profile.bio,
            subjects: profile.subjects,
            hourly_rate: profile.hourly_rate,
            rating: 0.0,
            total_reviews: 0,
            is_active: true,
        })
    }

    async fn get_tutor(&self, tutor_id: Uuid) -> CoreResult<Tutor> {
        let row = sqlx::query(
            "SELECT id, user_id, bio, hourly_rate, rating, total_reviews, is_active \
             FROM tutors WHERE id = ?",
        )
        .bind(tutor_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?
        .ok_or_else(|| CoreError::NotFound("tutor".to_string()))?;

        let subjects = self.subjects_for_tutor(tutor_id).await?;
        Self::tutor_from_row(&row, subjects)
    }

    async fn get_tutor_by_user(&self, user_id: Uuid) -> CoreResult<Tutor> {
        let row = sqlx::query(
            "SELECT id, user_id, bio, hourly_rate, rating, total_reviews, is_active \
             FROM tutors WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?
        .ok_or_else(|| CoreError::NotFound("tutor profile".to_string()))?;

        let tutor_id: Uuid = row.try_get("id").map_err(storage)?;
        let subjects = self.subjects_for_tutor(tutor_id).await?;
        Self::tutor_from_row(&row, subjects)
    }

    async fn list_active_tutors(&self, filter: TutorFilter) -> CoreResult<Vec<Tutor>> {
        let mut sql = String::from(
            "SELECT id, user_id, bio, hourly_rate, rating, total_reviews, is_active \
             FROM tutors WHERE is_active = 1",
        );
        if filter.subject.is_some() {
            // LIKE is case-insensitive for ASCII in SQLite.
            sql.push_str(
                " AND EXISTS (SELECT 1 FROM tutor_subjects ts \
                 WHERE ts.tutor_id = tutors.id AND ts.subject LIKE ?)",
            );
        }
        if filter.max_hourly_rate.is_some() {
            sql.push_str(" AND hourly_rate <= ?");
        }
        sql.push_str(" ORDER BY rating DESC");

        let mut query = sqlx::query(&sql);
        if let Some(subject) = &filter.subject {
            query = query.bind(format!("%{subject}%"));
        }
        if let Some(max_rate) = filter.max_hourly_rate {
            query = query.bind(max_rate);
        }

        let rows = query.fetch_all(&self.pool).await.map_err(storage)?;

        let mut tutors = Vec::with_capacity(rows.len());
        for row in &rows {
            let tutor_id: Uuid = row.try_get("id").map_err(storage)?;
            let subjects = self.subjects_for_tutor(tutor_id).await?;
            tutors.push(Self::tutor_from_row(row, subjects)?);
        }
        Ok(tutors)
    }

    // --- Slot Store ---

    async fn create_slot(
        &self,
        tutor_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        duration_minutes: Option<i64>,
    ) -> CoreResult<Slot> {
        if start >= end {
            return Err(CoreError::InvalidRange);
        }
        if start < self.clock.now() {
            return Err(CoreError::PastSlot);
        }
        if self.overlap_exists(tutor_id, start, end).await? {
            return Err(CoreError::OverlapConflict);
        }

        let duration = duration_minutes.unwrap_or_else(|| (end - start).num_minutes());
        self.insert_slot(tutor_id, start, end, duration, Recurrence::None, None)
            .await
    }

    async fn create_recurring_slots(
        &self,
        tutor_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        pattern: Recurrence,
        recurrence_end: Option<DateTime<Utc>>,
        max_count: u32,
    ) -> CoreResult<RecurrenceOutcome> {
        if start >= end {
            return Err(CoreError::InvalidRange);
        }
        if start < self.clock.now() {
            return Err(CoreError::PastSlot);
        }

        let horizon = recurrence_end
            .unwrap_or(start + chrono::Duration::days(schedule::DEFAULT_HORIZON_DAYS));
        let duration = (end - start).num_minutes();
        let mut outcome = RecurrenceOutcome {
            created: 0,
            skipped: 0,
        };

        // Each occurrence is checked against everything committed so far,
        // including earlier occurrences of this same batch, and skipped on
        // conflict. The batch itself never fails part-way.
        for (occ_start, occ_end) in
            schedule::expand_recurrence(start, end, pattern, Some(horizon), max_count)
        {
            if self.overlap_exists(tutor_id, occ_start, occ_end).await? {
                outcome.skipped += 1;
                continue;
            }
            self.insert_slot(tutor_id, occ_start, occ_end, duration, pattern, Some(horizon))
                .await?;
            outcome.created += 1;
        }

        Ok(outcome)
    }

    async fn update_slot(
        &self,
        slot_id: Uuid,
        requester_id: Uuid,
        changes: SlotChanges,
    ) -> CoreResult<Slot> {
        let (slot, owner_id) = self.slot_with_owner(slot_id).await?;
        if owner_id != requester_id {
            return Err(CoreError::Forbidden);
        }

        let start = changes.start_time.unwrap_or(slot.start_time);
        let end = changes.end_time.unwrap_or(slot.end_time);
        // Range is re-validated on time changes; overlap against other slots
        // is not re-checked here, matching create-time-only enforcement.
        if start >= end {
            return Err(CoreError::InvalidRange);
        }
        let duration = changes.duration_minutes.unwrap_or(slot.duration_minutes);

        // The lock check rides on the write: a booking landing between the
        // read above and this statement leaves zero rows to update.
        let updated = sqlx::query(
            "UPDATE slots SET start_time = ?, end_time = ?, duration_minutes = ? \
             WHERE id = ? AND is_booked = 0",
        )
        .bind(start)
        .bind(end)
        .bind(duration)
        .bind(slot_id)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        if updated.rows_affected() == 0 {
            return Err(CoreError::SlotLocked);
        }

        Ok(Slot {
            start_time: start,
            end_time: end,
            duration_minutes: duration,
            ..slot
        })
    }

    async fn delete_slot(&self, slot_id: Uuid, requester_id: Uuid) -> CoreResult<()> {
        let (_slot, owner_id) = self.slot_with_owner(slot_id).await?;
        if owner_id != requester_id {
            return Err(CoreError::Forbidden);
        }

        // Guarded like the update: a slot booked since the read stays put.
        let deleted = sqlx::query("DELETE FROM slots WHERE id = ? AND is_booked = 0")
            .bind(slot_id)
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        if deleted.rows_affected() == 0 {
            return Err(CoreError::SlotLocked);
        }
        Ok(())
    }

    async fn query_slots(&self, filter: SlotFilter) -> CoreResult<Vec<Slot>> {
        let mut sql = format!("SELECT {SLOT_COLUMNS} FROM slots WHERE 1 = 1");
        if filter.tutor_id.is_some() {
            sql.push_str(" AND tutor_id = ?");
        }
        if filter.from.is_some() {
            sql.push_str(" AND start_time >= ?");
        }
        if filter.to.is_some() {
            sql.push_str(" AND start_time <= ?");
        }
        if filter.available_only {
            sql.push_str(" AND is_booked = 0 AND start_time >= ?");
        }
        sql.push_str(" ORDER BY start_time ASC");

        let mut query = sqlx::query_as::<_, SlotRecord>(&sql);
        if let Some(tutor_id) = filter.tutor_id {
            query = query.bind(tutor_id);
        }
        if let Some(from) = filter.from {
            query = query.bind(from);
        }
        if let Some(to) = filter.to {
            query = query.bind(to);
        }
        if filter.available_only {
            query = query.bind(self.clock.now());
        }

        let records = query.fetch_all(&self.pool).await.map_err(storage)?;
        records.into_iter().map(SlotRecord::to_domain).collect()
    }

    async fn list_slots_for_tutor(&self, tutor_id: Uuid) -> CoreResult<Vec<Slot>> {
        let records = sqlx::query_as::<_, SlotRecord>(&format!(
            "SELECT {SLOT_COLUMNS} FROM slots WHERE tutor_id = ? ORDER BY start_time ASC"
        ))
        .bind(tutor_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        records.into_iter().map(SlotRecord::to_domain).collect()
    }

    // --- Booking Transaction Engine ---

    async fn create_booking(
        &self,
        student_id: Uuid,
        slot_id: Uuid,
        subject: &str,
        notes: Option<&str>,
    ) -> CoreResult<BookingDetails> {
        let mut tx = self.pool.begin().await.map_err(storage)?;

        // The guarded flip is deliberately the first statement of the
        // transaction: it takes the write lock before any read, so a
        // concurrent booking for the same slot queues on the busy timeout
        // instead of failing a lock upgrade, and then observes the flipped
        // row as zero rows affected.
        let flipped = sqlx::query("UPDATE slots SET is_booked = 1 WHERE id = ? AND is_booked = 0")
            .bind(slot_id)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        if flipped.rows_affected() == 0 {
            let exists = sqlx::query("SELECT 1 FROM slots WHERE id = ?")
                .bind(slot_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(storage)?;
            return Err(match exists {
                Some(_) => CoreError::SlotAlreadyBooked,
                None => CoreError::NotFound("slot".to_string()),
            });
        }

        // The flip touched exactly the row we are about to read.
        let slot = sqlx::query_as::<_, SlotRecord>(&format!(
            "SELECT {SLOT_COLUMNS} FROM slots WHERE id = ?"
        ))
        .bind(slot_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(storage)?
        .to_domain()?;

        if slot.start_time < self.clock.now() {
            // Rolling back releases the flip.
            return Err(CoreError::PastSlot);
        }

        let booking_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO bookings (id, slot_id, student_id, tutor_id, subject, notes, status, \
             reminder_sent, created_at) VALUES (?, ?, ?, ?, ?, ?, 'CONFIRMED', 0, ?)",
        )
        .bind(booking_id)
        .bind(slot_id)
        .bind(student_id)
        .bind(slot.tutor_id)
        .bind(subject)
        .bind(notes)
        .bind(self.clock.now())
        .execute(&mut *tx)
        .await
        .map_err(storage)?;

        let details = Self::booking_details(&mut tx, booking_id).await?;
        tx.commit().await.map_err(storage)?;
        Ok(details)
    }

    async fn cancel_booking(
        &self,
        requester_id: Uuid,
        booking_id: Uuid,
        reason: Option<&str>,
    ) -> CoreResult<BookingDetails> {
        let mut tx = self.pool.begin().await.map_err(storage)?;

        let (booking, owner_id) = Self::booking_with_owner(&mut tx, booking_id).await?;
        if booking.student_id != requester_id && owner_id != requester_id {
            return Err(CoreError::Forbidden);
        }
        match booking.status {
            BookingStatus::Cancelled => return Err(CoreError::AlreadyCancelled),
            BookingStatus::Completed => return Err(CoreError::AlreadyCompleted),
            BookingStatus::Pending | BookingStatus::Confirmed => {}
        }

        sqlx::query(
            "UPDATE bookings SET status = 'CANCELLED', cancellation_reason = ? WHERE id = ?",
        )
        .bind(reason)
        .bind(booking_id)
        .execute(&mut *tx)
        .await
        .map_err(storage)?;

        // Free the slot for rebooking in the same transaction.
        sqlx::query("UPDATE slots SET is_booked = 0 WHERE id = ?")
            .bind(booking.slot_id)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;

        let details = Self::booking_details(&mut tx, booking_id).await?;
        tx.commit().await.map_err(storage)?;
        Ok(details)
    }

    async fn complete_booking(
        &self,
        requester_id: Uuid,
        booking_id: Uuid,
    ) -> CoreResult<Booking> {
        let mut tx = self.pool.begin().await.map_err(storage)?;

        let (booking, owner_id) = Self::booking_with_owner(&mut tx, booking_id).await?;
        if owner_id != requester_id {
            return Err(CoreError::Forbidden);
        }
        match booking.status {
            BookingStatus::Cancelled => return Err(CoreError::AlreadyCancelled),
            BookingStatus::Completed => return Err(CoreError::AlreadyCompleted),
            BookingStatus::Pending => return Err(CoreError::NotConfirmed),
            BookingStatus::Confirmed => {}
        }

        sqlx::query("UPDATE bookings SET status = 'COMPLETED' WHERE id = ?")
            .bind(booking_id)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        tx.commit().await.map_err(storage)?;

        Ok(Booking {
            status: BookingStatus::Completed,
            ..booking
        })
    }

    async fn rate_booking(
        &self,
        student_id: Uuid,
        booking_id: Uuid,
        rating_value: i64,
        review: Option<&str>,
    ) -> CoreResult<Booking> {
        // Validation fails fast, before any read or write.
        if !(1..=5).contains(&rating_value) {
            return Err(CoreError::InvalidRating);
        }

        let mut tx = self.pool.begin().await.map_err(storage)?;

        let (booking, _owner_id) = Self::booking_with_owner(&mut tx, booking_id).await?;
        if booking.student_id != student_id {
            return Err(CoreError::Forbidden);
        }
        if booking.status != BookingStatus::Completed {
            return Err(CoreError::NotCompleted);
        }
        if booking.rating.is_some() {
            return Err(CoreError::AlreadyRated);
        }

        sqlx::query("UPDATE bookings SET rating = ?, review = ? WHERE id = ?")
            .bind(rating_value)
            .bind(review)
            .bind(booking_id)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;

        // Full recompute from every rated booking of this tutor, including
        // the one just written.
        let rows = sqlx::query(
            "SELECT rating FROM bookings WHERE tutor_id = ? AND rating IS NOT NULL",
        )
        .bind(booking.tutor_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(storage)?;
        let ratings: Vec<i64> = rows
            .iter()
            .map(|r| r.try_get::<i64, _>("rating").map_err(storage))
            .collect::<CoreResult<_>>()?;
        let (mean, count) = rating::recompute(&ratings);

        sqlx::query("UPDATE tutors SET rating = ?, total_reviews = ? WHERE id = ?")
            .bind(mean)
            .bind(count)
            .bind(booking.tutor_id)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;

        tx.commit().await.map_err(storage)?;

        Ok(Booking {
            rating: Some(rating_value),
            review: review.map(str::to_string),
            ..booking
        })
    }

    async fn list_bookings_for_user(&self, user_id: Uuid) -> CoreResult<Vec<Booking>> {
        let records = sqlx::query_as::<_, BookingRecord>(
            "SELECT b.id, b.slot_id, b.student_id, b.tutor_id, b.subject, b.notes, b.status, \
             b.cancellation_reason, b.rating, b.review, b.reminder_sent, b.created_at \
             FROM bookings b \
             LEFT JOIN tutors t ON t.id = b.tutor_id \
             WHERE b.student_id = ?1 OR t.user_id = ?1 \
             ORDER BY b.created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        records.into_iter().map(BookingRecord::to_domain).collect()
    }

    // --- Reminder Bookkeeping ---

    async fn due_reminders(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> CoreResult<Vec<BookingDetails>> {
        let rows = sqlx::query(&format!(
            "{DETAILS_QUERY} \
             WHERE b.status = 'CONFIRMED' AND b.reminder_sent = 0 \
             AND s.start_time >= ? AND s.start_time <= ? \
             ORDER BY s.start_time ASC"
        ))
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        rows.iter().map(details_from_row).collect()
    }

    async fn mark_reminder_sent(&self, booking_id: Uuid) -> CoreResult<()> {
        sqlx::query("UPDATE bookings SET reminder_sent = 1 WHERE id = ?")
            .bind(booking_id)
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(())
    }
}
