//! Shared fixtures for the integration tests: an in-memory store, a manual
//! clock, and notifier doubles.
//!
//! Each integration binary uses a different subset of these.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use uuid::Uuid;

use api_lib::adapters::store::SqliteStore;
use tutorbook_core::domain::{BookingDetails, Tutor, User, UserRole};
use tutorbook_core::ports::{Clock, CoreError, CoreResult, MarketplaceStore, NewTutorProfile, Notifier};

/// A clock the tests move by hand.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn at(now: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(now),
        })
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// A Monday morning well in the future of nothing in particular; slots are
/// placed relative to this.
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

/// A store over a fresh in-memory database. A single connection keeps every
/// test deterministic: concurrent transactions serialize on it.
pub async fn test_store(clock: Arc<ManualClock>) -> SqliteStore {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory database");
    let store = SqliteStore::new(pool, clock);
    store.run_migrations().await.expect("migrations");
    store
}

/// A store over a throwaway database file with a pool sized like the
/// production binary's. A single shared connection would serialize every
/// transaction and hide lock contention, which is exactly what the tests
/// using this fixture are after.
pub async fn file_store(clock: Arc<ManualClock>) -> (SqliteStore, PathBuf) {
    let path = std::env::temp_dir().join(format!("tutorbook-test-{}.db", Uuid::new_v4()));
    let options = SqliteConnectOptions::new()
        .filename(&path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .expect("file-backed database");
    let store = SqliteStore::new(pool, clock);
    store.run_migrations().await.expect("migrations");
    (store, path)
}

/// Best-effort cleanup of a [`file_store`] database and its journal files.
pub fn remove_database_files(path: &Path) {
    for suffix in ["", "-wal", "-shm"] {
        let mut file = path.as_os_str().to_owned();
        file.push(suffix);
        let _ = std::fs::remove_file(PathBuf::from(file));
    }
}

pub async fn signup_student(store: &SqliteStore, email: &str) -> User {
    store
        .create_user(email, "argon2-hash", "Sam", "Student", UserRole::Student)
        .await
        .expect("student account")
}

pub async fn signup_tutor(store: &SqliteStore, email: &str) -> (User, Tutor) {
    let user = store
        .create_user(email, "argon2-hash", "Tess", "Tutor", UserRole::Tutor)
        .await
        .expect("tutor account");
    let tutor = store
        .create_tutor_profile(
            user.id,
            NewTutorProfile {
                bio: "Calculus and statistics".to_string(),
                subjects: vec!["Mathematics".to_string(), "Statistics".to_string()],
                hourly_rate: 50.0,
            },
        )
        .await
        .expect("tutor profile");
    (user, tutor)
}

/// Records every notification it is asked to deliver.
#[derive(Default)]
pub struct RecordingNotifier {
    pub confirmed: Mutex<Vec<Uuid>>,
    pub cancelled: Mutex<Vec<Uuid>>,
    pub reminded: Mutex<Vec<Uuid>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn booking_confirmed(&self, details: &BookingDetails) -> CoreResult<()> {
        self.confirmed.lock().unwrap().push(details.booking.id);
        Ok(())
    }

    async fn booking_cancelled(&self, details: &BookingDetails) -> CoreResult<()> {
        self.cancelled.lock().unwrap().push(details.booking.id);
        Ok(())
    }

    async fn session_reminder(&self, details: &BookingDetails) -> CoreResult<()> {
        self.reminded.lock().unwrap().push(details.booking.id);
        Ok(())
    }
}

/// Fails reminder delivery for one specific booking, succeeds otherwise.
pub struct FlakyNotifier {
    pub fail_for: Uuid,
    pub reminded: Mutex<Vec<Uuid>>,
}

#[async_trait]
impl Notifier for FlakyNotifier {
    async fn booking_confirmed(&self, _details: &BookingDetails) -> CoreResult<()> {
        Ok(())
    }

    async fn booking_cancelled(&self, _details: &BookingDetails) -> CoreResult<()> {
        Ok(())
    }

    async fn session_reminder(&self, details: &BookingDetails) -> CoreResult<()> {
        if details.booking.id == self.fail_for {
            return Err(CoreError::Storage("smtp refused the message".to_string()));
        }
        self.reminded.lock().unwrap().push(details.booking.id);
        Ok(())
    }
}
