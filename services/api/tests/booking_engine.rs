//! Integration tests for the booking transaction engine: the atomic flip,
//! the double-booking race, cancellation and rebooking, completion
//! permissions, and the rating aggregate.

mod common;

use std::sync::Arc;

use chrono::Duration;
use tutorbook_core::domain::BookingStatus;
use tutorbook_core::ports::{CoreError, MarketplaceStore};
use uuid::Uuid;

use common::{
    base_time, file_store, remove_database_files, signup_student, signup_tutor, test_store,
    ManualClock,
};

async fn seed_slot(
    store: &(impl MarketplaceStore + ?Sized),
    tutor_id: Uuid,
    offset_hours: i64,
) -> tutorbook_core::domain::Slot {
    let start = base_time() + Duration::hours(offset_hours);
    store
        .create_slot(tutor_id, start, start + Duration::hours(1), None)
        .await
        .expect("seed slot")
}

#[tokio::test]
async fn booking_flips_slot_and_is_confirmed() {
    let clock = ManualClock::at(base_time());
    let store = test_store(clock.clone()).await;
    let (_, tutor) = signup_tutor(&store, "tutor@example.com").await;
    let student = signup_student(&store, "student@example.com").await;
    let slot = seed_slot(&store, tutor.id, 1).await;

    let details = store
        .create_booking(student.id, slot.id, "Algebra", Some("chapter 3"))
        .await
        .unwrap();
    assert_eq!(details.booking.status, BookingStatus::Confirmed);
    assert_eq!(details.booking.slot_id, slot.id);
    assert!(details.slot.is_booked);
    assert_eq!(details.student.email, "student@example.com");
    assert_eq!(details.tutor.email, "tutor@example.com");

    let err = store
        .create_booking(student.id, slot.id, "Algebra", None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::SlotAlreadyBooked));
}

#[tokio::test]
async fn booking_a_started_slot_is_rejected() {
    let clock = ManualClock::at(base_time());
    let store = test_store(clock.clone()).await;
    let (_, tutor) = signup_tutor(&store, "tutor@example.com").await;
    let student = signup_student(&store, "student@example.com").await;
    let slot = seed_slot(&store, tutor.id, 1).await;

    clock.advance(Duration::hours(2));
    let err = store
        .create_booking(student.id, slot.id, "Algebra", None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::PastSlot));
}

#[tokio::test]
async fn concurrent_bookings_admit_exactly_one() {
    let clock = ManualClock::at(base_time());
    let store = Arc::new(test_store(clock.clone()).await);
    let (owner, tutor) = signup_tutor(store.as_ref(), "tutor@example.com").await;
    let alice = signup_student(store.as_ref(), "alice@example.com").await;
    let bob = signup_student(store.as_ref(), "bob@example.com").await;
    let slot = seed_slot(store.as_ref(), tutor.id, 1).await;

    let (a, b) = tokio::join!(
        store.create_booking(alice.id, slot.id, "Algebra", None),
        store.create_booking(bob.id, slot.id, "Algebra", None),
    );

    let winners = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(winners, 1, "exactly one booking must win the slot");
    for outcome in [a, b] {
        if let Err(err) = outcome {
            assert!(matches!(err, CoreError::SlotAlreadyBooked));
        }
    }

    let bookings = store.list_bookings_for_user(owner.id).await.unwrap();
    assert_eq!(bookings.len(), 1);
}

#[tokio::test]
async fn race_losers_on_a_shared_pool_see_the_slot_as_taken() {
    // Multiple pool connections mean the two transactions genuinely contend
    // for the write lock instead of serializing on one connection. The loser
    // must come out of that contention with the domain error, not a storage
    // failure.
    let clock = ManualClock::at(base_time());
    let (store, db_path) = file_store(clock.clone()).await;
    let store = Arc::new(store);
    let (_, tutor) = signup_tutor(store.as_ref(), "tutor@example.com").await;
    let alice = signup_student(store.as_ref(), "alice@example.com").await;
    let bob = signup_student(store.as_ref(), "bob@example.com").await;

    for round in 0..10i64 {
        let start = base_time() + Duration::hours(1 + round);
        let slot = store
            .create_slot(tutor.id, start, start + Duration::hours(1), None)
            .await
            .unwrap();

        let (a, b) = tokio::join!(
            store.create_booking(alice.id, slot.id, "Algebra", None),
            store.create_booking(bob.id, slot.id, "Algebra", None),
        );

        let winners = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(winners, 1, "round {round}: exactly one booking must win");
        for outcome in [a, b] {
            if let Err(err) = outcome {
                assert!(
                    matches!(err, CoreError::SlotAlreadyBooked),
                    "round {round}: loser saw {err}"
                );
            }
        }
    }

    drop(store);
    remove_database_files(&db_path);
}

#[tokio::test]
async fn cancellation_frees_the_slot_for_rebooking() {
    let clock = ManualClock::at(base_time());
    let store = test_store(clock.clone()).await;
    let (_, tutor) = signup_tutor(&store, "tutor@example.com").await;
    let alice = signup_student(&store, "alice@example.com").await;
    let bob = signup_student(&store, "bob@example.com").await;
    let slot = seed_slot(&store, tutor.id, 1).await;

    let details = store
        .create_booking(alice.id, slot.id, "Algebra", None)
        .await
        .unwrap();
    let cancelled = store
        .cancel_booking(alice.id, details.booking.id, Some("conflict came up"))
        .await
        .unwrap();
    assert_eq!(cancelled.booking.status, BookingStatus::Cancelled);
    assert!(!cancelled.slot.is_booked);

    let err = store
        .cancel_booking(alice.id, details.booking.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::AlreadyCancelled));

    // Bob can now take the freed slot.
    let rebooked = store
        .create_booking(bob.id, slot.id, "Geometry", None)
        .await
        .unwrap();
    assert_eq!(rebooked.booking.student_id, bob.id);
}

#[tokio::test]
async fn cancellation_is_limited_to_participants() {
    let clock = ManualClock::at(base_time());
    let store = test_store(clock.clone()).await;
    let (owner, tutor) = signup_tutor(&store, "tutor@example.com").await;
    let alice = signup_student(&store, "alice@example.com").await;
    let mallory = signup_student(&store, "mallory@example.com").await;
    let slot = seed_slot(&store, tutor.id, 1).await;

    let details = store
        .create_booking(alice.id, slot.id, "Algebra", None)
        .await
        .unwrap();

    let err = store
        .cancel_booking(mallory.id, details.booking.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Forbidden));

    // The owning tutor may cancel.
    let cancelled = store
        .cancel_booking(owner.id, details.booking.id, Some("tutor unavailable"))
        .await
        .unwrap();
    assert_eq!(cancelled.booking.status, BookingStatus::Cancelled);
}

#[tokio::test]
async fn completion_is_for_the_owning_tutor() {
    let clock = ManualClock::at(base_time());
    let store = test_store(clock.clone()).await;
    let (owner, tutor) = signup_tutor(&store, "tutor@example.com").await;
    let alice = signup_student(&store, "alice@example.com").await;
    let slot = seed_slot(&store, tutor.id, 1).await;

    let details = store
        .create_booking(alice.id, slot.id, "Algebra", None)
        .await
        .unwrap();

    let err = store
        .complete_booking(alice.id, details.booking.id)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Forbidden));

    let done = store
        .complete_booking(owner.id, details.booking.id)
        .await
        .unwrap();
    assert_eq!(done.status, BookingStatus::Completed);

    let err = store
        .complete_booking(owner.id, details.booking.id)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::AlreadyCompleted));

    let err = store
        .cancel_booking(alice.id, details.booking.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::AlreadyCompleted));
}

#[tokio::test]
async fn rating_requires_a_completed_booking() {
    let clock = ManualClock::at(base_time());
    let store = test_store(clock.clone()).await;
    let (owner, tutor) = signup_tutor(&store, "tutor@example.com").await;
    let alice = signup_student(&store, "alice@example.com").await;
    let slot = seed_slot(&store, tutor.id, 1).await;

    let details = store
        .create_booking(alice.id, slot.id, "Algebra", None)
        .await
        .unwrap();

    let err = store
        .rate_booking(alice.id, details.booking.id, 6, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidRating));
    let err = store
        .rate_booking(alice.id, details.booking.id, 0, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidRating));

    let err = store
        .rate_booking(alice.id, details.booking.id, 5, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotCompleted));

    store
        .complete_booking(owner.id, details.booking.id)
        .await
        .unwrap();

    // Only the booking's student may rate it.
    let err = store
        .rate_booking(owner.id, details.booking.id, 5, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Forbidden));

    let rated = store
        .rate_booking(alice.id, details.booking.id, 5, Some("great session"))
        .await
        .unwrap();
    assert_eq!(rated.rating, Some(5));

    let err = store
        .rate_booking(alice.id, details.booking.id, 4, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::AlreadyRated));
}

#[tokio::test]
async fn rating_aggregate_is_a_rounded_mean_over_all_reviews() {
    let clock = ManualClock::at(base_time());
    let store = test_store(clock.clone()).await;
    let (owner, tutor) = signup_tutor(&store, "tutor@example.com").await;
    let alice = signup_student(&store, "alice@example.com").await;

    for (offset, rating) in [(1, 5), (3, 4), (5, 5)] {
        let slot = seed_slot(&store, tutor.id, offset).await;
        let details = store
            .create_booking(alice.id, slot.id, "Algebra", None)
            .await
            .unwrap();
        store
            .complete_booking(owner.id, details.booking.id)
            .await
            .unwrap();
        store
            .rate_booking(alice.id, details.booking.id, rating, None)
            .await
            .unwrap();
    }

    let refreshed = store.get_tutor_by_user(owner.id).await.unwrap();
    assert_eq!(refreshed.rating, 4.67);
    assert_eq!(refreshed.total_reviews, 3);
}

#[tokio::test]
async fn booking_a_missing_slot_is_not_found() {
    let clock = ManualClock::at(base_time());
    let store = test_store(clock.clone()).await;
    let student = signup_student(&store, "student@example.com").await;

    let err = store
        .create_booking(student.id, Uuid::new_v4(), "Algebra", None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound(_)));
}
