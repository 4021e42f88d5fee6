//! Integration tests for tutor discovery: single-profile lookup and the
//! subject/rate filters on the active-tutor listing.

mod common;

use tutorbook_core::domain::{Tutor, UserRole};
use tutorbook_core::ports::{CoreError, MarketplaceStore, NewTutorProfile, TutorFilter};
use uuid::Uuid;

use common::{base_time, test_store, ManualClock};

async fn seed_tutor(
    store: &(impl MarketplaceStore + ?Sized),
    email: &str,
    subjects: &[&str],
    rate: f64,
) -> Tutor {
    let user = store
        .create_user(email, "argon2-hash", "Tess", "Tutor", UserRole::Tutor)
        .await
        .expect("tutor account");
    store
        .create_tutor_profile(
            user.id,
            NewTutorProfile {
                bio: "Ten years of teaching".to_string(),
                subjects: subjects.iter().map(|s| s.to_string()).collect(),
                hourly_rate: rate,
            },
        )
        .await
        .expect("tutor profile")
}

#[tokio::test]
async fn profile_lookup_returns_the_full_tutor() {
    let clock = ManualClock::at(base_time());
    let store = test_store(clock.clone()).await;
    let tutor = seed_tutor(&store, "math@example.com", &["Mathematics", "Statistics"], 50.0).await;

    let found = store.get_tutor(tutor.id).await.unwrap();
    assert_eq!(found.id, tutor.id);
    assert_eq!(found.hourly_rate, 50.0);
    assert_eq!(found.subjects, vec!["Mathematics", "Statistics"]);

    let err = store.get_tutor(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, CoreError::NotFound(_)));
}

#[tokio::test]
async fn listing_filters_by_subject_and_rate() {
    let clock = ManualClock::at(base_time());
    let store = test_store(clock.clone()).await;
    let math = seed_tutor(&store, "math@example.com", &["Mathematics", "Statistics"], 50.0).await;
    let chem = seed_tutor(&store, "chem@example.com", &["Chemistry"], 30.0).await;

    let all = store
        .list_active_tutors(TutorFilter::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    // Subject match is a case-insensitive substring against any subject.
    let stats = store
        .list_active_tutors(TutorFilter {
            subject: Some("stat".to_string()),
            ..TutorFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].id, math.id);

    let affordable = store
        .list_active_tutors(TutorFilter {
            max_hourly_rate: Some(40.0),
            ..TutorFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(affordable.len(), 1);
    assert_eq!(affordable[0].id, chem.id);

    // Both filters together can exclude everyone.
    let none = store
        .list_active_tutors(TutorFilter {
            subject: Some("chem".to_string()),
            max_hourly_rate: Some(25.0),
        })
        .await
        .unwrap();
    assert!(none.is_empty());
}
