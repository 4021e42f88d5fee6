//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification. Handlers are thin: they decode
//! the request, call the store port, map the core error taxonomy onto HTTP
//! statuses, and spawn post-commit notifications.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;
use utoipa::{IntoParams, OpenApi, ToSchema};
use uuid::Uuid;

use crate::error::core_error_response;
use crate::web::auth;
use crate::web::state::AppState;
use tutorbook_core::domain::{Booking, BookingDetails, Recurrence, Slot, Tutor};
use tutorbook_core::ports::{NewTutorProfile, Notifier, SlotChanges, SlotFilter, TutorFilter};
use tutorbook_core::schedule;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::signup_handler,
        auth::login_handler,
        auth::logout_handler,
        create_tutor_handler,
        list_tutors_handler,
        get_tutor_handler,
        create_slot_handler,
        query_slots_handler,
        my_slots_handler,
        update_slot_handler,
        delete_slot_handler,
        create_booking_handler,
        list_bookings_handler,
        cancel_booking_handler,
        complete_booking_handler,
        rate_booking_handler,
    ),
    components(schemas(
        auth::SignupRequest,
        auth::LoginRequest,
        auth::AuthResponse,
        CreateTutorRequest,
        TutorResponse,
        CreateSlotRequest,
        CreateSlotResponse,
        UpdateSlotRequest,
        SlotResponse,
        CreateBookingRequest,
        CancelBookingRequest,
        RateBookingRequest,
        BookingResponse,
    )),
    tags(
        (name = "TutorBook API", description = "Tutor availability, bookings and reminders.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct TutorResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub bio: String,
    pub subjects: Vec<String>,
    pub hourly_rate: f64,
    pub rating: f64,
    pub total_reviews: i64,
    pub is_active: bool,
}

impl From<Tutor> for TutorResponse {
    fn from(t: Tutor) -> Self {
        Self {
            id: t.id,
            user_id: t.user_id,
            bio: t.bio,
            subjects: t.subjects,
            hourly_rate: t.hourly_rate,
            rating: t.rating,
            total_reviews: t.total_reviews,
            is_active: t.is_active,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct SlotResponse {
    pub id: Uuid,
    pub tutor_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: i64,
    pub is_booked: bool,
    pub recurrence: String,
    pub recurrence_end: Option<DateTime<Utc>>,
}

impl From<Slot> for SlotResponse {
    fn from(s: Slot) -> Self {
        Self {
            id: s.id,
            tutor_id: s.tutor_id,
            start_time: s.start_time,
            end_time: s.end_time,
            duration_minutes: s.duration_minutes,
            is_booked: s.is_booked,
            recurrence: s.recurrence.as_str().to_string(),
            recurrence_end: s.recurrence_end,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct BookingResponse {
    pub id: Uuid,
    pub slot_id: Uuid,
    pub student_id: Uuid,
    pub tutor_id: Uuid,
    pub subject: String,
    pub notes: Option<String>,
    pub status: String,
    pub cancellation_reason: Option<String>,
    pub rating: Option<i64>,
    pub review: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Booking> for BookingResponse {
    fn from(b: Booking) -> Self {
        Self {
            id: b.id,
            slot_id: b.slot_id,
            student_id: b.student_id,
            tutor_id: b.tutor_id,
            subject: b.subject,
            notes: b.notes,
            status: b.status.as_str().to_string(),
            cancellation_reason: b.cancellation_reason,
            rating: b.rating,
            review: b.review,
            created_at: b.created_at,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct CreateTutorRequest {
    pub bio: String,
    pub subjects: Vec<String>,
    pub hourly_rate: f64,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateSlotRequest {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: Option<i64>,
    /// NONE (default), DAILY, WEEKLY or MONTHLY.
    pub recurrence: Option<String>,
    pub recurrence_end: Option<DateTime<Utc>>,
    pub max_count: Option<u32>,
}

/// A single created slot, or the counts of a recurring batch.
#[derive(Serialize, ToSchema)]
#[serde(untagged)]
pub enum CreateSlotResponse {
    Single { slot: SlotResponse },
    Batch { created: u32, skipped: u32 },
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateSlotRequest {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i64>,
}

#[derive(Deserialize, IntoParams)]
pub struct TutorQuery {
    /// Substring match against the tutor's subjects, case-insensitive.
    pub subject: Option<String>,
    /// Upper bound on the hourly rate.
    pub max_rate: Option<f64>,
}

#[derive(Deserialize, IntoParams)]
pub struct SlotQuery {
    pub tutor_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub available: Option<bool>,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateBookingRequest {
    pub slot_id: Uuid,
    pub subject: String,
    pub notes: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct CancelBookingRequest {
    pub reason: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct RateBookingRequest {
    pub rating: i64,
    pub review: Option<String>,
}

/// Fire-and-forget notification dispatch, after the transaction committed.
/// Delivery failure is logged and never surfaced to the caller or retried.
fn spawn_notification(
    notifier: Arc<dyn Notifier>,
    details: BookingDetails,
    cancelled: bool,
) {
    tokio::spawn(async move {
        let result = if cancelled {
            notifier.booking_cancelled(&details).await
        } else {
            notifier.booking_confirmed(&details).await
        };
        if let Err(e) = result {
            warn!(booking_id = %details.booking.id, "notification dispatch failed: {e}");
        }
    });
}

//=========================================================================================
// Tutor Handlers
//=========================================================================================

/// POST /tutors - Create the calling user's tutor profile.
#[utoipa::path(
    post,
    path = "/tutors",
    request_body = CreateTutorRequest,
    responses(
        (status = 201, description = "Tutor profile created", body = TutorResponse),
        (status = 401, description = "Not logged in"),
        (status = 409, description = "Profile already exists")
    )
)]
pub async fn create_tutor_handler(
    State(state): State<Arc<AppState>>,
    axum::Extension(user_id): axum::Extension<Uuid>,
    Json(req): Json<CreateTutorRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let tutor = state
        .store
        .create_tutor_profile(
            user_id,
            NewTutorProfile {
                bio: req.bio,
                subjects: req.subjects,
                hourly_rate: req.hourly_rate,
            },
        )
        .await
        .map_err(core_error_response)?;
    Ok((StatusCode::CREATED, Json(TutorResponse::from(tutor))))
}

/// GET /tutors - List active tutors, best rated first, with optional
/// subject and rate filters.
#[utoipa::path(
    get,
    path = "/tutors",
    params(TutorQuery),
    responses(
        (status = 200, description = "Matching active tutors", body = [TutorResponse])
    )
)]
pub async fn list_tutors_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TutorQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let tutors = state
        .store
        .list_active_tutors(TutorFilter {
            subject: query.subject,
            max_hourly_rate: query.max_rate,
        })
        .await
        .map_err(core_error_response)?;
    let body: Vec<TutorResponse> = tutors.into_iter().map(TutorResponse::from).collect();
    Ok(Json(body))
}

/// GET /tutors/{id} - A single tutor's public profile.
#[utoipa::path(
    get,
    path = "/tutors/{id}",
    responses(
        (status = 200, description = "Tutor profile", body = TutorResponse),
        (status = 404, description = "No such tutor")
    )
)]
pub async fn get_tutor_handler(
    State(state): State<Arc<AppState>>,
    Path(tutor_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let tutor = state
        .store
        .get_tutor(tutor_id)
        .await
        .map_err(core_error_response)?;
    Ok(Json(TutorResponse::from(tutor)))
}

//=========================================================================================
// Slot Handlers
//=========================================================================================

/// POST /slots - Publish availability, single or recurring.
#[utoipa::path(
    post,
    path = "/slots",
    request_body = CreateSlotRequest,
    responses(
        (status = 201, description = "Slot(s) created", body = CreateSlotResponse),
        (status = 400, description = "Invalid range or past start"),
        (status = 404, description = "No tutor profile"),
        (status = 409, description = "Overlaps an existing slot")
    )
)]
pub async fn create_slot_handler(
    State(state): State<Arc<AppState>>,
    axum::Extension(user_id): axum::Extension<Uuid>,
    Json(req): Json<CreateSlotRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let tutor = state
        .store
        .get_tutor_by_user(user_id)
        .await
        .map_err(core_error_response)?;

    let pattern = match req.recurrence.as_deref() {
        None => Recurrence::None,
        Some(raw) => Recurrence::parse(raw).ok_or((
            StatusCode::BAD_REQUEST,
            format!("'{raw}' is not a valid recurrence"),
        ))?,
    };

    let response = if pattern == Recurrence::None {
        let slot = state
            .store
            .create_slot(tutor.id, req.start_time, req.end_time, req.duration_minutes)
            .await
            .map_err(core_error_response)?;
        CreateSlotResponse::Single {
            slot: SlotResponse::from(slot),
        }
    } else {
        let outcome = state
            .store
            .create_recurring_slots(
                tutor.id,
                req.start_time,
                req.end_time,
                pattern,
                req.recurrence_end,
                req.max_count
                    .unwrap_or(schedule::DEFAULT_MAX_OCCURRENCES),
            )
            .await
            .map_err(core_error_response)?;
        CreateSlotResponse::Batch {
            created: outcome.created,
            skipped: outcome.skipped,
        }
    };

    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /slots - Query slots, optionally only bookable ones.
#[utoipa::path(
    get,
    path = "/slots",
    params(SlotQuery),
    responses(
        (status = 200, description = "Matching slots, earliest first", body = [SlotResponse])
    )
)]
pub async fn query_slots_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SlotQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let slots = state
        .store
        .query_slots(SlotFilter {
            tutor_id: query.tutor_id,
            from: query.from,
            to: query.to,
            available_only: query.available.unwrap_or(false),
        })
        .await
        .map_err(core_error_response)?;
    let body: Vec<SlotResponse> = slots.into_iter().map(SlotResponse::from).collect();
    Ok(Json(body))
}

/// GET /slots/mine - All slots of the calling tutor.
#[utoipa::path(
    get,
    path = "/slots/mine",
    responses(
        (status = 200, description = "The tutor's slots", body = [SlotResponse]),
        (status = 404, description = "No tutor profile")
    )
)]
pub async fn my_slots_handler(
    State(state): State<Arc<AppState>>,
    axum::Extension(user_id): axum::Extension<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let tutor = state
        .store
        .get_tutor_by_user(user_id)
        .await
        .map_err(core_error_response)?;
    let slots = state
        .store
        .list_slots_for_tutor(tutor.id)
        .await
        .map_err(core_error_response)?;
    let body: Vec<SlotResponse> = slots.into_iter().map(SlotResponse::from).collect();
    Ok(Json(body))
}

/// PATCH /slots/{id} - Reschedule an unbooked slot.
#[utoipa::path(
    patch,
    path = "/slots/{id}",
    request_body = UpdateSlotRequest,
    responses(
        (status = 200, description = "Updated slot", body = SlotResponse),
        (status = 400, description = "Invalid range or slot is booked"),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "No such slot")
    )
)]
pub async fn update_slot_handler(
    State(state): State<Arc<AppState>>,
    axum::Extension(user_id): axum::Extension<Uuid>,
    Path(slot_id): Path<Uuid>,
    Json(req): Json<UpdateSlotRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let slot = state
        .store
        .update_slot(
            slot_id,
            user_id,
            SlotChanges {
                start_time: req.start_time,
                end_time: req.end_time,
                duration_minutes: req.duration_minutes,
            },
        )
        .await
        .map_err(core_error_response)?;
    Ok(Json(SlotResponse::from(slot)))
}

/// DELETE /slots/{id} - Remove an unbooked slot.
#[utoipa::path(
    delete,
    path = "/slots/{id}",
    responses(
        (status = 204, description = "Slot deleted"),
        (status = 400, description = "Slot is booked"),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "No such slot")
    )
)]
pub async fn delete_slot_handler(
    State(state): State<Arc<AppState>>,
    axum::Extension(user_id): axum::Extension<Uuid>,
    Path(slot_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state
        .store
        .delete_slot(slot_id, user_id)
        .await
        .map_err(core_error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

//=========================================================================================
// Booking Handlers
//=========================================================================================

/// POST /bookings - Book an available slot.
#[utoipa::path(
    post,
    path = "/bookings",
    request_body = CreateBookingRequest,
    responses(
        (status = 201, description = "Booking confirmed", body = BookingResponse),
        (status = 400, description = "Slot is in the past"),
        (status = 404, description = "No such slot"),
        (status = 409, description = "Slot is already booked")
    )
)]
pub async fn create_booking_handler(
    State(state): State<Arc<AppState>>,
    axum::Extension(user_id): axum::Extension<Uuid>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let details = state
        .store
        .create_booking(user_id, req.slot_id, &req.subject, req.notes.as_deref())
        .await
        .map_err(core_error_response)?;

    let booking = details.booking.clone();
    spawn_notification(state.notifier.clone(), details, false);

    Ok((StatusCode::CREATED, Json(BookingResponse::from(booking))))
}

/// GET /bookings - The caller's bookings, as student or tutor.
#[utoipa::path(
    get,
    path = "/bookings",
    responses(
        (status = 200, description = "Bookings, newest first", body = [BookingResponse])
    )
)]
pub async fn list_bookings_handler(
    State(state): State<Arc<AppState>>,
    axum::Extension(user_id): axum::Extension<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let bookings = state
        .store
        .list_bookings_for_user(user_id)
        .await
        .map_err(core_error_response)?;
    let body: Vec<BookingResponse> = bookings.into_iter().map(BookingResponse::from).collect();
    Ok(Json(body))
}

/// POST /bookings/{id}/cancel - Cancel a booking and free its slot.
#[utoipa::path(
    post,
    path = "/bookings/{id}/cancel",
    request_body = CancelBookingRequest,
    responses(
        (status = 200, description = "Cancelled booking", body = BookingResponse),
        (status = 400, description = "Already cancelled or completed"),
        (status = 403, description = "Neither the student nor the tutor"),
        (status = 404, description = "No such booking")
    )
)]
pub async fn cancel_booking_handler(
    State(state): State<Arc<AppState>>,
    axum::Extension(user_id): axum::Extension<Uuid>,
    Path(booking_id): Path<Uuid>,
    Json(req): Json<CancelBookingRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let details = state
        .store
        .cancel_booking(user_id, booking_id, req.reason.as_deref())
        .await
        .map_err(core_error_response)?;

    let booking = details.booking.clone();
    spawn_notification(state.notifier.clone(), details, true);

    Ok(Json(BookingResponse::from(booking)))
}

/// POST /bookings/{id}/complete - Tutor marks a session as held.
#[utoipa::path(
    post,
    path = "/bookings/{id}/complete",
    responses(
        (status = 200, description = "Completed booking", body = BookingResponse),
        (status = 400, description = "Not in a completable state"),
        (status = 403, description = "Not the owning tutor"),
        (status = 404, description = "No such booking")
    )
)]
pub async fn complete_booking_handler(
    State(state): State<Arc<AppState>>,
    axum::Extension(user_id): axum::Extension<Uuid>,
    Path(booking_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let booking = state
        .store
        .complete_booking(user_id, booking_id)
        .await
        .map_err(core_error_response)?;
    Ok(Json(BookingResponse::from(booking)))
}

/// POST /bookings/{id}/rate - Student rates a completed session.
#[utoipa::path(
    post,
    path = "/bookings/{id}/rate",
    request_body = RateBookingRequest,
    responses(
        (status = 200, description = "Rated booking", body = BookingResponse),
        (status = 400, description = "Invalid rating, not completed, or already rated"),
        (status = 403, description = "Not the booking's student"),
        (status = 404, description = "No such booking")
    )
)]
pub async fn rate_booking_handler(
    State(state): State<Arc<AppState>>,
    axum::Extension(user_id): axum::Extension<Uuid>,
    Path(booking_id): Path<Uuid>,
    Json(req): Json<RateBookingRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let booking = state
        .store
        .rate_booking(user_id, booking_id, req.rating, req.review.as_deref())
        .await
        .map_err(core_error_response)?;
    Ok(Json(BookingResponse::from(booking)))
}
