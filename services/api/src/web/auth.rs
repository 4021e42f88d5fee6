//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for user signup, login, and logout.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::core_error_response;
use crate::web::state::AppState;
use tutorbook_core::domain::UserRole;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    /// STUDENT or TUTOR; defaults to STUDENT.
    pub role: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct AuthResponse {
    pub user_id: Uuid,
    pub email: String,
    pub role: String,
}

const SESSION_DAYS: i64 = 30;

fn session_cookie(session_id: &str) -> String {
    format!(
        "session={}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={}",
        session_id,
        Duration::days(SESSION_DAYS).num_seconds()
    )
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/signup - Create a new user account
#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "User created successfully", body = AuthResponse),
        (status = 400, description = "Invalid request"),
        (status = 409, description = "Email already registered"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let role = match req.role.as_deref() {
        None => UserRole::Student,
        Some(raw) => match UserRole::parse(raw) {
            Some(UserRole::Admin) | None => {
                return Err((
                    StatusCode::BAD_REQUEST,
                    "role must be STUDENT or TUTOR".to_string(),
                ))
            }
            Some(role) => role,
        },
    };

    // 1. Hash the password
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| {
            error!("Failed to hash password: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to hash password".to_string(),
            )
        })?
        .to_string();

    // 2. Create user in database
    let user = state
        .store
        .create_user(
            &req.email,
            &password_hash,
            &req.first_name,
            &req.last_name,
            role,
        )
        .await
        .map_err(core_error_response)?;

    // 3. Create the auth session and hand back the cookie
    let auth_session_id = Uuid::new_v4().to_string();
    let expires_at = state.clock.now() + Duration::days(SESSION_DAYS);
    state
        .store
        .create_auth_session(&auth_session_id, user.id, expires_at)
        .await
        .map_err(core_error_response)?;

    let response = AuthResponse {
        user_id: user.id,
        email: user.email,
        role: user.role.as_str().to_string(),
    };

    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, session_cookie(&auth_session_id))],
        Json(response),
    ))
}

/// POST /auth/login - Login with existing account
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    // 1. Get user by email; an unknown address reads the same as a bad
    // password.
    let creds = state.store.get_user_by_email(&req.email).await.map_err(|_| {
        (
            StatusCode::UNAUTHORIZED,
            "Invalid email or password".to_string(),
        )
    })?;

    // 2. Verify password
    let parsed_hash = PasswordHash::new(&creds.hashed_password).map_err(|e| {
        error!("Failed to parse password hash: {:?}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Authentication error".to_string(),
        )
    })?;
    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| {
            (
                StatusCode::UNAUTHORIZED,
                "Invalid email or password".to_string(),
            )
        })?;

    // 3. Create a fresh auth session
    let auth_session_id = Uuid::new_v4().to_string();
    let expires_at = state.clock.now() + Duration::days(SESSION_DAYS);
    state
        .store
        .create_auth_session(&auth_session_id, creds.user_id, expires_at)
        .await
        .map_err(core_error_response)?;

    let response = AuthResponse {
        user_id: creds.user_id,
        email: creds.email,
        role: creds.role.as_str().to_string(),
    };

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, session_cookie(&auth_session_id))],
        Json(response),
    ))
}

/// POST /auth/logout - Invalidate the current session
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 204, description = "Logged out"),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    Extension(_user_id): Extension<Uuid>,
    headers: axum::http::HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if let Some(session_id) = crate::web::middleware::session_cookie_value(&headers) {
        state
            .store
            .delete_auth_session(session_id)
            .await
            .map_err(core_error_response)?;
    }

    let expired = "session=; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age=0".to_string();
    Ok((StatusCode::NO_CONTENT, [(header::SET_COOKIE, expired)]))
}
