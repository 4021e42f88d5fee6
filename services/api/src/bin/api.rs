//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{
        email::{LogNotifier, SmtpNotifier},
        store::SqliteStore,
    },
    config::Config,
    error::ApiError,
    jobs::start_reminder_scheduler,
    web::{
        auth::{login_handler, logout_handler, signup_handler},
        require_auth,
        rest::{
            cancel_booking_handler, complete_booking_handler, create_booking_handler,
            create_slot_handler, create_tutor_handler, delete_slot_handler, get_tutor_handler,
            list_bookings_handler, list_tutors_handler, my_slots_handler, query_slots_handler,
            rate_booking_handler, update_slot_handler,
        },
        ApiDoc, AppState,
    },
};
use axum::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tutorbook_core::ports::{Notifier, SystemClock};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let options =
        SqliteConnectOptions::from_str(&config.database_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;
    let clock = Arc::new(SystemClock);
    let store = Arc::new(SqliteStore::new(pool, clock.clone()));
    info!("Running database migrations...");
    store.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize the Notifier ---
    let notifier: Arc<dyn Notifier> = match &config.smtp {
        Some(smtp) => {
            info!("SMTP notifier enabled via {}", smtp.host);
            Arc::new(
                SmtpNotifier::new(smtp)
                    .map_err(|e| ApiError::Internal(format!("SMTP setup failed: {e}")))?,
            )
        }
        None => {
            info!("No SMTP configuration; notifications will only be logged");
            Arc::new(LogNotifier)
        }
    };

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        store: store.clone(),
        notifier: notifier.clone(),
        clock: clock.clone(),
        config: config.clone(),
    });

    // --- 5. Start the Reminder Scheduler ---
    let _reminder_task = start_reminder_scheduler(
        store,
        notifier,
        clock,
        StdDuration::from_secs(config.reminder_interval_secs),
        chrono::Duration::minutes(config.reminder_lead_minutes),
    );

    let cors = CorsLayer::new()
        .allow_origin(
            config
                .allowed_origin
                .parse::<HeaderValue>()
                .map_err(|e| ApiError::Internal(format!("invalid ALLOWED_ORIGIN: {e}")))?,
        )
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 6. Create the Web Router ---
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/auth/signup", post(signup_handler))
        .route("/auth/login", post(login_handler));

    // Protected routes (session cookie required)
    let protected_routes = Router::new()
        .route("/auth/logout", post(logout_handler))
        .route("/tutors", post(create_tutor_handler).get(list_tutors_handler))
        .route("/tutors/{id}", get(get_tutor_handler))
        .route("/slots", post(create_slot_handler).get(query_slots_handler))
        .route("/slots/mine", get(my_slots_handler))
        .route(
            "/slots/{id}",
            axum::routing::patch(update_slot_handler).delete(delete_slot_handler),
        )
        .route(
            "/bookings",
            post(create_booking_handler).get(list_bookings_handler),
        )
        .route("/bookings/{id}/cancel", post(cancel_booking_handler))
        .route("/bookings/{id}/complete", post(complete_booking_handler))
        .route("/bookings/{id}/rate", post(rate_booking_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    let app = Router::new()
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public_routes)
        .merge(protected_routes)
        .layer(cors)
        .with_state(app_state);

    // --- 7. Serve ---
    info!("Listening on {}", config.bind_address);
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
