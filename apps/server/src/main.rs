mod auth;
mod config;
mod db;
mod handlers;
mod lifecycle;
mod models;
mod notify;
mod phone;
mod rate_limit;
mod sheets;
mod slots;
mod timeslot;

use axum::{
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
    Router,
};
use sqlx::sqlite::SqlitePoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use config::AppConfig;
use lifecycle::Services;
use notify::{NullMailer, NullSms};
use rate_limit::{
    rate_limit_account, rate_limit_admin, rate_limit_booking, rate_limit_public, RateLimiter,
};
use sheets::NullSheets;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub cfg: AppConfig,
    pub services: Services,
    pub started_at: Instant,
}

/// Reminder sweep cadence (seconds).
const REMINDER_SWEEP_SECS: u64 = 60;
/// Completion sweep cadence (seconds).
const COMPLETION_SWEEP_SECS: u64 = 900;
/// Rate limit cleanup interval (seconds).
const RATE_LIMIT_CLEANUP_SECS: u64 = 300;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = EnvFilter::from_default_env().add_directive("info".parse()?);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = AppConfig::from_env();

    // ── Database ──
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&cfg.database_url)
        .await?;
    db::run_migrations(&pool).await?;

    // ── Notification channels, each optional ──
    let mailer: Arc<dyn notify::Mailer> = if !cfg.smtp_user.is_empty()
        && !cfg.operator_email.is_empty()
    {
        Arc::new(notify::email::SmtpMailer::new(
            &cfg.smtp_host,
            &cfg.smtp_user,
            &cfg.smtp_pass,
            &cfg.operator_email,
        )?)
    } else {
        tracing::warn!("SMTP_USER/OPERATOR_EMAIL not set — operator emails disabled");
        Arc::new(NullMailer)
    };

    let sms: Arc<dyn notify::SmsSender> = if !cfg.twilio_account_sid.is_empty() {
        Arc::new(notify::sms::TwilioSms::new(
            &cfg.twilio_account_sid,
            &cfg.twilio_auth_token,
            &cfg.twilio_from_number,
        ))
    } else {
        tracing::warn!("TWILIO_ACCOUNT_SID not set — customer SMS disabled");
        Arc::new(NullSms)
    };

    let sheet_ledger: Arc<dyn sheets::SheetLedger> = if !cfg.sheets_key_path.is_empty() {
        Arc::new(
            sheets::GoogleSheets::from_key_file(
                &cfg.sheets_key_path,
                &cfg.booking_sheet_id,
                &cfg.payment_sheet_id,
            )
            .await?,
        )
    } else {
        tracing::warn!("SHEETS_KEY_PATH not set — spreadsheet sync disabled");
        Arc::new(NullSheets)
    };

    let services = Services {
        mailer,
        sms,
        sheets: sheet_ledger,
    };

    let state = Arc::new(AppState {
        db: pool,
        cfg,
        services,
        started_at: Instant::now(),
    });

    // ── Background task: 24h reminders ──
    let reminder_state = state.clone();
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(tokio::time::Duration::from_secs(REMINDER_SWEEP_SECS));
        loop {
            interval.tick().await;
            let now = reminder_state.cfg.local_now();
            if let Err(e) = lifecycle::run_reminder_sweep(
                &reminder_state.db,
                &reminder_state.services,
                &reminder_state.cfg,
                now,
            )
            .await
            {
                tracing::error!("reminder sweep failed: {e}");
            }
        }
    });

    // ── Background task: completed appointments onto the payment sheet ──
    let completion_state = state.clone();
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(tokio::time::Duration::from_secs(COMPLETION_SWEEP_SECS));
        loop {
            interval.tick().await;
            let now = completion_state.cfg.local_now();
            if let Err(e) = lifecycle::run_completion_sweep(
                &completion_state.db,
                &completion_state.services,
                &completion_state.cfg,
                now,
            )
            .await
            {
                tracing::error!("completion sweep failed: {e}");
            }
        }
    });

    // ── Rate limiter + cleanup task ──
    let rate_limiter = RateLimiter::new();
    let cleanup_limiter = rate_limiter.clone();
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(tokio::time::Duration::from_secs(RATE_LIMIT_CLEANUP_SECS));
        loop {
            interval.tick().await;
            cleanup_limiter.cleanup();
        }
    });

    // Browser booking form talks to us cross-origin; preflights get a 204
    // from this layer.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // ── Router (5 groups with per-group rate limits) ──

    let no_limit_routes =
        Router::new().route("/api/health", get(handlers::health::health));

    let public_routes = Router::new()
        .route("/api/availability", get(handlers::client::get_availability))
        .route("/api/slots", get(handlers::client::get_slots))
        .layer(from_fn_with_state(rate_limiter.clone(), rate_limit_public));

    let booking_routes = Router::new()
        .route("/api/bookings", post(handlers::client::create_booking))
        .layer(from_fn_with_state(rate_limiter.clone(), rate_limit_booking));

    let account_routes = Router::new()
        .route("/api/accounts", post(handlers::account::signup))
        .route("/api/accounts/login", post(handlers::account::login))
        .route("/api/bookings/my", get(handlers::client::my_bookings))
        .route("/api/bookings/{id}", delete(handlers::client::cancel_booking))
        .layer(from_fn_with_state(rate_limiter.clone(), rate_limit_account));

    let admin_routes = Router::new()
        .route(
            "/api/admin/availability",
            get(handlers::admin::get_availability).put(handlers::admin::put_availability),
        )
        .route("/api/admin/bookings", get(handlers::admin::list_bookings))
        .route(
            "/api/admin/bookings/{id}",
            put(handlers::admin::update_booking).delete(handlers::admin::delete_booking),
        )
        .route("/api/admin/payments", post(handlers::admin::update_payment))
        .route(
            "/api/admin/accounts/{id}",
            delete(handlers::admin::delete_account),
        )
        .layer(from_fn_with_state(rate_limiter.clone(), rate_limit_admin));

    let app = Router::new()
        .merge(no_limit_routes)
        .merge(public_routes)
        .merge(booking_routes)
        .merge(account_routes)
        .merge(admin_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state.clone());

    let addr = format!("{}:{}", state.cfg.host, state.cfg.port);
    tracing::info!("Fadebook server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
