pub mod account;
pub mod admin;
pub mod client;
pub mod health;

use axum::{http::StatusCode, Json};
use sqlx::SqlitePool;

use crate::models::{ApiResponse, AvailabilityConfig};

/// Error shape shared by all endpoints.
pub type ApiError = (StatusCode, Json<ApiResponse<()>>);

pub fn err(status: StatusCode, msg: impl Into<String>) -> ApiError {
    (status, Json(ApiResponse::error(msg)))
}

pub fn db_err(context: &'static str) -> impl FnOnce(sqlx::Error) -> ApiError {
    move |e| {
        tracing::error!("{context}: {e}");
        err(StatusCode::INTERNAL_SERVER_ERROR, "Storage error")
    }
}

const AVAILABILITY_KEY: &str = "availability";

/// Load the availability document, falling back to the compiled-in default
/// when nothing has been saved yet or the stored JSON is corrupt.
pub async fn load_availability(db: &SqlitePool) -> Result<AvailabilityConfig, ApiError> {
    let stored: Option<String> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(AVAILABILITY_KEY)
            .fetch_optional(db)
            .await
            .map_err(db_err("load_availability"))?;

    Ok(match stored {
        Some(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
            tracing::error!("stored availability config is corrupt: {e}");
            AvailabilityConfig::fallback()
        }),
        None => AvailabilityConfig::fallback(),
    })
}

/// Replace the stored availability document atomically.
pub async fn save_availability(
    db: &SqlitePool,
    config: &AvailabilityConfig,
    updated_at: &str,
) -> Result<(), ApiError> {
    let json = serde_json::to_string(config)
        .map_err(|_| err(StatusCode::INTERNAL_SERVER_ERROR, "Serialization error"))?;
    sqlx::query(
        "INSERT INTO settings (key, value, updated_at) VALUES (?, ?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
    )
    .bind(AVAILABILITY_KEY)
    .bind(json)
    .bind(updated_at)
    .execute(db)
    .await
    .map_err(db_err("save_availability"))?;
    Ok(())
}
