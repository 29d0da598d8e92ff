use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    Json,
};
use std::collections::HashSet;
use std::sync::Arc;

use super::{db_err, err, load_availability, ApiError};
use crate::{auth, lifecycle, models::*, phone, slots, timeslot, AppState};

/// Helper: account id from an optional bearer token. Booking does not
/// require an account, so a missing header is fine; a bad token is not.
fn optional_account(headers: &HeaderMap, secret: &str) -> Result<Option<i64>, ApiError> {
    let Some(header) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    else {
        return Ok(None);
    };
    let token = auth::bearer(header)
        .ok_or_else(|| err(StatusCode::UNAUTHORIZED, "Malformed Authorization header"))?;
    let (account_id, _) = auth::verify_token(secret, token)
        .ok_or_else(|| err(StatusCode::UNAUTHORIZED, "Invalid token"))?;
    Ok(Some(account_id))
}

/// Helper: account id from a required bearer token.
fn require_account(headers: &HeaderMap, secret: &str) -> Result<i64, ApiError> {
    optional_account(headers, secret)?
        .ok_or_else(|| err(StatusCode::UNAUTHORIZED, "Missing Authorization header"))
}

/// All composite slots already taken on a date.
async fn booked_slots(
    db: &sqlx::SqlitePool,
    date: &str,
) -> Result<HashSet<String>, ApiError> {
    let taken: Vec<String> =
        sqlx::query_scalar("SELECT time_slot FROM bookings WHERE time_slot LIKE ?")
            .bind(format!("{date} %"))
            .fetch_all(db)
            .await
            .map_err(db_err("booked_slots"))?;
    Ok(taken.into_iter().collect())
}

// ── Endpoints ──

/// GET /api/availability — the schedule as the booking form needs it.
pub async fn get_availability(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<AvailabilityConfig>>, ApiError> {
    let config = load_availability(&state.db).await?;
    Ok(Json(ApiResponse::success(config)))
}

/// GET /api/slots?date=YYYY-MM-DD — slot labels with availability flags.
pub async fn get_slots(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SlotsQuery>,
) -> Result<Json<ApiResponse<SlotsResponse>>, ApiError> {
    let date = chrono::NaiveDate::parse_from_str(&query.date, "%Y-%m-%d")
        .map_err(|_| err(StatusCode::BAD_REQUEST, "date must be YYYY-MM-DD"))?;

    let config = load_availability(&state.db).await?;
    let bookable = slots::date_bookable(&config, &query.date, &state.cfg.local_today());
    if !bookable {
        return Ok(Json(ApiResponse::success(SlotsResponse {
            date: query.date,
            bookable: false,
            slots: Vec::new(),
        })));
    }

    let hours = config
        .business_hours
        .get(slots::weekday_name(date))
        .cloned()
        .unwrap_or(DayHours {
            enabled: false,
            start_time: String::new(),
            end_time: String::new(),
            slot_duration: 0,
        });
    let generated = slots::generate_day_slots(&hours, config.settings.time_format);
    let booked = booked_slots(&state.db, &query.date).await?;

    Ok(Json(ApiResponse::success(SlotsResponse {
        slots: slots::mark_availability(generated, &query.date, &booked),
        date: query.date,
        bookable: true,
    })))
}

/// POST /api/bookings — create a booking. No account required; with a valid
/// bearer token the booking is linked to the caller's account.
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateBookingRequest>,
) -> Result<Json<ApiResponse<Booking>>, ApiError> {
    let name = body.name.trim();
    if name.is_empty() {
        return Err(err(StatusCode::BAD_REQUEST, "Name is required"));
    }
    if body.phone.trim().is_empty() {
        return Err(err(StatusCode::BAD_REQUEST, "Phone is required"));
    }
    let date = chrono::NaiveDate::parse_from_str(&body.date, "%Y-%m-%d")
        .map_err(|_| err(StatusCode::BAD_REQUEST, "date must be YYYY-MM-DD"))?;

    let account_id = optional_account(&headers, &state.cfg.auth_secret)?;

    let config = load_availability(&state.db).await?;
    if !slots::date_bookable(&config, &body.date, &state.cfg.local_today()) {
        return Err(err(StatusCode::UNPROCESSABLE_ENTITY, "Date is not open for booking"));
    }

    // The label must be one the schedule actually offers.
    let hours = config
        .business_hours
        .get(slots::weekday_name(date))
        .ok_or_else(|| err(StatusCode::UNPROCESSABLE_ENTITY, "Date is not open for booking"))?;
    let offered = slots::generate_day_slots(hours, config.settings.time_format);
    if !offered.contains(&body.time) {
        return Err(err(StatusCode::UNPROCESSABLE_ENTITY, "Unknown time slot"));
    }

    // Store the canonical 12-hour form whatever the display format, so the
    // sweeps and the payment update can always parse the composite back.
    let canonical = slots::canonical_label(&body.time)
        .ok_or_else(|| err(StatusCode::UNPROCESSABLE_ENTITY, "Unknown time slot"))?;
    let time_slot = timeslot::compose(&body.date, &canonical);
    let taken: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bookings WHERE time_slot = ?")
        .bind(&time_slot)
        .fetch_one(&state.db)
        .await
        .map_err(db_err("create_booking conflict check"))?;
    if taken > 0 {
        return Err(err(StatusCode::CONFLICT, "That time slot is already booked"));
    }

    let canonical_phone = phone::canonicalize(&body.phone, &state.cfg.country_code);
    let id = sqlx::query(
        "INSERT INTO bookings (name, phone, time_slot, notes, created_at, account_id)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(name)
    .bind(&canonical_phone)
    .bind(&time_slot)
    .bind(&body.notes)
    .bind(state.cfg.local_timestamp())
    .bind(account_id)
    .execute(&state.db)
    .await
    .map_err(db_err("create_booking insert"))?
    .last_insert_rowid();

    let booking: Booking = sqlx::query_as("SELECT * FROM bookings WHERE id = ?")
        .bind(id)
        .fetch_one(&state.db)
        .await
        .map_err(db_err("create_booking fetch"))?;

    lifecycle::on_booking_created(&state.db, &state.services, &state.cfg, &booking).await;

    tracing::info!(booking_id = id, %time_slot, "booking created");
    Ok(Json(ApiResponse::success(booking)))
}

/// GET /api/bookings/my — the caller's bookings, soonest first.
pub async fn my_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<Vec<Booking>>>, ApiError> {
    let account_id = require_account(&headers, &state.cfg.auth_secret)?;
    let bookings: Vec<Booking> =
        sqlx::query_as("SELECT * FROM bookings WHERE account_id = ? ORDER BY time_slot ASC")
            .bind(account_id)
            .fetch_all(&state.db)
            .await
            .map_err(db_err("my_bookings"))?;
    Ok(Json(ApiResponse::success(bookings)))
}

/// DELETE /api/bookings/{id} — cancel one of the caller's own bookings.
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let account_id = require_account(&headers, &state.cfg.auth_secret)?;

    let snapshot: Booking = sqlx::query_as("SELECT * FROM bookings WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db)
        .await
        .map_err(db_err("cancel_booking fetch"))?
        .ok_or_else(|| err(StatusCode::NOT_FOUND, "Booking not found"))?;
    if snapshot.account_id != Some(account_id) {
        return Err(err(StatusCode::FORBIDDEN, "Not your booking"));
    }

    sqlx::query("DELETE FROM bookings WHERE id = ?")
        .bind(id)
        .execute(&state.db)
        .await
        .map_err(db_err("cancel_booking delete"))?;

    lifecycle::on_booking_cancelled(&state.services, &state.cfg, &snapshot).await;
    Ok(Json(ApiResponse::success(())))
}
