use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    Json,
};
use std::sync::Arc;

use super::{db_err, err, load_availability, save_availability, ApiError};
use crate::{auth, lifecycle, models::*, timeslot, AppState};

/// Helper: validate the admin bearer token.
fn extract_admin(headers: &HeaderMap, state: &AppState) -> Result<(), ApiError> {
    let header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| err(StatusCode::UNAUTHORIZED, "Missing Authorization header"))?;
    let token = auth::bearer(header)
        .ok_or_else(|| err(StatusCode::UNAUTHORIZED, "Malformed Authorization header"))?;
    if !auth::admin_token_ok(&state.cfg.admin_token, token) {
        return Err(err(StatusCode::FORBIDDEN, "Invalid admin token"));
    }
    Ok(())
}

/// GET /api/admin/availability
pub async fn get_availability(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<AvailabilityConfig>>, ApiError> {
    extract_admin(&headers, &state)?;
    let config = load_availability(&state.db).await?;
    Ok(Json(ApiResponse::success(config)))
}

/// PUT /api/admin/availability — replace the whole schedule document.
pub async fn put_availability(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<AvailabilityConfig>,
) -> Result<Json<ApiResponse<AvailabilityConfig>>, ApiError> {
    extract_admin(&headers, &state)?;
    body.validate()
        .map_err(|reason| err(StatusCode::UNPROCESSABLE_ENTITY, reason))?;
    save_availability(&state.db, &body, &state.cfg.local_timestamp()).await?;
    tracing::info!("availability config updated");
    Ok(Json(ApiResponse::success(body)))
}

/// GET /api/admin/bookings?date=YYYY-MM-DD — all bookings, optionally one day.
pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<BookingsQuery>,
) -> Result<Json<ApiResponse<Vec<Booking>>>, ApiError> {
    extract_admin(&headers, &state)?;

    let bookings: Vec<Booking> = match &query.date {
        Some(date) => {
            sqlx::query_as(
                "SELECT * FROM bookings WHERE time_slot LIKE ? ORDER BY time_slot ASC",
            )
            .bind(format!("{date} %"))
            .fetch_all(&state.db)
            .await
        }
        None => {
            sqlx::query_as("SELECT * FROM bookings ORDER BY time_slot ASC")
                .fetch_all(&state.db)
                .await
        }
    }
    .map_err(db_err("list_bookings"))?;

    Ok(Json(ApiResponse::success(bookings)))
}

/// PUT /api/admin/bookings/{id} — edit a booking in place.
pub async fn update_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<UpdateBookingRequest>,
) -> Result<Json<ApiResponse<Booking>>, ApiError> {
    extract_admin(&headers, &state)?;

    sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db)
        .await
        .map_err(db_err("update_booking fetch"))?
        .ok_or_else(|| err(StatusCode::NOT_FOUND, "Booking not found"))?;

    if let Some(time_slot) = &body.time_slot {
        if timeslot::parse(time_slot).is_none() {
            return Err(err(
                StatusCode::UNPROCESSABLE_ENTITY,
                "time_slot must be 'YYYY-MM-DD HH:MM AM/PM'",
            ));
        }
        let taken: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM bookings WHERE time_slot = ? AND id != ?",
        )
        .bind(time_slot)
        .bind(id)
        .fetch_one(&state.db)
        .await
        .map_err(db_err("update_booking conflict"))?;
        if taken > 0 {
            return Err(err(StatusCode::CONFLICT, "That time slot is already booked"));
        }
        sqlx::query("UPDATE bookings SET time_slot = ? WHERE id = ?")
            .bind(time_slot)
            .bind(id)
            .execute(&state.db)
            .await
            .map_err(db_err("update_booking slot"))?;
    }
    if let Some(name) = &body.name {
        sqlx::query("UPDATE bookings SET name = ? WHERE id = ?")
            .bind(name)
            .bind(id)
            .execute(&state.db)
            .await
            .map_err(db_err("update_booking name"))?;
    }
    if let Some(raw_phone) = &body.phone {
        let canonical = crate::phone::canonicalize(raw_phone, &state.cfg.country_code);
        sqlx::query("UPDATE bookings SET phone = ? WHERE id = ?")
            .bind(canonical)
            .bind(id)
            .execute(&state.db)
            .await
            .map_err(db_err("update_booking phone"))?;
    }
    if let Some(notes) = &body.notes {
        sqlx::query("UPDATE bookings SET notes = ? WHERE id = ?")
            .bind(notes)
            .bind(id)
            .execute(&state.db)
            .await
            .map_err(db_err("update_booking notes"))?;
    }

    let booking: Booking = sqlx::query_as("SELECT * FROM bookings WHERE id = ?")
        .bind(id)
        .fetch_one(&state.db)
        .await
        .map_err(db_err("update_booking refetch"))?;
    Ok(Json(ApiResponse::success(booking)))
}

/// DELETE /api/admin/bookings/{id} — cancel on the customer's behalf.
pub async fn delete_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    extract_admin(&headers, &state)?;

    let snapshot: Booking = sqlx::query_as("SELECT * FROM bookings WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db)
        .await
        .map_err(db_err("delete_booking fetch"))?
        .ok_or_else(|| err(StatusCode::NOT_FOUND, "Booking not found"))?;

    sqlx::query("DELETE FROM bookings WHERE id = ?")
        .bind(id)
        .execute(&state.db)
        .await
        .map_err(db_err("delete_booking delete"))?;

    lifecycle::on_booking_cancelled(&state.services, &state.cfg, &snapshot).await;
    Ok(Json(ApiResponse::success(())))
}

/// POST /api/admin/payments — record how (and when) a booking was paid.
///
/// `method_only` updates just the method, both in the store and in column E
/// of the payment sheet; sending method 'pending' reverts it. The full form
/// additionally needs `payment_date` and marks the booking paid.
pub async fn update_payment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<PaymentUpdateRequest>,
) -> Result<Json<ApiResponse<Booking>>, ApiError> {
    extract_admin(&headers, &state)?;

    if !matches!(body.payment_method.as_str(), "cash" | "card" | "pending") {
        return Err(err(
            StatusCode::UNPROCESSABLE_ENTITY,
            "payment_method must be cash, card or pending",
        ));
    }

    let booking: Booking = sqlx::query_as("SELECT * FROM bookings WHERE id = ?")
        .bind(body.booking_id)
        .fetch_optional(&state.db)
        .await
        .map_err(db_err("update_payment fetch"))?
        .ok_or_else(|| err(StatusCode::NOT_FOUND, "Booking not found"))?;

    let sheet_date = timeslot::parse(&booking.time_slot)
        .map(|dt| timeslot::sheet_date(dt.date()))
        .ok_or_else(|| {
            err(StatusCode::UNPROCESSABLE_ENTITY, "Booking has an unparseable time slot")
        })?;

    if body.method_only {
        sqlx::query("UPDATE bookings SET payment_method = ? WHERE id = ?")
            .bind(&body.payment_method)
            .bind(booking.id)
            .execute(&state.db)
            .await
            .map_err(db_err("update_payment method"))?;

        // 'pending' clears the sheet cell.
        let cell = if body.payment_method == "pending" {
            ""
        } else {
            body.payment_method.as_str()
        };
        if let Err(e) = state
            .services
            .sheets
            .set_payment_method(&sheet_date, &booking.name, cell)
            .await
        {
            tracing::warn!(booking_id = booking.id, %e, "payment method sheet update failed");
        }
    } else {
        let paid_date = body
            .payment_date
            .as_deref()
            .ok_or_else(|| err(StatusCode::BAD_REQUEST, "payment_date is required"))?;
        let paid_on = chrono::NaiveDate::parse_from_str(paid_date, "%Y-%m-%d")
            .map(timeslot::sheet_date)
            .map_err(|_| err(StatusCode::BAD_REQUEST, "payment_date must be YYYY-MM-DD"))?;

        sqlx::query(
            "UPDATE bookings SET payment_status = 'paid', payment_method = ?,
                    payment_confirmed_at = ? WHERE id = ?",
        )
        .bind(&body.payment_method)
        .bind(state.cfg.local_timestamp())
        .bind(booking.id)
        .execute(&state.db)
        .await
        .map_err(db_err("update_payment paid"))?;

        if let Err(e) = state
            .services
            .sheets
            .set_payment_date(&sheet_date, &booking.name, &paid_on)
            .await
        {
            tracing::warn!(booking_id = booking.id, %e, "payment date sheet update failed");
        }
        if body.payment_method != "pending" {
            if let Err(e) = state
                .services
                .sheets
                .set_payment_method(&sheet_date, &booking.name, &body.payment_method)
                .await
            {
                tracing::warn!(booking_id = booking.id, %e, "payment method sheet update failed");
            }
        }
    }

    let updated: Booking = sqlx::query_as("SELECT * FROM bookings WHERE id = ?")
        .bind(booking.id)
        .fetch_one(&state.db)
        .await
        .map_err(db_err("update_payment refetch"))?;
    tracing::info!(booking_id = updated.id, method = %updated.payment_method, "payment updated");
    Ok(Json(ApiResponse::success(updated)))
}

/// DELETE /api/admin/accounts/{id} — delete an account; its bookings stay
/// but become walk-ins again.
pub async fn delete_account(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    extract_admin(&headers, &state)?;

    let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM accounts WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db)
        .await
        .map_err(db_err("delete_account fetch"))?;
    if existing.is_none() {
        return Err(err(StatusCode::NOT_FOUND, "Account not found"));
    }

    sqlx::query("UPDATE bookings SET account_id = NULL WHERE account_id = ?")
        .bind(id)
        .execute(&state.db)
        .await
        .map_err(db_err("delete_account unlink"))?;
    sqlx::query("DELETE FROM accounts WHERE id = ?")
        .bind(id)
        .execute(&state.db)
        .await
        .map_err(db_err("delete_account delete"))?;

    tracing::info!(account_id = id, "account deleted");
    Ok(Json(ApiResponse::success(())))
}
