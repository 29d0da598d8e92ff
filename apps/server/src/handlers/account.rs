use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use super::{db_err, err, ApiError};
use crate::{auth, models::*, phone, AppState};

/// Re-link past walk-in bookings to a new account by canonical phone, then
/// recompute the booking counter from what actually matched.
async fn adopt_booking_history(
    db: &sqlx::SqlitePool,
    account_id: i64,
    canonical_phone: &str,
    country_code: &str,
) -> Result<i64, sqlx::Error> {
    let unlinked: Vec<(i64, String)> =
        sqlx::query_as("SELECT id, phone FROM bookings WHERE account_id IS NULL")
            .fetch_all(db)
            .await?;

    for (booking_id, raw_phone) in unlinked {
        if phone::canonicalize(&raw_phone, country_code) == canonical_phone {
            sqlx::query("UPDATE bookings SET account_id = ? WHERE id = ?")
                .bind(account_id)
                .bind(booking_id)
                .execute(db)
                .await?;
        }
    }

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bookings WHERE account_id = ?")
        .bind(account_id)
        .fetch_one(db)
        .await?;
    sqlx::query("UPDATE accounts SET booking_count = ? WHERE id = ?")
        .bind(count)
        .bind(account_id)
        .execute(db)
        .await?;
    Ok(count)
}

/// POST /api/accounts — sign up with name, phone and password.
pub async fn signup(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SignupRequest>,
) -> Result<Json<ApiResponse<AuthResponse>>, ApiError> {
    let name = body.name.trim();
    if name.is_empty() {
        return Err(err(StatusCode::BAD_REQUEST, "Name is required"));
    }
    if body.password.len() < 6 {
        return Err(err(StatusCode::BAD_REQUEST, "Password must be at least 6 characters"));
    }

    let canonical = phone::canonicalize(&body.phone, &state.cfg.country_code);
    let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM accounts WHERE phone = ?")
        .bind(&canonical)
        .fetch_optional(&state.db)
        .await
        .map_err(db_err("signup lookup"))?;
    if existing.is_some() {
        return Err(err(StatusCode::CONFLICT, "An account with this phone already exists"));
    }

    let credential = auth::credential_hash(&state.cfg.auth_secret, &canonical, &body.password);
    let id = sqlx::query(
        "INSERT INTO accounts (phone, name, credential, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(&canonical)
    .bind(name)
    .bind(&credential)
    .bind(state.cfg.local_timestamp())
    .execute(&state.db)
    .await
    .map_err(db_err("signup insert"))?
    .last_insert_rowid();

    let adopted =
        adopt_booking_history(&state.db, id, &canonical, &state.cfg.country_code)
            .await
            .map_err(db_err("signup history"))?;

    let account: Account = sqlx::query_as("SELECT * FROM accounts WHERE id = ?")
        .bind(id)
        .fetch_one(&state.db)
        .await
        .map_err(db_err("signup fetch"))?;

    let subject = format!("New account: {name}");
    let email = format!(
        "<p><b>{name}</b> ({canonical}) created an account. \
         {adopted} past booking(s) linked.</p>"
    );
    if let Err(e) = state.services.mailer.send(&subject, &email).await {
        tracing::warn!(account_id = id, %e, "signup email failed");
    }

    let token = auth::issue_token(&state.cfg.auth_secret, id, &canonical);
    tracing::info!(account_id = id, "account created");
    Ok(Json(ApiResponse::success(AuthResponse { account, token })))
}

/// POST /api/accounts/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<ApiResponse<AuthResponse>>, ApiError> {
    let canonical = phone::canonicalize(&body.phone, &state.cfg.country_code);
    let account: Option<Account> = sqlx::query_as("SELECT * FROM accounts WHERE phone = ?")
        .bind(&canonical)
        .fetch_optional(&state.db)
        .await
        .map_err(db_err("login lookup"))?;

    // Same error for unknown phone and wrong password.
    let unauthorized = || err(StatusCode::UNAUTHORIZED, "Invalid phone or password");
    let account = account.ok_or_else(unauthorized)?;
    let given = auth::credential_hash(&state.cfg.auth_secret, &canonical, &body.password);
    if !auth::admin_token_ok(&account.credential, &given) {
        return Err(unauthorized());
    }

    let token = auth::issue_token(&state.cfg.auth_secret, account.id, &canonical);
    Ok(Json(ApiResponse::success(AuthResponse { account, token })))
}
