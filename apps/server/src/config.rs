use chrono::{FixedOffset, NaiveDateTime, Utc};
use std::env;

/// All runtime configuration, read once at startup.
///
/// Secrets (SMTP, Twilio, Google service account) are externalized; the
/// availability schedule itself lives in the store (see handlers::admin).
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,

    /// Bearer token for the admin dashboard endpoints.
    pub admin_token: String,
    /// HMAC key for account credentials and session tokens.
    pub auth_secret: String,

    /// Shop's local offset from UTC, in minutes. Appointments are wall-clock
    /// local times; all sweep threshold math happens in this offset.
    pub utc_offset_minutes: i32,
    /// Country calling code for phone canonicalization (no '+').
    pub country_code: String,

    pub operator_email: String,
    pub smtp_host: String,
    pub smtp_user: String,
    pub smtp_pass: String,

    pub twilio_account_sid: String,
    pub twilio_auth_token: String,
    pub twilio_from_number: String,

    /// Path to the Google service-account key JSON.
    pub sheets_key_path: String,
    /// Booking backup spreadsheet.
    pub booking_sheet_id: String,
    /// Payment tracking spreadsheet.
    pub payment_sheet_id: String,

    pub shop_name: String,
    pub shop_address: String,
    pub shop_phone: String,
    /// Fixed price label written to the payment sheet, e.g. "$20".
    pub price_label: String,
    /// Linked from the payment-confirmation email; optional.
    pub admin_panel_url: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:fadebook.db?mode=rwc".into()),
            admin_token: env::var("ADMIN_TOKEN").expect("ADMIN_TOKEN must be set"),
            auth_secret: env::var("AUTH_SECRET").expect("AUTH_SECRET must be set"),
            utc_offset_minutes: env::var("UTC_OFFSET_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(600), // Brisbane, no DST
            country_code: env::var("COUNTRY_CODE").unwrap_or_else(|_| "61".into()),
            operator_email: env::var("OPERATOR_EMAIL").unwrap_or_default(),
            smtp_host: env::var("SMTP_HOST").unwrap_or_else(|_| "smtp.gmail.com".into()),
            smtp_user: env::var("SMTP_USER").unwrap_or_default(),
            smtp_pass: env::var("SMTP_PASS").unwrap_or_default(),
            twilio_account_sid: env::var("TWILIO_ACCOUNT_SID").unwrap_or_default(),
            twilio_auth_token: env::var("TWILIO_AUTH_TOKEN").unwrap_or_default(),
            twilio_from_number: env::var("TWILIO_FROM_NUMBER").unwrap_or_default(),
            sheets_key_path: env::var("SHEETS_KEY_PATH").unwrap_or_default(),
            booking_sheet_id: env::var("BOOKING_SHEET_ID").unwrap_or_default(),
            payment_sheet_id: env::var("PAYMENT_SHEET_ID").unwrap_or_default(),
            shop_name: env::var("SHOP_NAME").unwrap_or_else(|_| "Fadebook".into()),
            shop_address: env::var("SHOP_ADDRESS").unwrap_or_default(),
            shop_phone: env::var("SHOP_PHONE").unwrap_or_default(),
            price_label: env::var("PRICE_LABEL").unwrap_or_else(|_| "$20".into()),
            admin_panel_url: env::var("ADMIN_PANEL_URL").unwrap_or_default(),
        }
    }

    /// Current wall-clock time in the shop's timezone.
    pub fn local_now(&self) -> NaiveDateTime {
        let offset = FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .unwrap_or_else(|| FixedOffset::east_opt(0).unwrap());
        Utc::now().with_timezone(&offset).naive_local()
    }

    /// "YYYY-MM-DD" for the shop's current day.
    pub fn local_today(&self) -> String {
        self.local_now().format("%Y-%m-%d").to_string()
    }

    /// Local timestamp string used for created_at and flag timestamps.
    pub fn local_timestamp(&self) -> String {
        self.local_now().format("%Y-%m-%d %H:%M:%S").to_string()
    }
}
