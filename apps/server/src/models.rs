use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ── Availability configuration document ──

/// Slot label rendering: 12-hour "05:30 PM" or 24-hour "17:30".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TimeFormat {
    #[default]
    #[serde(rename = "12hour")]
    TwelveHour,
    #[serde(rename = "24hour")]
    TwentyFourHour,
}

/// One weekday's opening hours.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayHours {
    pub enabled: bool,
    /// "HH:MM" 24-hour.
    pub start_time: String,
    /// "HH:MM" 24-hour, exclusive.
    pub end_time: String,
    /// Slot width in minutes.
    pub slot_duration: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DisplaySettings {
    #[serde(default)]
    pub time_format: TimeFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockedDate {
    pub reason: String,
    pub blocked_at: String,
}

/// The whole availability document, stored as one JSON blob in `settings`
/// and replaced atomically by the admin update endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityConfig {
    /// Weekday name ("Sunday".."Saturday") → hours.
    pub business_hours: BTreeMap<String, DayHours>,
    #[serde(default)]
    pub settings: DisplaySettings,
    /// "YYYY-MM-DD" → block info.
    #[serde(default)]
    pub blocked_dates: BTreeMap<String, BlockedDate>,
}

impl AvailabilityConfig {
    /// Compiled-in fallback used when no document has been saved yet.
    pub fn fallback() -> Self {
        let mut business_hours = BTreeMap::new();
        business_hours.insert(
            "Saturday".to_string(),
            DayHours {
                enabled: true,
                start_time: "08:00".into(),
                end_time: "18:00".into(),
                slot_duration: 30,
            },
        );
        business_hours.insert(
            "Tuesday".to_string(),
            DayHours {
                enabled: true,
                start_time: "15:30".into(),
                end_time: "16:30".into(),
                slot_duration: 30,
            },
        );
        business_hours.insert(
            "Thursday".to_string(),
            DayHours {
                enabled: true,
                start_time: "15:30".into(),
                end_time: "16:30".into(),
                slot_duration: 30,
            },
        );
        Self {
            business_hours,
            settings: DisplaySettings::default(),
            blocked_dates: BTreeMap::new(),
        }
    }

    /// Validate the document before it replaces the stored one.
    pub fn validate(&self) -> Result<(), String> {
        for (day, hours) in &self.business_hours {
            if !hours.enabled {
                continue;
            }
            let start = crate::slots::parse_hm(&hours.start_time)
                .ok_or_else(|| format!("{day}: bad start_time '{}'", hours.start_time))?;
            let end = crate::slots::parse_hm(&hours.end_time)
                .ok_or_else(|| format!("{day}: bad end_time '{}'", hours.end_time))?;
            if start >= end {
                return Err(format!("{day}: start_time must be before end_time"));
            }
            if hours.slot_duration == 0 {
                return Err(format!("{day}: slot_duration must be positive"));
            }
        }
        for date in self.blocked_dates.keys() {
            if chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err() {
                return Err(format!("blocked date '{date}' is not YYYY-MM-DD"));
            }
        }
        Ok(())
    }
}

// ── Store rows ──

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Booking {
    pub id: i64,
    pub name: String,
    pub phone: String,
    /// Composite "YYYY-MM-DD HH:MM AM/PM" — the uniqueness key.
    pub time_slot: String,
    pub notes: Option<String>,
    pub created_at: String,
    pub account_id: Option<i64>,
    pub reminder_sent: bool,
    pub reminder_sent_at: Option<String>,
    pub added_to_payment_sheet: bool,
    pub added_to_payment_sheet_at: Option<String>,
    /// 'pending' | 'paid'
    pub payment_status: String,
    /// 'pending' | 'cash' | 'card'
    pub payment_method: String,
    pub payment_confirmed_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Account {
    pub id: i64,
    /// Canonical "+<cc><subscriber>" form.
    pub phone: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub credential: String,
    pub created_at: String,
    pub booking_count: i64,
}

// ── API request/response types ──

#[derive(Debug, Deserialize)]
pub struct SlotsQuery {
    pub date: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct SlotStatus {
    pub time: String,
    pub available: bool,
}

#[derive(Debug, Serialize)]
pub struct SlotsResponse {
    pub date: String,
    pub bookable: bool,
    pub slots: Vec<SlotStatus>,
}

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub name: String,
    pub phone: String,
    /// "YYYY-MM-DD"
    pub date: String,
    /// Slot label as offered by GET /api/slots, e.g. "05:30 PM".
    pub time: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateBookingRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub time_slot: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BookingsQuery {
    pub date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub name: String,
    pub phone: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub phone: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub account: Account,
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct PaymentUpdateRequest {
    pub booking_id: i64,
    /// 'cash' | 'card', or 'pending' with method_only to revert the method.
    pub payment_method: String,
    pub payment_date: Option<String>,
    #[serde(default)]
    pub method_only: bool,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub ok: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_config_validates() {
        assert!(AvailabilityConfig::fallback().validate().is_ok());
    }

    #[test]
    fn validate_rejects_inverted_hours() {
        let mut cfg = AvailabilityConfig::fallback();
        cfg.business_hours.get_mut("Saturday").unwrap().end_time = "07:00".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_duration() {
        let mut cfg = AvailabilityConfig::fallback();
        cfg.business_hours
            .get_mut("Saturday")
            .unwrap()
            .slot_duration = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_ignores_disabled_days() {
        let mut cfg = AvailabilityConfig::fallback();
        let sat = cfg.business_hours.get_mut("Saturday").unwrap();
        sat.enabled = false;
        sat.start_time = "garbage".into();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_blocked_date() {
        let mut cfg = AvailabilityConfig::fallback();
        cfg.blocked_dates.insert(
            "23/08/2025".into(),
            BlockedDate {
                reason: "holiday".into(),
                blocked_at: "2025-08-01 10:00:00".into(),
            },
        );
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn time_format_serde_names() {
        assert_eq!(
            serde_json::to_string(&TimeFormat::TwelveHour).unwrap(),
            "\"12hour\""
        );
        assert_eq!(
            serde_json::from_str::<TimeFormat>("\"24hour\"").unwrap(),
            TimeFormat::TwentyFourHour
        );
    }
}
