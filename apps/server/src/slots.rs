//! Slot generation and day-level bookability.
//!
//! Slots are produced from a weekday's opening hours as fixed-width steps in
//! [start, end): a slot exists when its start fits strictly inside the window,
//! even if the appointment itself would run past closing.

use chrono::{Datelike, NaiveDate};
use std::collections::HashSet;

use crate::models::{AvailabilityConfig, DayHours, SlotStatus, TimeFormat};

/// Parse "HH:MM" (24-hour) into minutes since midnight.
pub fn parse_hm(value: &str) -> Option<u32> {
    let (h, m) = value.split_once(':')?;
    if h.is_empty() || h.len() > 2 || m.len() != 2 {
        return None;
    }
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.parse().ok()?;
    if h > 23 || m > 59 {
        return None;
    }
    Some(h * 60 + m)
}

/// Render minutes-since-midnight as a slot label.
///
/// 12-hour labels are zero-padded with an upper-case meridiem ("05:30 PM");
/// midnight is "12:00 AM" and noon "12:00 PM".
pub fn format_label(minutes: u32, format: TimeFormat) -> String {
    let h = minutes / 60;
    let m = minutes % 60;
    match format {
        TimeFormat::TwentyFourHour => format!("{h:02}:{m:02}"),
        TimeFormat::TwelveHour => {
            let meridiem = if h < 12 { "AM" } else { "PM" };
            let h12 = match h % 12 {
                0 => 12,
                other => other,
            };
            format!("{h12:02}:{m:02} {meridiem}")
        }
    }
}

/// Parse a slot label in either rendering back to minutes since midnight.
pub fn parse_label(label: &str) -> Option<u32> {
    match label.split_once(' ') {
        Some((time, meridiem)) => {
            let (h, m) = time.split_once(':')?;
            let h: u32 = h.parse().ok()?;
            let m: u32 = m.parse().ok()?;
            if !(1..=12).contains(&h) || m > 59 {
                return None;
            }
            let h24 = match meridiem {
                "AM" => h % 12,
                "PM" => (h % 12) + 12,
                _ => return None,
            };
            Some(h24 * 60 + m)
        }
        None => parse_hm(label),
    }
}

/// Canonical 12-hour rendering of a label, whichever format it arrived in.
/// Stored composites always use this form so conflict checks and the
/// lifecycle sweeps are unaffected by the display format.
pub fn canonical_label(label: &str) -> Option<String> {
    parse_label(label).map(|minutes| format_label(minutes, TimeFormat::TwelveHour))
}

/// All slot labels for one weekday's hours. Disabled or malformed hours
/// produce no slots.
pub fn generate_day_slots(hours: &DayHours, format: TimeFormat) -> Vec<String> {
    if !hours.enabled || hours.slot_duration == 0 {
        return Vec::new();
    }
    let (start, end) = match (parse_hm(&hours.start_time), parse_hm(&hours.end_time)) {
        (Some(s), Some(e)) if s < e => (s, e),
        _ => return Vec::new(),
    };
    let mut slots = Vec::new();
    let mut t = start;
    while t < end {
        slots.push(format_label(t, format));
        t += hours.slot_duration;
    }
    slots
}

/// Weekday name ("Sunday".."Saturday") for a date, used as the key into
/// `business_hours`.
pub fn weekday_name(date: NaiveDate) -> &'static str {
    match date.weekday() {
        chrono::Weekday::Sun => "Sunday",
        chrono::Weekday::Mon => "Monday",
        chrono::Weekday::Tue => "Tuesday",
        chrono::Weekday::Wed => "Wednesday",
        chrono::Weekday::Thu => "Thursday",
        chrono::Weekday::Fri => "Friday",
        chrono::Weekday::Sat => "Saturday",
    }
}

/// Whether a date can take bookings at all: strictly in the future, its
/// weekday enabled, and not individually blocked.
pub fn date_bookable(config: &AvailabilityConfig, date: &str, today: &str) -> bool {
    let Ok(parsed) = NaiveDate::parse_from_str(date, "%Y-%m-%d") else {
        return false;
    };
    if date <= today {
        return false;
    }
    if config.blocked_dates.contains_key(date) {
        return false;
    }
    config
        .business_hours
        .get(weekday_name(parsed))
        .map(|h| h.enabled)
        .unwrap_or(false)
}

/// Slot labels for a date with availability flags. A slot is taken when its
/// composite "date label" string appears in `booked`.
pub fn mark_availability(
    generated: Vec<String>,
    date: &str,
    booked: &HashSet<String>,
) -> Vec<SlotStatus> {
    generated
        .into_iter()
        .map(|label| {
            let canonical = canonical_label(&label).unwrap_or_else(|| label.clone());
            let composite = crate::timeslot::compose(date, &canonical);
            SlotStatus {
                available: !booked.contains(&composite),
                time: label,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hours(start: &str, end: &str, duration: u32) -> DayHours {
        DayHours {
            enabled: true,
            start_time: start.into(),
            end_time: end.into(),
            slot_duration: duration,
        }
    }

    #[test]
    fn parse_hm_accepts_valid() {
        assert_eq!(parse_hm("08:00"), Some(480));
        assert_eq!(parse_hm("23:59"), Some(1439));
        assert_eq!(parse_hm("0:05"), Some(5));
    }

    #[test]
    fn parse_hm_rejects_garbage() {
        assert_eq!(parse_hm("24:00"), None);
        assert_eq!(parse_hm("08:60"), None);
        assert_eq!(parse_hm("0800"), None);
        assert_eq!(parse_hm("08:0"), None);
        assert_eq!(parse_hm(""), None);
    }

    #[test]
    fn half_open_window_excludes_end() {
        let slots = generate_day_slots(&hours("08:00", "09:00", 30), TimeFormat::TwelveHour);
        assert_eq!(slots, vec!["08:00 AM", "08:30 AM"]);
    }

    #[test]
    fn uneven_duration_keeps_last_partial_slot() {
        // 17:45 starts inside the window even though it runs past 18:00.
        let slots = generate_day_slots(&hours("17:00", "18:00", 45), TimeFormat::TwentyFourHour);
        assert_eq!(slots, vec!["17:00", "17:45"]);
    }

    #[test]
    fn disabled_day_generates_nothing() {
        let mut h = hours("08:00", "18:00", 30);
        h.enabled = false;
        assert!(generate_day_slots(&h, TimeFormat::TwelveHour).is_empty());
    }

    #[test]
    fn inverted_hours_generate_nothing() {
        assert!(generate_day_slots(&hours("18:00", "08:00", 30), TimeFormat::TwelveHour).is_empty());
    }

    #[test]
    fn twelve_hour_labels() {
        assert_eq!(format_label(0, TimeFormat::TwelveHour), "12:00 AM");
        assert_eq!(format_label(510, TimeFormat::TwelveHour), "08:30 AM");
        assert_eq!(format_label(720, TimeFormat::TwelveHour), "12:00 PM");
        assert_eq!(format_label(1050, TimeFormat::TwelveHour), "05:30 PM");
    }

    #[test]
    fn twenty_four_hour_labels() {
        assert_eq!(format_label(0, TimeFormat::TwentyFourHour), "00:00");
        assert_eq!(format_label(1050, TimeFormat::TwentyFourHour), "17:30");
    }

    #[test]
    fn bookable_requires_future_enabled_unblocked() {
        let config = AvailabilityConfig::fallback();
        // 2025-08-23 is a Saturday.
        assert!(date_bookable(&config, "2025-08-23", "2025-08-20"));
        // Same day is not bookable.
        assert!(!date_bookable(&config, "2025-08-23", "2025-08-23"));
        // Past is not bookable.
        assert!(!date_bookable(&config, "2025-08-23", "2025-08-24"));
        // 2025-08-25 is a Monday, which the fallback config does not open.
        assert!(!date_bookable(&config, "2025-08-25", "2025-08-20"));
    }

    #[test]
    fn blocked_date_is_not_bookable() {
        let mut config = AvailabilityConfig::fallback();
        config.blocked_dates.insert(
            "2025-08-23".into(),
            crate::models::BlockedDate {
                reason: "away".into(),
                blocked_at: "2025-08-01 09:00:00".into(),
            },
        );
        assert!(!date_bookable(&config, "2025-08-23", "2025-08-20"));
    }

    #[test]
    fn parse_label_accepts_both_renderings() {
        assert_eq!(parse_label("05:30 PM"), Some(1050));
        assert_eq!(parse_label("17:30"), Some(1050));
        assert_eq!(parse_label("12:00 AM"), Some(0));
        assert_eq!(parse_label("00:00"), Some(0));
        assert_eq!(parse_label("13:30 PM"), None);
        assert_eq!(parse_label("17:30 XM"), None);
        assert_eq!(parse_label("garbage"), None);
    }

    #[test]
    fn canonical_label_normalizes_24_hour_display() {
        assert_eq!(canonical_label("17:30").as_deref(), Some("05:30 PM"));
        assert_eq!(canonical_label("05:30 PM").as_deref(), Some("05:30 PM"));
        assert_eq!(canonical_label("00:00").as_deref(), Some("12:00 AM"));
        assert_eq!(canonical_label("garbage"), None);
    }

    #[test]
    fn twenty_four_hour_composites_stay_sweepable() {
        // A booking made under the 24-hour display must still parse for
        // the reminder and completion sweeps.
        let canonical = canonical_label("17:30").unwrap();
        let slot = crate::timeslot::compose("2025-08-23", &canonical);
        assert_eq!(slot, "2025-08-23 05:30 PM");
        assert!(crate::timeslot::parse(&slot).is_some());
    }

    #[test]
    fn marking_matches_canonical_composites_under_24_hour_display() {
        let booked: HashSet<String> = ["2025-08-23 05:30 PM".to_string()].into();
        let marked = mark_availability(
            vec!["17:00".into(), "17:30".into()],
            "2025-08-23",
            &booked,
        );
        assert_eq!(
            marked,
            vec![
                SlotStatus {
                    time: "17:00".into(),
                    available: true
                },
                SlotStatus {
                    time: "17:30".into(),
                    available: false
                },
            ]
        );
    }

    #[test]
    fn marking_uses_composite_key() {
        let booked: HashSet<String> = ["2025-08-23 05:30 PM".to_string()].into();
        let marked = mark_availability(
            vec!["05:00 PM".into(), "05:30 PM".into()],
            "2025-08-23",
            &booked,
        );
        assert_eq!(
            marked,
            vec![
                SlotStatus {
                    time: "05:00 PM".into(),
                    available: true
                },
                SlotStatus {
                    time: "05:30 PM".into(),
                    available: false
                },
            ]
        );
    }
}
