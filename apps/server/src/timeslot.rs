//! The composite time-slot string "YYYY-MM-DD HH:MM AM/PM".
//!
//! This string is the booking's identity: conflict checks, sheet lookups and
//! sweep math all go through it, so every producer must use `compose` and
//! every consumer must accept exactly what `parse` accepts.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};

/// Join a date and a slot label into the stored composite form.
pub fn compose(date: &str, label: &str) -> String {
    format!("{date} {label}")
}

/// Parse a composite slot back into a wall-clock datetime.
///
/// Expects exactly three space-separated parts; 24-hour labels (no meridiem)
/// are not composite slots and return None.
pub fn parse(slot: &str) -> Option<NaiveDateTime> {
    let mut parts = slot.split(' ');
    let date = parts.next()?;
    let time = parts.next()?;
    let meridiem = parts.next()?;
    if parts.next().is_some() {
        return None;
    }

    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
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
    Some(date.and_time(NaiveTime::from_hms_opt(h24, m, 0)?))
}

/// "23 August 2025" — the payment sheet's date column.
pub fn sheet_date(date: NaiveDate) -> String {
    format!("{} {} {}", date.day(), month_name(date.month()), date.year())
}

/// "23, August, Saturday" — the human date used in notification copy.
pub fn readable_date(date: NaiveDate) -> String {
    format!(
        "{}, {}, {}",
        date.day(),
        month_name(date.month()),
        crate::slots::weekday_name(date)
    )
}

/// The "HH:MM AM/PM" part of a composite slot, or the slot itself when it
/// does not parse.
pub fn time_of_day(slot: &str) -> &str {
    match slot.split_once(' ') {
        Some((_, rest)) => rest,
        None => slot,
    }
}

fn month_name(month: u32) -> &'static str {
    match month {
        1 => "January",
        2 => "February",
        3 => "March",
        4 => "April",
        5 => "May",
        6 => "June",
        7 => "July",
        8 => "August",
        9 => "September",
        10 => "October",
        11 => "November",
        _ => "December",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_afternoon_slot() {
        let dt = parse("2025-08-23 05:30 PM").unwrap();
        assert_eq!(dt.to_string(), "2025-08-23 17:30:00");
    }

    #[test]
    fn parses_noon_and_midnight() {
        assert_eq!(
            parse("2025-08-23 12:00 PM").unwrap().to_string(),
            "2025-08-23 12:00:00"
        );
        assert_eq!(
            parse("2025-08-23 12:00 AM").unwrap().to_string(),
            "2025-08-23 00:00:00"
        );
    }

    #[test]
    fn rejects_malformed_slots() {
        assert!(parse("2025-08-23 17:30").is_none());
        assert!(parse("2025-08-23 05:30 pm").is_none());
        assert!(parse("2025-08-23 05:30 PM extra").is_none());
        assert!(parse("2025-13-01 05:30 PM").is_none());
        assert!(parse("2025-08-23 13:30 PM").is_none());
        assert!(parse("").is_none());
    }

    #[test]
    fn compose_then_parse_round_trips() {
        let slot = compose("2025-08-23", "08:30 AM");
        assert_eq!(slot, "2025-08-23 08:30 AM");
        assert_eq!(parse(&slot).unwrap().to_string(), "2025-08-23 08:30:00");
    }

    #[test]
    fn sheet_and_readable_dates() {
        let date = NaiveDate::from_ymd_opt(2025, 8, 23).unwrap();
        assert_eq!(sheet_date(date), "23 August 2025");
        assert_eq!(readable_date(date), "23, August, Saturday");
    }

    #[test]
    fn time_of_day_extracts_label() {
        assert_eq!(time_of_day("2025-08-23 05:30 PM"), "05:30 PM");
        assert_eq!(time_of_day("oddball"), "oddball");
    }
}
