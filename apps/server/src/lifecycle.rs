//! Booking lifecycle: creation side effects, the reminder and completion
//! sweeps, and cancellation.
//!
//! Every external side effect is best-effort. A booking row is claimed by a
//! conditional update before its side effect runs, so two overlapping sweeps
//! can never send the same reminder or append the same payment row twice.

use chrono::NaiveDateTime;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::models::Booking;
use crate::notify::{Mailer, SmsSender};
use crate::sheets::{BackupRow, PaymentRow, SheetLedger};
use crate::timeslot;

#[derive(Clone)]
pub struct Services {
    pub mailer: Arc<dyn Mailer>,
    pub sms: Arc<dyn SmsSender>,
    pub sheets: Arc<dyn SheetLedger>,
}

/// Reminder fires when the appointment is 23.75 to 24.25 hours out. The
/// half-hour width covers sweep jitter on a one-minute cadence.
pub fn reminder_due(hours_until: f64) -> bool {
    (23.75..=24.25).contains(&hours_until)
}

/// Completion fires 30 to 45 minutes after the appointment started.
pub fn completion_due(minutes_since_start: i64) -> bool {
    (30..=45).contains(&minutes_since_start)
}

/// Side effects for a freshly inserted booking: operator email, customer
/// confirmation SMS, backup sheet row, account booking counter.
pub async fn on_booking_created(
    db: &SqlitePool,
    services: &Services,
    cfg: &AppConfig,
    booking: &Booking,
) {
    let when = describe_slot(&booking.time_slot);

    let subject = format!("New booking: {} on {when}", booking.name);
    let body = format!(
        "<h3>New booking</h3>\
         <p><b>Name:</b> {}<br>\
         <b>Phone:</b> {}<br>\
         <b>Time:</b> {when}<br>\
         <b>Notes:</b> {}</p>",
        booking.name,
        booking.phone,
        booking.notes.as_deref().unwrap_or("-"),
    );
    if let Err(err) = services.mailer.send(&subject, &body).await {
        tracing::warn!(booking_id = booking.id, %err, "booking email failed");
    }

    let sms = format!(
        "Hi {}, your {} appointment is confirmed for {when}. {} See you there!",
        booking.name, cfg.shop_name, cfg.shop_address,
    );
    if let Err(err) = services.sms.send(&booking.phone, &sms).await {
        tracing::warn!(booking_id = booking.id, %err, "confirmation sms failed");
    }

    let row = BackupRow {
        timestamp: booking.created_at.clone(),
        name: booking.name.clone(),
        phone: booking.phone.clone(),
        time_slot: booking.time_slot.clone(),
        notes: booking.notes.clone().unwrap_or_default(),
        booking_id: booking.id,
    };
    if let Err(err) = services.sheets.append_backup_row(row).await {
        tracing::warn!(booking_id = booking.id, %err, "backup sheet append failed");
    }

    if let Some(account_id) = booking.account_id {
        if let Err(err) =
            sqlx::query("UPDATE accounts SET booking_count = booking_count + 1 WHERE id = ?")
                .bind(account_id)
                .execute(db)
                .await
        {
            tracing::warn!(account_id, %err, "booking counter bump failed");
        }
    }
}

/// Side effects after a booking row has been deleted. Works from a snapshot
/// taken before the delete.
pub async fn on_booking_cancelled(services: &Services, cfg: &AppConfig, snapshot: &Booking) {
    if let Err(err) = services.sheets.delete_backup_row(snapshot.id).await {
        tracing::warn!(booking_id = snapshot.id, %err, "backup row delete failed");
    }

    let when = describe_slot(&snapshot.time_slot);
    let subject = format!("Booking Cancelled - {}", snapshot.name);
    let body = format!(
        "<h3>Booking cancelled</h3>\
         <p><b>Name:</b> {}<br>\
         <b>Phone:</b> {}<br>\
         <b>Time:</b> {when}<br>\
         <b>Notes:</b> {}</p>\
         <p>The slot is open again on the {} schedule.</p>",
        snapshot.name,
        snapshot.phone,
        snapshot.notes.as_deref().unwrap_or("-"),
        cfg.shop_name,
    );
    if let Err(err) = services.mailer.send(&subject, &body).await {
        tracing::warn!(booking_id = snapshot.id, %err, "cancellation email failed");
    }

    tracing::info!(
        booking_id = snapshot.id,
        time_slot = %snapshot.time_slot,
        "booking cancelled"
    );
}

/// Scan for bookings whose appointment is ~24h out and text a reminder.
/// Returns the number of reminders sent. Stateless between runs.
pub async fn run_reminder_sweep(
    db: &SqlitePool,
    services: &Services,
    cfg: &AppConfig,
    now: NaiveDateTime,
) -> anyhow::Result<u32> {
    let pending: Vec<Booking> =
        sqlx::query_as("SELECT * FROM bookings WHERE reminder_sent = 0")
            .fetch_all(db)
            .await?;

    let mut sent = 0u32;
    for booking in pending {
        let Some(starts_at) = timeslot::parse(&booking.time_slot) else {
            tracing::warn!(
                booking_id = booking.id,
                time_slot = %booking.time_slot,
                "skipping unparseable time slot"
            );
            continue;
        };
        let hours_until = (starts_at - now).num_minutes() as f64 / 60.0;
        if !reminder_due(hours_until) {
            continue;
        }

        // Claim before sending; a concurrent sweep loses the update race.
        let claimed = sqlx::query(
            "UPDATE bookings SET reminder_sent = 1, reminder_sent_at = ?
             WHERE id = ? AND reminder_sent = 0",
        )
        .bind(cfg.local_timestamp())
        .bind(booking.id)
        .execute(db)
        .await?;
        if claimed.rows_affected() != 1 {
            continue;
        }

        let when = describe_slot(&booking.time_slot);
        let body = format!(
            "Hi {}, a reminder that your {} appointment is tomorrow, {when}. \
             Reply or call {} if you need to reschedule.",
            booking.name, cfg.shop_name, cfg.shop_phone,
        );
        match services.sms.send(&booking.phone, &body).await {
            Ok(()) => {
                sent += 1;
                tracing::info!(booking_id = booking.id, "reminder sent");
            }
            Err(err) => {
                tracing::warn!(booking_id = booking.id, %err, "reminder sms failed");
            }
        }
    }
    Ok(sent)
}

/// Scan for appointments that started 30-45 minutes ago and append their
/// payment rows. Returns the number of rows appended.
pub async fn run_completion_sweep(
    db: &SqlitePool,
    services: &Services,
    cfg: &AppConfig,
    now: NaiveDateTime,
) -> anyhow::Result<u32> {
    let pending: Vec<Booking> = sqlx::query_as(
        "SELECT * FROM bookings WHERE added_to_payment_sheet = 0 AND payment_status = 'pending'",
    )
    .fetch_all(db)
    .await?;

    let mut added = 0u32;
    for booking in pending {
        let Some(starts_at) = timeslot::parse(&booking.time_slot) else {
            tracing::warn!(
                booking_id = booking.id,
                time_slot = %booking.time_slot,
                "skipping unparseable time slot"
            );
            continue;
        };
        if !completion_due((now - starts_at).num_minutes()) {
            continue;
        }

        let claimed = sqlx::query(
            "UPDATE bookings SET added_to_payment_sheet = 1, added_to_payment_sheet_at = ?
             WHERE id = ? AND added_to_payment_sheet = 0",
        )
        .bind(cfg.local_timestamp())
        .bind(booking.id)
        .execute(db)
        .await?;
        if claimed.rows_affected() != 1 {
            continue;
        }

        // Method column starts blank; the stored method is still 'pending'.
        let row = PaymentRow {
            appointment_date: timeslot::sheet_date(starts_at.date()),
            paid_date: String::new(),
            name: booking.name.clone(),
            price: cfg.price_label.clone(),
            method: String::new(),
        };
        if let Err(err) = services.sheets.append_payment_row(row).await {
            tracing::warn!(booking_id = booking.id, %err, "payment row append failed");
            continue;
        }
        added += 1;

        let subject = format!("Appointment completed: {}", booking.name);
        let body = format!(
            "<p>{}'s appointment on {} is done and is now on the payment sheet.</p>\
             <p><a href=\"{}\">Record the payment</a></p>",
            booking.name,
            describe_slot(&booking.time_slot),
            cfg.admin_panel_url,
        );
        if let Err(err) = services.mailer.send(&subject, &body).await {
            tracing::warn!(booking_id = booking.id, %err, "completion email failed");
        }
        tracing::info!(booking_id = booking.id, "payment row added");
    }
    Ok(added)
}

/// "23, August, Saturday at 05:30 PM" for notification copy; falls back to
/// the raw slot when it does not parse.
fn describe_slot(slot: &str) -> String {
    match timeslot::parse(slot) {
        Some(dt) => format!(
            "{} at {}",
            timeslot::readable_date(dt.date()),
            timeslot::time_of_day(slot)
        ),
        None => slot.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingMailer {
        subjects: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, subject: &str, _html_body: &str) -> anyhow::Result<()> {
            self.subjects.lock().unwrap().push(subject.to_string());
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingSms {
        messages: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl SmsSender for RecordingSms {
        async fn send(&self, to: &str, body: &str) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("carrier rejected");
            }
            self.messages
                .lock()
                .unwrap()
                .push((to.to_string(), body.to_string()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingSheets {
        backup: Mutex<Vec<BackupRow>>,
        deleted: Mutex<Vec<i64>>,
        payments: Mutex<Vec<PaymentRow>>,
    }

    #[async_trait]
    impl SheetLedger for RecordingSheets {
        async fn append_backup_row(&self, row: BackupRow) -> anyhow::Result<()> {
            self.backup.lock().unwrap().push(row);
            Ok(())
        }
        async fn delete_backup_row(&self, booking_id: i64) -> anyhow::Result<()> {
            self.deleted.lock().unwrap().push(booking_id);
            Ok(())
        }
        async fn append_payment_row(&self, row: PaymentRow) -> anyhow::Result<()> {
            self.payments.lock().unwrap().push(row);
            Ok(())
        }
        async fn set_payment_method(&self, _: &str, _: &str, _: &str) -> anyhow::Result<()> {
            Ok(())
        }
        async fn set_payment_date(&self, _: &str, _: &str, _: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn test_config() -> AppConfig {
        std::env::set_var("ADMIN_TOKEN", "test-admin");
        std::env::set_var("AUTH_SECRET", "test-secret");
        AppConfig::from_env()
    }

    fn services() -> (
        Services,
        Arc<RecordingMailer>,
        Arc<RecordingSms>,
        Arc<RecordingSheets>,
    ) {
        let mailer = Arc::new(RecordingMailer::default());
        let sms = Arc::new(RecordingSms::default());
        let sheets = Arc::new(RecordingSheets::default());
        (
            Services {
                mailer: mailer.clone(),
                sms: sms.clone(),
                sheets: sheets.clone(),
            },
            mailer,
            sms,
            sheets,
        )
    }

    async fn insert_booking(db: &SqlitePool, name: &str, time_slot: &str) -> i64 {
        sqlx::query(
            "INSERT INTO bookings (name, phone, time_slot, created_at)
             VALUES (?, '+61402098123', ?, '2025-08-20 10:00:00')",
        )
        .bind(name)
        .bind(time_slot)
        .execute(db)
        .await
        .unwrap()
        .last_insert_rowid()
    }

    async fn fetch(db: &SqlitePool, id: i64) -> Booking {
        sqlx::query_as("SELECT * FROM bookings WHERE id = ?")
            .bind(id)
            .fetch_one(db)
            .await
            .unwrap()
    }

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn reminder_window_bounds() {
        assert!(reminder_due(23.75));
        assert!(reminder_due(24.0));
        // 24h03m out is inside the ±15 minute tolerance.
        assert!(reminder_due(24.05));
        assert!(reminder_due(24.25));
        assert!(!reminder_due(23.74));
        assert!(!reminder_due(24.26));
        assert!(!reminder_due(-1.0));
    }

    #[test]
    fn completion_window_bounds() {
        assert!(completion_due(30));
        assert!(completion_due(45));
        assert!(!completion_due(29));
        assert!(!completion_due(46));
        assert!(!completion_due(-10));
    }

    #[tokio::test]
    async fn reminder_sweep_sends_once() {
        let db = crate::db::test_pool().await;
        let (services, _, sms, _) = services();
        let cfg = test_config();
        let id = insert_booking(&db, "Sam", "2025-08-23 05:30 PM").await;

        // 24h before the appointment.
        let now = at("2025-08-22 17:30:00");
        assert_eq!(run_reminder_sweep(&db, &services, &cfg, now).await.unwrap(), 1);
        let booking = fetch(&db, id).await;
        assert!(booking.reminder_sent);
        assert!(booking.reminder_sent_at.is_some());
        assert_eq!(sms.messages.lock().unwrap().len(), 1);

        // A second run is a no-op.
        assert_eq!(run_reminder_sweep(&db, &services, &cfg, now).await.unwrap(), 0);
        assert_eq!(sms.messages.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reminder_sweep_covers_quarter_hour_tolerance() {
        let db = crate::db::test_pool().await;
        let (services, _, sms, _) = services();
        let cfg = test_config();
        let near = insert_booking(&db, "Sam", "2025-08-23 05:30 PM").await;
        let far = insert_booking(&db, "Alex", "2025-08-23 05:47 PM").await;

        // Sam is 24h03m out (inside the tolerance); Alex is 24h20m out.
        let now = at("2025-08-22 17:27:00");
        assert_eq!(run_reminder_sweep(&db, &services, &cfg, now).await.unwrap(), 1);
        assert!(fetch(&db, near).await.reminder_sent);
        assert!(!fetch(&db, far).await.reminder_sent);
        assert_eq!(sms.messages.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reminder_sweep_skips_outside_window() {
        let db = crate::db::test_pool().await;
        let (services, _, sms, _) = services();
        let cfg = test_config();
        let id = insert_booking(&db, "Sam", "2025-08-23 05:30 PM").await;

        // 26h out: too early.
        let now = at("2025-08-22 15:30:00");
        assert_eq!(run_reminder_sweep(&db, &services, &cfg, now).await.unwrap(), 0);
        assert!(!fetch(&db, id).await.reminder_sent);
        assert!(sms.messages.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn reminder_claim_survives_send_failure() {
        let db = crate::db::test_pool().await;
        let mailer = Arc::new(RecordingMailer::default());
        let sms = Arc::new(RecordingSms {
            fail: true,
            ..Default::default()
        });
        let sheets = Arc::new(RecordingSheets::default());
        let services = Services {
            mailer,
            sms,
            sheets,
        };
        let cfg = test_config();
        let id = insert_booking(&db, "Sam", "2025-08-23 05:30 PM").await;

        let now = at("2025-08-22 17:30:00");
        assert_eq!(run_reminder_sweep(&db, &services, &cfg, now).await.unwrap(), 0);
        // Flag stays set so a flapping carrier cannot cause repeat sends.
        assert!(fetch(&db, id).await.reminder_sent);
    }

    #[tokio::test]
    async fn reminder_sweep_tolerates_bad_slots() {
        let db = crate::db::test_pool().await;
        let (services, _, _, _) = services();
        let cfg = test_config();
        let bad = insert_booking(&db, "Sam", "not a slot").await;
        let good = insert_booking(&db, "Alex", "2025-08-23 05:30 PM").await;

        let now = at("2025-08-22 17:30:00");
        assert_eq!(run_reminder_sweep(&db, &services, &cfg, now).await.unwrap(), 1);
        assert!(!fetch(&db, bad).await.reminder_sent);
        assert!(fetch(&db, good).await.reminder_sent);
    }

    #[tokio::test]
    async fn completion_sweep_appends_payment_row_once() {
        let db = crate::db::test_pool().await;
        let (services, mailer, _, sheets) = services();
        let cfg = test_config();
        let id = insert_booking(&db, "Sam", "2025-08-23 05:30 PM").await;

        // 35 minutes after start.
        let now = at("2025-08-23 18:05:00");
        assert_eq!(
            run_completion_sweep(&db, &services, &cfg, now).await.unwrap(),
            1
        );
        let booking = fetch(&db, id).await;
        assert!(booking.added_to_payment_sheet);
        assert_eq!(booking.payment_status, "pending");

        let payments = sheets.payments.lock().unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].appointment_date, "23 August 2025");
        assert_eq!(payments[0].paid_date, "");
        assert_eq!(payments[0].name, "Sam");
        assert_eq!(payments[0].price, "$20");
        assert_eq!(payments[0].method, "");
        drop(payments);
        assert_eq!(mailer.subjects.lock().unwrap().len(), 1);

        assert_eq!(
            run_completion_sweep(&db, &services, &cfg, now).await.unwrap(),
            0
        );
        assert_eq!(sheets.payments.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn completion_sweep_respects_window() {
        let db = crate::db::test_pool().await;
        let (services, _, _, sheets) = services();
        let cfg = test_config();
        insert_booking(&db, "Sam", "2025-08-23 05:30 PM").await;

        // 20 minutes after start: too soon.
        let now = at("2025-08-23 17:50:00");
        assert_eq!(
            run_completion_sweep(&db, &services, &cfg, now).await.unwrap(),
            0
        );
        // An hour after start: window missed, stays pending forever.
        let now = at("2025-08-23 18:30:00");
        assert_eq!(
            run_completion_sweep(&db, &services, &cfg, now).await.unwrap(),
            0
        );
        assert!(sheets.payments.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn created_side_effects_fire() {
        let db = crate::db::test_pool().await;
        let (services, mailer, sms, sheets) = services();
        let cfg = test_config();

        sqlx::query(
            "INSERT INTO accounts (phone, name, credential, created_at)
             VALUES ('+61402098123', 'Sam', 'x', '2025-08-01 09:00:00')",
        )
        .execute(&db)
        .await
        .unwrap();
        let id = insert_booking(&db, "Sam", "2025-08-23 05:30 PM").await;
        sqlx::query("UPDATE bookings SET account_id = 1 WHERE id = ?")
            .bind(id)
            .execute(&db)
            .await
            .unwrap();
        let booking = fetch(&db, id).await;

        on_booking_created(&db, &services, &cfg, &booking).await;

        assert_eq!(mailer.subjects.lock().unwrap().len(), 1);
        assert_eq!(sms.messages.lock().unwrap()[0].0, "+61402098123");
        let backup = sheets.backup.lock().unwrap();
        assert_eq!(backup.len(), 1);
        assert_eq!(backup[0].booking_id, id);
        assert_eq!(backup[0].time_slot, "2025-08-23 05:30 PM");
        drop(backup);

        let count: i64 = sqlx::query_scalar("SELECT booking_count FROM accounts WHERE id = 1")
            .fetch_one(&db)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn cancelled_side_effects_fire() {
        let db = crate::db::test_pool().await;
        let (services, mailer, _, sheets) = services();
        let cfg = test_config();
        let id = insert_booking(&db, "Sam", "2025-08-23 05:30 PM").await;
        let snapshot = fetch(&db, id).await;
        sqlx::query("DELETE FROM bookings WHERE id = ?")
            .bind(id)
            .execute(&db)
            .await
            .unwrap();

        on_booking_cancelled(&services, &cfg, &snapshot).await;

        assert_eq!(*sheets.deleted.lock().unwrap(), vec![id]);
        let subjects = mailer.subjects.lock().unwrap();
        assert_eq!(subjects.len(), 1);
        assert!(subjects[0].contains("Booking Cancelled"));
        assert!(subjects[0].contains("Sam"));
    }
}
