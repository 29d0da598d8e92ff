//! Outbound notification channels.
//!
//! Both channels sit behind traits so the lifecycle engine and its tests
//! never touch SMTP or Twilio directly.

pub mod email;
pub mod sms;

use async_trait::async_trait;

/// Operator-facing email (booking alerts, cancellation snapshots,
/// payment-row confirmations).
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, subject: &str, html_body: &str) -> anyhow::Result<()>;
}

/// Customer-facing SMS (booking confirmations, 24h reminders).
#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send(&self, to: &str, body: &str) -> anyhow::Result<()>;
}

/// Stand-ins used when a channel is not configured; messages are dropped
/// with a log line instead of failing the request.
pub struct NullMailer;

#[async_trait]
impl Mailer for NullMailer {
    async fn send(&self, subject: &str, _html_body: &str) -> anyhow::Result<()> {
        tracing::warn!(subject, "SMTP not configured, email dropped");
        Ok(())
    }
}

pub struct NullSms;

#[async_trait]
impl SmsSender for NullSms {
    async fn send(&self, to: &str, _body: &str) -> anyhow::Result<()> {
        tracing::warn!(to, "Twilio not configured, sms dropped");
        Ok(())
    }
}
