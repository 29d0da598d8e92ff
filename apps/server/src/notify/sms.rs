use async_trait::async_trait;

use super::SmsSender;

/// Twilio Messages API client.
pub struct TwilioSms {
    http: reqwest::Client,
    account_sid: String,
    auth_token: String,
    from_number: String,
}

impl TwilioSms {
    pub fn new(account_sid: &str, auth_token: &str, from_number: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            account_sid: account_sid.to_string(),
            auth_token: auth_token.to_string(),
            from_number: from_number.to_string(),
        }
    }
}

#[async_trait]
impl SmsSender for TwilioSms {
    async fn send(&self, to: &str, body: &str) -> anyhow::Result<()> {
        let url = format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
            self.account_sid
        );
        let params = [("To", to), ("From", self.from_number.as_str()), ("Body", body)];
        let response = self
            .http
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&params)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            anyhow::bail!("twilio returned {status}: {detail}");
        }
        tracing::debug!(to, "sms sent");
        Ok(())
    }
}
