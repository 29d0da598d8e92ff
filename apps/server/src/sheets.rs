//! Google Sheets ledgers.
//!
//! Two spreadsheets back the store: a booking backup sheet (one row per
//! booking, deleted on cancellation) and a payment sheet (one row per
//! completed appointment, updated in place when the admin records payment).
//! All writes are best-effort from the caller's point of view.

use async_trait::async_trait;
use serde_json::json;
use yup_oauth2::{ServiceAccountAuthenticator, ServiceAccountKey};

/// Backup sheet columns A..F.
#[derive(Debug, Clone)]
pub struct BackupRow {
    pub timestamp: String,
    pub name: String,
    pub phone: String,
    pub time_slot: String,
    pub notes: String,
    pub booking_id: i64,
}

/// Payment sheet columns A..E:
/// appointment date, paid date, name, price, method.
#[derive(Debug, Clone)]
pub struct PaymentRow {
    /// "D Month YYYY"
    pub appointment_date: String,
    /// Blank until the admin records payment.
    pub paid_date: String,
    pub name: String,
    pub price: String,
    pub method: String,
}

#[async_trait]
pub trait SheetLedger: Send + Sync {
    async fn append_backup_row(&self, row: BackupRow) -> anyhow::Result<()>;
    async fn delete_backup_row(&self, booking_id: i64) -> anyhow::Result<()>;
    async fn append_payment_row(&self, row: PaymentRow) -> anyhow::Result<()>;
    /// Write the method into column E of the payment row matching
    /// date + name.
    async fn set_payment_method(
        &self,
        appointment_date: &str,
        name: &str,
        method: &str,
    ) -> anyhow::Result<()>;
    /// Write the paid date into column B of the payment row matching
    /// date + name with an empty paid column.
    async fn set_payment_date(
        &self,
        appointment_date: &str,
        name: &str,
        paid_on: &str,
    ) -> anyhow::Result<()>;
}

/// Stand-in when no service-account key is configured; all operations are
/// dropped with a log line.
pub struct NullSheets;

#[async_trait]
impl SheetLedger for NullSheets {
    async fn append_backup_row(&self, row: BackupRow) -> anyhow::Result<()> {
        tracing::warn!(booking_id = row.booking_id, "Sheets not configured, backup row dropped");
        Ok(())
    }
    async fn delete_backup_row(&self, booking_id: i64) -> anyhow::Result<()> {
        tracing::warn!(booking_id, "Sheets not configured, delete dropped");
        Ok(())
    }
    async fn append_payment_row(&self, row: PaymentRow) -> anyhow::Result<()> {
        tracing::warn!(name = %row.name, "Sheets not configured, payment row dropped");
        Ok(())
    }
    async fn set_payment_method(&self, _: &str, _: &str, _: &str) -> anyhow::Result<()> {
        tracing::warn!("Sheets not configured, method update dropped");
        Ok(())
    }
    async fn set_payment_date(&self, _: &str, _: &str, _: &str) -> anyhow::Result<()> {
        tracing::warn!("Sheets not configured, date update dropped");
        Ok(())
    }
}

pub struct GoogleSheets {
    key: ServiceAccountKey,
    http: reqwest::Client,
    booking_sheet_id: String,
    payment_sheet_id: String,
}

const SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";

impl GoogleSheets {
    pub async fn from_key_file(
        path: &str,
        booking_sheet_id: &str,
        payment_sheet_id: &str,
    ) -> anyhow::Result<Self> {
        let key = yup_oauth2::read_service_account_key(path).await?;
        Ok(Self {
            key,
            http: reqwest::Client::new(),
            booking_sheet_id: booking_sheet_id.to_string(),
            payment_sheet_id: payment_sheet_id.to_string(),
        })
    }

    async fn access_token(&self) -> anyhow::Result<String> {
        let auth = ServiceAccountAuthenticator::builder(self.key.clone())
            .build()
            .await?;
        let token = auth.token(&[SCOPE]).await?;
        token
            .token()
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("service account returned no access token"))
    }

    async fn append(&self, sheet_id: &str, values: Vec<serde_json::Value>) -> anyhow::Result<()> {
        let token = self.access_token().await?;
        let url = format!(
            "{BASE}/{sheet_id}/values/A:F:append?valueInputOption=RAW&insertDataOption=INSERT_ROWS"
        );
        let response = self
            .http
            .post(&url)
            .bearer_auth(&token)
            .json(&json!({ "values": [values] }))
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            anyhow::bail!("sheets append returned {status}");
        }
        Ok(())
    }

    async fn read_rows(&self, sheet_id: &str, range: &str) -> anyhow::Result<Vec<Vec<String>>> {
        let token = self.access_token().await?;
        let url = format!("{BASE}/{sheet_id}/values/{range}");
        let response = self
            .http
            .get(&url)
            .bearer_auth(&token)
            .send()
            .await?
            .error_for_status()?;
        let body: serde_json::Value = response.json().await?;
        let rows = body["values"]
            .as_array()
            .map(|rows| {
                rows.iter()
                    .map(|row| {
                        row.as_array()
                            .map(|cells| {
                                cells
                                    .iter()
                                    .map(|c| c.as_str().unwrap_or_default().to_string())
                                    .collect()
                            })
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(rows)
    }

    async fn write_cell(&self, sheet_id: &str, cell: &str, value: &str) -> anyhow::Result<()> {
        let token = self.access_token().await?;
        let url = format!("{BASE}/{sheet_id}/values/{cell}?valueInputOption=RAW");
        self.http
            .put(&url)
            .bearer_auth(&token)
            .json(&json!({ "values": [[value]] }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Latest row index (0-based) whose date and name columns match; when
    /// `require_unpaid` the paid column must also be empty. Bottom-up so a
    /// returning customer's newest appointment wins.
    fn find_payment_row(
        rows: &[Vec<String>],
        appointment_date: &str,
        name: &str,
        require_unpaid: bool,
    ) -> Option<usize> {
        rows.iter().enumerate().rev().find_map(|(i, row)| {
            let date_matches = row.first().is_some_and(|v| v == appointment_date);
            let name_matches = row.get(2).is_some_and(|v| v == name);
            let unpaid_ok =
                !require_unpaid || row.get(1).map(|v| v.is_empty()).unwrap_or(true);
            (date_matches && name_matches && unpaid_ok).then_some(i)
        })
    }
}

#[async_trait]
impl SheetLedger for GoogleSheets {
    async fn append_backup_row(&self, row: BackupRow) -> anyhow::Result<()> {
        self.append(
            &self.booking_sheet_id,
            vec![
                json!(row.timestamp),
                json!(row.name),
                json!(row.phone),
                json!(row.time_slot),
                json!(row.notes),
                json!(row.booking_id.to_string()),
            ],
        )
        .await
    }

    async fn delete_backup_row(&self, booking_id: i64) -> anyhow::Result<()> {
        let rows = self.read_rows(&self.booking_sheet_id, "A:F").await?;
        let id = booking_id.to_string();
        let Some(index) = rows
            .iter()
            .position(|row| row.get(5).is_some_and(|v| *v == id))
        else {
            tracing::warn!(booking_id, "backup row not found, nothing to delete");
            return Ok(());
        };

        let token = self.access_token().await?;
        let url = format!("{BASE}/{}/:batchUpdate", self.booking_sheet_id);
        self.http
            .post(&url)
            .bearer_auth(&token)
            .json(&json!({
                "requests": [{
                    "deleteDimension": {
                        "range": {
                            "sheetId": 0,
                            "dimension": "ROWS",
                            "startIndex": index,
                            "endIndex": index + 1
                        }
                    }
                }]
            }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn append_payment_row(&self, row: PaymentRow) -> anyhow::Result<()> {
        self.append(
            &self.payment_sheet_id,
            vec![
                json!(row.appointment_date),
                json!(row.paid_date),
                json!(row.name),
                json!(row.price),
                json!(row.method),
            ],
        )
        .await
    }

    async fn set_payment_method(
        &self,
        appointment_date: &str,
        name: &str,
        method: &str,
    ) -> anyhow::Result<()> {
        let rows = self.read_rows(&self.payment_sheet_id, "A:E").await?;
        let Some(index) = Self::find_payment_row(&rows, appointment_date, name, false) else {
            anyhow::bail!("no payment row for {name} on {appointment_date}");
        };
        self.write_cell(&self.payment_sheet_id, &format!("E{}", index + 1), method)
            .await
    }

    async fn set_payment_date(
        &self,
        appointment_date: &str,
        name: &str,
        paid_on: &str,
    ) -> anyhow::Result<()> {
        let rows = self.read_rows(&self.payment_sheet_id, "A:E").await?;
        let Some(index) = Self::find_payment_row(&rows, appointment_date, name, true) else {
            anyhow::bail!("no unpaid payment row for {name} on {appointment_date}");
        };
        self.write_cell(&self.payment_sheet_id, &format!("B{}", index + 1), paid_on)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(date: &str, paid: &str, name: &str) -> Vec<String> {
        vec![
            date.into(),
            paid.into(),
            name.into(),
            "$20".into(),
            String::new(),
        ]
    }

    #[test]
    fn payment_row_search_is_bottom_up() {
        let rows = vec![
            row("23 August 2025", "", "Sam"),
            row("23 August 2025", "", "Alex"),
            row("23 August 2025", "", "Sam"),
        ];
        assert_eq!(
            GoogleSheets::find_payment_row(&rows, "23 August 2025", "Sam", false),
            Some(2)
        );
    }

    #[test]
    fn unpaid_filter_skips_paid_rows() {
        let rows = vec![
            row("23 August 2025", "", "Sam"),
            row("23 August 2025", "24 August 2025", "Sam"),
        ];
        assert_eq!(
            GoogleSheets::find_payment_row(&rows, "23 August 2025", "Sam", true),
            Some(0)
        );
    }

    #[test]
    fn no_match_returns_none() {
        let rows = vec![row("23 August 2025", "", "Sam")];
        assert_eq!(
            GoogleSheets::find_payment_row(&rows, "24 August 2025", "Sam", false),
            None
        );
        assert_eq!(
            GoogleSheets::find_payment_row(&rows, "23 August 2025", "Alex", false),
            None
        );
    }
}
