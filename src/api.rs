//! Backend API client
//!
//! Thin typed client over the Fayol HTTP API. Every authenticated call
//! can surface `ApiError::Unauthorized`, which callers must translate
//! into a session clear plus a re-login prompt.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::classifier::TransactionKind;
use crate::config::Settings;

/// Errors from backend API calls.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Token rejected; the session must be invalidated
    #[error("unauthorized")]
    Unauthorized,
    /// Login refused (wrong identifier or credential)
    #[error("invalid credentials")]
    InvalidCredentials,
    /// Any other non-success response
    #[error("API returned {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, truncated
        message: String,
    },
    /// Connection, DNS or timeout failure
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl ApiError {
    /// Whether the failure looks like the backend being unreachable,
    /// for offline-specific user wording.
    #[must_use]
    pub fn is_offline(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_connect() || e.is_timeout())
    }
}

/// User payload returned by authentication.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthUser {
    /// Backend user id
    pub id: String,
    /// Display name
    pub name: String,
    /// Onboarding progress, `None` once complete
    #[serde(rename = "onboardingStep")]
    pub onboarding_step: Option<u32>,
}

/// Successful authentication result.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthSuccess {
    /// Bearer token for subsequent calls
    #[serde(rename = "access_token")]
    pub token: String,
    /// The authenticated user
    pub user: AuthUser,
}

/// Fields patched onto the user's onboarding progress.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OnboardingPatch {
    /// New progress step
    pub step: u32,
    /// Display name, set during the name step
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Investor profile, set during the final step
    #[serde(rename = "investorProfile", skip_serializing_if = "Option::is_none")]
    pub investor_profile: Option<String>,
}

/// Account creation payload.
#[derive(Debug, Clone, Serialize)]
pub struct NewAccount {
    /// Account display name
    pub name: String,
    /// Account type (currently always "CHECKING")
    #[serde(rename = "type")]
    pub kind: String,
    /// Opening balance
    pub balance: f64,
}

/// Month-to-date totals for the balance summary.
#[derive(Debug, Clone, Deserialize)]
pub struct PeriodSummary {
    /// Income total
    pub income: f64,
    /// Expense total
    pub expense: f64,
    /// Income minus expense
    pub result: f64,
}

/// Dashboard balance summary.
#[derive(Debug, Clone, Deserialize)]
pub struct DashboardSummary {
    /// Balance across all accounts
    #[serde(rename = "totalBalance")]
    pub total_balance: f64,
    /// Current-month totals
    #[serde(rename = "periodSummary")]
    pub period: PeriodSummary,
}

/// One statement line.
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionEntry {
    /// Description
    pub description: String,
    /// Amount, always positive
    pub amount: f64,
    /// Transaction kind
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    /// ISO date of the transaction
    pub date: chrono::DateTime<chrono::Utc>,
}

/// Month-to-date spend for one category.
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryExpense {
    /// Category name
    pub name: String,
    /// Category emoji, if configured
    pub icon: Option<String>,
    /// Amount spent
    pub amount: f64,
}

/// One AI-generated insight.
#[derive(Debug, Clone, Deserialize)]
pub struct Insight {
    /// Severity tag: "warning", "success" or informational
    #[serde(rename = "type")]
    pub kind: String,
    /// The insight text
    pub text: String,
}

/// Downloadable report formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    /// Monthly consolidated PDF
    Pdf,
    /// Transaction spreadsheet
    Excel,
}

impl ReportFormat {
    fn as_query(self) -> &'static str {
        match self {
            Self::Pdf => "PDF",
            Self::Excel => "EXCEL",
        }
    }
}

/// Interface to the backend API.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// Whether an e-mail/phone identifier belongs to a registered user.
    async fn check_identifier_exists(&self, identifier: &str) -> Result<bool, ApiError>;
    /// Exchange identifier + credential for a token.
    async fn authenticate(
        &self,
        identifier: &str,
        credential: &str,
    ) -> Result<AuthSuccess, ApiError>;
    /// Patch the user's onboarding progress.
    async fn update_onboarding(&self, token: &str, patch: OnboardingPatch) -> Result<(), ApiError>;
    /// Create a financial account.
    async fn create_account(&self, token: &str, account: NewAccount) -> Result<(), ApiError>;
    /// Persist a transaction.
    async fn create_transaction(
        &self,
        token: &str,
        description: &str,
        amount: f64,
        kind: TransactionKind,
    ) -> Result<(), ApiError>;
    /// Balance and month-to-date totals.
    async fn dashboard_summary(&self, token: &str) -> Result<DashboardSummary, ApiError>;
    /// Most recent transactions, newest first.
    async fn recent_transactions(
        &self,
        token: &str,
        limit: usize,
    ) -> Result<Vec<TransactionEntry>, ApiError>;
    /// Current-month expenses grouped by category, largest first.
    async fn expenses_by_category(&self, token: &str) -> Result<Vec<CategoryExpense>, ApiError>;
    /// AI-generated insights.
    async fn insights(&self, token: &str) -> Result<Vec<Insight>, ApiError>;
    /// Download a monthly report in the given format.
    async fn download_report(
        &self,
        token: &str,
        format: ReportFormat,
    ) -> Result<Vec<u8>, ApiError>;
}

/// reqwest-based client against the configured backend URL.
pub struct HttpApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpApiClient {
    /// Build a client with the configured base URL and timeout.
    ///
    /// # Errors
    ///
    /// Fails if the underlying HTTP client cannot be constructed.
    pub fn new(settings: &Settings) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(settings.api_timeout())
            .build()?;
        Ok(Self {
            http,
            base_url: settings.api_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized);
        }
        let message = response.text().await.unwrap_or_default();
        let message = message.chars().take(200).collect();
        Err(ApiError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

#[derive(Deserialize)]
struct ExistsResponse {
    exists: bool,
}

#[async_trait]
impl ApiClient for HttpApiClient {
    async fn check_identifier_exists(&self, identifier: &str) -> Result<bool, ApiError> {
        let response = self
            .http
            .post(self.url("/auth/check-user"))
            .json(&serde_json::json!({ "identifier": identifier }))
            .send()
            .await?;
        let body: ExistsResponse = Self::check_status(response).await?.json().await?;
        Ok(body.exists)
    }

    async fn authenticate(
        &self,
        identifier: &str,
        credential: &str,
    ) -> Result<AuthSuccess, ApiError> {
        let response = self
            .http
            .post(self.url("/auth/login"))
            .json(&serde_json::json!({ "login": identifier, "password": credential }))
            .send()
            .await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(ApiError::InvalidCredentials);
        }
        Ok(Self::check_status(response).await?.json().await?)
    }

    async fn update_onboarding(&self, token: &str, patch: OnboardingPatch) -> Result<(), ApiError> {
        let response = self
            .http
            .patch(self.url("/users/onboarding"))
            .bearer_auth(token)
            .json(&patch)
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn create_account(&self, token: &str, account: NewAccount) -> Result<(), ApiError> {
        let response = self
            .http
            .post(self.url("/accounts"))
            .bearer_auth(token)
            .json(&account)
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn create_transaction(
        &self,
        token: &str,
        description: &str,
        amount: f64,
        kind: TransactionKind,
    ) -> Result<(), ApiError> {
        let response = self
            .http
            .post(self.url("/transactions"))
            .bearer_auth(token)
            .json(&serde_json::json!({
                "description": description,
                "amount": amount,
                "type": kind,
            }))
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn dashboard_summary(&self, token: &str) -> Result<DashboardSummary, ApiError> {
        let response = self
            .http
            .get(self.url("/dashboard/summary"))
            .bearer_auth(token)
            .send()
            .await?;
        Ok(Self::check_status(response).await?.json().await?)
    }

    async fn recent_transactions(
        &self,
        token: &str,
        limit: usize,
    ) -> Result<Vec<TransactionEntry>, ApiError> {
        let response = self
            .http
            .get(self.url("/dashboard/latest-transactions"))
            .query(&[("limit", limit)])
            .bearer_auth(token)
            .send()
            .await?;
        Ok(Self::check_status(response).await?.json().await?)
    }

    async fn expenses_by_category(&self, token: &str) -> Result<Vec<CategoryExpense>, ApiError> {
        let response = self
            .http
            .get(self.url("/dashboard/spending-by-category"))
            .bearer_auth(token)
            .send()
            .await?;
        Ok(Self::check_status(response).await?.json().await?)
    }

    async fn insights(&self, token: &str) -> Result<Vec<Insight>, ApiError> {
        let response = self
            .http
            .get(self.url("/ai/insights"))
            .bearer_auth(token)
            .send()
            .await?;
        Ok(Self::check_status(response).await?.json().await?)
    }

    async fn download_report(
        &self,
        token: &str,
        format: ReportFormat,
    ) -> Result<Vec<u8>, ApiError> {
        let response = self
            .http
            .get(self.url("/reports/export"))
            .query(&[("format", format.as_query())])
            .bearer_auth(token)
            .send()
            .await?;
        let bytes = Self::check_status(response).await?.bytes().await?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_payload_deserializes() {
        let json = r#"{
            "access_token": "tok123",
            "user": {"id": "u1", "name": "João", "onboardingStep": 2}
        }"#;
        let auth: AuthSuccess = serde_json::from_str(json).unwrap();
        assert_eq!(auth.token, "tok123");
        assert_eq!(auth.user.onboarding_step, Some(2));
    }

    #[test]
    fn test_onboarding_patch_skips_empty_fields() {
        let patch = OnboardingPatch {
            step: 2,
            name: Some("Ana".into()),
            investor_profile: None,
        };
        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json["step"], 2);
        assert_eq!(json["name"], "Ana");
        assert!(json.get("investorProfile").is_none());
    }

    #[test]
    fn test_transaction_kind_wire_names() {
        assert_eq!(
            serde_json::to_value(TransactionKind::Income).unwrap(),
            "INCOME"
        );
        let kind: TransactionKind = serde_json::from_value("EXPENSE".into()).unwrap();
        assert_eq!(kind, TransactionKind::Expense);
    }
}
