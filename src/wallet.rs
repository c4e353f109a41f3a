//! Wallet and identity collaborator
//!
//! The arbiter never holds balances. Stakes, winnings, identity and session
//! history live in the main casino backend, reached through `WalletService`.
//! `HttpWalletClient` talks to that backend; `InMemoryWallet` stands in for
//! it in tests and local runs.

use crate::{
    common::{AccountId, Amount, SessionToken},
    config::WalletConfig,
    errors::WalletError,
};
use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::{sync::Mutex, time::Duration};
use tracing::{debug, warn};

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub account_id: AccountId,
    pub email: String,
}

/// Account profile as returned by the backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AccountProfile {
    pub id: AccountId,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub balance: Option<Amount>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Finished session reported for the player's history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub game_type: String,
    pub bet_amount: Amount,
    pub win_amount: Amount,
    pub session_token: SessionToken,
}

#[async_trait]
pub trait WalletService: Send + Sync {
    async fn verify_token(&self, token: &str) -> Result<Identity, WalletError>;

    async fn fetch_profile(&self, token: &str) -> Result<AccountProfile, WalletError>;

    async fn debit(&self, token: &str, amount: Amount, game_tag: &str) -> Result<(), WalletError>;

    async fn credit(&self, token: &str, amount: Amount, game_tag: &str) -> Result<(), WalletError>;

    /// Best-effort history write; callers ignore failures
    async fn record_session(&self, token: &str, report: &SessionReport) -> Result<(), WalletError>;
}

/// Accept both raw tokens and full `Authorization` header values
pub fn strip_bearer(token: &str) -> &str {
    token.strip_prefix("Bearer ").unwrap_or(token).trim()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BalanceChange<'a> {
    amount: Amount,
    game_type: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct BackendError {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// reqwest client for the casino backend
#[derive(Clone)]
pub struct HttpWalletClient {
    client: Client,
    base_url: String,
}

impl HttpWalletClient {
    pub fn new(config: &WalletConfig) -> Result<Self, WalletError> {
        Self::with_timeout(&config.base_url, config.timeout())
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, WalletError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WalletError::Unavailable(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_balance_change(
        &self,
        path: &str,
        token: &str,
        amount: Amount,
        game_tag: &str,
    ) -> Result<reqwest::Response, WalletError> {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(strip_bearer(token))
            .json(&BalanceChange {
                amount,
                game_type: game_tag,
            })
            .send()
            .await?;
        Ok(response)
    }
}

#[async_trait]
impl WalletService for HttpWalletClient {
    async fn verify_token(&self, token: &str) -> Result<Identity, WalletError> {
        let profile = self.fetch_profile(token).await?;
        Ok(Identity {
            account_id: profile.id,
            email: profile.email,
        })
    }

    async fn fetch_profile(&self, token: &str) -> Result<AccountProfile, WalletError> {
        let response = self
            .client
            .get(self.url("/api/user/profile"))
            .bearer_auth(strip_bearer(token))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => response
                .json::<AccountProfile>()
                .await
                .map_err(|e| WalletError::Rejected(format!("Malformed profile: {}", e))),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(WalletError::InvalidToken),
            status => Err(WalletError::Unavailable(format!(
                "Profile lookup failed with status {}",
                status
            ))),
        }
    }

    async fn debit(&self, token: &str, amount: Amount, game_tag: &str) -> Result<(), WalletError> {
        let response = self
            .post_balance_change("/api/user/wallet/deduct", token, amount, game_tag)
            .await?;

        match response.status() {
            StatusCode::OK => {
                debug!(%amount, game_tag, "Stake deducted");
                Ok(())
            }
            StatusCode::BAD_REQUEST => {
                let body = response.json::<BackendError>().await.unwrap_or_default();
                Err(WalletError::InsufficientFunds(
                    body.error
                        .or(body.message)
                        .unwrap_or_else(|| "Insufficient balance".to_string()),
                ))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(WalletError::InvalidToken),
            status => Err(WalletError::Rejected(format!(
                "Failed to deduct balance (status {})",
                status
            ))),
        }
    }

    async fn credit(&self, token: &str, amount: Amount, game_tag: &str) -> Result<(), WalletError> {
        let response = self
            .post_balance_change("/api/user/wallet/add", token, amount, game_tag)
            .await?;

        if response.status() == StatusCode::OK {
            debug!(%amount, game_tag, "Winnings credited");
            Ok(())
        } else {
            Err(WalletError::Rejected(format!(
                "Failed to add balance (status {})",
                response.status()
            )))
        }
    }

    async fn record_session(&self, token: &str, report: &SessionReport) -> Result<(), WalletError> {
        let response = self
            .client
            .post(self.url("/api/games/record"))
            .bearer_auth(strip_bearer(token))
            .json(report)
            .send()
            .await?;

        if response.status() == StatusCode::OK {
            Ok(())
        } else {
            warn!(status = %response.status(), session = %report.session_token, "Session recording rejected");
            Err(WalletError::Rejected(format!(
                "Failed to record session (status {})",
                response.status()
            )))
        }
    }
}

// ============================================================================
// In-memory wallet
// ============================================================================

#[derive(Debug, Clone)]
struct WalletAccount {
    id: AccountId,
    email: String,
    balance: Amount,
}

/// Scripted wallet for tests and local runs
#[derive(Default)]
pub struct InMemoryWallet {
    accounts: DashMap<String, WalletAccount>,
    debit_failure: Mutex<Option<WalletError>>,
    credit_failure: Mutex<Option<WalletError>>,
    record_failure: Mutex<Option<WalletError>>,
    latency: Mutex<Option<Duration>>,
    recorded: Mutex<Vec<SessionReport>>,
}

fn read<T: Clone>(slot: &Mutex<T>) -> T {
    slot.lock().unwrap_or_else(|e| e.into_inner()).clone()
}

fn write<T>(slot: &Mutex<T>, value: T) {
    *slot.lock().unwrap_or_else(|e| e.into_inner()) = value;
}

impl InMemoryWallet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_account(&self, token: &str, id: AccountId, email: &str, balance: Amount) {
        self.accounts.insert(
            token.to_string(),
            WalletAccount {
                id,
                email: email.to_string(),
                balance,
            },
        );
    }

    pub fn balance(&self, token: &str) -> Option<Amount> {
        self.accounts.get(strip_bearer(token)).map(|a| a.balance)
    }

    /// Every debit fails with `error` until cleared with `None`
    pub fn set_debit_failure(&self, error: Option<WalletError>) {
        write(&self.debit_failure, error);
    }

    pub fn set_credit_failure(&self, error: Option<WalletError>) {
        write(&self.credit_failure, error);
    }

    pub fn set_record_failure(&self, error: Option<WalletError>) {
        write(&self.record_failure, error);
    }

    /// Delay applied to every money movement
    pub fn set_latency(&self, latency: Option<Duration>) {
        write(&self.latency, latency);
    }

    pub fn recorded_sessions(&self) -> Vec<SessionReport> {
        read(&self.recorded)
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = read(&self.latency) {
            tokio::time::sleep(latency).await;
        }
    }

    fn adjust(
        &self,
        token: &str,
        apply: impl FnOnce(&mut WalletAccount) -> Result<(), WalletError>,
    ) -> Result<(), WalletError> {
        let mut account = self
            .accounts
            .get_mut(strip_bearer(token))
            .ok_or(WalletError::InvalidToken)?;
        apply(&mut account)
    }
}

#[async_trait]
impl WalletService for InMemoryWallet {
    async fn verify_token(&self, token: &str) -> Result<Identity, WalletError> {
        let profile = self.fetch_profile(token).await?;
        Ok(Identity {
            account_id: profile.id,
            email: profile.email,
        })
    }

    async fn fetch_profile(&self, token: &str) -> Result<AccountProfile, WalletError> {
        self.accounts
            .get(strip_bearer(token))
            .map(|a| AccountProfile {
                id: a.id,
                email: a.email.clone(),
                balance: Some(a.balance),
                status: Some("ACTIVE".to_string()),
            })
            .ok_or(WalletError::InvalidToken)
    }

    async fn debit(&self, token: &str, amount: Amount, _game_tag: &str) -> Result<(), WalletError> {
        self.simulate_latency().await;
        if let Some(error) = read(&self.debit_failure) {
            return Err(error);
        }
        self.adjust(token, |account| {
            if account.balance < amount {
                return Err(WalletError::InsufficientFunds(format!(
                    "Insufficient balance: {} available",
                    account.balance
                )));
            }
            account.balance = Amount::from_minor(account.balance.minor() - amount.minor());
            Ok(())
        })
    }

    async fn credit(&self, token: &str, amount: Amount, _game_tag: &str) -> Result<(), WalletError> {
        self.simulate_latency().await;
        if let Some(error) = read(&self.credit_failure) {
            return Err(error);
        }
        self.adjust(token, |account| {
            account.balance = account.balance.saturating_add(amount);
            Ok(())
        })
    }

    async fn record_session(&self, _token: &str, report: &SessionReport) -> Result<(), WalletError> {
        if let Some(error) = read(&self.record_failure) {
            return Err(error);
        }
        self.recorded
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(report.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_bearer() {
        assert_eq!(strip_bearer("Bearer abc"), "abc");
        assert_eq!(strip_bearer("abc"), "abc");
    }

    #[test]
    fn test_profile_wire_format() {
        let raw = r#"{"id": 12, "firstName": "A", "email": "a@b.c", "balance": 42.5, "status": "ACTIVE"}"#;
        let profile: AccountProfile = serde_json::from_str(raw).unwrap();
        assert_eq!(profile.id, 12);
        assert_eq!(profile.balance, Some(Amount::from_minor(4250)));
    }

    #[test]
    fn test_session_report_wire_format() {
        let report = SessionReport {
            game_type: "SNAKE".into(),
            bet_amount: Amount::from_minor(500),
            win_amount: Amount::from_minor(50),
            session_token: SessionToken::from("t"),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["gameType"], "SNAKE");
        assert_eq!(json["betAmount"], 5.0);
        assert_eq!(json["winAmount"], 0.5);
        assert_eq!(json["sessionToken"], "t");
    }

    #[tokio::test]
    async fn test_in_memory_debit_and_credit() {
        let wallet = InMemoryWallet::new();
        wallet.add_account("tok", 1, "p@x.io", Amount::from_minor(700));

        let identity = wallet.verify_token("Bearer tok").await.unwrap();
        assert_eq!(identity.account_id, 1);

        wallet.debit("tok", Amount::from_minor(500), "SNAKE").await.unwrap();
        assert_eq!(wallet.balance("tok"), Some(Amount::from_minor(200)));

        let err = wallet.debit("tok", Amount::from_minor(500), "SNAKE").await.unwrap_err();
        assert!(matches!(err, WalletError::InsufficientFunds(_)));

        wallet.credit("tok", Amount::from_minor(50), "SNAKE").await.unwrap();
        assert_eq!(wallet.balance("tok"), Some(Amount::from_minor(250)));

        assert_eq!(
            wallet.verify_token("nobody").await.unwrap_err(),
            WalletError::InvalidToken
        );
    }

    #[tokio::test]
    async fn test_scripted_failures() {
        let wallet = InMemoryWallet::new();
        wallet.add_account("tok", 1, "p@x.io", Amount::from_minor(700));

        wallet.set_credit_failure(Some(WalletError::Timeout));
        assert_eq!(
            wallet.credit("tok", Amount::from_minor(1), "SNAKE").await.unwrap_err(),
            WalletError::Timeout
        );
        wallet.set_credit_failure(None);
        assert!(wallet.credit("tok", Amount::from_minor(1), "SNAKE").await.is_ok());
    }

    #[tokio::test]
    async fn test_http_client_reports_unreachable_backend() {
        // Nothing listens on port 9; the request fails fast
        let client =
            HttpWalletClient::with_timeout("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        let err = client
            .debit("tok", Amount::from_minor(500), "SNAKE")
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::Unavailable(_) | WalletError::Timeout));
    }
}
