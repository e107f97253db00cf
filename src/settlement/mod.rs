//! Settlement executor boundary
//!
//! The collaborator that actually moves funds. Opaque to the core
//! beyond its success/failure contract: one call per run, no internal
//! retry, the result is final for that order.

use crate::error::{GateError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::env;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Outcome of a single transfer attempt as reported by the executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settlement_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

/// Trait for the external settlement service
#[async_trait::async_trait]
pub trait SettlementExecutor: Send + Sync {
    /// Balance currently available for payments. Unavailability here is
    /// a system error, not a policy rejection.
    async fn available_balance(&self) -> Result<f64>;

    /// Execute one transfer. A reported failure comes back as a
    /// non-success outcome, not an `Err`; `Err` means the executor
    /// itself could not be reached or gave an unusable answer.
    async fn execute_transfer(
        &self,
        destination: &str,
        amount: f64,
        asset: &str,
    ) -> Result<TransferOutcome>;
}

//
// ================= Mock implementation =================
//

/// Deterministic in-memory executor for development and tests
pub struct MockSettlementExecutor {
    balance: Mutex<f64>,
    forced_failure: Option<String>,
}

impl MockSettlementExecutor {
    pub fn with_balance(balance: f64) -> Self {
        Self {
            balance: Mutex::new(balance),
            forced_failure: None,
        }
    }

    /// An executor with funds available that still reports every
    /// transfer as failed with the given reason.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            balance: Mutex::new(1.0),
            forced_failure: Some(reason.into()),
        }
    }
}

#[async_trait::async_trait]
impl SettlementExecutor for MockSettlementExecutor {
    async fn available_balance(&self) -> Result<f64> {
        Ok(*self.balance.lock().await)
    }

    async fn execute_transfer(
        &self,
        _destination: &str,
        amount: f64,
        _asset: &str,
    ) -> Result<TransferOutcome> {
        if let Some(reason) = &self.forced_failure {
            return Ok(TransferOutcome {
                success: false,
                settlement_ref: None,
                failure_reason: Some(reason.clone()),
            });
        }

        let mut balance = self.balance.lock().await;
        if *balance < amount {
            return Ok(TransferOutcome {
                success: false,
                settlement_ref: None,
                failure_reason: Some(format!(
                    "insufficient funds: balance {:.4}, transfer {:.4}",
                    *balance, amount
                )),
            });
        }

        *balance -= amount;

        Ok(TransferOutcome {
            success: true,
            settlement_ref: Some(format!("settle-{}", Uuid::new_v4().simple())),
            failure_reason: None,
        })
    }
}

//
// ================= HTTP implementation =================
//

/// Executor backed by a settlement HTTP service
pub struct HttpSettlementExecutor {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSettlementExecutor {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_env() -> Option<Self> {
        let base_url = env::var("SETTLEMENT_API_BASE_URL").ok()?;
        Self::new(base_url).ok()
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                GateError::Execution(format!("settlement request failed for {}: {}", path, e))
            })?;

        let status = response.status();
        let body = response
            .json::<Value>()
            .await
            .map_err(|e| GateError::Execution(format!("invalid JSON response: {}", e)))?;

        if !status.is_success() {
            return Err(GateError::Execution(format!(
                "settlement service returned {} for {}: {}",
                status, path, body
            )));
        }

        Ok(body)
    }
}

#[async_trait::async_trait]
impl SettlementExecutor for HttpSettlementExecutor {
    async fn available_balance(&self) -> Result<f64> {
        let url = format!("{}/balance", self.base_url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| GateError::System(format!("settlement service unavailable: {}", e)))?;

        let body = response
            .json::<Value>()
            .await
            .map_err(|e| GateError::System(format!("invalid balance response: {}", e)))?;

        body.get("balance")
            .and_then(Value::as_f64)
            .ok_or_else(|| GateError::System("balance missing from response".to_string()))
    }

    async fn execute_transfer(
        &self,
        destination: &str,
        amount: f64,
        asset: &str,
    ) -> Result<TransferOutcome> {
        let body = self
            .post_json(
                "/transfers",
                &json!({
                    "destination": destination,
                    "amount": amount,
                    "asset": asset,
                }),
            )
            .await?;

        Ok(serde_json::from_value(body)?)
    }
}

//
// ================= Tests =================
//

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_transfer_decrements_balance() {
        let executor = MockSettlementExecutor::with_balance(1.0);

        let outcome = executor
            .execute_transfer("merchant-1", 0.25, "USDC")
            .await
            .unwrap();

        assert!(outcome.success);
        assert!(outcome.settlement_ref.is_some());
        assert_eq!(executor.available_balance().await.unwrap(), 0.75);
    }

    #[tokio::test]
    async fn test_mock_insufficient_funds_is_reported_not_thrown() {
        let executor = MockSettlementExecutor::with_balance(0.1);

        let outcome = executor
            .execute_transfer("merchant-1", 0.5, "USDC")
            .await
            .unwrap();

        assert!(!outcome.success);
        assert!(outcome.failure_reason.unwrap().contains("insufficient"));
    }

    #[tokio::test]
    async fn test_failing_executor_preserves_reason() {
        let executor = MockSettlementExecutor::failing("chain congested");

        let outcome = executor
            .execute_transfer("merchant-1", 0.01, "USDC")
            .await
            .unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.failure_reason.as_deref(), Some("chain congested"));
    }
}
