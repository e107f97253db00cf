//! Core data models for the payment gate

use crate::error::{GateError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

//
// ================= Enums =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
    Confirm,
    Delay,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CheckOutcome {
    Pass,
    Warn,
    Fail,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderIntent {
    Purchase,
    BulkPurchase,
    Cancellation,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StageRole {
    Reception,
    Approval,
    Payment,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StageOutcome {
    Pass,
    Fail,
    Approved,
    Rejected,
    Success,
    Failed,
}

//
// ================= Run Status (state machine) =================
//

/// Authoritative pipeline state. Transitions only happen through
/// [`PipelineRun::advance`], which consults the transition table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Received,
    Validating,
    PendingApproval,
    Approved,
    Processing,
    Completed,
    Rejected,
    Failed,
}

impl RunStatus {
    /// Exhaustive transition table. No stage skipping, no re-entry.
    pub fn can_transition_to(self, next: RunStatus) -> bool {
        use RunStatus::*;
        matches!(
            (self, next),
            (Received, Validating)
                | (Validating, Rejected)
                | (Validating, PendingApproval)
                | (PendingApproval, Rejected)
                | (PendingApproval, Approved)
                | (Approved, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Rejected | RunStatus::Failed
        )
    }
}

//
// ================= Order =================
//

/// Identity-scoped purchase request. Immutable once created; the id is
/// generated once and never reused.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub order_id: Uuid,
    pub item: String,
    pub price: f64,
    pub quantity: u32,
    pub currency: String,
    pub user_identity: String,
    pub merchant_identity: String,
    pub intent: OrderIntent,
    pub created_at: DateTime<Utc>,
}

//
// ================= Decision =================
//

/// One named, weighted check contributing to the overall confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningStep {
    pub check_name: String,
    pub outcome: CheckOutcome,
    pub detail: String,
    pub weight: f64,
}

impl ReasoningStep {
    pub fn new(
        check_name: &str,
        outcome: CheckOutcome,
        detail: impl Into<String>,
        weight: f64,
    ) -> Self {
        Self {
            check_name: check_name.to_string(),
            outcome,
            detail: detail.into(),
            weight,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionResult {
    pub decision: Decision,
    pub confidence: f64,
    pub risk_tier: RiskTier,
    pub reasoning: Vec<ReasoningStep>,
    pub summary: String,
    pub suggestions: Vec<String>,
    pub evaluated_at: DateTime<Utc>,
    pub evaluation_duration_ms: u64,
}

/// Snapshot handed to the decision engine. The engine is pure given
/// this input; the gate assembles it from the policy store and the
/// settlement executor before evaluation.
#[derive(Debug, Clone)]
pub struct DecisionContext {
    pub order: Order,
    pub recent_order_count: usize,
    pub window_spend: f64,
    pub available_balance: f64,
    pub now: DateTime<Utc>,
}

//
// ================= Pipeline =================
//

/// Immutable, signed log entry a stage produces describing what it did.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage_name: String,
    pub stage_role: StageRole,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
    pub outcome: StageOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attestation_signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settlement_ref: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageRecords {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reception: Option<StageRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval: Option<StageRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment: Option<StageRecord>,
}

impl StageRecords {
    pub fn attach(&mut self, record: StageRecord) {
        match record.stage_role {
            StageRole::Reception => self.reception = Some(record),
            StageRole::Approval => self.approval = Some(record),
            StageRole::Payment => self.payment = Some(record),
        }
    }

    pub fn get(&self, role: StageRole) -> Option<&StageRecord> {
        match role {
            StageRole::Reception => self.reception.as_ref(),
            StageRole::Approval => self.approval.as_ref(),
            StageRole::Payment => self.payment.as_ref(),
        }
    }
}

/// A single order's trip through the pipeline. Owned exclusively by the
/// run that created it; callers must not assume all three stage records
/// are present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub run_id: Uuid,
    pub order: Order,
    pub status: RunStatus,
    pub stages: StageRecords,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preceding_stage: Option<StageRole>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminal_error: Option<String>,
}

impl PipelineRun {
    pub fn new(order: Order) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            order,
            status: RunStatus::Received,
            stages: StageRecords::default(),
            preceding_stage: None,
            terminal_error: None,
        }
    }

    /// Advance the state machine. An illegal transition is a structural
    /// bug in the caller and is rejected, never applied.
    pub fn advance(&mut self, next: RunStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(GateError::PipelineIntegrity(format!(
                "illegal transition {} -> {} for order {}",
                self.status, next, self.order.order_id
            )));
        }
        self.status = next;
        Ok(())
    }

    /// Collapse the run to REJECTED from any non-terminal state.
    /// Reserved for pipeline-integrity violations, which are fatal
    /// wherever they are detected.
    pub fn abort_for_integrity(&mut self, reason: impl Into<String>) {
        if !self.status.is_terminal() {
            self.status = RunStatus::Rejected;
        }
        self.terminal_error = Some(reason.into());
    }

    /// Settlement reference, if the payment stage produced one.
    pub fn settlement_ref(&self) -> Option<&str> {
        self.stages
            .payment
            .as_ref()
            .and_then(|r| r.settlement_ref.as_deref())
    }
}

//
// ================= Intake Contract =================
//

/// Order submission as received from the (excluded) transport layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub intent: String,
    pub item: String,
    pub price: f64,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    pub currency: Option<String>,
    pub user_identity: String,
    pub merchant_identity: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

fn default_quantity() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateResponse {
    pub decision: DecisionResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline_run: Option<PipelineRun>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settlement_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

//
// ================= RiskTier Ordering =================
//

impl RiskTier {
    fn rank(&self) -> u8 {
        match self {
            RiskTier::Low => 0,
            RiskTier::Medium => 1,
            RiskTier::High => 2,
            RiskTier::Critical => 3,
        }
    }
}

impl PartialOrd for RiskTier {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RiskTier {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

//
// ================= Display =================
//

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Decision::Approve => "approve",
            Decision::Reject => "reject",
            Decision::Confirm => "confirm",
            Decision::Delay => "delay",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Received => "RECEIVED",
            RunStatus::Validating => "VALIDATING",
            RunStatus::PendingApproval => "PENDING_APPROVAL",
            RunStatus::Approved => "APPROVED",
            RunStatus::Processing => "PROCESSING",
            RunStatus::Completed => "COMPLETED",
            RunStatus::Rejected => "REJECTED",
            RunStatus::Failed => "FAILED",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for StageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StageRole::Reception => "reception",
            StageRole::Approval => "approval",
            StageRole::Payment => "payment",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskTier::Low => "low",
            RiskTier::Medium => "medium",
            RiskTier::High => "high",
            RiskTier::Critical => "critical",
        };
        write!(f, "{}", s)
    }
}

//
// ================= Tests =================
//

#[cfg(test)]
mod tests {
    use super::*;

    fn test_order() -> Order {
        Order {
            order_id: Uuid::new_v4(),
            item: "api-credits".to_string(),
            price: 0.05,
            quantity: 1,
            currency: "USDC".to_string(),
            user_identity: "user-1".to_string(),
            merchant_identity: "merchant-1".to_string(),
            intent: OrderIntent::Purchase,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_legal_transition_path() {
        let mut run = PipelineRun::new(test_order());
        assert_eq!(run.status, RunStatus::Received);

        for next in [
            RunStatus::Validating,
            RunStatus::PendingApproval,
            RunStatus::Approved,
            RunStatus::Processing,
            RunStatus::Completed,
        ] {
            run.advance(next).unwrap();
        }
        assert!(run.status.is_terminal());
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        let mut run = PipelineRun::new(test_order());

        // Cannot skip straight to processing
        assert!(run.advance(RunStatus::Processing).is_err());
        // Cannot complete from the initial state
        assert!(run.advance(RunStatus::Completed).is_err());
        // Status unchanged after rejected transitions
        assert_eq!(run.status, RunStatus::Received);
    }

    #[test]
    fn test_terminal_states_immovable() {
        let mut run = PipelineRun::new(test_order());
        run.advance(RunStatus::Validating).unwrap();
        run.advance(RunStatus::Rejected).unwrap();

        assert!(run.advance(RunStatus::PendingApproval).is_err());
        assert!(run.advance(RunStatus::Completed).is_err());
        assert_eq!(run.status, RunStatus::Rejected);
    }

    #[test]
    fn test_no_reentry_into_prior_state() {
        let mut run = PipelineRun::new(test_order());
        run.advance(RunStatus::Validating).unwrap();
        run.advance(RunStatus::PendingApproval).unwrap();

        assert!(run.advance(RunStatus::Validating).is_err());
        assert!(run.advance(RunStatus::Received).is_err());
    }

    #[test]
    fn test_risk_tier_ordering() {
        assert!(RiskTier::Critical > RiskTier::High);
        assert!(RiskTier::High > RiskTier::Medium);
        assert!(RiskTier::Medium > RiskTier::Low);
        assert_eq!(
            std::cmp::max(RiskTier::Low, RiskTier::Critical),
            RiskTier::Critical
        );
    }

    #[test]
    fn test_stage_records_attach_by_role() {
        let mut stages = StageRecords::default();
        stages.attach(StageRecord {
            stage_name: "reception-agent".to_string(),
            stage_role: StageRole::Reception,
            timestamp: Utc::now(),
            duration_ms: 1,
            outcome: StageOutcome::Pass,
            message: None,
            attestation_signature: None,
            settlement_ref: None,
        });

        assert!(stages.reception.is_some());
        assert!(stages.get(StageRole::Approval).is_none());
    }
}
