//! The three pipeline stage agents
//!
//! Each agent validates its preconditions, performs one unit of work,
//! and stamps exactly one stage record. Validation and policy failures
//! are resolved here by rejecting the run; they never propagate as
//! errors past the stage boundary.

use crate::attestation::{binding_payload, AttestationSigner};
use crate::config::PolicyConfig;
use crate::error::Result;
use crate::models::{PipelineRun, RunStatus, StageOutcome, StageRecord, StageRole};
use crate::policy::PolicyStore;
use crate::settlement::SettlementExecutor;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

/// Longest identity string the reception stage accepts.
const MAX_IDENTITY_LEN: usize = 128;

/// Trait for a single pipeline stage
#[async_trait::async_trait]
pub trait StageAgent: Send + Sync {
    fn name(&self) -> &'static str;

    fn role(&self) -> StageRole;

    /// Advance the run by one stage. Returns `Err` only for system
    /// faults (e.g. a failing backing store); everything the stage can
    /// resolve itself lands in the run's status and records.
    async fn run(&self, run: &mut PipelineRun) -> Result<()>;
}

fn make_record(
    name: &str,
    role: StageRole,
    started: Instant,
    outcome: StageOutcome,
    message: Option<String>,
) -> StageRecord {
    StageRecord {
        stage_name: name.to_string(),
        stage_role: role,
        timestamp: Utc::now(),
        duration_ms: started.elapsed().as_millis() as u64,
        outcome,
        message,
        attestation_signature: None,
        settlement_ref: None,
    }
}

fn valid_identity(identity: &str) -> bool {
    !identity.is_empty()
        && identity.len() <= MAX_IDENTITY_LEN
        && !identity.chars().any(char::is_whitespace)
}

//
// ================= Reception =================
//

/// Validates structural well-formedness before any policy check runs.
pub struct ReceptionAgent {
    config: Arc<PolicyConfig>,
}

impl ReceptionAgent {
    pub fn new(config: Arc<PolicyConfig>) -> Self {
        Self { config }
    }

    fn validate(&self, run: &PipelineRun) -> std::result::Result<(), String> {
        let order = &run.order;

        if order.item.trim().is_empty() {
            return Err("item name is empty".to_string());
        }
        if !(order.price.is_finite() && order.price > 0.0) {
            return Err(format!("price {} is not strictly positive", order.price));
        }
        if !self.config.accepts_currency(&order.currency) {
            return Err(format!("currency {} is not accepted", order.currency));
        }
        if !valid_identity(&order.user_identity) {
            return Err(format!("user identity {:?} is invalid", order.user_identity));
        }
        if !valid_identity(&order.merchant_identity) {
            return Err(format!(
                "merchant identity {:?} is invalid",
                order.merchant_identity
            ));
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl StageAgent for ReceptionAgent {
    fn name(&self) -> &'static str {
        "reception-agent"
    }

    fn role(&self) -> StageRole {
        StageRole::Reception
    }

    async fn run(&self, run: &mut PipelineRun) -> Result<()> {
        let started = Instant::now();
        run.advance(RunStatus::Validating)?;

        match self.validate(run) {
            Ok(()) => {
                run.advance(RunStatus::PendingApproval)?;
                run.stages.attach(make_record(
                    self.name(),
                    self.role(),
                    started,
                    StageOutcome::Pass,
                    None,
                ));
                run.preceding_stage = Some(self.role());

                debug!(order_id = %run.order.order_id, "Reception passed");
            }
            Err(reason) => {
                run.advance(RunStatus::Rejected)?;
                run.stages.attach(make_record(
                    self.name(),
                    self.role(),
                    started,
                    StageOutcome::Fail,
                    Some(reason.clone()),
                ));

                warn!(order_id = %run.order.order_id, reason = %reason, "Reception rejected order");
            }
        }

        Ok(())
    }
}

//
// ================= Approval =================
//

/// The authoritative policy gate. Re-checks limits independently of the
/// decision engine and performs the atomic check-and-reserve against
/// the rolling ceiling.
pub struct ApprovalAgent {
    config: Arc<PolicyConfig>,
    policy: Arc<dyn PolicyStore>,
    signer: Arc<dyn AttestationSigner>,
}

impl ApprovalAgent {
    pub fn new(
        config: Arc<PolicyConfig>,
        policy: Arc<dyn PolicyStore>,
        signer: Arc<dyn AttestationSigner>,
    ) -> Self {
        Self {
            config,
            policy,
            signer,
        }
    }
}

#[async_trait::async_trait]
impl StageAgent for ApprovalAgent {
    fn name(&self) -> &'static str {
        "approval-agent"
    }

    fn role(&self) -> StageRole {
        StageRole::Approval
    }

    async fn run(&self, run: &mut PipelineRun) -> Result<()> {
        let started = Instant::now();

        // Integrity precondition: distinct from a policy rejection and
        // a structural bug signal if it ever fires.
        if run.preceding_stage != Some(StageRole::Reception)
            || run.status != RunStatus::PendingApproval
        {
            let reason = format!(
                "approval received run in state {} with preceding stage {:?}",
                run.status, run.preceding_stage
            );
            error!(order_id = %run.order.order_id, reason = %reason, "Pipeline integrity violation");

            run.abort_for_integrity(reason.clone());
            run.stages.attach(make_record(
                self.name(),
                self.role(),
                started,
                StageOutcome::Rejected,
                Some(reason),
            ));
            return Ok(());
        }

        let order_id = run.order.order_id;
        let price = run.order.price;
        let identity = run.order.user_identity.clone();

        // Single-transaction ceiling, independent of the advisory
        // pre-filter.
        if price > self.config.single_tx_ceiling {
            let reason = format!(
                "price {:.4} exceeds single-transaction ceiling {:.4}",
                price, self.config.single_tx_ceiling
            );
            run.advance(RunStatus::Rejected)?;
            run.stages.attach(make_record(
                self.name(),
                self.role(),
                started,
                StageOutcome::Rejected,
                Some(reason.clone()),
            ));

            warn!(order_id = %order_id, reason = %reason, "Approval rejected order");
            return Ok(());
        }

        // Atomic check-and-reserve: committed plus pending spend must
        // stay inside the rolling ceiling.
        if let Err(violation) = self
            .policy
            .reserve(&identity, price, self.config.window_ceiling)
            .await
        {
            let reason = violation.to_string();
            run.advance(RunStatus::Rejected)?;
            run.stages.attach(make_record(
                self.name(),
                self.role(),
                started,
                StageOutcome::Rejected,
                Some(reason.clone()),
            ));

            warn!(order_id = %order_id, reason = %reason, "Approval rejected order");
            return Ok(());
        }

        // Attestation binds order id, amount and timestamp. A signer
        // failure fails the stage and returns the reservation.
        let payload = binding_payload(order_id, "approval", price, Utc::now());
        match self.signer.sign(payload.as_bytes()) {
            Ok(signature) => {
                run.advance(RunStatus::Approved)?;
                let mut record = make_record(
                    self.name(),
                    self.role(),
                    started,
                    StageOutcome::Approved,
                    None,
                );
                record.attestation_signature = Some(signature);
                run.stages.attach(record);
                run.preceding_stage = Some(self.role());

                debug!(order_id = %order_id, "Approval granted");
            }
            Err(e) => {
                self.policy.release(&identity, price).await?;

                let reason = format!("attestation signing failed: {}", e);
                run.advance(RunStatus::Rejected)?;
                run.stages.attach(make_record(
                    self.name(),
                    self.role(),
                    started,
                    StageOutcome::Rejected,
                    Some(reason.clone()),
                ));

                error!(order_id = %run.order.order_id, reason = %reason, "Approval stage failed");
            }
        }

        Ok(())
    }
}

//
// ================= Payment =================
//

/// Invokes the settlement executor exactly once and records its verdict.
pub struct PaymentAgent {
    executor: Arc<dyn SettlementExecutor>,
    signer: Arc<dyn AttestationSigner>,
}

impl PaymentAgent {
    pub fn new(executor: Arc<dyn SettlementExecutor>, signer: Arc<dyn AttestationSigner>) -> Self {
        Self { executor, signer }
    }
}

#[async_trait::async_trait]
impl StageAgent for PaymentAgent {
    fn name(&self) -> &'static str {
        "payment-agent"
    }

    fn role(&self) -> StageRole {
        StageRole::Payment
    }

    async fn run(&self, run: &mut PipelineRun) -> Result<()> {
        let started = Instant::now();

        if run.preceding_stage != Some(StageRole::Approval) || run.status != RunStatus::Approved {
            let reason = format!(
                "payment received run in state {} with preceding stage {:?}",
                run.status, run.preceding_stage
            );
            error!(order_id = %run.order.order_id, reason = %reason, "Pipeline integrity violation");

            run.abort_for_integrity(reason.clone());
            run.stages.attach(make_record(
                self.name(),
                self.role(),
                started,
                StageOutcome::Failed,
                Some(reason),
            ));
            return Ok(());
        }

        run.advance(RunStatus::Processing)?;

        let order = run.order.clone();
        let outcome = self
            .executor
            .execute_transfer(&order.merchant_identity, order.price, &order.currency)
            .await;

        match outcome {
            Ok(transfer) if transfer.success => {
                let payload =
                    binding_payload(order.order_id, "payment", order.price, Utc::now());

                match self.signer.sign(payload.as_bytes()) {
                    Ok(signature) => {
                        run.advance(RunStatus::Completed)?;
                        let mut record = make_record(
                            self.name(),
                            self.role(),
                            started,
                            StageOutcome::Success,
                            None,
                        );
                        record.attestation_signature = Some(signature);
                        record.settlement_ref = transfer.settlement_ref;
                        run.stages.attach(record);
                        run.preceding_stage = Some(self.role());

                        debug!(order_id = %run.order.order_id, "Payment completed");
                    }
                    Err(e) => {
                        // Funds moved but the completion attestation is
                        // missing; keep the settlement ref for
                        // reconciliation and fail the stage.
                        let reason = format!("attestation signing failed: {}", e);
                        run.advance(RunStatus::Failed)?;
                        let mut record = make_record(
                            self.name(),
                            self.role(),
                            started,
                            StageOutcome::Failed,
                            Some(reason.clone()),
                        );
                        record.settlement_ref = transfer.settlement_ref;
                        run.stages.attach(record);
                        run.terminal_error = Some(reason.clone());

                        error!(order_id = %run.order.order_id, reason = %reason, "Payment stage failed");
                    }
                }
            }
            Ok(transfer) => {
                // Executor reported failure: the reason is preserved
                // verbatim for operator diagnosis, no retry.
                let reason = transfer
                    .failure_reason
                    .unwrap_or_else(|| "settlement executor reported failure".to_string());
                run.advance(RunStatus::Failed)?;
                run.stages.attach(make_record(
                    self.name(),
                    self.role(),
                    started,
                    StageOutcome::Failed,
                    Some(reason.clone()),
                ));
                run.terminal_error = Some(reason.clone());

                warn!(order_id = %run.order.order_id, reason = %reason, "Settlement failed");
            }
            Err(e) => {
                let reason = e.to_string();
                run.advance(RunStatus::Failed)?;
                run.stages.attach(make_record(
                    self.name(),
                    self.role(),
                    started,
                    StageOutcome::Failed,
                    Some(reason.clone()),
                ));
                run.terminal_error = Some(reason.clone());

                error!(order_id = %run.order.order_id, reason = %reason, "Settlement executor unreachable");
            }
        }

        Ok(())
    }
}
