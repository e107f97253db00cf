//! Pipeline orchestrator
//!
//! Drives an order through Reception -> Approval -> Payment in fixed
//! order, short-circuiting at the first stage that does not advance
//! the run. The spend ledger is committed only on a completed run.

pub mod stages;

pub use stages::{ApprovalAgent, PaymentAgent, ReceptionAgent, StageAgent};

use crate::attestation::AttestationSigner;
use crate::config::PolicyConfig;
use crate::error::Result;
use crate::models::{Order, PipelineRun, RunStatus, StageOutcome};
use crate::policy::PolicyStore;
use crate::settlement::SettlementExecutor;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Sequential, synchronous driver for a single order
pub struct PipelineOrchestrator {
    stages: Vec<Box<dyn StageAgent>>,
    policy: Arc<dyn PolicyStore>,
}

impl PipelineOrchestrator {
    pub fn new(
        config: Arc<PolicyConfig>,
        policy: Arc<dyn PolicyStore>,
        executor: Arc<dyn SettlementExecutor>,
        signer: Arc<dyn AttestationSigner>,
    ) -> Self {
        let stages: Vec<Box<dyn StageAgent>> = vec![
            Box::new(ReceptionAgent::new(Arc::clone(&config))),
            Box::new(ApprovalAgent::new(
                Arc::clone(&config),
                Arc::clone(&policy),
                Arc::clone(&signer),
            )),
            Box::new(PaymentAgent::new(executor, signer)),
        ];

        Self { stages, policy }
    }

    /// Run an order through the pipeline. The returned run carries only
    /// the stage records actually executed; callers must not assume all
    /// three are present.
    pub async fn process(&self, order: Order) -> Result<PipelineRun> {
        let started = Instant::now();
        let mut run = PipelineRun::new(order);

        info!(
            order_id = %run.order.order_id,
            identity = %run.order.user_identity,
            price = run.order.price,
            "Pipeline started"
        );

        for stage in &self.stages {
            debug!(
                order_id = %run.order.order_id,
                stage = stage.name(),
                "Running stage"
            );

            stage.run(&mut run).await?;

            if run.status.is_terminal() {
                break;
            }
        }

        match run.status {
            RunStatus::Completed => {
                self.policy
                    .commit(&run.order.user_identity, run.order.price)
                    .await?;
            }
            RunStatus::Failed => {
                // The approval stage holds a reservation for every run
                // that got past it; a failed payment returns it.
                let reserved = run
                    .stages
                    .approval
                    .as_ref()
                    .map(|r| r.outcome == StageOutcome::Approved)
                    .unwrap_or(false);

                if reserved {
                    self.policy
                        .release(&run.order.user_identity, run.order.price)
                        .await?;
                }
            }
            _ => {}
        }

        info!(
            order_id = %run.order.order_id,
            status = %run.status,
            duration_ms = started.elapsed().as_millis() as u64,
            "Pipeline finished"
        );

        Ok(run)
    }
}

//
// ================= Tests =================
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attestation::HmacSigner;
    use crate::models::OrderIntent;
    use crate::policy::InMemoryPolicyStore;
    use crate::settlement::MockSettlementExecutor;
    use chrono::Utc;
    use uuid::Uuid;

    fn order(price: f64) -> Order {
        Order {
            order_id: Uuid::new_v4(),
            item: "api-credits".to_string(),
            price,
            quantity: 1,
            currency: "USDC".to_string(),
            user_identity: "agent-7".to_string(),
            merchant_identity: "data-vendor".to_string(),
            intent: OrderIntent::Purchase,
            created_at: Utc::now(),
        }
    }

    fn harness(
        balance: f64,
    ) -> (PipelineOrchestrator, Arc<InMemoryPolicyStore>) {
        let config = Arc::new(PolicyConfig::default());
        let policy = Arc::new(InMemoryPolicyStore::new(
            config.spend_window,
            config.frequency_window,
        ));
        let executor = Arc::new(MockSettlementExecutor::with_balance(balance));
        let signer: Arc<dyn AttestationSigner> =
            Arc::new(HmacSigner::new("gate", b"test-key"));

        let orchestrator = PipelineOrchestrator::new(
            config,
            Arc::clone(&policy) as Arc<dyn PolicyStore>,
            executor,
            signer,
        );

        (orchestrator, policy)
    }

    #[tokio::test]
    async fn test_happy_path_completes_and_commits() {
        let (orchestrator, policy) = harness(1.0);

        let run = orchestrator.process(order(0.03)).await.unwrap();

        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(
            run.stages.reception.as_ref().unwrap().outcome,
            StageOutcome::Pass
        );
        assert_eq!(
            run.stages.approval.as_ref().unwrap().outcome,
            StageOutcome::Approved
        );
        assert_eq!(
            run.stages.payment.as_ref().unwrap().outcome,
            StageOutcome::Success
        );
        assert!(run.settlement_ref().is_some());
        assert!(run
            .stages
            .approval
            .as_ref()
            .unwrap()
            .attestation_signature
            .is_some());

        let snap = policy.snapshot("agent-7").await.unwrap();
        assert_eq!(snap.committed, 0.03);
        assert_eq!(snap.pending, 0.0);
    }

    #[tokio::test]
    async fn test_over_ceiling_rejected_at_approval() {
        let (orchestrator, policy) = harness(10.0);

        let run = orchestrator.process(order(1.5)).await.unwrap();

        assert_eq!(run.status, RunStatus::Rejected);
        assert!(run.stages.payment.is_none());
        assert_eq!(
            run.stages.approval.as_ref().unwrap().outcome,
            StageOutcome::Rejected
        );
        assert!(run
            .stages
            .approval
            .as_ref()
            .unwrap()
            .message
            .as_ref()
            .unwrap()
            .contains("ceiling"));

        // Ledger untouched
        let snap = policy.snapshot("agent-7").await.unwrap();
        assert_eq!(snap.committed, 0.0);
        assert_eq!(snap.pending, 0.0);
    }

    #[tokio::test]
    async fn test_window_ceiling_enforced_against_committed_spend() {
        let (orchestrator, policy) = harness(100.0);

        // Seed 9.5 of committed spend in the current window
        policy.reserve("agent-7", 9.5, 10.0).await.unwrap();
        policy.commit("agent-7", 9.5).await.unwrap();

        // 9.5 + 0.9 overshoots the 10.0 window ceiling
        let run = orchestrator.process(order(0.9)).await.unwrap();
        assert_eq!(run.status, RunStatus::Rejected);

        // 9.5 + 0.5 lands exactly on it, which is allowed
        let run = orchestrator.process(order(0.5)).await.unwrap();
        assert_eq!(run.status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn test_reception_rejects_malformed_order() {
        let (orchestrator, _) = harness(1.0);

        let mut bad = order(0.03);
        bad.currency = "DOGE".to_string();

        let run = orchestrator.process(bad).await.unwrap();

        assert_eq!(run.status, RunStatus::Rejected);
        assert_eq!(
            run.stages.reception.as_ref().unwrap().outcome,
            StageOutcome::Fail
        );
        // Halted before any policy check
        assert!(run.stages.approval.is_none());
        assert!(run.stages.payment.is_none());
    }

    #[tokio::test]
    async fn test_executor_failure_fails_run_and_releases_reservation() {
        let config = Arc::new(PolicyConfig::default());
        let policy = Arc::new(InMemoryPolicyStore::new(
            config.spend_window,
            config.frequency_window,
        ));
        let executor = Arc::new(MockSettlementExecutor::failing("chain congested"));
        let signer: Arc<dyn AttestationSigner> =
            Arc::new(HmacSigner::new("gate", b"test-key"));
        let orchestrator = PipelineOrchestrator::new(
            config,
            Arc::clone(&policy) as Arc<dyn PolicyStore>,
            executor,
            signer,
        );

        let run = orchestrator.process(order(0.03)).await.unwrap();

        assert_eq!(run.status, RunStatus::Failed);
        // Executor's reason preserved verbatim
        assert_eq!(
            run.stages.payment.as_ref().unwrap().message.as_deref(),
            Some("chain congested")
        );
        assert_eq!(run.terminal_error.as_deref(), Some("chain congested"));

        let snap = policy.snapshot("agent-7").await.unwrap();
        assert_eq!(snap.committed, 0.0);
        assert_eq!(snap.pending, 0.0);
    }

    #[tokio::test]
    async fn test_approval_refuses_run_that_skipped_reception() {
        let config = Arc::new(PolicyConfig::default());
        let policy = Arc::new(InMemoryPolicyStore::new(
            config.spend_window,
            config.frequency_window,
        ));
        let signer: Arc<dyn AttestationSigner> =
            Arc::new(HmacSigner::new("gate", b"test-key"));
        let approval = ApprovalAgent::new(
            config,
            Arc::clone(&policy) as Arc<dyn PolicyStore>,
            signer,
        );

        // Fresh run handed straight to approval: preceding stage is not
        // reception.
        let mut run = PipelineRun::new(order(0.03));
        approval.run(&mut run).await.unwrap();

        assert_eq!(run.status, RunStatus::Rejected);
        assert!(run.terminal_error.is_some());
        assert!(run.stages.payment.is_none());

        // No reservation was taken
        let snap = policy.snapshot("agent-7").await.unwrap();
        assert_eq!(snap.pending, 0.0);
    }

    #[tokio::test]
    async fn test_payment_refuses_unapproved_run() {
        let executor = Arc::new(MockSettlementExecutor::with_balance(1.0));
        let signer: Arc<dyn AttestationSigner> =
            Arc::new(HmacSigner::new("gate", b"test-key"));
        let payment = PaymentAgent::new(executor.clone(), signer);

        let mut run = PipelineRun::new(order(0.03));
        payment.run(&mut run).await.unwrap();

        assert_eq!(run.status, RunStatus::Rejected);
        assert!(run.settlement_ref().is_none());
        // No funds moved
        assert_eq!(executor.available_balance().await.unwrap(), 1.0);
    }
}
