//! Payment gate facade
//!
//! The single entry point the transport layer talks to:
//! classify -> register attempt -> snapshot -> decide -> pipeline -> audit.

use crate::audit::{compute_order_hash, AuditLog, GateAuditRecord};
use crate::classifier::IntentClassifier;
use crate::config::PolicyConfig;
use crate::decision::{create_default_decision_engine, DecisionEngine};
use crate::error::{GateError, Result};
use crate::models::{
    Decision, DecisionContext, GateResponse, Order, OrderRequest, PipelineRun,
};
use crate::pipeline::PipelineOrchestrator;
use crate::policy::PolicyStore;
use crate::settlement::SettlementExecutor;
use crate::attestation::AttestationSigner;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Gates autonomous purchases behind the decision engine and drives
/// approved orders through the pipeline.
pub struct PaymentGate {
    config: Arc<PolicyConfig>,
    engine: DecisionEngine,
    orchestrator: PipelineOrchestrator,
    policy: Arc<dyn PolicyStore>,
    executor: Arc<dyn SettlementExecutor>,
    audit_log: AuditLog,
}

impl PaymentGate {
    pub fn new(
        config: PolicyConfig,
        policy: Arc<dyn PolicyStore>,
        executor: Arc<dyn SettlementExecutor>,
        signer: Arc<dyn AttestationSigner>,
    ) -> Self {
        let config = Arc::new(config);
        let engine = create_default_decision_engine((*config).clone());
        let orchestrator = PipelineOrchestrator::new(
            Arc::clone(&config),
            Arc::clone(&policy),
            Arc::clone(&executor),
            signer,
        );

        Self {
            config,
            engine,
            orchestrator,
            policy,
            executor,
            audit_log: AuditLog::new(),
        }
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit_log
    }

    /// Gate one purchase intent end to end.
    ///
    /// A policy rejection comes back as a response carrying the
    /// decision; an `Err` means the request was malformed, the caller
    /// is rate limited, or the service itself is unavailable.
    pub async fn submit(&self, request: OrderRequest) -> Result<GateResponse> {
        let started = Instant::now();

        let order = self.build_order(&request)?;

        info!(
            order_id = %order.order_id,
            identity = %order.user_identity,
            item = %order.item,
            price = order.price,
            intent = ?order.intent,
            "Order received"
        );

        // Count first so the snapshot holds prior attempts only, then
        // register this one. Abusive traffic is refused outright; the
        // engine's frequency check stays as defense in depth.
        let recent_order_count = self.policy.count(&order.user_identity).await?;
        self.policy.record(&order.user_identity).await?;

        if recent_order_count >= self.config.order_cap {
            warn!(
                identity = %order.user_identity,
                attempts = recent_order_count,
                cap = self.config.order_cap,
                "Order attempt rate limited"
            );
            return Err(GateError::RateLimitExceeded(format!(
                "{} attempts in the trailing window, cap {}",
                recent_order_count, self.config.order_cap
            )));
        }

        // Collaborator unavailability is a system fault, reported
        // distinctly from any policy outcome.
        let available_balance = self.executor.available_balance().await?;
        let spend = self.policy.snapshot(&order.user_identity).await?;

        let ctx = DecisionContext {
            order: order.clone(),
            recent_order_count,
            window_spend: spend.committed + spend.pending,
            available_balance,
            now: Utc::now(),
        };

        let decision = Arc::new(self.engine.evaluate(&ctx)?);

        debug!(
            order_id = %order.order_id,
            decision = %decision.decision,
            confidence = decision.confidence,
            "Pre-filter evaluated"
        );

        // Only an outright rejection stops here; the approval stage is
        // the authoritative gate for everything that proceeds.
        let pipeline_run = if decision.decision == Decision::Reject {
            None
        } else {
            Some(Arc::new(self.orchestrator.process(order.clone()).await?))
        };

        let settlement_ref = pipeline_run
            .as_deref()
            .and_then(PipelineRun::settlement_ref)
            .map(str::to_string);
        let error_message = match pipeline_run.as_deref() {
            Some(run) => run.terminal_error.clone(),
            None => Some(decision.summary.clone()),
        };

        self.audit_log
            .record(GateAuditRecord {
                audit_id: Uuid::new_v4(),
                order_hash: compute_order_hash(&order),
                order: Arc::new(order),
                decision: Arc::clone(&decision),
                run_status: pipeline_run.as_deref().map(|run| run.status),
                pipeline_run: pipeline_run.clone(),
                settlement_ref: settlement_ref.clone(),
                created_at: Utc::now(),
            })
            .await?;

        info!(
            decision = %decision.decision,
            status = ?pipeline_run.as_deref().map(|run| run.status),
            duration_ms = started.elapsed().as_millis() as u64,
            "Order gated"
        );

        Ok(GateResponse {
            decision: (*decision).clone(),
            pipeline_run: pipeline_run.map(|run| (*run).clone()),
            settlement_ref,
            error_message,
        })
    }

    fn build_order(&self, request: &OrderRequest) -> Result<Order> {
        if request.user_identity.trim().is_empty() {
            return Err(GateError::Validation("user identity is required".to_string()));
        }
        if request.item.trim().is_empty() {
            return Err(GateError::Validation("item name is required".to_string()));
        }
        if !request.price.is_finite() {
            return Err(GateError::Validation(format!(
                "price {} is not a finite number",
                request.price
            )));
        }
        let merchant_identity = request
            .merchant_identity
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .ok_or_else(|| {
                GateError::Validation("merchant identity is required".to_string())
            })?;

        let intent =
            IntentClassifier::classify(&request.intent, request.quantity, &self.config);

        Ok(Order {
            order_id: Uuid::new_v4(),
            item: request.item.trim().to_string(),
            price: request.price,
            quantity: request.quantity,
            currency: request
                .currency
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .unwrap_or("USDC")
                .to_uppercase(),
            user_identity: request.user_identity.trim().to_string(),
            merchant_identity: merchant_identity.to_string(),
            intent,
            created_at: Utc::now(),
        })
    }
}

//
// ================= Tests =================
//
