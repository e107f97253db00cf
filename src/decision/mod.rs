//! Decision engine for purchase-intent gating
//!
//! A deterministic, inspectable weighted rule evaluator. Not a model:
//! every decision carries the full list of reasoning steps that
//! produced it.

pub mod checks;

pub use checks::{
    AmountBoundsCheck, BalanceSufficiencyCheck, CheckCategory, IntentValidityCheck,
    OrderFrequencyCheck, PolicyCheck, TemporalPolicyCheck, WindowLimitCheck,
};

use crate::config::PolicyConfig;
use crate::error::{GateError, Result};
use crate::models::{
    CheckOutcome, Decision, DecisionContext, DecisionResult, OrderIntent, ReasoningStep, RiskTier,
};
use chrono::Utc;
use std::time::Instant;
use tracing::info;

/// Threshold above which a single failing check rejects outright,
/// regardless of aggregate confidence.
const CRITICAL_FAIL_WEIGHT: f64 = 0.9;

/// Weighted rule evaluator producing an explainable decision
pub struct DecisionEngine {
    config: PolicyConfig,
    checks: Vec<Box<dyn PolicyCheck>>,
}

impl DecisionEngine {
    pub fn new(config: PolicyConfig) -> Self {
        Self {
            config,
            checks: Vec::new(),
        }
    }

    pub fn add_check(&mut self, check: Box<dyn PolicyCheck>) {
        self.checks.push(check);
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Evaluate a purchase intent against the full rule set.
    ///
    /// Pure given its context. A malformed context is a validation
    /// error surfaced before any check runs; a well-formed context
    /// never errors, however bad the order looks.
    pub fn evaluate(&self, ctx: &DecisionContext) -> Result<DecisionResult> {
        let start = Instant::now();

        validate_context(ctx)?;

        let reasoning: Vec<ReasoningStep> = self
            .checks
            .iter()
            .map(|check| check.evaluate(ctx, &self.config))
            .collect();

        let confidence = weighted_confidence(&reasoning);
        let warn_count = reasoning
            .iter()
            .filter(|s| s.outcome == CheckOutcome::Warn)
            .count();
        let has_fail = reasoning.iter().any(|s| s.outcome == CheckOutcome::Fail);

        let decision = self.decide(ctx, &reasoning, confidence, warn_count);
        let risk_tier = risk_tier(has_fail, warn_count, confidence);
        let summary = summarize(decision, confidence, risk_tier, &reasoning);
        let suggestions = suggestions(&self.checks, &reasoning);

        info!(
            order_id = %ctx.order.order_id,
            decision = %decision,
            confidence = confidence,
            risk_tier = %risk_tier,
            "Decision evaluated"
        );

        Ok(DecisionResult {
            decision,
            confidence,
            risk_tier,
            reasoning,
            summary,
            suggestions,
            evaluated_at: Utc::now(),
            evaluation_duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Decision precedence: critical fail, cancellation, thresholds,
    /// warn escalation, default approve.
    fn decide(
        &self,
        ctx: &DecisionContext,
        reasoning: &[ReasoningStep],
        confidence: f64,
        warn_count: usize,
    ) -> Decision {
        let critical_fail = reasoning
            .iter()
            .any(|s| s.outcome == CheckOutcome::Fail && s.weight >= CRITICAL_FAIL_WEIGHT);

        if critical_fail {
            Decision::Reject
        } else if ctx.order.intent == OrderIntent::Cancellation {
            Decision::Reject
        } else if confidence >= self.config.auto_approve_threshold {
            Decision::Approve
        } else if confidence < self.config.auto_reject_threshold {
            Decision::Reject
        } else if warn_count >= 2 {
            Decision::Confirm
        } else {
            Decision::Approve
        }
    }
}

/// Create a decision engine with the canonical six checks, in order.
pub fn create_default_decision_engine(config: PolicyConfig) -> DecisionEngine {
    let mut engine = DecisionEngine::new(config);
    engine.add_check(Box::new(IntentValidityCheck));
    engine.add_check(Box::new(AmountBoundsCheck));
    engine.add_check(Box::new(WindowLimitCheck));
    engine.add_check(Box::new(BalanceSufficiencyCheck));
    engine.add_check(Box::new(OrderFrequencyCheck));
    engine.add_check(Box::new(TemporalPolicyCheck));
    engine
}

fn validate_context(ctx: &DecisionContext) -> Result<()> {
    if ctx.order.user_identity.trim().is_empty() {
        return Err(GateError::Validation("user identity is empty".to_string()));
    }
    if ctx.order.item.trim().is_empty() {
        return Err(GateError::Validation("item name is empty".to_string()));
    }
    if !ctx.order.price.is_finite() {
        return Err(GateError::Validation(format!(
            "price {} is not a finite number",
            ctx.order.price
        )));
    }
    if !ctx.available_balance.is_finite() || !ctx.window_spend.is_finite() {
        return Err(GateError::Validation(
            "balance/spend snapshot is not finite".to_string(),
        ));
    }
    Ok(())
}

/// Weighted pass-rate over all steps, rounded to two decimals.
/// pass scores its full weight, warn half, fail nothing.
fn weighted_confidence(reasoning: &[ReasoningStep]) -> f64 {
    let total_weight: f64 = reasoning.iter().map(|s| s.weight).sum();
    if total_weight <= 0.0 {
        return 0.0;
    }

    let score: f64 = reasoning
        .iter()
        .map(|s| match s.outcome {
            CheckOutcome::Pass => s.weight,
            CheckOutcome::Warn => s.weight * 0.5,
            CheckOutcome::Fail => 0.0,
        })
        .sum();

    (score / total_weight * 100.0).round() / 100.0
}

fn risk_tier(has_fail: bool, warn_count: usize, confidence: f64) -> RiskTier {
    if has_fail {
        RiskTier::Critical
    } else if warn_count >= 3 {
        RiskTier::High
    } else if warn_count >= 1 || confidence < 0.7 {
        RiskTier::Medium
    } else {
        RiskTier::Low
    }
}

fn summarize(
    decision: Decision,
    confidence: f64,
    risk_tier: RiskTier,
    reasoning: &[ReasoningStep],
) -> String {
    let first_fail = reasoning
        .iter()
        .find(|s| s.outcome == CheckOutcome::Fail)
        .map(|s| s.detail.as_str());

    match decision {
        Decision::Reject => match first_fail {
            Some(detail) => format!("rejected: {}", detail),
            None => format!(
                "rejected: confidence {:.2} below the auto-reject threshold",
                confidence
            ),
        },
        Decision::Confirm => format!(
            "confirmation requested: confidence {:.2} with {} warning(s), risk {}",
            confidence,
            reasoning
                .iter()
                .filter(|s| s.outcome == CheckOutcome::Warn)
                .count(),
            risk_tier
        ),
        Decision::Delay => format!("delayed: confidence {:.2}, risk {}", confidence, risk_tier),
        Decision::Approve => format!(
            "approved: confidence {:.2}, risk {}",
            confidence, risk_tier
        ),
    }
}

/// One remediation string per failed category, deduplicated in order.
fn suggestions(checks: &[Box<dyn PolicyCheck>], reasoning: &[ReasoningStep]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();

    for (check, step) in checks.iter().zip(reasoning.iter()) {
        if step.outcome == CheckOutcome::Fail {
            let suggestion = check.category().suggestion().to_string();
            if !out.contains(&suggestion) {
                out.push(suggestion);
            }
        }
    }

    out
}

//
// ================= Tests =================
//
