//! The canonical policy checks
//!
//! Each check is independent and pure: context + config in, one
//! reasoning step out. Weights express how much a check's verdict
//! moves the overall confidence.

use crate::config::PolicyConfig;
use crate::models::{CheckOutcome, DecisionContext, OrderIntent, ReasoningStep};
use chrono::Timelike;

/// Remediation category a failed check maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckCategory {
    Intent,
    Amount,
    WindowLimit,
    Balance,
    Frequency,
    Temporal,
}

impl CheckCategory {
    /// One remediation string per category, deduplicated by the engine.
    pub fn suggestion(&self) -> &'static str {
        match self {
            CheckCategory::Intent => {
                "Route cancellations and refunds through the merchant, not the payment pipeline"
            }
            CheckCategory::Amount => {
                "Reduce the order amount below the single-transaction ceiling"
            }
            CheckCategory::WindowLimit => {
                "Wait for the rolling spend window to reset before ordering again"
            }
            CheckCategory::Balance => "Top up the settlement balance before retrying",
            CheckCategory::Frequency => {
                "Space out order attempts; recent attempts must age out of the window"
            }
            CheckCategory::Temporal => "Submit the order inside the permitted time range",
        }
    }
}

/// Trait for a single policy check
pub trait PolicyCheck: Send + Sync {
    fn name(&self) -> &'static str;

    fn category(&self) -> CheckCategory;

    fn evaluate(&self, ctx: &DecisionContext, config: &PolicyConfig) -> ReasoningStep;
}

//
// ================= 1. Intent validity =================
//

/// Cancellations can never proceed to payment; bulk orders draw a warning.
pub struct IntentValidityCheck;

impl PolicyCheck for IntentValidityCheck {
    fn name(&self) -> &'static str {
        "intent_validity"
    }

    fn category(&self) -> CheckCategory {
        CheckCategory::Intent
    }

    fn evaluate(&self, ctx: &DecisionContext, config: &PolicyConfig) -> ReasoningStep {
        const WEIGHT: f64 = 1.0;

        match ctx.order.intent {
            OrderIntent::Cancellation => ReasoningStep::new(
                self.name(),
                CheckOutcome::Fail,
                "cancellation intents cannot proceed to payment",
                WEIGHT,
            ),
            OrderIntent::BulkPurchase => ReasoningStep::new(
                self.name(),
                CheckOutcome::Warn,
                format!(
                    "bulk order: quantity {} at or above threshold {}",
                    ctx.order.quantity, config.bulk_quantity_threshold
                ),
                WEIGHT,
            ),
            OrderIntent::Purchase => ReasoningStep::new(
                self.name(),
                CheckOutcome::Pass,
                "purchase intent accepted",
                WEIGHT,
            ),
        }
    }
}

//
// ================= 2. Amount bounds =================
//

pub struct AmountBoundsCheck;

impl PolicyCheck for AmountBoundsCheck {
    fn name(&self) -> &'static str {
        "amount_bounds"
    }

    fn category(&self) -> CheckCategory {
        CheckCategory::Amount
    }

    fn evaluate(&self, ctx: &DecisionContext, config: &PolicyConfig) -> ReasoningStep {
        const WEIGHT: f64 = 1.0;
        let price = ctx.order.price;
        let ceiling = config.single_tx_ceiling;

        if price <= 0.0 {
            return ReasoningStep::new(
                self.name(),
                CheckOutcome::Fail,
                format!("price {:.4} must be strictly positive", price),
                WEIGHT,
            );
        }

        if price > ceiling {
            return ReasoningStep::new(
                self.name(),
                CheckOutcome::Fail,
                format!(
                    "price {:.4} exceeds single-transaction ceiling {:.4}",
                    price, ceiling
                ),
                WEIGHT,
            );
        }

        if price > ceiling * 0.8 {
            return ReasoningStep::new(
                self.name(),
                CheckOutcome::Warn,
                format!(
                    "price {:.4} is above 80% of the {:.4} ceiling",
                    price, ceiling
                ),
                WEIGHT,
            );
        }

        ReasoningStep::new(
            self.name(),
            CheckOutcome::Pass,
            format!("price {:.4} within ceiling {:.4}", price, ceiling),
            WEIGHT,
        )
    }
}

//
// ================= 3. Rolling window limit =================
//

pub struct WindowLimitCheck;

impl PolicyCheck for WindowLimitCheck {
    fn name(&self) -> &'static str {
        "rolling_window_limit"
    }

    fn category(&self) -> CheckCategory {
        CheckCategory::WindowLimit
    }

    fn evaluate(&self, ctx: &DecisionContext, config: &PolicyConfig) -> ReasoningStep {
        const WEIGHT: f64 = 0.9;
        let projected = ctx.window_spend + ctx.order.price;
        let ceiling = config.window_ceiling;

        if projected > ceiling {
            return ReasoningStep::new(
                self.name(),
                CheckOutcome::Fail,
                format!(
                    "projected window spend {:.4} exceeds rolling ceiling {:.4}",
                    projected, ceiling
                ),
                WEIGHT,
            );
        }

        if projected > ceiling * 0.9 {
            return ReasoningStep::new(
                self.name(),
                CheckOutcome::Warn,
                format!(
                    "projected window spend {:.4} is above 90% of ceiling {:.4}",
                    projected, ceiling
                ),
                WEIGHT,
            );
        }

        ReasoningStep::new(
            self.name(),
            CheckOutcome::Pass,
            format!(
                "projected window spend {:.4} within ceiling {:.4}",
                projected, ceiling
            ),
            WEIGHT,
        )
    }
}

//
// ================= 4. Balance sufficiency =================
//

pub struct BalanceSufficiencyCheck;

impl PolicyCheck for BalanceSufficiencyCheck {
    fn name(&self) -> &'static str {
        "balance_sufficiency"
    }

    fn category(&self) -> CheckCategory {
        CheckCategory::Balance
    }

    fn evaluate(&self, ctx: &DecisionContext, config: &PolicyConfig) -> ReasoningStep {
        const WEIGHT: f64 = 1.0;
        let balance = ctx.available_balance;
        let price = ctx.order.price;

        if balance < price {
            return ReasoningStep::new(
                self.name(),
                CheckOutcome::Fail,
                format!(
                    "available balance {:.4} is below order price {:.4}",
                    balance, price
                ),
                WEIGHT,
            );
        }

        let remaining = balance - price;
        if remaining < config.balance_buffer {
            return ReasoningStep::new(
                self.name(),
                CheckOutcome::Warn,
                format!(
                    "remaining balance {:.4} would fall below buffer {:.4}",
                    remaining, config.balance_buffer
                ),
                WEIGHT,
            );
        }

        ReasoningStep::new(
            self.name(),
            CheckOutcome::Pass,
            format!("balance {:.4} covers price {:.4}", balance, price),
            WEIGHT,
        )
    }
}

//
// ================= 5. Order frequency =================
//

pub struct OrderFrequencyCheck;

impl PolicyCheck for OrderFrequencyCheck {
    fn name(&self) -> &'static str {
        "order_frequency"
    }

    fn category(&self) -> CheckCategory {
        CheckCategory::Frequency
    }

    fn evaluate(&self, ctx: &DecisionContext, config: &PolicyConfig) -> ReasoningStep {
        const WEIGHT: f64 = 0.7;
        let count = ctx.recent_order_count;
        let cap = config.order_cap;

        if count >= cap {
            return ReasoningStep::new(
                self.name(),
                CheckOutcome::Fail,
                format!("{} recent attempts at or above the cap of {}", count, cap),
                WEIGHT,
            );
        }

        if count as f64 >= cap as f64 * 0.7 {
            return ReasoningStep::new(
                self.name(),
                CheckOutcome::Warn,
                format!("{} recent attempts approaching the cap of {}", count, cap),
                WEIGHT,
            );
        }

        ReasoningStep::new(
            self.name(),
            CheckOutcome::Pass,
            format!("{} recent attempts, cap {}", count, cap),
            WEIGHT,
        )
    }
}

//
// ================= 6. Temporal policy =================
//

/// Orders outside the permitted hours are suspicious but never fatal.
pub struct TemporalPolicyCheck;

impl PolicyCheck for TemporalPolicyCheck {
    fn name(&self) -> &'static str {
        "temporal_policy"
    }

    fn category(&self) -> CheckCategory {
        CheckCategory::Temporal
    }

    fn evaluate(&self, ctx: &DecisionContext, config: &PolicyConfig) -> ReasoningStep {
        const WEIGHT: f64 = 0.3;
        let hour = ctx.now.hour();

        if !config.is_hour_permitted(hour) {
            return ReasoningStep::new(
                self.name(),
                CheckOutcome::Warn,
                format!(
                    "order placed at hour {} outside permitted range {}-{}",
                    hour, config.permitted_start_hour, config.permitted_end_hour
                ),
                WEIGHT,
            );
        }

        ReasoningStep::new(
            self.name(),
            CheckOutcome::Pass,
            format!("order placed at hour {} inside permitted range", hour),
            WEIGHT,
        )
    }
}
