//! Policy configuration
//!
//! All spending ceilings, thresholds and windows in one place.
//! Values come from `GATE_*` environment variables, with defaults
//! suitable for small-value agent payments.

use chrono::Duration;
use std::env;

#[derive(Debug, Clone)]
pub struct PolicyConfig {
    /// Maximum price of a single transaction.
    pub single_tx_ceiling: f64,
    /// Maximum committed spend inside one rolling window.
    pub window_ceiling: f64,
    /// Length of the rolling spend window.
    pub spend_window: Duration,
    /// Balance that must remain after a payment before a warning fires.
    pub balance_buffer: f64,
    /// Maximum order attempts per identity inside the frequency window.
    pub order_cap: usize,
    /// Length of the trailing order-frequency window.
    pub frequency_window: Duration,
    /// Quantity at which a purchase counts as a bulk order.
    pub bulk_quantity_threshold: u32,
    /// Permitted ordering hours, UTC. `start == end` means always open;
    /// `start > end` wraps past midnight.
    pub permitted_start_hour: u32,
    pub permitted_end_hour: u32,
    /// Confidence at or above which an order auto-approves.
    pub auto_approve_threshold: f64,
    /// Confidence below which an order auto-rejects.
    pub auto_reject_threshold: f64,
    /// Currency codes the reception stage accepts.
    pub accepted_currencies: Vec<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            single_tx_ceiling: 1.0,
            window_ceiling: 10.0,
            spend_window: Duration::hours(24),
            balance_buffer: 0.1,
            order_cap: 10,
            frequency_window: Duration::hours(1),
            bulk_quantity_threshold: 10,
            permitted_start_hour: 0,
            permitted_end_hour: 24,
            auto_approve_threshold: 0.80,
            auto_reject_threshold: 0.30,
            accepted_currencies: vec![
                "USDC".to_string(),
                "USD".to_string(),
                "ETH".to_string(),
            ],
        }
    }
}

impl PolicyConfig {
    /// Build a config from `GATE_*` environment variables. Unset or
    /// unparseable values fall back to the defaults rather than abort.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            single_tx_ceiling: env_f64("GATE_SINGLE_TX_CEILING", defaults.single_tx_ceiling),
            window_ceiling: env_f64("GATE_WINDOW_CEILING", defaults.window_ceiling),
            spend_window: Duration::seconds(env_i64(
                "GATE_SPEND_WINDOW_SECS",
                defaults.spend_window.num_seconds(),
            )),
            balance_buffer: env_f64("GATE_BALANCE_BUFFER", defaults.balance_buffer),
            order_cap: env_usize("GATE_ORDER_CAP", defaults.order_cap),
            frequency_window: Duration::seconds(env_i64(
                "GATE_FREQUENCY_WINDOW_SECS",
                defaults.frequency_window.num_seconds(),
            )),
            bulk_quantity_threshold: env_u32(
                "GATE_BULK_QUANTITY_THRESHOLD",
                defaults.bulk_quantity_threshold,
            ),
            permitted_start_hour: env_u32("GATE_PERMITTED_START_HOUR", defaults.permitted_start_hour),
            permitted_end_hour: env_u32("GATE_PERMITTED_END_HOUR", defaults.permitted_end_hour),
            auto_approve_threshold: env_f64(
                "GATE_AUTO_APPROVE_THRESHOLD",
                defaults.auto_approve_threshold,
            ),
            auto_reject_threshold: env_f64(
                "GATE_AUTO_REJECT_THRESHOLD",
                defaults.auto_reject_threshold,
            ),
            accepted_currencies: env::var("GATE_ACCEPTED_CURRENCIES")
                .map(|raw| {
                    raw.split(',')
                        .map(|c| c.trim().to_uppercase())
                        .filter(|c| !c.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.accepted_currencies),
        }
    }

    /// Whether an hour-of-day (UTC) falls inside the permitted range.
    pub fn is_hour_permitted(&self, hour: u32) -> bool {
        let (start, end) = (self.permitted_start_hour, self.permitted_end_hour);
        if start == end || (start == 0 && end == 24) {
            return true;
        }
        if start < end {
            hour >= start && hour < end
        } else {
            // wraps past midnight
            hour >= start || hour < end
        }
    }

    pub fn accepts_currency(&self, currency: &str) -> bool {
        self.accepted_currencies
            .iter()
            .any(|c| c.eq_ignore_ascii_case(currency))
    }
}

fn env_f64(name: &str, default: f64) -> f64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_i64(name: &str, default: i64) -> i64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(name: &str, default: u32) -> u32 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
