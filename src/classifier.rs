//! Intent Classifier
//!
//! Classifies the free-text intent of an order request as either:
//! - Purchase: a plain buy (e.g., "buy 100 api credits")
//! - BulkPurchase: a buy whose wording or quantity indicates bulk
//! - Cancellation: a cancel/refund request, which can never reach payment

use crate::config::PolicyConfig;
use crate::models::OrderIntent;

/// Static keyword lists — zero allocation
const CANCELLATION_KEYWORDS: &[&str] = &[
    "cancel", "refund", "void", "revoke", "undo", "reverse", "chargeback",
];

const BULK_KEYWORDS: &[&str] = &[
    "bulk", "batch", "wholesale", "in bulk", "stock up", "restock",
];

/// Intent classifier
pub struct IntentClassifier;

impl IntentClassifier {
    /// Classify a request's intent text plus quantity
    pub fn classify(intent_text: &str, quantity: u32, config: &PolicyConfig) -> OrderIntent {
        let text = intent_text.to_lowercase();

        if CANCELLATION_KEYWORDS.iter().any(|kw| text.contains(kw)) {
            return OrderIntent::Cancellation;
        }

        if quantity >= config.bulk_quantity_threshold
            || BULK_KEYWORDS.iter().any(|kw| text.contains(kw))
        {
            return OrderIntent::BulkPurchase;
        }

        OrderIntent::Purchase
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_purchases() {
        let config = PolicyConfig::default();
        let cases = vec![
            "buy 100 api credits",
            "purchase dataset access",
            "pay for compute time",
            "order a weather report",
        ];

        for c in cases {
            assert_eq!(
                IntentClassifier::classify(c, 1, &config),
                OrderIntent::Purchase
            );
        }
    }

    #[test]
    fn test_cancellations() {
        let config = PolicyConfig::default();
        let cases = vec![
            "cancel my last order",
            "refund the api credits",
            "void transaction",
            "reverse that payment",
        ];

        for c in cases {
            assert_eq!(
                IntentClassifier::classify(c, 1, &config),
                OrderIntent::Cancellation
            );
        }
    }

    #[test]
    fn test_bulk_by_quantity_and_keyword() {
        let config = PolicyConfig::default();

        assert_eq!(
            IntentClassifier::classify("buy api credits", 50, &config),
            OrderIntent::BulkPurchase
        );
        assert_eq!(
            IntentClassifier::classify("bulk order of credits", 1, &config),
            OrderIntent::BulkPurchase
        );
    }

    #[test]
    fn test_cancellation_wins_over_bulk() {
        let config = PolicyConfig::default();
        assert_eq!(
            IntentClassifier::classify("cancel the bulk order", 50, &config),
            OrderIntent::Cancellation
        );
    }
}
