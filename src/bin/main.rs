use agent_payment_gate::{
    attestation::HmacSigner,
    config::PolicyConfig,
    gate::PaymentGate,
    models::OrderRequest,
    policy::InMemoryPolicyStore,
    settlement::MockSettlementExecutor,
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    info!("Agent Payment Gate starting");

    // Create components
    let config = PolicyConfig::default();
    let policy = Arc::new(InMemoryPolicyStore::new(
        config.spend_window,
        config.frequency_window,
    ));
    let executor = Arc::new(MockSettlementExecutor::with_balance(1.0));
    let signer = Arc::new(HmacSigner::from_env("payment-gate"));

    // Create the gate
    let gate = PaymentGate::new(config, policy, executor, signer);

    // Submit a sample order
    let request = OrderRequest {
        intent: "buy 100 api credits for the research agent".to_string(),
        item: "api-credits".to_string(),
        price: 0.03,
        quantity: 1,
        currency: Some("USDC".to_string()),
        user_identity: "agent-7".to_string(),
        merchant_identity: Some("data-vendor".to_string()),
        metadata: None,
    };

    info!(
        item = %request.item,
        price = request.price,
        "Submitting order"
    );

    match gate.submit(request).await {
        Ok(response) => {
            println!("\n=== GATE RESULT ===");
            println!("Decision: {}", response.decision.decision);
            println!("Confidence: {:.2}", response.decision.confidence);
            println!("Risk tier: {}", response.decision.risk_tier);
            println!("Summary: {}", response.decision.summary);

            if let Some(run) = &response.pipeline_run {
                println!("Pipeline status: {}", run.status);
            }
            if let Some(settlement_ref) = &response.settlement_ref {
                println!("Settlement ref: {}", settlement_ref);
            }

            println!("\nReasoning:");
            for (i, step) in response.decision.reasoning.iter().enumerate() {
                println!(
                    "  {}: [{:?}] {} - {}",
                    i + 1,
                    step.outcome,
                    step.check_name,
                    step.detail
                );
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("Gate refused the order: {}", e);
            Err(Box::new(e) as Box<dyn std::error::Error>)
        }
    }
}
