use agent_payment_gate::{
    api::start_server,
    attestation::HmacSigner,
    config::PolicyConfig,
    gate::PaymentGate,
    policy::InMemoryPolicyStore,
    settlement::{HttpSettlementExecutor, MockSettlementExecutor, SettlementExecutor},
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    let api_port: u16 = std::env::var("PORT")
        .or_else(|_| std::env::var("API_PORT"))
        .unwrap_or_else(|_| "8080".to_string())
        .parse()?;

    info!("Agent Payment Gate - API Server");
    info!("Port: {}", api_port);

    // Create components
    let config = PolicyConfig::from_env();
    let policy = Arc::new(InMemoryPolicyStore::new(
        config.spend_window,
        config.frequency_window,
    ));

    // Real settlement service when configured, mock otherwise
    let executor: Arc<dyn SettlementExecutor> = match HttpSettlementExecutor::from_env() {
        Some(executor) => {
            info!("Using HTTP settlement executor");
            Arc::new(executor)
        }
        None => {
            info!("SETTLEMENT_API_BASE_URL not set, using mock settlement executor");
            Arc::new(MockSettlementExecutor::with_balance(1.0))
        }
    };

    let signer = Arc::new(HmacSigner::from_env("payment-gate"));

    let gate = Arc::new(PaymentGate::new(config, policy, executor, signer));

    info!("Gate initialized");

    // Start API server
    start_server(gate, api_port).await?;

    Ok(())
}
