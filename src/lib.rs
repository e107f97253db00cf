//! Agent Payment Gate
//!
//! Gates autonomous, repeated small-value payments made on behalf of a
//! user by an unattended agent:
//! - Explainable, weighted rule evaluation for every purchase intent
//! - Layered spending limits: per-transaction, rolling window, rate cap
//! - Three independently-accountable pipeline stages with signed records
//! - Spend committed only on fully completed runs
//! - Fully auditable, even on partial failure
//!
//! PIPELINE:
//! INTAKE → DECIDE → RECEPTION → APPROVAL → PAYMENT → COMMIT

pub mod api;
pub mod attestation;
pub mod audit;
pub mod classifier;
pub mod config;
pub mod decision;
pub mod error;
pub mod gate;
pub mod models;
pub mod pipeline;
pub mod policy;
pub mod settlement;

pub use error::Result;

// Re-export common types
pub use config::PolicyConfig;
pub use models::*;
pub use classifier::IntentClassifier;
