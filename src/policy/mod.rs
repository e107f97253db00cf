//! Policy store: spend ledger + order-frequency tracker
//!
//! Shared, long-lived, per-identity policy state behind one injected
//! abstraction. Currently in-memory; a durable store can replace it
//! behind the same trait.

use crate::error::{GateError, Result};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

/// Point-in-time view of one identity's rolling spend window.
#[derive(Debug, Clone, Copy)]
pub struct SpendSnapshot {
    pub committed: f64,
    pub pending: f64,
    pub window_started_at: DateTime<Utc>,
}

/// Trait for per-identity policy state
///
/// Every read-decide-write sequence an implementation performs must be
/// atomic per call, so two concurrent orders cannot both observe
/// "projected spend within limit" and later both commit.
#[async_trait::async_trait]
pub trait PolicyStore: Send + Sync {
    /// Committed + pending spend after applying the lazy window reset.
    async fn snapshot(&self, identity: &str) -> Result<SpendSnapshot>;

    /// Atomic check-and-reserve against the rolling ceiling. On success
    /// the amount is held as pending until committed or released.
    async fn reserve(&self, identity: &str, amount: f64, ceiling: f64) -> Result<()>;

    /// Move a reservation into committed spend. The only way committed
    /// spend grows; called exactly once per completed run.
    async fn commit(&self, identity: &str, amount: f64) -> Result<()>;

    /// Return a reservation after a failed or rejected run.
    async fn release(&self, identity: &str, amount: f64) -> Result<()>;

    /// Register an order attempt at the current time.
    async fn record(&self, identity: &str) -> Result<()>;

    /// Number of attempts inside the trailing frequency window.
    async fn count(&self, identity: &str) -> Result<usize>;
}

//
// ================= In-memory implementation =================
//

struct LedgerEntry {
    window_started_at: DateTime<Utc>,
    committed: f64,
    pending: f64,
}

impl LedgerEntry {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            window_started_at: now,
            committed: 0.0,
            pending: 0.0,
        }
    }

    /// All-or-nothing lazy reset: once the window has fully elapsed,
    /// committed spend drops to zero and the window restarts at `now`.
    /// Pending reservations belong to in-flight runs and carry over.
    fn reset_if_elapsed(&mut self, now: DateTime<Utc>, window: Duration) {
        if now - self.window_started_at >= window {
            self.committed = 0.0;
            self.window_started_at = now;
        }
    }
}

/// In-memory policy store for development and single-process deployments.
/// Ledger and tracker maps are fully partitioned by identity; each
/// operation holds the map lock across its whole read-decide-write
/// sequence.
pub struct InMemoryPolicyStore {
    spend_window: Duration,
    frequency_window: Duration,
    ledgers: Mutex<HashMap<String, LedgerEntry>>,
    attempts: Mutex<HashMap<String, Vec<DateTime<Utc>>>>,
}

impl InMemoryPolicyStore {
    pub fn new(spend_window: Duration, frequency_window: Duration) -> Self {
        Self {
            spend_window,
            frequency_window,
            ledgers: Mutex::new(HashMap::new()),
            attempts: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait::async_trait]
impl PolicyStore for InMemoryPolicyStore {

    async fn snapshot(&self, identity: &str) -> Result<SpendSnapshot> {
        let now = Utc::now();
        let mut ledgers = self.ledgers.lock().await;

        let entry = ledgers
            .entry(identity.to_string())
            .or_insert_with(|| LedgerEntry::new(now));
        entry.reset_if_elapsed(now, self.spend_window);

        Ok(SpendSnapshot {
            committed: entry.committed,
            pending: entry.pending,
            window_started_at: entry.window_started_at,
        })
    }

    async fn reserve(&self, identity: &str, amount: f64, ceiling: f64) -> Result<()> {
        let now = Utc::now();
        let mut ledgers = self.ledgers.lock().await;

        let entry = ledgers
            .entry(identity.to_string())
            .or_insert_with(|| LedgerEntry::new(now));
        entry.reset_if_elapsed(now, self.spend_window);

        let projected = entry.committed + entry.pending + amount;
        if projected > ceiling {
            return Err(GateError::PolicyViolation(format!(
                "projected window spend {:.4} exceeds ceiling {:.4} for {}",
                projected, ceiling, identity
            )));
        }

        entry.pending += amount;

        debug!(
            identity = identity,
            amount = amount,
            pending = entry.pending,
            committed = entry.committed,
            "Reserved spend"
        );

        Ok(())
    }

    async fn commit(&self, identity: &str, amount: f64) -> Result<()> {
        let now = Utc::now();
        let mut ledgers = self.ledgers.lock().await;

        let entry = ledgers
            .entry(identity.to_string())
            .or_insert_with(|| LedgerEntry::new(now));

        entry.pending = (entry.pending - amount).max(0.0);
        entry.committed += amount;

        debug!(
            identity = identity,
            amount = amount,
            committed = entry.committed,
            "Committed spend"
        );

        Ok(())
    }

    async fn release(&self, identity: &str, amount: f64) -> Result<()> {
        let mut ledgers = self.ledgers.lock().await;

        if let Some(entry) = ledgers.get_mut(identity) {
            entry.pending = (entry.pending - amount).max(0.0);
        }

        Ok(())
    }

    async fn record(&self, identity: &str) -> Result<()> {
        let now = Utc::now();
        let cutoff = now - self.frequency_window;
        let mut attempts = self.attempts.lock().await;

        let stamps = attempts.entry(identity.to_string()).or_default();
        stamps.retain(|t| *t > cutoff);
        stamps.push(now);

        Ok(())
    }

    async fn count(&self, identity: &str) -> Result<usize> {
        let cutoff = Utc::now() - self.frequency_window;
        let mut attempts = self.attempts.lock().await;

        match attempts.get_mut(identity) {
            Some(stamps) => {
                stamps.retain(|t| *t > cutoff);
                Ok(stamps.len())
            }
            None => Ok(0),
        }
    }
}

//
// ================= Tests =================
//

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> InMemoryPolicyStore {
        InMemoryPolicyStore::new(Duration::hours(24), Duration::hours(1))
    }

    #[tokio::test]
    async fn test_snapshot_starts_empty() {
        let store = store();
        let snap = store.snapshot("alice").await.unwrap();
        assert_eq!(snap.committed, 0.0);
        assert_eq!(snap.pending, 0.0);
    }

    #[tokio::test]
    async fn test_reserve_commit_lifecycle() {
        let store = store();

        store.reserve("alice", 0.5, 10.0).await.unwrap();
        let snap = store.snapshot("alice").await.unwrap();
        assert_eq!(snap.pending, 0.5);
        assert_eq!(snap.committed, 0.0);

        store.commit("alice", 0.5).await.unwrap();
        let snap = store.snapshot("alice").await.unwrap();
        assert_eq!(snap.pending, 0.0);
        assert_eq!(snap.committed, 0.5);
    }

    #[tokio::test]
    async fn test_reserve_enforces_ceiling() {
        let store = store();

        store.reserve("alice", 9.0, 10.0).await.unwrap();
        store.commit("alice", 9.0).await.unwrap();

        // 9.0 + 1.5 > 10.0 is rejected, 9.0 + 0.5 is not
        assert!(store.reserve("alice", 1.5, 10.0).await.is_err());
        assert!(store.reserve("alice", 0.5, 10.0).await.is_ok());
    }

    #[tokio::test]
    async fn test_pending_counts_toward_ceiling() {
        let store = store();

        store.reserve("alice", 6.0, 10.0).await.unwrap();
        // A concurrent order cannot also claim the remaining headroom twice
        assert!(store.reserve("alice", 6.0, 10.0).await.is_err());
        assert!(store.reserve("alice", 4.0, 10.0).await.is_ok());
    }

    #[tokio::test]
    async fn test_release_restores_headroom() {
        let store = store();

        store.reserve("alice", 8.0, 10.0).await.unwrap();
        assert!(store.reserve("alice", 8.0, 10.0).await.is_err());

        store.release("alice", 8.0).await.unwrap();
        assert!(store.reserve("alice", 8.0, 10.0).await.is_ok());
    }

    #[tokio::test]
    async fn test_identities_are_partitioned() {
        let store = store();

        store.reserve("alice", 10.0, 10.0).await.unwrap();
        // Bob's ledger is untouched by Alice's reservation
        assert!(store.reserve("bob", 10.0, 10.0).await.is_ok());
    }

    #[tokio::test]
    async fn test_window_reset_is_all_or_nothing() {
        let store = InMemoryPolicyStore::new(
            Duration::milliseconds(40),
            Duration::hours(1),
        );

        store.reserve("alice", 5.0, 10.0).await.unwrap();
        store.commit("alice", 5.0).await.unwrap();
        let before = store.snapshot("alice").await.unwrap();
        assert_eq!(before.committed, 5.0);

        tokio::time::sleep(std::time::Duration::from_millis(60)).await;

        let after = store.snapshot("alice").await.unwrap();
        assert_eq!(after.committed, 0.0);
        assert!(after.window_started_at > before.window_started_at);
    }

    #[tokio::test]
    async fn test_frequency_tracker_prunes_old_attempts() {
        let store = InMemoryPolicyStore::new(
            Duration::hours(24),
            Duration::milliseconds(40),
        );

        for _ in 0..3 {
            store.record("alice").await.unwrap();
        }
        assert_eq!(store.count("alice").await.unwrap(), 3);

        tokio::time::sleep(std::time::Duration::from_millis(60)).await;

        assert_eq!(store.count("alice").await.unwrap(), 0);

        store.record("alice").await.unwrap();
        assert_eq!(store.count("alice").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_reserves_cannot_overshoot() {
        use std::sync::Arc;

        let store = Arc::new(store());
        let mut handles = Vec::new();

        // Twenty concurrent orders of 1.0 against a 10.0 ceiling
        for _ in 0..20 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.reserve("alice", 1.0, 10.0).await.is_ok()
            }));
        }

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                granted += 1;
            }
        }

        assert_eq!(granted, 10);
        let snap = store.snapshot("alice").await.unwrap();
        assert_eq!(snap.pending, 10.0);
    }
}
