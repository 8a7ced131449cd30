use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{PulseModel, SignalRecord};

/// The single storage contract both deployment modes implement: append-only
/// signals, one upserted model per scope, and a recent-activity listing for
/// the batch path. There is deliberately no update or delete surface for
/// signals.
#[async_trait]
pub trait PulseStore: Send + Sync {
    /// Append a batch of signal records. Returns how many were written.
    async fn insert_signals(&self, records: &[SignalRecord]) -> anyhow::Result<usize>;

    /// Signals for one scope with `created_at >= cutoff`, newest first.
    /// Stored records that fail to decode are skipped, not fatal.
    async fn signals_since(
        &self,
        scope_key: &str,
        cutoff: DateTime<Utc>,
    ) -> anyhow::Result<Vec<SignalRecord>>;

    /// Replace the cached model for a scope (single row, overwrite).
    async fn upsert_model(&self, scope_key: &str, model: &PulseModel) -> anyhow::Result<()>;

    /// The cached model for a scope, if one has ever been computed.
    async fn latest_model(&self, scope_key: &str) -> anyhow::Result<Option<PulseModel>>;

    /// Scopes that received signals since `since`, most recently active
    /// first, capped at `limit`.
    async fn active_scopes(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> anyhow::Result<Vec<String>>;
}
