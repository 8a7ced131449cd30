use std::sync::Arc;

use chrono::{Datelike, Duration, FixedOffset, Timelike, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::builder::{build_model, clamp_lookback, DEFAULT_LOOKBACK_DAYS};
use crate::models::{PulseModel, SignalInput, SignalRecord};
use crate::store::PulseStore;

pub const STALE_AFTER_HOURS: i64 = 24;
pub const MIN_WEIGHT: f64 = 0.05;
pub const MAX_WEIGHT: f64 = 50.0;

/// How far back the batch path looks when deciding which scopes count as
/// recently active.
const ACTIVE_SCOPE_WINDOW_DAYS: i64 = 7;

/// Read-only lookup for a scope's configured time zone. Scopes without a
/// configuration fall back to the engine's default offset.
pub trait TimezoneSource: Send + Sync {
    fn zone_for(&self, scope_key: &str) -> Option<FixedOffset>;
}

/// No per-scope configuration at all; every scope uses the default offset.
pub struct NoZoneConfig;

impl TimezoneSource for NoZoneConfig {
    fn zone_for(&self, _scope_key: &str) -> Option<FixedOffset> {
        None
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BatchOutcome {
    pub recomputed: usize,
    pub failed: usize,
}

/// Recompute orchestrator: owns the staleness policy and the ingestion
/// defaults, delegates persistence to the configured backend.
pub struct PulseEngine {
    store: Arc<dyn PulseStore>,
    zones: Arc<dyn TimezoneSource>,
    default_zone: FixedOffset,
}

impl PulseEngine {
    pub fn new(
        store: Arc<dyn PulseStore>,
        zones: Arc<dyn TimezoneSource>,
        default_zone: FixedOffset,
    ) -> Self {
        Self {
            store,
            zones,
            default_zone,
        }
    }

    /// Append a batch of observations for one scope. An invalid entry is
    /// skipped rather than blocking the rest of the batch; the return value
    /// counts records actually written.
    pub async fn record_signals(
        &self,
        scope_key: &str,
        category: &str,
        inputs: &[SignalInput],
    ) -> anyhow::Result<usize> {
        let now = Utc::now();
        let zone = self
            .zones
            .zone_for(scope_key)
            .unwrap_or(self.default_zone);

        let mut records = Vec::with_capacity(inputs.len());
        for input in inputs {
            let weight = input.weight.unwrap_or(1.0);
            if !weight.is_finite() {
                warn!(scope_key, "skipping signal with non-finite weight");
                continue;
            }

            // Slot assignment happens once, here, in the scope's local time.
            let occurred_at = input.occurred_at.unwrap_or(now);
            let local = occurred_at.with_timezone(&zone);

            records.push(SignalRecord {
                id: Uuid::new_v4(),
                scope_key: scope_key.to_string(),
                category: category.to_string(),
                kind: input.kind,
                day_of_week: local.weekday().num_days_from_monday() as u8,
                hour: local.hour() as u8,
                weight: weight.clamp(MIN_WEIGHT, MAX_WEIGHT),
                created_at: now,
            });
        }

        let written = self.store.insert_signals(&records).await?;
        debug!(scope_key, written, "recorded signals");
        Ok(written)
    }

    /// The current model for a scope: cached if fresh enough, recomputed
    /// otherwise.
    pub async fn get_model(&self, scope_key: &str) -> anyhow::Result<PulseModel> {
        let now = Utc::now();
        if let Some(model) = self.store.latest_model(scope_key).await? {
            if now - model.computed_at <= Duration::hours(STALE_AFTER_HOURS) {
                return Ok(model);
            }
            debug!(scope_key, "cached model is stale, recomputing");
        }

        self.recompute(scope_key, None).await
    }

    /// Rebuild the model from the signal history and overwrite the cached
    /// copy. Idempotent: with no new signals the output differs only in
    /// `computed_at`.
    pub async fn recompute(
        &self,
        scope_key: &str,
        range_days: Option<i64>,
    ) -> anyhow::Result<PulseModel> {
        let now = Utc::now();
        let lookback = clamp_lookback(range_days.unwrap_or(DEFAULT_LOOKBACK_DAYS));
        let cutoff = now - Duration::days(lookback);

        let signals = self.store.signals_since(scope_key, cutoff).await?;
        let model = build_model(&signals, now);
        self.store.upsert_model(scope_key, &model).await?;

        info!(
            scope_key,
            signals = signals.len(),
            lookback_days = lookback,
            "recomputed model"
        );
        Ok(model)
    }

    /// Batch path: refresh every recently-active scope so reads stay cheap.
    /// One scope failing never aborts the rest.
    pub async fn recompute_recent(&self, limit: usize) -> anyhow::Result<BatchOutcome> {
        let since = Utc::now() - Duration::days(ACTIVE_SCOPE_WINDOW_DAYS);
        let scopes = self.store.active_scopes(since, limit).await?;

        let mut outcome = BatchOutcome::default();
        for scope_key in &scopes {
            match self.recompute(scope_key, None).await {
                Ok(_) => outcome.recomputed += 1,
                Err(error) => {
                    warn!(scope_key = %scope_key, %error, "batch recompute failed for scope");
                    outcome.failed += 1;
                }
            }
        }

        info!(
            recomputed = outcome.recomputed,
            failed = outcome.failed,
            "batch recompute finished"
        );
        Ok(outcome)
    }
}
