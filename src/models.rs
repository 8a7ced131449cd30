use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a single observation contributes to the busy/slow balance of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Busy,
    Slow,
    EventSpike,
    PostSuccess,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Busy => "busy",
            SignalKind::Slow => "slow",
            SignalKind::EventSpike => "event_spike",
            SignalKind::PostSuccess => "post_success",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "busy" => Some(SignalKind::Busy),
            "slow" => Some(SignalKind::Slow),
            "event_spike" => Some(SignalKind::EventSpike),
            "post_success" => Some(SignalKind::PostSuccess),
            _ => None,
        }
    }
}

/// One weighted, timestamped observation. Write-once: records are appended
/// at ingestion and never mutated or deleted, so scope history stays
/// reconstructable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalRecord {
    pub id: Uuid,
    pub scope_key: String,
    pub category: String,
    pub kind: SignalKind,
    /// 0-6, 0 = Monday, fixed at ingestion in the scope's local time zone.
    pub day_of_week: u8,
    /// 0-23, same resolution rule as `day_of_week`.
    pub hour: u8,
    pub weight: f64,
    pub created_at: DateTime<Utc>,
}

/// Producer-facing shape for `record_signals`. Missing fields get defaults
/// at ingestion (weight 1.0, occurred_at = now).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalInput {
    pub kind: SignalKind,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
}

/// A `(day_of_week, hour)` aggregation bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotWindow {
    pub day_of_week: u8,
    pub hour: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventEnergy {
    Low,
    Medium,
    High,
}

impl EventEnergy {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventEnergy::Low => "low",
            EventEnergy::Medium => "medium",
            EventEnergy::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Up,
    Steady,
    Down,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Up => "up",
            Trend::Steady => "steady",
            Trend::Down => "down",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryTrend {
    pub category: String,
    pub trend: Trend,
}

/// The derived, cached summary for one scope. Keyed 1:1 per scope with
/// upsert semantics; superseded silently on the next recompute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PulseModel {
    pub busy_windows: Vec<SlotWindow>,
    pub slow_windows: Vec<SlotWindow>,
    pub event_energy: EventEnergy,
    pub seasonal_notes: String,
    pub category_trends: Vec<CategoryTrend>,
    pub computed_at: DateTime<Utc>,
}

/// Raw per-post metrics joined to the post's publish time, the signal
/// source for the per-brand timing variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostPerformance {
    pub views: i64,
    pub likes: i64,
    pub comments: i64,
    pub shares: i64,
    pub saves: i64,
    pub clicks: i64,
    pub redemptions: i64,
    pub published_at: DateTime<Utc>,
}

/// Per-brand posting-time summary, the sibling of `PulseModel`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingModel {
    pub best_hours: Vec<u8>,
    pub best_days: Vec<u8>,
    pub sample_size: usize,
    pub best_time_label: String,
    pub computed_at: DateTime<Utc>,
}
