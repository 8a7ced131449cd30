use std::collections::HashMap;

use chrono::{DateTime, Datelike, Duration, Utc};

use crate::models::{
    CategoryTrend, EventEnergy, PulseModel, SignalKind, SignalRecord, SlotWindow, Trend,
};

pub const DEFAULT_LOOKBACK_DAYS: i64 = 45;
pub const MIN_LOOKBACK_DAYS: i64 = 7;
pub const MAX_LOOKBACK_DAYS: i64 = 90;

const MAX_WINDOWS: usize = 4;
const MAX_CATEGORY_TRENDS: usize = 4;
const RECENT_EVENT_DAYS: i64 = 14;

const POST_SUCCESS_FACTOR: f64 = 0.7;
const EVENT_SPIKE_FACTOR: f64 = 0.85;

pub fn clamp_lookback(days: i64) -> i64 {
    days.clamp(MIN_LOOKBACK_DAYS, MAX_LOOKBACK_DAYS)
}

#[derive(Default)]
struct SlotAccum {
    busy: f64,
    slow: f64,
}

/// Compress one scope's signals into a pulse model. Pure and deterministic
/// for a fixed `now`; never fails, an empty input just yields empty window
/// and trend lists.
pub fn build_model(signals: &[SignalRecord], now: DateTime<Utc>) -> PulseModel {
    let mut slots: HashMap<(u8, u8), SlotAccum> = HashMap::new();
    let mut categories: HashMap<String, f64> = HashMap::new();
    let mut recent_event_energy = 0.0;
    let event_cutoff = now - Duration::days(RECENT_EVENT_DAYS);

    for signal in signals {
        let slot = slots
            .entry((signal.day_of_week, signal.hour))
            .or_default();
        match signal.kind {
            SignalKind::Busy => slot.busy += signal.weight,
            SignalKind::Slow => slot.slow += signal.weight,
            SignalKind::PostSuccess => slot.busy += POST_SUCCESS_FACTOR * signal.weight,
            SignalKind::EventSpike => {
                slot.busy += EVENT_SPIKE_FACTOR * signal.weight;
                if signal.created_at >= event_cutoff {
                    recent_event_energy += signal.weight;
                }
            }
        }
        *categories.entry(signal.category.clone()).or_insert(0.0) += signal.weight;
    }

    let busy_windows = rank_windows(&slots, |accum| accum.busy - accum.slow);
    let slow_windows = rank_windows(&slots, |accum| accum.slow - accum.busy);

    PulseModel {
        busy_windows,
        slow_windows,
        event_energy: classify_event_energy(recent_event_energy),
        seasonal_notes: seasonal_notes(now.month()).to_string(),
        category_trends: rank_category_trends(categories),
        computed_at: now,
    }
}

fn rank_windows<F>(slots: &HashMap<(u8, u8), SlotAccum>, score: F) -> Vec<SlotWindow>
where
    F: Fn(&SlotAccum) -> f64,
{
    let mut scored: Vec<((u8, u8), f64)> = slots
        .iter()
        .map(|(slot, accum)| (*slot, score(accum)))
        .filter(|(_, value)| *value > 0.0)
        .collect();

    // Tie-break on the slot key so equal scores still order deterministically.
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });

    scored
        .into_iter()
        .take(MAX_WINDOWS)
        .map(|((day_of_week, hour), _)| SlotWindow { day_of_week, hour })
        .collect()
}

fn rank_category_trends(categories: HashMap<String, f64>) -> Vec<CategoryTrend> {
    let mut totals: Vec<(String, f64)> = categories.into_iter().collect();
    totals.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });

    totals
        .into_iter()
        .take(MAX_CATEGORY_TRENDS)
        .map(|(category, total)| CategoryTrend {
            category,
            trend: classify_trend(total),
        })
        .collect()
}

fn classify_trend(total_weight: f64) -> Trend {
    if total_weight >= 8.0 {
        Trend::Up
    } else if total_weight >= 3.0 {
        Trend::Steady
    } else {
        Trend::Down
    }
}

fn classify_event_energy(recent_weight: f64) -> EventEnergy {
    if recent_weight >= 8.0 {
        EventEnergy::High
    } else if recent_weight >= 2.0 {
        EventEnergy::Medium
    } else {
        EventEnergy::Low
    }
}

fn seasonal_notes(month: u32) -> &'static str {
    match month {
        11 | 12 | 1 => {
            "Holiday season: gift guides, year-end events, and warm indoor promos land well."
        }
        2..=4 => "Spring ramp-up: fresh menus, outdoor prep, and renewal themes resonate.",
        5..=8 => "Summer peak: tourists, patios, and evening events drive foot traffic.",
        _ => "Fall transition: back-to-school routines and cozy seasonal specials perform.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn signal(kind: SignalKind, dow: u8, hour: u8, weight: f64, days_ago: i64) -> SignalRecord {
        SignalRecord {
            id: Uuid::new_v4(),
            scope_key: "town:riverton".to_string(),
            category: "cafe".to_string(),
            kind,
            day_of_week: dow,
            hour,
            weight,
            created_at: Utc::now() - Duration::days(days_ago),
        }
    }

    fn categorized(mut record: SignalRecord, category: &str) -> SignalRecord {
        record.category = category.to_string();
        record
    }

    #[test]
    fn empty_input_yields_safe_model() {
        let model = build_model(&[], Utc::now());
        assert!(model.busy_windows.is_empty());
        assert!(model.slow_windows.is_empty());
        assert!(model.category_trends.is_empty());
        assert_eq!(model.event_energy, EventEnergy::Low);
        assert!(!model.seasonal_notes.is_empty());
    }

    #[test]
    fn dominant_slot_lands_in_busy_windows() {
        let signals = vec![
            signal(SignalKind::Busy, 5, 18, 2.0, 1),
            signal(SignalKind::Busy, 5, 18, 1.5, 2),
            signal(SignalKind::Busy, 5, 18, 1.0, 3),
            signal(SignalKind::Slow, 5, 18, 1.0, 1),
        ];
        // Net score 3.5 for the slot.
        let model = build_model(&signals, Utc::now());
        assert_eq!(
            model.busy_windows,
            vec![SlotWindow {
                day_of_week: 5,
                hour: 18
            }]
        );
        assert!(model.slow_windows.is_empty());
    }

    #[test]
    fn no_slot_appears_on_both_window_lists() {
        let signals = vec![
            signal(SignalKind::Busy, 0, 9, 3.0, 1),
            signal(SignalKind::Slow, 0, 9, 1.0, 1),
            signal(SignalKind::Slow, 2, 14, 4.0, 2),
            signal(SignalKind::Busy, 2, 14, 1.0, 2),
            signal(SignalKind::Busy, 4, 19, 2.0, 3),
        ];
        let model = build_model(&signals, Utc::now());
        for window in &model.busy_windows {
            assert!(!model.slow_windows.contains(window));
        }
        assert!(model.busy_windows.contains(&SlotWindow {
            day_of_week: 0,
            hour: 9
        }));
        assert!(model.slow_windows.contains(&SlotWindow {
            day_of_week: 2,
            hour: 14
        }));
    }

    #[test]
    fn window_lists_cap_at_four() {
        let mut signals = Vec::new();
        for dow in 0..6u8 {
            signals.push(signal(SignalKind::Busy, dow, 10, 1.0 + dow as f64, 1));
        }
        let model = build_model(&signals, Utc::now());
        assert_eq!(model.busy_windows.len(), 4);
        // Strongest slot first.
        assert_eq!(model.busy_windows[0].day_of_week, 5);
    }

    #[test]
    fn post_success_counts_at_reduced_strength() {
        let signals = vec![
            signal(SignalKind::PostSuccess, 3, 12, 2.0, 1),
            signal(SignalKind::Slow, 3, 12, 1.5, 1),
        ];
        // 0.7 * 2.0 = 1.4 busy vs 1.5 slow, so the slot nets slow.
        let model = build_model(&signals, Utc::now());
        assert!(model.busy_windows.is_empty());
        assert_eq!(model.slow_windows.len(), 1);
    }

    #[test]
    fn recent_event_spikes_raise_energy() {
        let signals = vec![
            signal(SignalKind::EventSpike, 6, 20, 5.0, 2),
            signal(SignalKind::EventSpike, 6, 21, 4.0, 10),
        ];
        let model = build_model(&signals, Utc::now());
        assert_eq!(model.event_energy, EventEnergy::High);
    }

    #[test]
    fn stale_event_spikes_do_not_count_toward_energy() {
        let signals = vec![
            signal(SignalKind::EventSpike, 6, 20, 5.0, 30),
            signal(SignalKind::EventSpike, 6, 21, 4.0, 45),
        ];
        let model = build_model(&signals, Utc::now());
        assert_eq!(model.event_energy, EventEnergy::Low);
        // The spikes still contribute to busy scoring.
        assert!(!model.busy_windows.is_empty());
    }

    #[test]
    fn medium_energy_threshold() {
        let signals = vec![signal(SignalKind::EventSpike, 1, 11, 2.0, 1)];
        let model = build_model(&signals, Utc::now());
        assert_eq!(model.event_energy, EventEnergy::Medium);
    }

    #[test]
    fn category_trend_boundaries() {
        let signals = vec![
            categorized(signal(SignalKind::Busy, 0, 8, 8.0, 1), "cafe"),
            categorized(signal(SignalKind::Busy, 1, 8, 3.0, 1), "fitness"),
            categorized(signal(SignalKind::Busy, 2, 8, 2.99, 1), "retail"),
        ];
        let model = build_model(&signals, Utc::now());
        let trend_for = |name: &str| {
            model
                .category_trends
                .iter()
                .find(|t| t.category == name)
                .map(|t| t.trend)
        };
        assert_eq!(trend_for("cafe"), Some(Trend::Up));
        assert_eq!(trend_for("fitness"), Some(Trend::Steady));
        assert_eq!(trend_for("retail"), Some(Trend::Down));
    }

    #[test]
    fn builds_are_deterministic() {
        let signals = vec![
            signal(SignalKind::Busy, 4, 17, 2.0, 1),
            signal(SignalKind::Slow, 1, 10, 1.0, 5),
            categorized(signal(SignalKind::EventSpike, 5, 19, 3.0, 3), "mixed"),
        ];
        let now = Utc::now();
        let first = build_model(&signals, now);
        let second = build_model(&signals, now);
        assert_eq!(first.busy_windows, second.busy_windows);
        assert_eq!(first.slow_windows, second.slow_windows);
        assert_eq!(first.category_trends, second.category_trends);
        assert_eq!(first.event_energy, second.event_energy);
    }

    #[test]
    fn seasonal_notes_follow_the_calendar() {
        assert!(seasonal_notes(12).contains("Holiday"));
        assert!(seasonal_notes(1).contains("Holiday"));
        assert!(seasonal_notes(3).contains("Spring"));
        assert!(seasonal_notes(7).contains("Summer"));
        assert!(seasonal_notes(9).contains("Fall"));
    }

    #[test]
    fn lookback_clamps_to_supported_range() {
        assert_eq!(clamp_lookback(45), 45);
        assert_eq!(clamp_lookback(1), 7);
        assert_eq!(clamp_lookback(400), 90);
    }
}
