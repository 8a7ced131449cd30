use std::collections::HashMap;

use chrono::{DateTime, Datelike, FixedOffset, Timelike, Utc};

use crate::models::{PostPerformance, TimingModel};

const MAX_BEST_HOURS: usize = 3;
const MAX_BEST_DAYS: usize = 3;

pub const DAY_NAMES: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// Fixed linear engagement formula used to weight a post's publish slot.
pub fn engagement_score(post: &PostPerformance) -> f64 {
    post.views as f64 / 100.0
        + post.likes as f64
        + 2.0 * post.comments as f64
        + 3.0 * post.shares as f64
        + 2.0 * post.saves as f64
        + 2.0 * post.clicks as f64
        + 4.0 * post.redemptions as f64
}

/// Aggregate a brand's own post history into a posting-time summary. Same
/// bucket-accumulate-rank shape as the town pulse builder, over engagement
/// scores instead of classified signals.
pub fn build_timing_model(
    posts: &[PostPerformance],
    zone: FixedOffset,
    now: DateTime<Utc>,
) -> TimingModel {
    let mut hours: HashMap<u8, f64> = HashMap::new();
    let mut days: HashMap<u8, f64> = HashMap::new();

    for post in posts {
        let local = post.published_at.with_timezone(&zone);
        let day = local.weekday().num_days_from_monday() as u8;
        let hour = local.hour() as u8;
        let score = engagement_score(post);

        *hours.entry(hour).or_insert(0.0) += score;
        *days.entry(day).or_insert(0.0) += score;
    }

    let best_hours = rank_keys(hours, MAX_BEST_HOURS);
    let best_days = rank_keys(days, MAX_BEST_DAYS);
    let best_time_label = match (best_days.first(), best_hours.first()) {
        (Some(&day), Some(&hour)) => format!("{} {:02}:00", DAY_NAMES[day as usize], hour),
        _ => "Not enough posting history yet".to_string(),
    };

    TimingModel {
        best_hours,
        best_days,
        sample_size: posts.len(),
        best_time_label,
        computed_at: now,
    }
}

fn rank_keys(totals: HashMap<u8, f64>, limit: usize) -> Vec<u8> {
    let mut ranked: Vec<(u8, f64)> = totals
        .into_iter()
        .filter(|(_, score)| *score > 0.0)
        .collect();
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    ranked.into_iter().take(limit).map(|(key, _)| key).collect()
}

/// Thin consumer of a timing model: should the brand post right now?
/// Returns the recommendation plus a confidence that grows with sample
/// size and slot agreement.
pub fn post_now_recommendation(
    model: &TimingModel,
    local_now: DateTime<FixedOffset>,
) -> (bool, f64) {
    if model.sample_size == 0 {
        return (false, 0.0);
    }

    let day = local_now.weekday().num_days_from_monday() as u8;
    let hour = local_now.hour() as u8;

    let day_match = model.best_days.contains(&day);
    // Circular distance so a best hour of 0 still matches 23:00.
    let hour_match = model.best_hours.iter().any(|&best| {
        let distance = (best as i16 - hour as i16).rem_euclid(24);
        distance <= 1 || distance == 23
    });

    let recommend = day_match && hour_match;
    let sample_factor = (model.sample_size as f64 / 20.0).min(1.0);
    let agreement = match (day_match, hour_match) {
        (true, true) => 1.0,
        (true, false) | (false, true) => 0.4,
        (false, false) => 0.1,
    };

    (recommend, sample_factor * agreement)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn post(published_at: DateTime<Utc>, likes: i64, shares: i64) -> PostPerformance {
        PostPerformance {
            views: 200,
            likes,
            comments: 1,
            shares,
            saves: 0,
            clicks: 2,
            redemptions: 0,
            published_at,
        }
    }

    fn utc_zone() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    #[test]
    fn engagement_formula_matches_fixed_weights() {
        let post = PostPerformance {
            views: 300,
            likes: 5,
            comments: 2,
            shares: 1,
            saves: 3,
            clicks: 4,
            redemptions: 2,
            published_at: Utc::now(),
        };
        // 3 + 5 + 4 + 3 + 6 + 8 + 8
        assert!((engagement_score(&post) - 37.0).abs() < 1e-9);
    }

    #[test]
    fn best_slots_track_strongest_publish_times() {
        // 2026-08-28 is a Friday.
        let friday_evening = Utc.with_ymd_and_hms(2026, 8, 28, 18, 0, 0).unwrap();
        let tuesday_morning = Utc.with_ymd_and_hms(2026, 8, 25, 9, 0, 0).unwrap();
        let posts = vec![
            post(friday_evening, 40, 10),
            post(friday_evening, 30, 5),
            post(tuesday_morning, 2, 0),
        ];

        let model = build_timing_model(&posts, utc_zone(), Utc::now());
        assert_eq!(model.sample_size, 3);
        assert_eq!(model.best_hours.first(), Some(&18));
        assert_eq!(model.best_days.first(), Some(&4));
        assert_eq!(model.best_time_label, "Friday 18:00");
    }

    #[test]
    fn hour_match_wraps_around_midnight() {
        // 2026-08-28 is a Friday; posts land in the 00:00 slot.
        let friday_midnight = Utc.with_ymd_and_hms(2026, 8, 28, 0, 0, 0).unwrap();
        let posts: Vec<PostPerformance> =
            (0..10).map(|_| post(friday_midnight, 20, 4)).collect();
        let model = build_timing_model(&posts, utc_zone(), Utc::now());
        assert_eq!(model.best_hours.first(), Some(&0));

        // Friday 23:00 local is one hour before the best slot.
        let late_friday = Utc
            .with_ymd_and_hms(2026, 9, 4, 23, 0, 0)
            .unwrap()
            .with_timezone(&utc_zone());
        let (recommend, _) = post_now_recommendation(&model, late_friday);
        assert!(recommend);
    }

    #[test]
    fn empty_history_yields_no_recommendation() {
        let model = build_timing_model(&[], utc_zone(), Utc::now());
        assert!(model.best_hours.is_empty());
        assert_eq!(model.best_time_label, "Not enough posting history yet");

        let local = Utc::now().with_timezone(&utc_zone());
        let (recommend, confidence) = post_now_recommendation(&model, local);
        assert!(!recommend);
        assert_eq!(confidence, 0.0);
    }

    #[test]
    fn recommends_inside_a_best_window() {
        let friday_evening = Utc.with_ymd_and_hms(2026, 8, 28, 18, 0, 0).unwrap();
        let posts: Vec<PostPerformance> =
            (0..10).map(|_| post(friday_evening, 20, 4)).collect();
        let model = build_timing_model(&posts, utc_zone(), Utc::now());

        // Friday 19:00 local, one hour off the best slot.
        let near_best = Utc
            .with_ymd_and_hms(2026, 9, 4, 19, 0, 0)
            .unwrap()
            .with_timezone(&utc_zone());
        let (recommend, confidence) = post_now_recommendation(&model, near_best);
        assert!(recommend);
        assert!(confidence > 0.4);

        // Monday 09:00 local misses on both axes.
        let off_slot = Utc
            .with_ymd_and_hms(2026, 8, 31, 9, 0, 0)
            .unwrap()
            .with_timezone(&utc_zone());
        let (recommend, confidence) = post_now_recommendation(&model, off_slot);
        assert!(!recommend);
        assert!(confidence < 0.1f64 + 1e-9);
    }
}
