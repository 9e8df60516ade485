use serde::{Deserialize, Serialize};

use crate::interaction::Interaction;

const RECENT_WINDOW_S: i64 = 30 * 24 * 3600;
const RECENT_WEIGHT: f64 = 1.0;
const STALE_WEIGHT: f64 = 0.5;
const NEGATIVE_MULTIPLIER: f64 = 3.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TrustScore {
    pub score: f64,
    pub total: u64,
    pub positive: u64,
    pub negative: u64,
    pub rtc_volume: f64,
}

fn weight_for(ts: i64, now: i64) -> f64 {
    if now - ts <= RECENT_WINDOW_S {
        RECENT_WEIGHT
    } else {
        STALE_WEIGHT
    }
}

/// Recency-weighted trust score over one agent's interaction history.
pub fn compute_score(interactions: &[&Interaction], now: i64) -> TrustScore {
    let mut positive_weighted = 0.0;
    let mut negative_weighted = 0.0;
    let mut positive = 0u64;
    let mut negative = 0u64;
    let mut rtc_volume = 0.0;

    for interaction in interactions {
        let w = weight_for(interaction.ts, now);
        if interaction.outcome.is_positive() {
            positive_weighted += w;
            positive += 1;
        } else {
            negative_weighted += w;
            negative += 1;
        }
        if let Some(rtc) = interaction.rtc {
            rtc_volume += rtc.abs();
        }
    }

    let total = interactions.len() as u64;
    let raw = (positive_weighted - NEGATIVE_MULTIPLIER * negative_weighted) / (total.max(1) as f64);

    TrustScore {
        score: raw.clamp(-1.0, 1.0),
        total,
        positive,
        negative,
        rtc_volume,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction::{Direction, Outcome};

    fn mk(ts: i64, outcome: Outcome) -> Interaction {
        let mut interaction = Interaction::new("bcn_abc", Direction::In, "deliver", outcome, None);
        interaction.ts = ts;
        interaction
    }

    #[test]
    fn all_positive_scores_near_one() {
        let now = 1_000_000;
        let interactions = vec![mk(now, Outcome::Ok), mk(now, Outcome::Delivered)];
        let refs: Vec<&Interaction> = interactions.iter().collect();
        let score = compute_score(&refs, now);
        assert!(score.score > 0.9);
        assert_eq!(score.total, 2);
    }

    #[test]
    fn negative_outweighs_positive_by_triple() {
        let now = 1_000_000;
        let interactions = vec![mk(now, Outcome::Ok), mk(now, Outcome::Scam)];
        let refs: Vec<&Interaction> = interactions.iter().collect();
        let score = compute_score(&refs, now);
        assert!(score.score < 0.0);
    }

    #[test]
    fn stale_interactions_are_downweighted() {
        let now = 1_000_000;
        let stale_ts = now - RECENT_WINDOW_S - 1;
        let interactions = vec![mk(stale_ts, Outcome::Ok)];
        let refs: Vec<&Interaction> = interactions.iter().collect();
        let score = compute_score(&refs, now);
        assert!((score.score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn empty_history_scores_zero() {
        let score = compute_score(&[], 0);
        assert_eq!(score.score, 0.0);
        assert_eq!(score.total, 0);
    }

    #[test]
    fn rtc_volume_sums_magnitudes_not_signed_amounts() {
        let now = 1_000_000;
        let mut a = mk(now, Outcome::Ok);
        a.rtc = Some(10.0);
        let mut b = mk(now, Outcome::Rejected);
        b.rtc = Some(-4.0);
        let interactions = vec![a, b];
        let refs: Vec<&Interaction> = interactions.iter().collect();
        let score = compute_score(&refs, now);
        assert_eq!(score.rtc_volume, 14.0);
    }
}
