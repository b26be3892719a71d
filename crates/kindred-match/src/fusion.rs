//! Multi-signal confidence fusion.
//!
//! Signals are not summed: the fused value starts from the strongest
//! single signal, and every *other* signal that independently fired adds
//! its configured corroboration bonus, capped at the ceiling. A candidate
//! seen three different ways is worth more than any one score, but never
//! more than certainty.

use kindred_core::{FactorType, SignalScore};

use crate::config::MatchConfig;

/// Corroboration bonus contributed by a signal when it backs a candidate
/// discovered more strongly by another signal.
pub fn corroboration_bonus(signal: FactorType, config: &MatchConfig) -> f32 {
    match signal {
        FactorType::UsernameSimilarity => config.bonus_username,
        FactorType::TemporalCorrelation => config.bonus_temporal,
        FactorType::SocialOverlap => config.bonus_social,
        // Manual verification is not a matching signal; it never reaches
        // fusion.
        FactorType::ManualVerification => 0.0,
    }
}

/// Fuse per-signal scores into one candidate confidence, 0-100.
pub fn fuse(signals: &[SignalScore], config: &MatchConfig) -> f32 {
    let Some(strongest) = signals
        .iter()
        .max_by(|a, b| a.score.total_cmp(&b.score))
    else {
        return 0.0;
    };

    let mut confidence = strongest.score;
    for s in signals {
        if s.signal != strongest.signal {
            confidence += corroboration_bonus(s.signal, config);
        }
    }
    confidence.min(config.confidence_cap)
}

/// Sort signals strongest-first for presentation.
pub fn sort_signals(signals: &mut [SignalScore]) {
    signals.sort_by(|a, b| b.score.total_cmp(&a.score));
}
