//! Matching engine configuration.
//!
//! Every threshold and bonus defaults to the values in
//! [`kindred_core::defaults`]; none of them encode a validated
//! precision/recall tradeoff, so deployments are expected to tune them.

use kindred_core::defaults;

/// Tunable parameters for candidate discovery, scoring, and fusion.
#[derive(Debug, Clone)]
pub struct MatchConfig {
    /// Minimum username similarity (0-100) for candidacy from that signal.
    pub username_threshold: f32,
    /// Trigram prefilter fetch size.
    pub username_fetch_limit: i64,
    /// Minimum Pearson correlation before the temporal signal contributes.
    pub temporal_floor: f32,
    /// Confidence per unit correlation.
    pub temporal_weight: f32,
    /// Minimum observations in both histograms before correlating.
    pub temporal_min_observations: i64,
    /// Cap on recently-active profiles scanned for temporal discovery.
    pub temporal_scan_limit: i64,
    /// Minimum shared communities before the social signal contributes.
    pub social_min_shared: i64,
    /// Confidence per shared community.
    pub social_weight: f32,
    /// Ceiling on the social signal's contribution.
    pub social_cap: f32,
    /// Corroboration bonus when username similarity backs another signal.
    pub bonus_username: f32,
    /// Corroboration bonus when temporal correlation backs another signal.
    pub bonus_temporal: f32,
    /// Corroboration bonus when social overlap backs another signal.
    pub bonus_social: f32,
    /// Hard ceiling on fused confidence.
    pub confidence_cap: f32,
    /// Fused confidence at which a candidate is persisted as a pending
    /// auto link.
    pub auto_link_threshold: f32,
    /// Maximum candidates returned per run.
    pub candidate_limit: usize,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            username_threshold: defaults::USERNAME_CANDIDATE_THRESHOLD,
            username_fetch_limit: defaults::USERNAME_FETCH_LIMIT,
            temporal_floor: defaults::TEMPORAL_CORRELATION_FLOOR,
            temporal_weight: defaults::TEMPORAL_SCORE_WEIGHT,
            temporal_min_observations: defaults::TEMPORAL_MIN_OBSERVATIONS,
            temporal_scan_limit: defaults::TEMPORAL_SCAN_LIMIT,
            social_min_shared: defaults::SOCIAL_MIN_SHARED,
            social_weight: defaults::SOCIAL_WEIGHT,
            social_cap: defaults::SOCIAL_SCORE_CAP,
            bonus_username: defaults::CORROBORATION_BONUS_USERNAME,
            bonus_temporal: defaults::CORROBORATION_BONUS_TEMPORAL,
            bonus_social: defaults::CORROBORATION_BONUS_SOCIAL,
            confidence_cap: defaults::CONFIDENCE_CAP,
            auto_link_threshold: defaults::AUTO_LINK_THRESHOLD,
            candidate_limit: defaults::CANDIDATE_LIMIT,
        }
    }
}

impl MatchConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the auto-link threshold.
    pub fn auto_link_threshold(mut self, threshold: f32) -> Self {
        self.auto_link_threshold = threshold;
        self
    }

    /// Set the username candidacy threshold.
    pub fn username_threshold(mut self, threshold: f32) -> Self {
        self.username_threshold = threshold;
        self
    }

    /// Set the temporal correlation floor.
    pub fn temporal_floor(mut self, floor: f32) -> Self {
        self.temporal_floor = floor;
        self
    }

    /// Set the minimum shared communities for the social signal.
    pub fn social_min_shared(mut self, min: i64) -> Self {
        self.social_min_shared = min;
        self
    }

    /// Set the maximum candidates returned per run.
    pub fn candidate_limit(mut self, limit: usize) -> Self {
        self.candidate_limit = limit;
        self
    }
}
