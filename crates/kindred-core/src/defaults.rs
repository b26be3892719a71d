//! Centralized default constants for the kindred identity graph.
//!
//! **This module is the single source of truth** for all shared default
//! values. The matching and verification layers read these through their
//! config structs rather than hard-coding magic numbers, so deployments can
//! tune them. None of the signal constants encode a validated
//! precision/recall tradeoff; they are conservative starting points.

// =============================================================================
// USERNAME SIGNAL
// =============================================================================

/// Score for an exact normalized username match.
pub const USERNAME_EXACT_SCORE: f32 = 100.0;

/// Score when one normalized username contains the other.
pub const USERNAME_CONTAINMENT_SCORE: f32 = 85.0;

/// Minimum username similarity (0-100) for a profile to become a candidate
/// from this signal.
pub const USERNAME_CANDIDATE_THRESHOLD: f32 = 70.0;

/// Maximum trigram-prefiltered rows fetched per candidate query.
pub const USERNAME_FETCH_LIMIT: i64 = 50;

// =============================================================================
// TEMPORAL SIGNAL
// =============================================================================

/// Activity histogram buckets: 24 hours x 7 days.
pub const ACTIVITY_BUCKETS: usize = 168;

/// Minimum Pearson correlation for the temporal signal to contribute.
pub const TEMPORAL_CORRELATION_FLOOR: f32 = 0.7;

/// Confidence contributed per unit of correlation (`correlation x 60`).
pub const TEMPORAL_SCORE_WEIGHT: f32 = 60.0;

/// Minimum total observations in a histogram before correlation is
/// meaningful. Sparse histograms correlate spuriously.
pub const TEMPORAL_MIN_OBSERVATIONS: i64 = 20;

/// Cap on recently-active other-platform profiles scanned for temporal
/// discovery in one engine run.
pub const TEMPORAL_SCAN_LIMIT: i64 = 200;

// =============================================================================
// SOCIAL SIGNAL
// =============================================================================

/// Minimum shared logical communities before the signal contributes.
pub const SOCIAL_MIN_SHARED: i64 = 3;

/// Confidence contributed per shared community.
pub const SOCIAL_WEIGHT: f32 = 10.0;

/// Ceiling on the social signal's contribution.
pub const SOCIAL_SCORE_CAP: f32 = 80.0;

// =============================================================================
// FUSION
// =============================================================================

/// Bonus when temporal correlation corroborates another signal's candidate.
pub const CORROBORATION_BONUS_TEMPORAL: f32 = 15.0;

/// Bonus when social overlap corroborates another signal's candidate.
pub const CORROBORATION_BONUS_SOCIAL: f32 = 20.0;

/// Bonus when username similarity corroborates another signal's candidate.
pub const CORROBORATION_BONUS_USERNAME: f32 = 15.0;

/// Hard ceiling on any fused or stored confidence value.
pub const CONFIDENCE_CAP: f32 = 100.0;

/// Fused confidence at or above which a candidate is persisted as a
/// pending `auto_*` link. Automatic detection only ever proposes.
pub const AUTO_LINK_THRESHOLD: f32 = 80.0;

/// Maximum candidates returned from one analysis run.
pub const CANDIDATE_LIMIT: usize = 25;

// =============================================================================
// VERIFICATION
// =============================================================================

/// Verification code length. 6 characters over a 31-symbol alphabet gives
/// ~9e8 combinations, unguessable within a minutes-scale expiry window.
pub const CODE_LENGTH: usize = 6;

/// Minutes until a pending link request expires.
pub const CODE_TTL_MINUTES: i64 = 15;

/// Confidence assigned to a manually verified link. Manual verification is
/// the only path to 100 without reviewer action.
pub const VERIFIED_CONFIDENCE: f32 = 100.0;

/// Days terminal link requests are retained before the reaper purges them.
pub const REQUEST_RETENTION_DAYS: i64 = 30;

// =============================================================================
// SEARCH / PAGINATION
// =============================================================================

/// Default page size for identity search.
pub const SEARCH_LIMIT: i64 = 50;

/// Default page size for audit history listings.
pub const AUDIT_PAGE_LIMIT: i64 = 100;
