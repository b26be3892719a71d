//! Core data models for the kindred identity graph.
//!
//! These types are shared across all kindred crates and represent the
//! durable entities of the graph store plus the DTOs exchanged with the
//! operation surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::Error;

// =============================================================================
// IDENTITY
// =============================================================================

/// A hypothesized real-world person uniting one or more platform profiles.
///
/// Destroyed only by merge (absorbed into the surviving identity); unlink
/// spawns a new identity instead of deleting this one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    /// Globally-unique handle that survives merges. External tooling should
    /// reference identities by this, not by row id.
    pub master_id: String,
    pub primary_platform: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    /// Set once any link to this identity has been manually verified.
    pub verified: bool,
    /// Mean of the identity's current confidence factors, 0-100.
    pub confidence_score: f32,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// PLATFORM PROFILE
// =============================================================================

/// A user as seen on one specific platform.
///
/// Exactly one row exists per `(platform, platform_user_id)` pair, and a
/// profile belongs to at most one identity at any time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformProfile {
    pub id: Uuid,
    pub identity_id: Option<Uuid>,
    pub platform: String,
    pub platform_user_id: String,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    /// Verification flag reported by the platform itself (blue check etc.),
    /// distinct from kindred's own link verification.
    pub platform_verified: bool,
    /// Opaque platform payload. Only adapters interpret its shape; no core
    /// logic depends on its contents.
    pub raw_payload: JsonValue,
    pub message_count: i64,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

/// Mutable attributes applied on profile upsert.
#[derive(Debug, Clone, Default)]
pub struct ProfileAttrs {
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub platform_verified: Option<bool>,
    pub raw_payload: Option<JsonValue>,
}

impl ProfileAttrs {
    /// Attrs carrying only a username, the common case for adapters that
    /// have not fetched full profile metadata yet.
    pub fn username(name: impl Into<String>) -> Self {
        Self {
            username: Some(name.into()),
            ..Self::default()
        }
    }
}

// =============================================================================
// IDENTITY LINK
// =============================================================================

/// Provenance of a believed same-person edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    /// Confirmed by a relayed verification code.
    Manual,
    AutoUsername,
    AutoTemporal,
    AutoSocial,
}

impl LinkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkType::Manual => "manual",
            LinkType::AutoUsername => "auto_username",
            LinkType::AutoTemporal => "auto_temporal",
            LinkType::AutoSocial => "auto_social",
        }
    }
}

impl FromStr for LinkType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "manual" => Ok(LinkType::Manual),
            "auto_username" => Ok(LinkType::AutoUsername),
            "auto_temporal" => Ok(LinkType::AutoTemporal),
            "auto_social" => Ok(LinkType::AutoSocial),
            other => Err(Error::Internal(format!("unknown link type: {other}"))),
        }
    }
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of an identity link edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    Pending,
    Confirmed,
    Rejected,
}

impl LinkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkStatus::Pending => "pending",
            LinkStatus::Confirmed => "confirmed",
            LinkStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for LinkStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "pending" => Ok(LinkStatus::Pending),
            "confirmed" => Ok(LinkStatus::Confirmed),
            "rejected" => Ok(LinkStatus::Rejected),
            other => Err(Error::Internal(format!("unknown link status: {other}"))),
        }
    }
}

/// A directed edge between two platform profiles recording why they are
/// believed to be the same person.
///
/// At most one edge exists per unordered profile pair; re-detection
/// strengthens the existing edge rather than duplicating it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityLink {
    pub id: Uuid,
    pub source_profile_id: Uuid,
    pub target_profile_id: Uuid,
    pub link_type: LinkType,
    /// 0-100.
    pub confidence: f32,
    /// Structured signal payload explaining the edge.
    pub evidence: JsonValue,
    pub status: LinkStatus,
    /// Profile that performed manual confirmation, when status is confirmed
    /// through the verification workflow.
    pub verified_by: Option<Uuid>,
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// CONFIDENCE FACTOR
// =============================================================================

/// Named signal contributing to an identity's aggregate confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorType {
    UsernameSimilarity,
    TemporalCorrelation,
    SocialOverlap,
    ManualVerification,
}

impl FactorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FactorType::UsernameSimilarity => "username_similarity",
            FactorType::TemporalCorrelation => "temporal_correlation",
            FactorType::SocialOverlap => "social_overlap",
            FactorType::ManualVerification => "manual_verification",
        }
    }

    /// The auto link type persisted when this signal is the strongest
    /// discoverer of a candidate. Manual verification never auto-links.
    pub fn auto_link_type(&self) -> Option<LinkType> {
        match self {
            FactorType::UsernameSimilarity => Some(LinkType::AutoUsername),
            FactorType::TemporalCorrelation => Some(LinkType::AutoTemporal),
            FactorType::SocialOverlap => Some(LinkType::AutoSocial),
            FactorType::ManualVerification => None,
        }
    }
}

impl FromStr for FactorType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "username_similarity" => Ok(FactorType::UsernameSimilarity),
            "temporal_correlation" => Ok(FactorType::TemporalCorrelation),
            "social_overlap" => Ok(FactorType::SocialOverlap),
            "manual_verification" => Ok(FactorType::ManualVerification),
            other => Err(Error::Internal(format!("unknown factor type: {other}"))),
        }
    }
}

impl fmt::Display for FactorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One signal's contribution (0-100) to an identity's aggregate score.
/// At most one factor exists per `(identity, factor_type)`; recomputation
/// overwrites in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceFactor {
    pub id: Uuid,
    pub identity_id: Uuid,
    pub factor_type: FactorType,
    pub value: f32,
    pub evidence: JsonValue,
    pub computed_at: DateTime<Utc>,
}

// =============================================================================
// LINK REQUEST
// =============================================================================

/// Lifecycle of a user-initiated verification attempt.
/// `pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Verified,
    Expired,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Verified => "verified",
            RequestStatus::Expired => "expired",
            RequestStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for RequestStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "verified" => Ok(RequestStatus::Verified),
            "expired" => Ok(RequestStatus::Expired),
            "rejected" => Ok(RequestStatus::Rejected),
            other => Err(Error::Internal(format!("unknown request status: {other}"))),
        }
    }
}

/// An ephemeral verification attempt: the requesting profile asks to prove
/// it also controls an account on `target_platform`.
///
/// Terminal rows are kept until the retention reaper reclaims them, so the
/// single-use property holds even across status checks that race.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkRequest {
    pub id: Uuid,
    pub requester_profile_id: Uuid,
    pub target_platform: String,
    /// Username or platform-native id as typed by the user; resolved to a
    /// concrete profile only at verification time.
    pub target_identifier: String,
    pub code: String,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl LinkRequest {
    /// Whether the deadline has passed at `now`. Expiry is data, not a
    /// timer; every consumer evaluates this lazily.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

// =============================================================================
// AUDIT LOG
// =============================================================================

/// Identity-affecting actions recorded in the append-only audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    LinkCreated,
    LinkRemoved,
    Merge,
    Split,
    Verification,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::LinkCreated => "link_created",
            AuditAction::LinkRemoved => "link_removed",
            AuditAction::Merge => "merge",
            AuditAction::Split => "split",
            AuditAction::Verification => "verification",
        }
    }
}

impl FromStr for AuditAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "link_created" => Ok(AuditAction::LinkCreated),
            "link_removed" => Ok(AuditAction::LinkRemoved),
            "merge" => Ok(AuditAction::Merge),
            "split" => Ok(AuditAction::Split),
            "verification" => Ok(AuditAction::Verification),
            other => Err(Error::Internal(format!("unknown audit action: {other}"))),
        }
    }
}

/// Append-only record of an identity-affecting action. Never mutated or
/// deleted; the sole reconstruction mechanism for identity history.
///
/// `identity_id` is a plain UUID, not a foreign key, so history outlives
/// merged-away identity rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub identity_id: Option<Uuid>,
    pub action: AuditAction,
    pub actor_profile_id: Option<Uuid>,
    pub details: JsonValue,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// ROOMS (social-signal evidence)
// =============================================================================

/// A chat room/channel/group on one platform, used only as input evidence
/// for the social-overlap signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: Uuid,
    pub platform: String,
    pub platform_room_id: String,
    pub name: Option<String>,
    /// Logical community label clustering rooms across platforms (e.g. a
    /// project's Telegram group and Discord server share one label).
    pub community: Option<String>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// OPERATION SURFACE DTOs
// =============================================================================

/// Result of `resolve`: the profile, its owning identity if any, and every
/// sibling profile under that identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedProfile {
    pub profile: PlatformProfile,
    pub identity: Option<Identity>,
    pub linked_profiles: Vec<PlatformProfile>,
}

impl ResolvedProfile {
    /// Aggregate confidence of the owning identity, if one exists.
    pub fn confidence_score(&self) -> Option<f32> {
        self.identity.as_ref().map(|i| i.confidence_score)
    }
}

/// One ranked candidate produced by the matching engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub profile: PlatformProfile,
    /// Fused confidence, 0-100.
    pub confidence: f32,
    /// Signals that fired for this candidate, strongest first.
    pub signals: Vec<SignalScore>,
    pub evidence: JsonValue,
}

/// A single signal's raw contribution before fusion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SignalScore {
    pub signal: FactorType,
    pub score: f32,
}

/// Result of `analyze`: ranked candidates plus how many crossed the
/// auto-link threshold and were persisted as pending links.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeReport {
    pub profile_id: Uuid,
    pub identity_id: Uuid,
    pub candidates: Vec<MatchCandidate>,
    pub auto_linked: usize,
}

/// Result of `request_link`: the persisted request plus a human-readable
/// instruction the caller relays to the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkRequestTicket {
    pub request: LinkRequest,
    pub instruction: String,
}

/// Result of a successful `verify`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyOutcome {
    pub identity_id: Uuid,
    pub link_id: Uuid,
    pub target_profile_id: Uuid,
}

/// One `search` hit group: an identity (or an unclaimed profile) with every
/// profile matching the term.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityGroup {
    pub identity: Option<Identity>,
    pub profiles: Vec<PlatformProfile>,
}
