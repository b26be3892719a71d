//! Core traits for the identity graph storage seam.
//!
//! These traits define the contract the graph store must satisfy. All
//! invariant enforcement (unique keys, single-edge-per-pair, single-code
//! consumption) lives behind these interfaces as atomic conditional writes;
//! callers never touch storage state directly.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// IDENTITY REPOSITORY
// =============================================================================

/// Seed attributes for a freshly created identity, typically copied from the
/// platform profile that triggered creation.
#[derive(Debug, Clone, Default)]
pub struct IdentitySeed {
    pub primary_platform: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub first_seen_at: Option<DateTime<Utc>>,
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl IdentitySeed {
    /// Seed an identity from an existing profile's attributes.
    pub fn from_profile(profile: &PlatformProfile) -> Self {
        Self {
            primary_platform: Some(profile.platform.clone()),
            display_name: profile
                .display_name
                .clone()
                .or_else(|| profile.username.clone()),
            avatar_url: profile.avatar_url.clone(),
            first_seen_at: Some(profile.first_seen_at),
            last_seen_at: Some(profile.last_seen_at),
        }
    }
}

/// Repository for identity records and the merge operation.
#[async_trait]
pub trait IdentityRepository: Send + Sync {
    /// Create a new identity.
    async fn create(&self, seed: IdentitySeed) -> Result<Identity>;

    /// Fetch an identity by row id.
    async fn get(&self, id: Uuid) -> Result<Option<Identity>>;

    /// Fetch an identity by its merge-surviving master identifier.
    async fn get_by_master_id(&self, master_id: &str) -> Result<Option<Identity>>;

    /// All profiles currently owned by the identity.
    async fn linked_profiles(&self, identity_id: Uuid) -> Result<Vec<PlatformProfile>>;

    /// Recompute the aggregate confidence score as the mean of the
    /// identity's current factors, persist it, and return it.
    async fn recompute_confidence(&self, identity_id: Uuid) -> Result<f32>;

    /// Atomically reassign everything owned by `merge_away` onto `keep`,
    /// audit the absorption on `keep`, and delete the emptied record.
    /// Partial reassignment is never observable.
    async fn merge(&self, keep: Uuid, merge_away: Uuid, actor: Option<Uuid>) -> Result<Uuid>;
}

// =============================================================================
// PROFILE REPOSITORY
// =============================================================================

/// Repository for platform profiles and the unlink operation.
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    /// Idempotent on the `(platform, platform_user_id)` key: creates the
    /// profile (with no identity) on first sight, otherwise updates mutable
    /// attributes and `last_seen_at`. A uniqueness conflict is a successful
    /// upsert, not an error.
    async fn upsert(
        &self,
        platform: &str,
        platform_user_id: &str,
        attrs: ProfileAttrs,
    ) -> Result<PlatformProfile>;

    /// Fetch a profile by its platform key.
    async fn get(&self, platform: &str, platform_user_id: &str)
        -> Result<Option<PlatformProfile>>;

    /// Fetch a profile by row id.
    async fn get_by_id(&self, id: Uuid) -> Result<Option<PlatformProfile>>;

    /// Bump the profile's message counter and hour-of-week activity bucket
    /// for a message observed at `at`. Atomic in SQL.
    async fn record_activity(
        &self,
        platform: &str,
        platform_user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<()>;

    /// Atomically detach the profile into a brand-new identity: every link
    /// touching it is removed, a fresh identity is seeded from its
    /// attributes, and the split is audited on the original identity.
    /// Returns the new identity id.
    async fn unlink(&self, profile_id: Uuid, actor: Option<Uuid>) -> Result<Uuid>;
}

// =============================================================================
// LINK REPOSITORY
// =============================================================================

/// Parameters for creating or strengthening an identity link edge.
#[derive(Debug, Clone)]
pub struct RecordLink {
    pub source_profile_id: Uuid,
    pub target_profile_id: Uuid,
    pub link_type: LinkType,
    /// 0-100.
    pub confidence: f32,
    pub evidence: JsonValue,
    pub status: LinkStatus,
    /// Added on top of the surviving confidence when this write strengthens
    /// an existing edge detected by a *different* signal. Zero for plain
    /// re-detection.
    pub corroboration_bonus: f32,
    pub verified_by: Option<Uuid>,
    pub verified_at: Option<DateTime<Utc>>,
}

/// Repository for identity link edges.
#[async_trait]
pub trait LinkRepository: Send + Sync {
    /// Create or strengthen the unique edge for the unordered profile pair.
    /// Never downgrades a `confirmed` edge, and leaves `rejected` edges
    /// untouched for automatic signals.
    async fn record(&self, req: RecordLink) -> Result<IdentityLink>;

    /// All edges touching the profile, newest first.
    async fn list_for_profile(&self, profile_id: Uuid) -> Result<Vec<IdentityLink>>;

    /// Reviewer rejection of a pending edge: `pending -> rejected`.
    async fn reject(&self, link_id: Uuid, actor: Option<Uuid>) -> Result<()>;
}

// =============================================================================
// CONFIDENCE FACTOR REPOSITORY
// =============================================================================

/// Repository for per-identity confidence factors.
#[async_trait]
pub trait FactorRepository: Send + Sync {
    /// Upsert on `(identity, factor_type)`: recomputing a factor overwrites
    /// it in place.
    async fn upsert(
        &self,
        identity_id: Uuid,
        factor_type: FactorType,
        value: f32,
        evidence: JsonValue,
    ) -> Result<ConfidenceFactor>;

    /// All current factors for the identity.
    async fn list_for_identity(&self, identity_id: Uuid) -> Result<Vec<ConfidenceFactor>>;
}

// =============================================================================
// AUDIT REPOSITORY
// =============================================================================

/// Repository for the append-only audit log.
///
/// Appends must never fail silently: a failed audit write fails the
/// enclosing operation, because the log is the only reconstruction
/// mechanism for identity history.
#[async_trait]
pub trait AuditRepository: Send + Sync {
    /// Pure insert of one audit entry.
    async fn append(
        &self,
        identity_id: Option<Uuid>,
        action: AuditAction,
        actor_profile_id: Option<Uuid>,
        details: JsonValue,
    ) -> Result<AuditLogEntry>;

    /// History for one identity, oldest first, paged by time range.
    async fn list_for_identity(
        &self,
        identity_id: Uuid,
        since: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<AuditLogEntry>>;
}
