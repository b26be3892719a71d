//! The identity resolution operation surface.
//!
//! One service struct exposes the logical operations callers invoke over
//! whatever transport they choose; this crate defines no wire protocol of
//! its own. All state lives in the graph store, so any number of service
//! instances may run concurrently against one database.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use kindred_core::{
    defaults, AnalyzeReport, AuditLogEntry, AuditRepository, Error, IdentityGroup,
    IdentityRepository, LinkRepository, LinkRequestTicket, PlatformProfile, ProfileAttrs,
    ProfileRepository, ResolvedProfile, Result, VerifyOutcome,
};
use kindred_db::Database;
use kindred_match::{MatchConfig, MatchEngine};

use crate::reaper::{self, ReaperStats};
use crate::verification::{VerificationWorkflow, VerifyConfig};

/// The kindred operation surface over one graph store.
pub struct IdentityService {
    db: Database,
    engine: MatchEngine,
    verification: VerificationWorkflow,
}

impl IdentityService {
    /// Create a service with default matching and verification configs.
    pub fn new(db: Database) -> Self {
        Self::with_config(db, MatchConfig::default(), VerifyConfig::default())
    }

    /// Create a service with custom configs.
    pub fn with_config(db: Database, match_config: MatchConfig, verify_config: VerifyConfig) -> Self {
        Self {
            engine: MatchEngine::with_config(db.clone(), match_config),
            verification: VerificationWorkflow::with_config(db.clone(), verify_config),
            db,
        }
    }

    /// The underlying graph store.
    pub fn db(&self) -> &Database {
        &self.db
    }

    // =========================================================================
    // INGESTION (called by platform adapters)
    // =========================================================================

    /// Idempotent profile upsert on first sight of a user or on any
    /// metadata refresh.
    pub async fn upsert_profile(
        &self,
        platform: &str,
        platform_user_id: &str,
        attrs: ProfileAttrs,
    ) -> Result<PlatformProfile> {
        self.db.profiles.upsert(platform, platform_user_id, attrs).await
    }

    /// Count one message at `at` toward the profile's activity histogram.
    /// Message content never reaches this core.
    pub async fn record_activity(
        &self,
        platform: &str,
        platform_user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.db.profiles.record_activity(platform, platform_user_id, at).await
    }

    /// Record that a profile participates in a room, upserting the room
    /// itself. Social-signal evidence only.
    pub async fn observe_room(
        &self,
        profile: &PlatformProfile,
        platform_room_id: &str,
        room_name: Option<&str>,
        community: Option<&str>,
    ) -> Result<()> {
        let room = self
            .db
            .rooms
            .upsert_room(&profile.platform, platform_room_id, room_name, community)
            .await?;
        self.db.rooms.add_participant(room.id, profile.id).await
    }

    // =========================================================================
    // OPERATION SURFACE
    // =========================================================================

    /// Resolve a platform user to their profile, owning identity (if any),
    /// and sibling profiles. Read-only: two calls with no intervening
    /// writes return identical data.
    pub async fn resolve(
        &self,
        platform: &str,
        platform_user_id: &str,
    ) -> Result<ResolvedProfile> {
        let profile = self
            .db
            .profiles
            .get(platform, platform_user_id)
            .await?
            .ok_or_else(|| Error::ProfileNotFound {
                platform: platform.to_string(),
                platform_user_id: platform_user_id.to_string(),
            })?;

        let (identity, linked_profiles) = match profile.identity_id {
            Some(identity_id) => {
                let identity = self
                    .db
                    .identities
                    .get(identity_id)
                    .await?
                    .ok_or(Error::IdentityNotFound(identity_id))?;
                let linked = self.db.identities.linked_profiles(identity_id).await?;
                (Some(identity), linked)
            }
            None => (None, Vec::new()),
        };

        Ok(ResolvedProfile {
            profile,
            identity,
            linked_profiles,
        })
    }

    /// Open a verification request toward another platform.
    pub async fn request_link(
        &self,
        platform: &str,
        platform_user_id: &str,
        target_platform: &str,
        target_identifier: &str,
    ) -> Result<LinkRequestTicket> {
        self.verification
            .request_link(platform, platform_user_id, target_platform, target_identifier)
            .await
    }

    /// Submit a verification code from the target platform.
    pub async fn verify(
        &self,
        target_platform: &str,
        target_platform_user_id: &str,
        code: &str,
        attrs: ProfileAttrs,
    ) -> Result<VerifyOutcome> {
        self.verification
            .verify_code(target_platform, target_platform_user_id, code, attrs)
            .await
    }

    /// Run the matching engine for a profile: ranked cross-platform
    /// candidates plus pending auto links for the strongest ones.
    pub async fn analyze(&self, platform: &str, platform_user_id: &str) -> Result<AnalyzeReport> {
        self.engine.analyze(platform, platform_user_id).await
    }

    /// Admin operation: absorb `merge_identity` into `keep_identity`.
    pub async fn merge(
        &self,
        keep_identity: Uuid,
        merge_identity: Uuid,
        actor_profile: Option<Uuid>,
    ) -> Result<Uuid> {
        self.db
            .identities
            .merge(keep_identity, merge_identity, actor_profile)
            .await
    }

    /// Detach the identity's profile on `target_platform` into a fresh
    /// standalone identity. The requesting profile (`platform`,
    /// `platform_user_id`) names which identity is being edited and is
    /// recorded as the actor.
    pub async fn unlink(
        &self,
        platform: &str,
        platform_user_id: &str,
        target_platform: &str,
    ) -> Result<Uuid> {
        let requester = self
            .db
            .profiles
            .get(platform, platform_user_id)
            .await?
            .ok_or_else(|| Error::ProfileNotFound {
                platform: platform.to_string(),
                platform_user_id: platform_user_id.to_string(),
            })?;

        let identity_id = requester.identity_id.ok_or_else(|| {
            Error::NotFound(format!(
                "profile {platform}/{platform_user_id} has no linked identity"
            ))
        })?;

        let linked = self.db.identities.linked_profiles(identity_id).await?;
        let detach = linked
            .into_iter()
            .find(|p| p.platform == target_platform)
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "identity {identity_id} has no profile on {target_platform}"
                ))
            })?;

        self.db.profiles.unlink(detach.id, Some(requester.id)).await
    }

    /// Free-text search over usernames and display names, grouped by
    /// owning identity. Unclaimed profiles form single-profile groups.
    pub async fn search(&self, term: &str) -> Result<Vec<IdentityGroup>> {
        let hits = self
            .db
            .search
            .search_profiles(term, defaults::SEARCH_LIMIT)
            .await?;

        // Group hits by identity, preserving relevance order of first
        // appearance. Unclaimed profiles each form their own group.
        let mut order: Vec<Uuid> = Vec::new();
        let mut grouped: HashMap<Uuid, Vec<PlatformProfile>> = HashMap::new();
        let mut groups = Vec::new();
        for hit in hits {
            match hit.identity_id {
                Some(id) => {
                    if !grouped.contains_key(&id) {
                        order.push(id);
                    }
                    grouped.entry(id).or_default().push(hit);
                }
                None => groups.push(IdentityGroup {
                    identity: None,
                    profiles: vec![hit],
                }),
            }
        }

        for identity_id in order {
            let Some(profiles) = grouped.remove(&identity_id) else {
                continue;
            };
            let identity = self.db.identities.get(identity_id).await?;
            groups.push(IdentityGroup { identity, profiles });
        }

        Ok(groups)
    }

    // =========================================================================
    // MODERATION / MAINTENANCE
    // =========================================================================

    /// Reviewer rejection of a pending link proposal.
    pub async fn reject_link(&self, link_id: Uuid, actor_profile: Option<Uuid>) -> Result<()> {
        self.db.links.reject(link_id, actor_profile).await
    }

    /// Replay how an identity arrived at its current shape.
    pub async fn audit_history(
        &self,
        identity_id: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<AuditLogEntry>> {
        self.db
            .audit
            .list_for_identity(identity_id, since, defaults::AUDIT_PAGE_LIMIT)
            .await
    }

    /// One storage-reclamation pass over link requests. Callers schedule
    /// this however they like; correctness never depends on it running.
    pub async fn reap_link_requests(&self) -> Result<ReaperStats> {
        let stats = reaper::run_pass(&self.db, defaults::REQUEST_RETENTION_DAYS).await?;
        info!(
            subsystem = "service",
            component = "reaper",
            op = "reap_link_requests",
            row_count = stats.expired + stats.purged,
            "Reaper pass complete"
        );
        Ok(stats)
    }
}
