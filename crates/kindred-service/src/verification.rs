//! The verification workflow: code-based proof that one human controls
//! accounts on two platforms.
//!
//! Per link request the state machine is `pending -> {verified | expired |
//! rejected}`, terminal on any of the latter. The entire success path of
//! [`VerificationWorkflow::verify_code`] runs in one transaction, with the
//! request row claimed `FOR UPDATE`: among N concurrent submissions of the
//! same code exactly one commits `verified`, and the rest observe a
//! terminal row and fail as a conflict. A failed audit append aborts the
//! whole transaction.

use chrono::{Duration, Utc};
use rand::Rng;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::info;

use kindred_core::{
    defaults, AuditAction, AuditRepository, Error, FactorType, LinkRequestTicket, LinkStatus,
    LinkType, ProfileAttrs, ProfileRepository, RecordLink, RequestStatus, Result, VerifyOutcome,
};
use kindred_db::{audit, factors, identities, link_requests, links, profiles, Database};

/// Code alphabet: uppercase alphanumerics minus the lookalikes I, L, O,
/// 0 and 1, since humans relay these codes by hand across platforms.
const CODE_CHARSET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Attempts at regenerating a colliding code before giving up.
const CODE_RETRY_LIMIT: usize = 3;

/// Tunable parameters for the verification workflow.
#[derive(Debug, Clone)]
pub struct VerifyConfig {
    /// Generated code length.
    pub code_length: usize,
    /// Minutes until a pending request expires.
    pub ttl_minutes: i64,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            code_length: defaults::CODE_LENGTH,
            ttl_minutes: defaults::CODE_TTL_MINUTES,
        }
    }
}

impl VerifyConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the generated code length.
    pub fn code_length(mut self, length: usize) -> Self {
        self.code_length = length;
        self
    }

    /// Set the request time-to-live in minutes.
    pub fn ttl_minutes(mut self, minutes: i64) -> Self {
        self.ttl_minutes = minutes;
        self
    }
}

/// Generate a verification code from a cryptographically strong source.
/// `thread_rng` is a CSPRNG reseeded from the operating system.
pub fn generate_code(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..CODE_CHARSET.len());
            CODE_CHARSET[idx] as char
        })
        .collect()
}

/// SHA-256 fingerprint of the submitted raw payload, recorded in audit
/// details instead of the payload itself.
fn payload_fingerprint(attrs: &ProfileAttrs) -> Option<String> {
    let payload = attrs.raw_payload.as_ref()?;
    let mut hasher = Sha256::new();
    hasher.update(payload.to_string().as_bytes());
    Some(hex::encode(hasher.finalize()))
}

/// Code-based verification over the graph store.
pub struct VerificationWorkflow {
    db: Database,
    config: VerifyConfig,
}

impl VerificationWorkflow {
    /// Create a workflow with default configuration.
    pub fn new(db: Database) -> Self {
        Self::with_config(db, VerifyConfig::default())
    }

    /// Create a workflow with custom configuration.
    pub fn with_config(db: Database, config: VerifyConfig) -> Self {
        Self { db, config }
    }

    /// The active configuration.
    pub fn config(&self) -> &VerifyConfig {
        &self.config
    }

    /// Open a link request: the profile `(platform, platform_user_id)`
    /// claims to also control `target_identifier` on `target_platform`.
    ///
    /// Creates the requester's identity first when none exists, so the
    /// request always has a concrete identity to attach to. Returns the
    /// pending request plus the instruction to relay to the user.
    pub async fn request_link(
        &self,
        platform: &str,
        platform_user_id: &str,
        target_platform: &str,
        target_identifier: &str,
    ) -> Result<LinkRequestTicket> {
        if target_identifier.trim().is_empty() {
            return Err(Error::InvalidInput(
                "target identifier must not be empty".to_string(),
            ));
        }
        if platform == target_platform {
            return Err(Error::InvalidInput(
                "target platform must differ from the requesting platform".to_string(),
            ));
        }

        let requester = self
            .db
            .profiles
            .get(platform, platform_user_id)
            .await?
            .ok_or_else(|| Error::ProfileNotFound {
                platform: platform.to_string(),
                platform_user_id: platform_user_id.to_string(),
            })?;

        let identity_id = match requester.identity_id {
            Some(id) => id,
            None => identities::ensure_for_profile(&self.db.pool, requester.id).await?,
        };

        let expires_at = Utc::now() + Duration::minutes(self.config.ttl_minutes);

        // The partial unique index on live codes turns a collision into a
        // conflict; regenerate and retry a few times before surfacing it.
        let mut last_err = None;
        let mut created = None;
        for _ in 0..CODE_RETRY_LIMIT {
            let code = generate_code(self.config.code_length);
            match self
                .db
                .link_requests
                .create(
                    requester.id,
                    target_platform,
                    target_identifier,
                    &code,
                    expires_at,
                )
                .await
            {
                Ok(request) => {
                    created = Some(request);
                    break;
                }
                Err(e @ Error::Conflict(_)) => last_err = Some(e),
                Err(e) => return Err(e),
            }
        }
        let request = match created {
            Some(request) => request,
            None => {
                return Err(last_err
                    .unwrap_or_else(|| Error::Internal("code generation failed".to_string())))
            }
        };

        self.db
            .audit
            .append(
                Some(identity_id),
                AuditAction::Verification,
                Some(requester.id),
                json!({
                    "request_id": request.id,
                    "target_platform": target_platform,
                    "target_identifier": target_identifier,
                    "expires_at": request.expires_at,
                }),
            )
            .await?;

        let instruction = format!(
            "Send the code {} from your {} account within {} minutes to confirm both accounts are yours.",
            request.code, target_platform, self.config.ttl_minutes
        );

        info!(
            subsystem = "service",
            component = "verification",
            op = "request_link",
            request_id = %request.id,
            profile_id = %requester.id,
            identity_id = %identity_id,
            platform = target_platform,
            "Link request opened"
        );

        Ok(LinkRequestTicket {
            request,
            instruction,
        })
    }

    /// Submit a code from the target platform.
    ///
    /// On success the target profile is upserted, assigned the requester's
    /// identity (created first when absent), joined by a `confirmed`
    /// manual link at full confidence, and audited — all atomically with
    /// the `pending -> verified` transition. A code is single-use: every
    /// call after the winner observes no pending row and fails.
    pub async fn verify_code(
        &self,
        target_platform: &str,
        target_platform_user_id: &str,
        code: &str,
        attrs: ProfileAttrs,
    ) -> Result<VerifyOutcome> {
        let now = Utc::now();
        let mut tx = self.db.pool.begin().await.map_err(Error::Database)?;

        let Some(request) = link_requests::claim_pending_tx(&mut tx, target_platform, code).await?
        else {
            return Err(Error::NotFound(format!(
                "no pending link request on {target_platform} for that code"
            )));
        };

        if request.is_expired_at(now) {
            // The lazy expiry transition must survive the failed
            // verification, so it commits before the error surfaces.
            link_requests::set_status_tx(&mut tx, request.id, RequestStatus::Expired).await?;
            tx.commit().await.map_err(Error::Database)?;
            return Err(Error::Expired {
                target_platform: request.target_platform,
                requested_at: request.created_at,
            });
        }

        let requester = profiles::get_for_update_tx(&mut tx, request.requester_profile_id)
            .await?
            .ok_or_else(|| {
                Error::NotFound(format!("profile {}", request.requester_profile_id))
            })?;

        let identity_id = match requester.identity_id {
            Some(id) => id,
            None => identities::ensure_for_profile_tx(&mut tx, requester.id).await?,
        };

        let target =
            profiles::upsert_tx(&mut tx, target_platform, target_platform_user_id, &attrs).await?;
        if target.id == requester.id {
            return Err(Error::InvalidInput(
                "a profile cannot verify a link to itself".to_string(),
            ));
        }

        let prior_identity = target.identity_id;
        profiles::assign_identity_tx(&mut tx, target.id, identity_id).await?;

        let link = links::record_tx(
            &mut tx,
            &RecordLink {
                source_profile_id: requester.id,
                target_profile_id: target.id,
                link_type: LinkType::Manual,
                confidence: defaults::VERIFIED_CONFIDENCE,
                evidence: json!({
                    "method": "verification_code",
                    "request_id": request.id,
                    "payload_fingerprint": payload_fingerprint(&attrs),
                }),
                status: LinkStatus::Confirmed,
                corroboration_bonus: 0.0,
                verified_by: Some(target.id),
                verified_at: Some(now),
            },
        )
        .await?;

        identities::mark_verified_tx(&mut tx, identity_id).await?;
        factors::upsert_tx(
            &mut tx,
            identity_id,
            FactorType::ManualVerification,
            defaults::VERIFIED_CONFIDENCE,
            json!({ "request_id": request.id }),
        )
        .await?;
        identities::recompute_confidence_tx(&mut tx, identity_id).await?;

        audit::append_tx(
            &mut tx,
            Some(identity_id),
            AuditAction::LinkCreated,
            Some(target.id),
            json!({
                "link_id": link.id,
                "source_profile_id": requester.id,
                "target_profile_id": target.id,
                "method": "verification_code",
                "request_id": request.id,
                "prior_identity_id": prior_identity,
            }),
        )
        .await?;

        link_requests::set_status_tx(&mut tx, request.id, RequestStatus::Verified).await?;
        tx.commit().await.map_err(Error::Database)?;

        info!(
            subsystem = "service",
            component = "verification",
            op = "verify_code",
            request_id = %request.id,
            identity_id = %identity_id,
            link_id = %link.id,
            profile_id = %target.id,
            "Link verified"
        );

        Ok(VerifyOutcome {
            identity_id,
            link_id: link.id,
            target_profile_id: target.id,
        })
    }
}
