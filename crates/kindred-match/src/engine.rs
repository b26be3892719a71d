//! The matching engine: candidate discovery, scoring, fusion, and
//! persistence of factors and pending auto links.
//!
//! Deliberately conservative: a high-confidence candidate is only ever
//! *proposed* as a pending link. Realizing a match (assigning profiles to
//! one identity) is reserved for the verification workflow and explicit
//! merges, because a false positive merges two strangers' histories.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::time::Instant;

use serde_json::{json, Map as JsonMap, Value as JsonValue};
use tracing::{debug, info};
use uuid::Uuid;

use kindred_core::{
    AnalyzeReport, Error, FactorRepository, FactorType, LinkRepository, LinkStatus,
    MatchCandidate, PlatformProfile, ProfileRepository, RecordLink, Result, SignalScore,
};
use kindred_db::{identities, Database};

use crate::config::MatchConfig;
use crate::{fusion, social, temporal, username};

struct CandidateAcc {
    profile: PlatformProfile,
    signals: Vec<SignalScore>,
    evidence: JsonMap<String, JsonValue>,
}

impl CandidateAcc {
    fn new(profile: PlatformProfile) -> Self {
        Self {
            profile,
            signals: Vec::new(),
            evidence: JsonMap::new(),
        }
    }
}

/// Multi-signal matching engine over the graph store.
pub struct MatchEngine {
    db: Database,
    config: MatchConfig,
}

impl MatchEngine {
    /// Create an engine with default configuration.
    pub fn new(db: Database) -> Self {
        Self::with_config(db, MatchConfig::default())
    }

    /// Create an engine with custom configuration.
    pub fn with_config(db: Database, config: MatchConfig) -> Self {
        Self { db, config }
    }

    /// The active configuration.
    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Full analysis run for one profile: rank candidates across other
    /// platforms, persist confidence factors on the profile's identity
    /// (creating it if absent), and record pending auto links for
    /// candidates above the threshold.
    pub async fn analyze(&self, platform: &str, platform_user_id: &str) -> Result<AnalyzeReport> {
        let start = Instant::now();

        let profile = self
            .db
            .profiles
            .get(platform, platform_user_id)
            .await?
            .ok_or_else(|| Error::ProfileNotFound {
                platform: platform.to_string(),
                platform_user_id: platform_user_id.to_string(),
            })?;

        let candidates = self.rank_candidates(&profile).await?;
        let identity_id = self.ensure_identity(&profile).await?;

        // One factor per signal that fired anywhere, valued at its best
        // candidate score. Each upsert refreshes the aggregate.
        let mut best: HashMap<FactorType, (f32, Uuid)> = HashMap::new();
        for cand in &candidates {
            for s in &cand.signals {
                let entry = best.entry(s.signal).or_insert((s.score, cand.profile.id));
                if s.score > entry.0 {
                    *entry = (s.score, cand.profile.id);
                }
            }
        }
        for (factor, (value, cand_id)) in &best {
            self.db
                .factors
                .upsert(
                    identity_id,
                    *factor,
                    *value,
                    json!({ "best_candidate_profile_id": cand_id }),
                )
                .await?;
        }

        let mut auto_linked = 0;
        for cand in &candidates {
            if cand.confidence < self.config.auto_link_threshold {
                // Sorted descending; nothing further qualifies.
                break;
            }
            let Some(strongest) = cand.signals.first() else {
                continue;
            };
            let Some(link_type) = strongest.signal.auto_link_type() else {
                continue;
            };

            self.db
                .links
                .record(RecordLink {
                    source_profile_id: profile.id,
                    target_profile_id: cand.profile.id,
                    link_type,
                    confidence: cand.confidence,
                    evidence: cand.evidence.clone(),
                    status: LinkStatus::Pending,
                    corroboration_bonus: fusion::corroboration_bonus(
                        strongest.signal,
                        &self.config,
                    ),
                    verified_by: None,
                    verified_at: None,
                })
                .await?;
            auto_linked += 1;
        }

        info!(
            subsystem = "match",
            component = "engine",
            op = "analyze",
            profile_id = %profile.id,
            identity_id = %identity_id,
            candidate_count = candidates.len(),
            auto_linked = auto_linked,
            duration_ms = start.elapsed().as_millis() as u64,
            "Analysis run complete"
        );

        Ok(AnalyzeReport {
            profile_id: profile.id,
            identity_id,
            candidates,
            auto_linked,
        })
    }

    /// Rank plausible same-person candidates on other platforms without
    /// side effects.
    pub async fn rank_candidates(&self, profile: &PlatformProfile) -> Result<Vec<MatchCandidate>> {
        let mut acc: HashMap<Uuid, CandidateAcc> = HashMap::new();

        self.gather_username(profile, &mut acc).await?;
        self.gather_social(profile, &mut acc).await?;
        self.gather_temporal(profile, &mut acc).await?;

        let mut candidates: Vec<MatchCandidate> = acc
            .into_values()
            .filter(|c| !c.signals.is_empty())
            .map(|mut c| {
                fusion::sort_signals(&mut c.signals);
                let confidence = fusion::fuse(&c.signals, &self.config);
                MatchCandidate {
                    profile: c.profile,
                    confidence,
                    signals: c.signals,
                    evidence: JsonValue::Object(c.evidence),
                }
            })
            .collect();

        candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        candidates.truncate(self.config.candidate_limit);
        Ok(candidates)
    }

    async fn gather_username(
        &self,
        profile: &PlatformProfile,
        acc: &mut HashMap<Uuid, CandidateAcc>,
    ) -> Result<()> {
        let Some(handle) = profile.username.as_deref() else {
            return Ok(());
        };

        let prefiltered = self
            .db
            .search
            .username_candidates(&profile.platform, handle, self.config.username_fetch_limit)
            .await?;

        debug!(
            subsystem = "match",
            component = "engine",
            op = "username_signal",
            profile_id = %profile.id,
            candidate_count = prefiltered.len(),
            "Trigram prefilter returned candidates"
        );

        for cand in prefiltered {
            let Some(cand_handle) = cand.username.as_deref() else {
                continue;
            };
            let score = username::similarity(handle, cand_handle);
            if score < self.config.username_threshold {
                continue;
            }
            let evidence = json!({
                "source": handle,
                "candidate": cand_handle,
                "similarity": score,
            });
            let entry = acc
                .entry(cand.id)
                .or_insert_with(|| CandidateAcc::new(cand.clone()));
            entry.signals.push(SignalScore {
                signal: FactorType::UsernameSimilarity,
                score,
            });
            entry.evidence.insert("username".to_string(), evidence);
        }
        Ok(())
    }

    async fn gather_social(
        &self,
        profile: &PlatformProfile,
        acc: &mut HashMap<Uuid, CandidateAcc>,
    ) -> Result<()> {
        let overlaps = self
            .db
            .rooms
            .social_candidates(
                profile.id,
                &profile.platform,
                self.config.social_min_shared,
                self.config.username_fetch_limit,
            )
            .await?;

        let missing: Vec<Uuid> = overlaps
            .iter()
            .map(|o| o.profile_id)
            .filter(|id| !acc.contains_key(id))
            .collect();
        let fetched: HashMap<Uuid, PlatformProfile> = self
            .db
            .profiles
            .get_by_ids(&missing)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        for overlap in overlaps {
            let score = social::overlap_score(
                overlap.shared_communities,
                self.config.social_min_shared,
                self.config.social_weight,
                self.config.social_cap,
            );
            if score <= 0.0 {
                continue;
            }
            let entry = match acc.entry(overlap.profile_id) {
                Entry::Occupied(e) => e.into_mut(),
                Entry::Vacant(v) => {
                    let Some(p) = fetched.get(&overlap.profile_id) else {
                        continue;
                    };
                    v.insert(CandidateAcc::new(p.clone()))
                }
            };
            entry.signals.push(SignalScore {
                signal: FactorType::SocialOverlap,
                score,
            });
            entry.evidence.insert(
                "social".to_string(),
                json!({ "shared_communities": overlap.shared_communities }),
            );
        }
        Ok(())
    }

    async fn gather_temporal(
        &self,
        profile: &PlatformProfile,
        acc: &mut HashMap<Uuid, CandidateAcc>,
    ) -> Result<()> {
        let subject = self.db.profiles.activity_histogram(profile.id).await?;
        if temporal::total_observations(&subject) < self.config.temporal_min_observations {
            return Ok(());
        }

        // Correlate against candidates the other signals surfaced, plus a
        // bounded set of recently active other-platform profiles so the
        // signal can also discover on its own.
        let recents = self
            .db
            .profiles
            .recently_active_excluding(
                &profile.platform,
                self.config.temporal_min_observations,
                self.config.temporal_scan_limit,
            )
            .await?;

        let mut universe: Vec<Uuid> = acc.keys().copied().collect();
        let mut recent_profiles: HashMap<Uuid, PlatformProfile> = HashMap::new();
        for p in recents {
            if !acc.contains_key(&p.id) {
                universe.push(p.id);
            }
            recent_profiles.insert(p.id, p);
        }

        let histograms = self.db.profiles.activity_histograms(&universe).await?;

        for (cand_id, hist) in histograms {
            if cand_id == profile.id {
                continue;
            }
            if temporal::total_observations(&hist) < self.config.temporal_min_observations {
                continue;
            }
            let Some(corr) = temporal::pearson_correlation(&subject, &hist) else {
                continue;
            };
            let score =
                temporal::correlation_score(corr, self.config.temporal_floor, self.config.temporal_weight);
            if score <= 0.0 {
                continue;
            }
            let entry = match acc.entry(cand_id) {
                Entry::Occupied(e) => e.into_mut(),
                Entry::Vacant(v) => {
                    let Some(p) = recent_profiles.get(&cand_id) else {
                        continue;
                    };
                    v.insert(CandidateAcc::new(p.clone()))
                }
            };
            entry.signals.push(SignalScore {
                signal: FactorType::TemporalCorrelation,
                score,
            });
            entry
                .evidence
                .insert("temporal".to_string(), json!({ "correlation": corr }));
        }
        Ok(())
    }

    /// Return the profile's identity, creating one when none exists.
    async fn ensure_identity(&self, profile: &PlatformProfile) -> Result<Uuid> {
        if let Some(id) = profile.identity_id {
            return Ok(id);
        }
        identities::ensure_for_profile(&self.db.pool, profile.id).await
    }
}
