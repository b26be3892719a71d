//! Integration tests for the matching engine's discovery and side effects.
//!
//! Requires a migrated Postgres; run with `cargo test -- --ignored`.

use uuid::Uuid;

use kindred_db::test_fixtures::TestDatabase;
use kindred_db::{
    FactorRepository, FactorType, IdentityRepository, LinkStatus, LinkType, ProfileRepository,
};
use kindred_match::{MatchConfig, MatchEngine};

#[tokio::test]
#[ignore = "requires a PostgreSQL test database"]
async fn exact_username_match_persists_a_pending_auto_link() {
    let t = TestDatabase::new().await.unwrap();
    let handle = format!("cryptoking{}", Uuid::new_v4().simple());
    let tg = t.seed_profile("telegram", &handle).await.unwrap();
    let dc = t.seed_profile("discord", &handle).await.unwrap();

    let engine = MatchEngine::new(t.db.clone());
    let report = engine
        .analyze("telegram", &tg.platform_user_id)
        .await
        .unwrap();

    // Exact match scores 100: candidate present and auto-linked.
    let candidate = report
        .candidates
        .iter()
        .find(|c| c.profile.id == dc.id)
        .expect("discord profile should be a candidate");
    assert!(candidate.confidence >= 80.0);
    assert_eq!(report.auto_linked, 1);

    let link = t
        .db
        .links
        .get_for_pair(tg.id, dc.id)
        .await
        .unwrap()
        .expect("auto link should exist");
    assert_eq!(link.link_type, LinkType::AutoUsername);
    // Automatic detection only proposes; it never confirms.
    assert_eq!(link.status, LinkStatus::Pending);

    // The run attached a confidence factor to the analyzed identity.
    let factors = t
        .db
        .factors
        .list_for_identity(report.identity_id)
        .await
        .unwrap();
    assert!(factors
        .iter()
        .any(|f| f.factor_type == FactorType::UsernameSimilarity && f.value >= 99.0));
}

#[tokio::test]
#[ignore = "requires a PostgreSQL test database"]
async fn near_miss_usernames_are_surfaced_but_not_linked() {
    let t = TestDatabase::new().await.unwrap();
    // Distance 3 over length 10 scores exactly 70: a candidate, but below
    // the auto-link threshold.
    let tg = t.seed_profile("telegram", "abcdefghij").await.unwrap();
    let dc = t.seed_profile("discord", "abcdefgxyz").await.unwrap();

    let engine = MatchEngine::with_config(t.db.clone(), MatchConfig::new());
    let report = engine
        .analyze("telegram", &tg.platform_user_id)
        .await
        .unwrap();

    let candidate = report.candidates.iter().find(|c| c.profile.id == dc.id);
    if let Some(candidate) = candidate {
        assert!(candidate.confidence < 80.0);
    }
    assert!(t.db.links.get_for_pair(tg.id, dc.id).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires a PostgreSQL test database"]
async fn analyze_creates_an_identity_for_an_unclaimed_profile() {
    let t = TestDatabase::new().await.unwrap();
    let handle = format!("loner{}", Uuid::new_v4().simple());
    let tg = t.seed_profile("telegram", &handle).await.unwrap();
    assert!(tg.identity_id.is_none());

    let engine = MatchEngine::new(t.db.clone());
    let report = engine
        .analyze("telegram", &tg.platform_user_id)
        .await
        .unwrap();

    let identity = t
        .db
        .identities
        .get(report.identity_id)
        .await
        .unwrap()
        .expect("identity should have been created");
    assert_eq!(identity.primary_platform.as_deref(), Some("telegram"));

    let refreshed = t.db.profiles.get_by_id(tg.id).await.unwrap().unwrap();
    assert_eq!(refreshed.identity_id, Some(report.identity_id));

    // Re-analysis reuses the identity instead of minting another.
    let again = engine
        .analyze("telegram", &tg.platform_user_id)
        .await
        .unwrap();
    assert_eq!(again.identity_id, report.identity_id);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL test database"]
async fn correlated_activity_corroborates_a_username_candidate() {
    let t = TestDatabase::new().await.unwrap();
    let suffix = Uuid::new_v4().simple().to_string();
    let tg = t
        .seed_profile("telegram", &format!("nightowl{suffix}"))
        .await
        .unwrap();
    let dc = t
        .seed_profile("discord", &format!("nightowl{suffix}x"))
        .await
        .unwrap();

    // Same late-night hours on both accounts, enough observations for the
    // correlation to be meaningful.
    let hours: Vec<i64> = (0..7).flat_map(|d| [d * 24, d * 24 + 1, d * 24 + 2]).collect();
    t.seed_activity(&tg, &hours, 2).await.unwrap();
    t.seed_activity(&dc, &hours, 2).await.unwrap();

    let engine = MatchEngine::new(t.db.clone());
    let report = engine
        .analyze("telegram", &tg.platform_user_id)
        .await
        .unwrap();

    let candidate = report
        .candidates
        .iter()
        .find(|c| c.profile.id == dc.id)
        .expect("corroborated candidate should rank");
    // Containment (85) corroborated by temporal (+15) caps at 100.
    assert!(candidate.confidence >= 99.0);
    assert!(candidate.signals.len() >= 2);
    assert_eq!(report.auto_linked, 1);
}
