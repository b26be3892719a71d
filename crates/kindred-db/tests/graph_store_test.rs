//! Integration tests for the graph store invariants.
//!
//! These validate the storage-layer contract:
//! - profile uniqueness under repeated upserts
//! - single link edge per unordered profile pair, with strengthening
//! - confidence factor upsert and aggregate recomputation
//! - merge completeness and unlink isolation
//!
//! Requires a migrated Postgres (pg_trgm, pgcrypto); run with
//! `cargo test -- --ignored` once DATABASE_URL points at it.

use serde_json::json;
use uuid::Uuid;

use kindred_db::test_fixtures::TestDatabase;
use kindred_db::{
    identities, AuditRepository, FactorRepository, FactorType, IdentityRepository, LinkRepository,
    LinkStatus, LinkType, ProfileAttrs, ProfileRepository, RecordLink,
};

fn pending_auto_username(source: Uuid, target: Uuid, confidence: f32) -> RecordLink {
    RecordLink {
        source_profile_id: source,
        target_profile_id: target,
        link_type: LinkType::AutoUsername,
        confidence,
        evidence: json!({ "username": { "similarity": confidence } }),
        status: LinkStatus::Pending,
        corroboration_bonus: 0.0,
        verified_by: None,
        verified_at: None,
    }
}

#[tokio::test]
#[ignore = "requires a PostgreSQL test database"]
async fn repeated_upsert_never_duplicates_a_profile() {
    let t = TestDatabase::new().await.unwrap();
    let user_id = format!("u-{}", Uuid::new_v4().simple());

    let first = t
        .db
        .profiles
        .upsert("telegram", &user_id, ProfileAttrs::username("alpha"))
        .await
        .unwrap();

    let second = t
        .db
        .profiles
        .upsert(
            "telegram",
            &user_id,
            ProfileAttrs {
                display_name: Some("Alpha Prime".to_string()),
                ..ProfileAttrs::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    // Attrs absent from the second upsert survive from the first.
    assert_eq!(second.username.as_deref(), Some("alpha"));
    assert_eq!(second.display_name.as_deref(), Some("Alpha Prime"));

    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM platform_profile WHERE platform = $1 AND platform_user_id = $2",
    )
    .bind("telegram")
    .bind(&user_id)
    .fetch_one(&t.db.pool)
    .await
    .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL test database"]
async fn link_pair_is_unique_regardless_of_direction() {
    let t = TestDatabase::new().await.unwrap();
    let a = t.seed_profile("telegram", "sym-a").await.unwrap();
    let b = t.seed_profile("discord", "sym-b").await.unwrap();

    t.db
        .links
        .record(pending_auto_username(a.id, b.id, 85.0))
        .await
        .unwrap();

    // Reversed direction, different signal, carries a corroboration bonus.
    let strengthened = t
        .db
        .links
        .record(RecordLink {
            source_profile_id: b.id,
            target_profile_id: a.id,
            link_type: LinkType::AutoTemporal,
            confidence: 60.0,
            evidence: json!({ "temporal": { "correlation": 0.91 } }),
            status: LinkStatus::Pending,
            corroboration_bonus: 15.0,
            verified_by: None,
            verified_at: None,
        })
        .await
        .unwrap();

    // One edge for the unordered pair, confidence max(85, 60) + 15.
    assert_eq!(t.db.links.list_for_profile(a.id).await.unwrap().len(), 1);
    assert!((strengthened.confidence - 100.0).abs() < 0.01);
    // Both signals' evidence merged onto the surviving edge.
    assert!(strengthened.evidence.get("username").is_some());
    assert!(strengthened.evidence.get("temporal").is_some());
}

#[tokio::test]
#[ignore = "requires a PostgreSQL test database"]
async fn rejected_link_ignores_automatic_redetection() {
    let t = TestDatabase::new().await.unwrap();
    let a = t.seed_profile("telegram", "rej-a").await.unwrap();
    let b = t.seed_profile("discord", "rej-b").await.unwrap();

    let link = t
        .db
        .links
        .record(pending_auto_username(a.id, b.id, 88.0))
        .await
        .unwrap();
    t.db.links.reject(link.id, None).await.unwrap();

    let after = t
        .db
        .links
        .record(pending_auto_username(a.id, b.id, 95.0))
        .await
        .unwrap();
    assert_eq!(after.status, LinkStatus::Rejected);
    assert!((after.confidence - 88.0).abs() < 0.01);

    // A second reject is a conflict, not a silent no-op.
    assert!(t.db.links.reject(link.id, None).await.is_err());
}

#[tokio::test]
#[ignore = "requires a PostgreSQL test database"]
async fn factor_upsert_overwrites_and_recomputes_aggregate() {
    let t = TestDatabase::new().await.unwrap();
    let p = t.seed_profile("telegram", "factor-p").await.unwrap();
    let identity_id = identities::ensure_for_profile(&t.db.pool, p.id).await.unwrap();

    t.db.factors
        .upsert(identity_id, FactorType::UsernameSimilarity, 80.0, json!({}))
        .await
        .unwrap();
    t.db.factors
        .upsert(identity_id, FactorType::SocialOverlap, 40.0, json!({}))
        .await
        .unwrap();

    let identity = t.db.identities.get(identity_id).await.unwrap().unwrap();
    assert!((identity.confidence_score - 60.0).abs() < 0.01);

    // Recomputing a factor overwrites rather than duplicating.
    t.db.factors
        .upsert(identity_id, FactorType::UsernameSimilarity, 100.0, json!({}))
        .await
        .unwrap();
    let factors = t.db.factors.list_for_identity(identity_id).await.unwrap();
    assert_eq!(factors.len(), 2);

    let identity = t.db.identities.get(identity_id).await.unwrap().unwrap();
    assert!((identity.confidence_score - 70.0).abs() < 0.01);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL test database"]
async fn merge_moves_every_profile_and_deletes_the_absorbed_identity() {
    let t = TestDatabase::new().await.unwrap();
    let p1 = t.seed_profile("telegram", "merge-p1").await.unwrap();
    let p2 = t.seed_profile("discord", "merge-p2").await.unwrap();
    let p3 = t.seed_profile("x", "merge-p3").await.unwrap();

    let keep = identities::ensure_for_profile(&t.db.pool, p1.id).await.unwrap();
    let away = identities::ensure_for_profile(&t.db.pool, p2.id).await.unwrap();
    sqlx::query("UPDATE platform_profile SET identity_id = $1 WHERE id = $2")
        .bind(away)
        .bind(p3.id)
        .execute(&t.db.pool)
        .await
        .unwrap();

    t.db.factors
        .upsert(away, FactorType::SocialOverlap, 50.0, json!({}))
        .await
        .unwrap();

    let surviving = t.db.identities.merge(keep, away, None).await.unwrap();
    assert_eq!(surviving, keep);

    let linked = t.db.identities.linked_profiles(keep).await.unwrap();
    let ids: Vec<Uuid> = linked.iter().map(|p| p.id).collect();
    assert!(ids.contains(&p1.id) && ids.contains(&p2.id) && ids.contains(&p3.id));

    // The absorbed identity no longer resolves; its factors moved.
    assert!(t.db.identities.get(away).await.unwrap().is_none());
    let factors = t.db.factors.list_for_identity(keep).await.unwrap();
    assert!(factors
        .iter()
        .any(|f| f.factor_type == FactorType::SocialOverlap));

    // The absorption is audited on the surviving identity.
    let history = t.db.audit.list_for_identity(keep, None, 100).await.unwrap();
    assert!(history
        .iter()
        .any(|e| e.action == kindred_db::AuditAction::Merge));
}

#[tokio::test]
#[ignore = "requires a PostgreSQL test database"]
async fn merge_into_itself_is_rejected() {
    let t = TestDatabase::new().await.unwrap();
    let p = t.seed_profile("telegram", "self-merge").await.unwrap();
    let id = identities::ensure_for_profile(&t.db.pool, p.id).await.unwrap();
    assert!(t.db.identities.merge(id, id, None).await.is_err());
}

#[tokio::test]
#[ignore = "requires a PostgreSQL test database"]
async fn unlink_isolates_the_profile_in_a_new_identity() {
    let t = TestDatabase::new().await.unwrap();
    let p1 = t.seed_profile("telegram", "unlink-p1").await.unwrap();
    let p2 = t.seed_profile("discord", "unlink-p2").await.unwrap();

    let original = identities::ensure_for_profile(&t.db.pool, p1.id).await.unwrap();
    sqlx::query("UPDATE platform_profile SET identity_id = $1 WHERE id = $2")
        .bind(original)
        .bind(p2.id)
        .execute(&t.db.pool)
        .await
        .unwrap();
    t.db.links
        .record(pending_auto_username(p1.id, p2.id, 90.0))
        .await
        .unwrap();

    let fresh = t.db.profiles.unlink(p2.id, None).await.unwrap();
    assert_ne!(fresh, original);

    // The new identity contains only the detached profile.
    let fresh_profiles = t.db.identities.linked_profiles(fresh).await.unwrap();
    assert_eq!(fresh_profiles.len(), 1);
    assert_eq!(fresh_profiles[0].id, p2.id);

    // No link touches the detached profile anymore.
    assert!(t.db.links.list_for_profile(p2.id).await.unwrap().is_empty());

    // The split is audited on the original identity.
    let history = t
        .db
        .audit
        .list_for_identity(original, None, 100)
        .await
        .unwrap();
    assert!(history
        .iter()
        .any(|e| e.action == kindred_db::AuditAction::Split));
}

#[tokio::test]
#[ignore = "requires a PostgreSQL test database"]
async fn activity_recording_bumps_histogram_and_count() {
    let t = TestDatabase::new().await.unwrap();
    let p = t.seed_profile("telegram", "activity-p").await.unwrap();

    t.seed_activity(&p, &[9, 9, 33], 1).await.unwrap();

    let refreshed = t
        .db
        .profiles
        .get_by_id(p.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(refreshed.message_count, 3);

    let histogram = t.db.profiles.activity_histogram(p.id).await.unwrap();
    assert_eq!(histogram.len(), 168);
    assert_eq!(histogram[9], 2);
    assert_eq!(histogram[33], 1);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL test database"]
async fn shared_communities_count_across_platforms() {
    let t = TestDatabase::new().await.unwrap();
    let a = t.seed_profile("telegram", "room-a").await.unwrap();
    let b = t.seed_profile("discord", "room-b").await.unwrap();
    let suffix = Uuid::new_v4().simple().to_string();

    for i in 0..3 {
        let community = format!("community-{suffix}-{i}");
        let tg = t
            .db
            .rooms
            .upsert_room("telegram", &format!("tg-{suffix}-{i}"), None, Some(&community))
            .await
            .unwrap();
        let dc = t
            .db
            .rooms
            .upsert_room("discord", &format!("dc-{suffix}-{i}"), None, Some(&community))
            .await
            .unwrap();
        t.db.rooms.add_participant(tg.id, a.id).await.unwrap();
        t.db.rooms.add_participant(dc.id, b.id).await.unwrap();
    }

    let shared = t.db.rooms.shared_community_count(a.id, b.id).await.unwrap();
    assert_eq!(shared, 3);

    let candidates = t
        .db
        .rooms
        .social_candidates(a.id, "telegram", 3, 10)
        .await
        .unwrap();
    assert!(candidates
        .iter()
        .any(|c| c.profile_id == b.id && c.shared_communities == 3));
}
