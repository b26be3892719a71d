//! Integration tests for the operation surface and verification workflow.
//!
//! Requires a migrated Postgres; run with `cargo test -- --ignored`.

use std::sync::Arc;

use uuid::Uuid;

use kindred_db::test_fixtures::TestDatabase;
use kindred_db::{AuditAction, Error, LinkStatus, LinkType, ProfileAttrs, RequestStatus};
use kindred_match::MatchConfig;
use kindred_service::{IdentityService, VerifyConfig};

fn service(t: &TestDatabase) -> IdentityService {
    init_tracing();
    IdentityService::new(t.db.clone())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn service_with_ttl(t: &TestDatabase, ttl_minutes: i64) -> IdentityService {
    init_tracing();
    IdentityService::with_config(
        t.db.clone(),
        MatchConfig::default(),
        VerifyConfig::new().ttl_minutes(ttl_minutes),
    )
}

#[tokio::test]
#[ignore = "requires a PostgreSQL test database"]
async fn verify_links_both_profiles_under_one_identity() {
    let t = TestDatabase::new().await.unwrap();
    let svc = service(&t);
    let requester = t.seed_profile("telegram", "scenario-c").await.unwrap();

    let ticket = svc
        .request_link(
            "telegram",
            &requester.platform_user_id,
            "discord",
            "newuser",
        )
        .await
        .unwrap();
    assert_eq!(ticket.request.status, RequestStatus::Pending);
    assert!(ticket.instruction.contains(&ticket.request.code));

    let target_user = format!("u-{}", Uuid::new_v4().simple());
    let outcome = svc
        .verify(
            "discord",
            &target_user,
            &ticket.request.code,
            ProfileAttrs::username("newuser"),
        )
        .await
        .unwrap();

    // Both profiles now resolve to the same identity.
    let resolved = svc.resolve("discord", &target_user).await.unwrap();
    let identity = resolved.identity.expect("target should have an identity");
    assert_eq!(identity.id, outcome.identity_id);
    assert!(identity.verified);
    let linked: Vec<Uuid> = resolved.linked_profiles.iter().map(|p| p.id).collect();
    assert!(linked.contains(&requester.id));
    assert!(linked.contains(&outcome.target_profile_id));

    // The edge is a confirmed manual link at full confidence.
    let link = t
        .db
        .links
        .get_for_pair(requester.id, outcome.target_profile_id)
        .await
        .unwrap()
        .expect("confirmed link should exist");
    assert_eq!(link.link_type, LinkType::Manual);
    assert_eq!(link.status, LinkStatus::Confirmed);
    assert!((link.confidence - 100.0).abs() < 0.01);
    assert!(link.verified_by.is_some());
    assert!(link.verified_at.is_some());

    // Exactly one link_created audit entry records the join.
    let history = svc.audit_history(outcome.identity_id, None).await.unwrap();
    let created: Vec<_> = history
        .iter()
        .filter(|e| e.action == AuditAction::LinkCreated)
        .collect();
    assert_eq!(created.len(), 1);

    // The request reached its terminal state.
    let request = t
        .db
        .link_requests
        .get(ticket.request.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(request.status, RequestStatus::Verified);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL test database"]
async fn expired_code_fails_and_transitions_the_request() {
    let t = TestDatabase::new().await.unwrap();
    let svc = service_with_ttl(&t, 0);
    let requester = t.seed_profile("telegram", "scenario-b").await.unwrap();

    let ticket = svc
        .request_link(
            "telegram",
            &requester.platform_user_id,
            "discord",
            "whoever",
        )
        .await
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let err = svc
        .verify(
            "discord",
            "u-expired",
            &ticket.request.code,
            ProfileAttrs::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Expired { .. }));

    // The lazy transition persisted even though verification failed.
    let request = t
        .db
        .link_requests
        .get(ticket.request.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(request.status, RequestStatus::Expired);

    // And stays failed on retry, reaper or not.
    let again = svc
        .verify(
            "discord",
            "u-expired",
            &ticket.request.code,
            ProfileAttrs::default(),
        )
        .await;
    assert!(again.is_err());
}

#[tokio::test]
#[ignore = "requires a PostgreSQL test database"]
async fn code_is_single_use_under_concurrency() {
    let t = TestDatabase::new().await.unwrap();
    let svc = Arc::new(service(&t));
    let requester = t.seed_profile("telegram", "single-use").await.unwrap();

    let ticket = svc
        .request_link(
            "telegram",
            &requester.platform_user_id,
            "discord",
            "whoever",
        )
        .await
        .unwrap();

    let target_user = format!("u-{}", Uuid::new_v4().simple());
    let attempts = (0..8).map(|_| {
        let svc = svc.clone();
        let code = ticket.request.code.clone();
        let target_user = target_user.clone();
        tokio::spawn(async move {
            svc.verify("discord", &target_user, &code, ProfileAttrs::default())
                .await
        })
    });

    let mut successes = 0;
    for handle in attempts {
        if handle.await.unwrap().is_ok() {
            successes += 1;
        }
    }
    assert_eq!(successes, 1, "exactly one concurrent verify may win");

    // Sequential retry after consumption also fails.
    let err = svc
        .verify(
            "discord",
            &target_user,
            &ticket.request.code,
            ProfileAttrs::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
#[ignore = "requires a PostgreSQL test database"]
async fn resolve_is_idempotent_without_intervening_writes() {
    let t = TestDatabase::new().await.unwrap();
    let svc = service(&t);
    let p = t.seed_profile("telegram", "idempotent").await.unwrap();

    let first = svc.resolve("telegram", &p.platform_user_id).await.unwrap();
    let second = svc.resolve("telegram", &p.platform_user_id).await.unwrap();

    assert_eq!(
        serde_json::to_value(&first).unwrap(),
        serde_json::to_value(&second).unwrap()
    );
}

#[tokio::test]
#[ignore = "requires a PostgreSQL test database"]
async fn unlink_detaches_the_named_platform() {
    let t = TestDatabase::new().await.unwrap();
    let svc = service(&t);
    let requester = t.seed_profile("telegram", "unlinker").await.unwrap();

    // Join a discord profile through the real workflow.
    let ticket = svc
        .request_link(
            "telegram",
            &requester.platform_user_id,
            "discord",
            "other-half",
        )
        .await
        .unwrap();
    let target_user = format!("u-{}", Uuid::new_v4().simple());
    let outcome = svc
        .verify(
            "discord",
            &target_user,
            &ticket.request.code,
            ProfileAttrs::username("other-half"),
        )
        .await
        .unwrap();

    let fresh = svc
        .unlink("telegram", &requester.platform_user_id, "discord")
        .await
        .unwrap();
    assert_ne!(fresh, outcome.identity_id);

    // The discord profile stands alone; the telegram one kept the
    // original identity.
    let discord = svc.resolve("discord", &target_user).await.unwrap();
    assert_eq!(discord.identity.unwrap().id, fresh);
    assert_eq!(discord.linked_profiles.len(), 1);

    let telegram = svc
        .resolve("telegram", &requester.platform_user_id)
        .await
        .unwrap();
    assert_eq!(telegram.identity.unwrap().id, outcome.identity_id);

    // No edge survives to rejoin them silently.
    assert!(t
        .db
        .links
        .get_for_pair(requester.id, outcome.target_profile_id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
#[ignore = "requires a PostgreSQL test database"]
async fn search_groups_profiles_by_identity() {
    let t = TestDatabase::new().await.unwrap();
    let svc = service(&t);
    let handle = format!("findme{}", Uuid::new_v4().simple());
    let requester = t.seed_profile("telegram", &handle).await.unwrap();

    let ticket = svc
        .request_link("telegram", &requester.platform_user_id, "discord", &handle)
        .await
        .unwrap();
    let target_user = format!("u-{}", Uuid::new_v4().simple());
    let outcome = svc
        .verify(
            "discord",
            &target_user,
            &ticket.request.code,
            ProfileAttrs::username(&handle),
        )
        .await
        .unwrap();

    let groups = svc.search(&handle).await.unwrap();
    let group = groups
        .iter()
        .find(|g| g.identity.as_ref().map(|i| i.id) == Some(outcome.identity_id))
        .expect("identity group should surface");
    assert_eq!(group.profiles.len(), 2);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL test database"]
async fn reaper_expires_and_purges_stale_requests() {
    let t = TestDatabase::new().await.unwrap();
    let svc = service_with_ttl(&t, 0);
    let requester = t.seed_profile("telegram", "reaped").await.unwrap();

    let ticket = svc
        .request_link(
            "telegram",
            &requester.platform_user_id,
            "discord",
            "whoever",
        )
        .await
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let stats = svc.reap_link_requests().await.unwrap();
    assert!(stats.expired >= 1);
    let request = t
        .db
        .link_requests
        .get(ticket.request.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(request.status, RequestStatus::Expired);

    // A negative retention window forces the purge immediately.
    let purged = kindred_service::run_reaper_pass(&t.db, -1).await.unwrap();
    assert!(purged.purged >= 1);
    assert!(t
        .db
        .link_requests
        .get(ticket.request.id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
#[ignore = "requires a PostgreSQL test database"]
async fn request_link_validates_inputs() {
    let t = TestDatabase::new().await.unwrap();
    let svc = service(&t);
    let requester = t.seed_profile("telegram", "validator").await.unwrap();

    // Same-platform target is meaningless.
    assert!(svc
        .request_link(
            "telegram",
            &requester.platform_user_id,
            "telegram",
            "someone"
        )
        .await
        .is_err());

    // Unknown requester profile.
    assert!(matches!(
        svc.request_link("telegram", "no-such-user", "discord", "someone")
            .await
            .unwrap_err(),
        Error::ProfileNotFound { .. }
    ));

    // Empty target identifier.
    assert!(svc
        .request_link("telegram", &requester.platform_user_id, "discord", "  ")
        .await
        .is_err());
}
