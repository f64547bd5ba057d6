//! Catalog scenarios against an in-process relay

mod support;

use std::sync::Arc;

use support::{relay_with_actors, FakeRelay, RelayOptions};
use zooid_core::HarnessConfig;
use zooid_scenarios::steps::join_with_claim_retry;
use zooid_scenarios::{catalog, ScenarioContext, ScenarioError};

async fn run(name: &str, config: &Arc<HarnessConfig>) -> anyhow::Result<()> {
    let scenario = catalog()
        .into_iter()
        .find(|scenario| scenario.name == name)
        .unwrap_or_else(|| panic!("no scenario named {name}"));
    let ctx = ScenarioContext::new(config.clone());
    let outcome = scenario.run(ctx.clone()).await;
    ctx.teardown().await;
    assert_eq!(ctx.open_resources(), 0);
    outcome
}

async fn relay() -> (FakeRelay, Arc<HarnessConfig>) {
    relay_with_actors(RelayOptions::default()).await
}

#[tokio::test]
async fn test_publish_round_trips() {
    let (_relay, config) = relay().await;
    run("nip01-kind0-metadata", &config).await.unwrap();
    run("nip01-kind1-text-note", &config).await.unwrap();
}

#[tokio::test]
async fn test_relay_info_lists_required_nips() {
    let (_relay, config) = relay().await;
    run("nip11-relay-info", &config).await.unwrap();
}

#[tokio::test]
async fn test_auth_scenarios() {
    let (_relay, config) = relay().await;
    for name in [
        "nip42-auth-challenge",
        "nip42-unauth-event",
        "nip42-unauth-req",
        "nip43-nonmember-req",
        "auth-mismatch-pubkey",
    ] {
        if let Err(e) = run(name, &config).await {
            panic!("{name} failed: {e:#}");
        }
    }
}

#[tokio::test]
async fn test_membership_scenarios() {
    let (relay, config) = relay().await;
    let member = config.member.as_ref().unwrap().pubkey.clone();

    run("invite-claim", &config).await.unwrap();
    run("join-valid-claim", &config).await.unwrap();
    assert!(relay.is_member(&member));

    // Joining again is answered as a duplicate, which still counts as joined
    run("join-existing-member", &config).await.unwrap();
    run("nip43-relay-members-list", &config).await.unwrap();
    run("nip43-leave-removes-member", &config).await.unwrap();
    run("nip43-relay-member-events", &config).await.unwrap();
}

#[tokio::test]
async fn test_deletion_scenarios() {
    let (_relay, config) = relay().await;
    for name in [
        "nip09-delete-single",
        "nip09-delete-multiple",
        "nip09-delete-partial",
        "nip09-delete-addressable",
        "nip09-delete-mixed-authors",
    ] {
        if let Err(e) = run(name, &config).await {
            panic!("{name} failed: {e:#}");
        }
    }
}

#[tokio::test]
async fn test_relay_that_never_deletes_fails_to_converge() {
    let (_relay, config) = relay_with_actors(RelayOptions {
        ignore_deletions: true,
        ..RelayOptions::default()
    })
    .await;

    let err = run("nip09-delete-single", &config).await.unwrap_err();
    assert!(
        err.to_string().contains("Relay did not converge"),
        "unexpected error: {err:#}"
    );
}

#[tokio::test]
async fn test_deleted_event_that_reappears_fails() {
    let (_relay, config) = relay_with_actors(RelayOptions {
        resurrect_deletions: true,
        ..RelayOptions::default()
    })
    .await;

    let err = run("nip09-delete-single", &config).await.unwrap_err();
    assert!(
        err.to_string().contains("reappeared after deletion"),
        "unexpected error: {err:#}"
    );
}

#[tokio::test]
async fn test_partially_applied_mixed_author_deletion_fails() {
    let (_relay, config) = relay_with_actors(RelayOptions {
        partial_mixed_deletions: true,
        ..RelayOptions::default()
    })
    .await;

    let err = run("nip09-delete-mixed-authors", &config).await.unwrap_err();
    assert!(
        err.to_string().contains("Relay did not converge"),
        "unexpected error: {err:#}"
    );
}

#[tokio::test]
async fn test_invites_for_another_key_are_not_claimed() {
    let (relay, config) = relay_with_actors(RelayOptions {
        misaddressed_invites: true,
        ..RelayOptions::default()
    })
    .await;
    let ctx = ScenarioContext::new(config.clone());
    let admin = ctx.admin_client().unwrap();
    let member = ctx.member_client().unwrap();

    let err = join_with_claim_retry(&admin, &member, &config.admin.pubkey)
        .await
        .unwrap_err();
    assert!(matches!(err, ScenarioError::ClaimNotFound { invites: 1 }), "{err}");
    assert!(!relay.is_member(&config.member.as_ref().unwrap().pubkey));

    ctx.teardown().await;
}

#[tokio::test]
async fn test_stale_claim_is_retried_with_a_fresh_claim() {
    let (relay, config) = relay_with_actors(RelayOptions {
        stale_claims: 2,
        ..RelayOptions::default()
    })
    .await;
    let ctx = ScenarioContext::new(config.clone());
    let admin = ctx.admin_client().unwrap();
    let member = ctx.member_client().unwrap();

    let result = join_with_claim_retry(&admin, &member, &config.admin.pubkey)
        .await
        .unwrap();
    assert!(result.is_success());
    assert!(relay.is_member(&config.member.as_ref().unwrap().pubkey));

    ctx.teardown().await;
}

#[tokio::test]
async fn test_claim_retries_are_bounded() {
    let (relay, config) = relay_with_actors(RelayOptions {
        stale_claims: 5,
        ..RelayOptions::default()
    })
    .await;
    let ctx = ScenarioContext::new(config.clone());
    let admin = ctx.admin_client().unwrap();
    let member = ctx.member_client().unwrap();

    let err = join_with_claim_retry(&admin, &member, &config.admin.pubkey)
        .await
        .unwrap_err();
    assert!(matches!(err, ScenarioError::StaleClaim { .. }), "{err}");
    assert!(!relay.is_member(&config.member.as_ref().unwrap().pubkey));

    ctx.teardown().await;
}
