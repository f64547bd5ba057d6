//! Sub-protocols shared across scenarios
//!
//! Auth priming, invite-claim retrieval, the claim-retrying join, membership
//! convergence and deletion verification. Every wait on relay-side state goes through
//! the convergence poller; nothing here caches what the relay said earlier.

use chrono::{SecondsFormat, Utc};
use nostr_sdk::{Event, EventBuilder, EventId, Filter, PublicKey, Tag};
use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, info};
use zooid_core::{poll_until, retry_with_backoff, HarnessError, PollSettings, RetryPolicy};
use zooid_nostr::{PublishResult, PublishStatus, RelayEvent, TestClient};

use crate::error::{Result, ScenarioError};
use crate::kinds::{self, kind};

/// Relay detail marking a join from an actor that is already a member
const DUPLICATE_MARKER: &str = "duplicate";
/// Relay detail marking a claim that was invalid or already used
const STALE_CLAIM_MARKER: &str = "invite code";

// ----------------------------------------------------------------------------
// Event Construction
// ----------------------------------------------------------------------------

/// Random lowercase token that keeps otherwise identical events distinct
pub fn nonce() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(char::from)
        .collect::<String>()
        .to_lowercase()
}

/// Current time as an RFC 3339 string with milliseconds
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn tag(parts: &[&str]) -> Result<Tag> {
    Tag::parse(parts).map_err(|e| ScenarioError::InvalidTag {
        tag: parts.iter().map(|part| part.to_string()).collect(),
        reason: e.to_string(),
    })
}

/// Builder for an event carrying a fresh `nonce` tag after `tags`
pub fn unique_event(
    event_kind: u16,
    content: impl Into<String>,
    mut tags: Vec<Tag>,
) -> Result<EventBuilder> {
    tags.push(tag(&["nonce", nonce().as_str()])?);
    Ok(EventBuilder::new(kind(event_kind), content.into(), tags))
}

/// Kind 5 request deleting every event in `targets` by id
pub fn deletion_by_ids<S: AsRef<str>>(targets: &[S]) -> Result<EventBuilder> {
    let tags = targets
        .iter()
        .map(|id| tag(&["e", id.as_ref()]))
        .collect::<Result<Vec<_>>>()?;
    unique_event(kinds::DELETION, "zooid-test delete", tags)
}

/// `<kind>:<pubkey>:<identifier>` coordinate of an addressable event
pub fn address(event_kind: u16, author: &PublicKey, identifier: &str) -> String {
    format!("{}:{}:{}", event_kind, author.to_hex(), identifier)
}

// ----------------------------------------------------------------------------
// Publishing
// ----------------------------------------------------------------------------

/// Publish and require the relay to accept
pub async fn publish_or_fail(
    client: &TestClient,
    event: &Event,
    action: &'static str,
) -> Result<PublishResult> {
    let result = client.publish_event(event).await?;
    if !result.is_success() {
        return Err(ScenarioError::PublishRejected {
            action,
            status: result.status,
            detail: result.detail,
        });
    }
    Ok(result)
}

/// Force the connection through the auth handshake with a throwaway probe
///
/// The probe may be rejected; only a probe the relay never answers is fatal, since
/// nothing after it can run unauthenticated.
pub async fn prime_auth(client: &TestClient) -> Result<()> {
    let probe = client
        .sign(unique_event(
            kinds::AUTH_PROBE,
            format!("zooid-test auth probe {}", timestamp()),
            Vec::new(),
        )?)
        .await?;
    let result = client.publish_event(&probe).await?;
    if result.status == PublishStatus::Timeout {
        return Err(HarnessError::ProtocolTimeout {
            operation: format!("Auth probe for {}", client.actor_name()),
            after: client.timeouts().publish,
        }
        .into());
    }
    debug!(
        "Auth probe for {} answered {:?} {}",
        client.actor_name(),
        result.status,
        result.detail
    );
    sleep(client.timeouts().auth_settle).await;
    Ok(())
}

// ----------------------------------------------------------------------------
// Invites And Joins
// ----------------------------------------------------------------------------

/// Claim from the newest invite addressed to `admin_pubkey` that carries one
///
/// Invites issued to anyone else are never used, even when they are the only ones.
pub fn select_invite_claim(invites: &[RelayEvent], admin_pubkey: &str) -> Option<String> {
    invites
        .iter()
        .filter(|invite| invite.has_tag_value("p", admin_pubkey))
        .filter_map(|invite| {
            invite
                .first_tag_value("claim")
                .filter(|claim| !claim.is_empty())
                .map(|claim| (invite.created_at, claim))
        })
        .max_by_key(|(created_at, _)| *created_at)
        .map(|(_, claim)| claim.to_string())
}

/// Fetch the relay's current invites as `admin` and pick a claim
pub async fn fetch_invite_claim(admin: &TestClient, admin_pubkey: &str) -> Result<String> {
    prime_auth(admin).await?;
    let invites = admin
        .fetch_events(vec![Filter::new().kind(kind(kinds::RELAY_INVITE))])
        .await?;
    select_invite_claim(&invites, admin_pubkey).ok_or(ScenarioError::ClaimNotFound {
        invites: invites.len(),
    })
}

/// How the relay answered a join request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    AlreadyMember,
    StaleClaim,
    Rejected,
}

impl JoinOutcome {
    pub fn is_member(self) -> bool {
        matches!(self, JoinOutcome::Joined | JoinOutcome::AlreadyMember)
    }
}

/// Classify a join acknowledgement
///
/// Relays only signal "already a member" and "bad claim" through free-text detail,
/// so both are case-insensitive substring checks.
pub fn classify_join(result: &PublishResult) -> JoinOutcome {
    if result.is_success() {
        JoinOutcome::Joined
    } else if result.detail_mentions(DUPLICATE_MARKER) {
        JoinOutcome::AlreadyMember
    } else if result.detail_mentions(STALE_CLAIM_MARKER) {
        JoinOutcome::StaleClaim
    } else {
        JoinOutcome::Rejected
    }
}

/// Publish one join request carrying `claim`
pub async fn request_join(member: &TestClient, claim: &str) -> Result<PublishResult> {
    let join = member
        .sign(EventBuilder::new(
            kind(kinds::RELAY_JOIN),
            "",
            vec![tag(&["claim", claim])?],
        ))
        .await?;
    Ok(member.publish_event(&join).await?)
}

/// Join with a fresh claim, re-fetching the claim when it turns out stale
///
/// An "already a member" answer counts as joined. Any other rejection is final.
pub async fn join_with_claim_retry(
    admin: &TestClient,
    member: &TestClient,
    admin_pubkey: &str,
) -> Result<PublishResult> {
    let policy = RetryPolicy::fixed(
        admin.timeouts().claim_attempts,
        admin.timeouts().claim_backoff,
    );

    retry_with_backoff(&policy, ScenarioError::is_retryable_claim, move |attempt| async move {
        let claim = fetch_invite_claim(admin, admin_pubkey).await?;
        let result = request_join(member, &claim).await?;
        let outcome = classify_join(&result);
        debug!(
            "Join attempt {} for {}: {:?} {}",
            attempt,
            member.actor_name(),
            outcome,
            result.detail
        );

        match outcome {
            JoinOutcome::Joined | JoinOutcome::AlreadyMember => Ok(result),
            JoinOutcome::StaleClaim => Err(ScenarioError::StaleClaim {
                detail: result.detail,
            }),
            JoinOutcome::Rejected => Err(ScenarioError::JoinRejected {
                status: result.status,
                detail: if result.detail.is_empty() {
                    "unknown error".to_string()
                } else {
                    result.detail
                },
            }),
        }
    })
    .await
}

// ----------------------------------------------------------------------------
// Membership
// ----------------------------------------------------------------------------

/// Whether any members-list event names `pubkey` in a `member` tag
pub fn lists_member(lists: &[RelayEvent], pubkey: &str) -> bool {
    lists.iter().any(|list| list.has_tag_value("member", pubkey))
}

pub async fn has_member(client: &TestClient, pubkey: &str) -> Result<bool> {
    let lists = client
        .fetch_events(vec![Filter::new().kind(kind(kinds::RELAY_MEMBERS))])
        .await?;
    Ok(lists_member(&lists, pubkey))
}

/// Poll the members list until `pubkey` is present (or absent)
pub async fn wait_for_membership(client: &TestClient, pubkey: &str, present: bool) -> Result<()> {
    let description = if present {
        format!("member {pubkey} added to the relay members list")
    } else {
        format!("member {pubkey} removed from the relay members list")
    };
    poll_until(
        &description,
        PollSettings::from(client.timeouts()),
        move || async move { Ok::<_, ScenarioError>(has_member(client, pubkey).await? == present) },
    )
    .await
}

/// Make `member` a relay member unless the admin already sees it listed
pub async fn ensure_member_joined(
    admin: &TestClient,
    member: &TestClient,
    admin_pubkey: &str,
    member_pubkey: &str,
) -> Result<()> {
    if has_member(admin, member_pubkey).await? {
        debug!("{} is already a member", member.actor_name());
        return Ok(());
    }

    prime_auth(member).await?;
    join_with_claim_retry(admin, member, admin_pubkey).await?;
    wait_for_membership(admin, member_pubkey, true).await?;
    info!("{} joined the relay", member.actor_name());
    Ok(())
}

/// Publish a leave request and require it to be accepted
pub async fn leave_relay(member: &TestClient) -> Result<()> {
    let leave = member
        .sign(EventBuilder::new(kind(kinds::RELAY_LEAVE), "", Vec::new()))
        .await?;
    publish_or_fail(member, &leave, "Leave").await?;
    Ok(())
}

/// Poll until an event of `event_kind` tagging `pubkey` with `p` is queryable
pub async fn wait_for_member_event(client: &TestClient, event_kind: u16, pubkey: &str) -> Result<()> {
    let target = PublicKey::from_hex(pubkey)
        .map_err(|e| ScenarioError::Assertion(format!("invalid member pubkey {pubkey}: {e}")))?;
    let filter = Filter::new().kind(kind(event_kind)).pubkey(target);

    poll_until(
        &format!("kind {event_kind} event tagging {pubkey}"),
        PollSettings::from(client.timeouts()),
        || {
            let filter = filter.clone();
            async move { Ok::<_, ScenarioError>(!client.fetch_events(vec![filter]).await?.is_empty()) }
        },
    )
    .await
}

// ----------------------------------------------------------------------------
// Deletion
// ----------------------------------------------------------------------------

/// Poll until `id` is no longer retrievable, then check it stays gone
pub async fn wait_for_deletion(client: &TestClient, id: &EventId) -> Result<()> {
    poll_until(
        &format!("event {} deleted", id.to_hex()),
        PollSettings::from(client.timeouts()),
        move || async move { Ok::<_, ScenarioError>(client.fetch_event(id).await?.is_none()) },
    )
    .await?;

    if client.fetch_event(id).await?.is_some() {
        return Err(ScenarioError::Assertion(format!(
            "Event {} reappeared after deletion",
            id.to_hex()
        )));
    }
    Ok(())
}

/// Poll until `id` is retrievable
pub async fn wait_for_presence(client: &TestClient, id: &EventId) -> Result<()> {
    poll_until(
        &format!("event {} present", id.to_hex()),
        PollSettings::from(client.timeouts()),
        move || async move { Ok::<_, ScenarioError>(client.fetch_event(id).await?.is_some()) },
    )
    .await
}
