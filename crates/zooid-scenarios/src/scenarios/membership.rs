//! NIP-43 relay membership scenarios: invites, joins, the members list and leaving

use anyhow::{ensure, Result};
use nostr_sdk::Filter;
use tracing::info;

use crate::context::ScenarioContext;
use crate::kinds::{self, kind};
use crate::steps::{
    classify_join, ensure_member_joined, fetch_invite_claim, has_member, join_with_claim_retry,
    leave_relay, prime_auth, request_join, select_invite_claim, wait_for_member_event,
    wait_for_membership,
};

/// The relay hands admins an invite carrying a claim
pub async fn invite_claim(ctx: ScenarioContext) -> Result<()> {
    let client = ctx.admin_client()?;
    let invites = client
        .fetch_events(vec![Filter::new().kind(kind(kinds::RELAY_INVITE))])
        .await?;

    let claim = select_invite_claim(&invites, &ctx.admin_actor().pubkey);
    ensure!(
        claim.is_some(),
        "No invite with a claim tag among {} invites",
        invites.len()
    );
    Ok(())
}

/// A join with the admin's current claim is accepted, or reported as a duplicate
pub async fn join_valid_claim(ctx: ScenarioContext) -> Result<()> {
    let admin = ctx.admin_client()?;
    let member = ctx.member_client()?;

    prime_auth(&member).await?;
    let result = join_with_claim_retry(&admin, &member, &ctx.admin_actor().pubkey).await?;
    info!(
        "Join for {}: {:?}",
        member.actor_name(),
        classify_join(&result)
    );
    Ok(())
}

/// Joining again while already a member succeeds or is reported as a duplicate
pub async fn join_existing_member(ctx: ScenarioContext) -> Result<()> {
    let admin = ctx.admin_client()?;
    let member = ctx.member_client()?;
    let admin_pubkey = ctx.admin_actor().pubkey.clone();
    let member_pubkey = ctx.member_actor()?.pubkey.clone();

    ensure_member_joined(&admin, &member, &admin_pubkey, &member_pubkey).await?;

    prime_auth(&member).await?;
    let claim = fetch_invite_claim(&admin, &admin_pubkey).await?;
    let result = request_join(&member, &claim).await?;
    ensure!(
        classify_join(&result).is_member(),
        "Second join failed ({:?}): {}",
        result.status,
        result.detail
    );
    Ok(())
}

/// A joined member appears in the relay members list
pub async fn members_list(ctx: ScenarioContext) -> Result<()> {
    let admin = ctx.admin_client()?;
    let member = ctx.member_client()?;
    let member_pubkey = ctx.member_actor()?.pubkey.clone();

    ensure_member_joined(&admin, &member, &ctx.admin_actor().pubkey, &member_pubkey).await?;
    ensure!(
        has_member(&admin, &member_pubkey).await?,
        "{} is missing from the relay members list",
        member_pubkey
    );
    Ok(())
}

/// Leaving removes a freshly joined member from the members list
pub async fn leave_removes_member(ctx: ScenarioContext) -> Result<()> {
    let admin = ctx.admin_client()?;
    let (actor, member) = ctx.ephemeral_client("ephemeral_member")?;

    ensure_member_joined(&admin, &member, &ctx.admin_actor().pubkey, &actor.pubkey).await?;
    leave_relay(&member).await?;
    wait_for_membership(&admin, &actor.pubkey, false).await?;
    Ok(())
}

/// Joining and leaving emit add and remove member events queryable by `#p`
pub async fn member_events(ctx: ScenarioContext) -> Result<()> {
    let admin = ctx.admin_client()?;
    let (actor, member) = ctx.ephemeral_client("ephemeral_member_events")?;

    prime_auth(&member).await?;
    join_with_claim_retry(&admin, &member, &ctx.admin_actor().pubkey).await?;
    wait_for_membership(&admin, &actor.pubkey, true).await?;
    wait_for_member_event(&admin, kinds::RELAY_ADD_MEMBER, &actor.pubkey).await?;

    leave_relay(&member).await?;
    wait_for_member_event(&admin, kinds::RELAY_REMOVE_MEMBER, &actor.pubkey).await?;
    Ok(())
}
