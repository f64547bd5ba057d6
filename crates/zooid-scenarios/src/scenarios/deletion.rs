//! NIP-09 deletion scenarios
//!
//! Each target of a deletion request is checked on its own, so a relay that deletes
//! the valid targets of a partially invalid request passes, while a relay that applies
//! part of an unauthorized mixed-author request fails.

use std::sync::Arc;

use anyhow::{ensure, Result};
use chrono::Utc;
use nostr_sdk::Event;
use zooid_nostr::{reason, TestClient};

use crate::context::ScenarioContext;
use crate::kinds;
use crate::steps::{
    address, deletion_by_ids, ensure_member_joined, publish_or_fail, tag, timestamp,
    unique_event, wait_for_deletion, wait_for_presence,
};

/// Admin and member clients with the member already joined
async fn joined_actors(ctx: &ScenarioContext) -> Result<(Arc<TestClient>, Arc<TestClient>)> {
    let admin = ctx.admin_client()?;
    let member = ctx.member_client()?;
    ensure_member_joined(
        &admin,
        &member,
        &ctx.admin_actor().pubkey,
        &ctx.member_actor()?.pubkey,
    )
    .await?;
    Ok((admin, member))
}

async fn publish_note(client: &TestClient, content: String) -> Result<Event> {
    let event = client
        .sign(unique_event(kinds::TEXT_NOTE, content, Vec::new())?)
        .await?;
    publish_or_fail(client, &event, "Publish").await?;
    Ok(event)
}

async fn delete(client: &TestClient, targets: &[String]) -> Result<()> {
    let deletion = client.sign(deletion_by_ids(targets)?).await?;
    publish_or_fail(client, &deletion, "Deletion").await?;
    Ok(())
}

/// A single `e`-tagged target is deleted
pub async fn delete_single(ctx: ScenarioContext) -> Result<()> {
    let (_, member) = joined_actors(&ctx).await?;

    let original = publish_note(&member, format!("zooid-test delete {}", timestamp())).await?;
    let fetched = member.fetch_event(&original.id).await?;
    ensure!(
        fetched.map(|event| event.id) == Some(original.id.to_hex()),
        "Published event {} was not returned before deletion",
        original.id.to_hex()
    );

    delete(&member, &[original.id.to_hex()]).await?;
    wait_for_deletion(&member, &original.id).await?;
    Ok(())
}

/// Every target of a multi-target request is deleted
pub async fn delete_multiple(ctx: ScenarioContext) -> Result<()> {
    let (_, member) = joined_actors(&ctx).await?;
    let millis = Utc::now().timestamp_millis();

    let first = publish_note(&member, format!("zooid-test delete multi A {millis}")).await?;
    let second = publish_note(&member, format!("zooid-test delete multi B {millis}")).await?;

    delete(&member, &[first.id.to_hex(), second.id.to_hex()]).await?;
    wait_for_deletion(&member, &first.id).await?;
    wait_for_deletion(&member, &second.id).await?;
    Ok(())
}

/// A target the relay has never seen does not block the valid one
pub async fn delete_partial(ctx: ScenarioContext) -> Result<()> {
    let (_, member) = joined_actors(&ctx).await?;

    let event = publish_note(
        &member,
        format!("zooid-test delete missing tag {}", Utc::now().timestamp_millis()),
    )
    .await?;
    let missing = format!("{:064x}", rand::random::<u128>());

    delete(&member, &[missing, event.id.to_hex()]).await?;
    wait_for_deletion(&member, &event.id).await?;
    Ok(())
}

/// An addressable event is deleted through its `a` coordinate
pub async fn delete_addressable(ctx: ScenarioContext) -> Result<()> {
    let (_, member) = joined_actors(&ctx).await?;
    let millis = Utc::now().timestamp_millis();
    let identifier = format!("zooid-test-addr-{millis}");

    let event = member
        .sign(unique_event(
            kinds::ADDRESSABLE_LIST,
            format!("zooid-test addressable {millis}"),
            vec![tag(&["d", identifier.as_str()])?],
        )?)
        .await?;
    publish_or_fail(&member, &event, "Publish").await?;

    let coordinate = address(kinds::ADDRESSABLE_LIST, &event.pubkey, &identifier);
    let deletion = member
        .sign(unique_event(
            kinds::DELETION,
            "",
            vec![tag(&["a", coordinate.as_str()])?],
        )?)
        .await?;
    publish_or_fail(&member, &deletion, "Deletion").await?;

    wait_for_deletion(&member, &event.id).await?;
    Ok(())
}

/// A request naming another author's event is rejected whole and deletes nothing
pub async fn delete_mixed_authors(ctx: ScenarioContext) -> Result<()> {
    let (admin, member) = joined_actors(&ctx).await?;
    let millis = Utc::now().timestamp_millis();

    let member_event = publish_note(&member, format!("zooid-test member event {millis}")).await?;
    let admin_event = publish_note(&admin, format!("zooid-test admin event {millis}")).await?;

    let deletion = member
        .sign(deletion_by_ids(&[
            member_event.id.to_hex(),
            admin_event.id.to_hex(),
        ])?)
        .await?;
    let result = member.publish_event(&deletion).await?;

    ensure!(
        result.is_failure(),
        "Mixed-author deletion was not rejected ({:?}): {}",
        result.status,
        result.detail
    );
    ensure!(
        result.detail.contains(reason::BLOCKED),
        "Mixed-author deletion rejected without a blocked reason: {}",
        result.detail
    );

    wait_for_presence(&member, &member_event.id).await?;
    wait_for_presence(&member, &admin_event.id).await?;
    Ok(())
}
