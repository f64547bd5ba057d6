//! NIP-01 publish and read-back scenarios

use anyhow::{anyhow, ensure, Context, Result};
use nostr_sdk::{Event, EventBuilder};
use serde_json::Value;
use tracing::info;
use zooid_nostr::{RelayEvent, TestClient};

use crate::context::ScenarioContext;
use crate::kinds::{self, kind};
use crate::steps::{publish_or_fail, timestamp};

/// Fetch `event` back by id and require id, author and content to match
async fn read_back(client: &TestClient, event: &Event) -> Result<RelayEvent> {
    let id = event.id.to_hex();
    let stored = client
        .fetch_event(&event.id)
        .await?
        .ok_or_else(|| anyhow!("Published event {id} was not returned by the relay"))?;

    ensure!(stored.id == id, "Stored id {} does not match {}", stored.id, id);
    ensure!(
        stored.pubkey == event.pubkey.to_hex(),
        "Stored pubkey {} does not match {}",
        stored.pubkey,
        event.pubkey.to_hex()
    );
    ensure!(
        stored.content == event.content,
        "Stored content {:?} does not match {:?}",
        stored.content,
        event.content
    );
    Ok(stored)
}

/// Kind 0 profile built from the identity's metadata round-trips
pub async fn kind0_metadata(ctx: ScenarioContext) -> Result<()> {
    let actor = ctx.admin_actor().clone();
    let client = ctx.admin_client()?;

    let event = client
        .sign(EventBuilder::new(
            kind(kinds::METADATA),
            actor.metadata_json(),
            Vec::new(),
        ))
        .await?;
    ensure!(
        event.pubkey.to_hex() == actor.pubkey,
        "Signed pubkey {} does not match identity {}",
        event.pubkey.to_hex(),
        actor.identity_name
    );

    publish_or_fail(&client, &event, "Publish").await?;
    let stored = read_back(&client, &event).await?;

    let metadata: Value =
        serde_json::from_str(&stored.content).context("Stored metadata is not valid JSON")?;
    ensure!(
        metadata == Value::Object(actor.metadata.clone()),
        "Stored metadata {} does not match identity metadata",
        metadata
    );

    info!("Metadata for {} round-tripped", actor.identity_name);
    Ok(())
}

/// Kind 1 text note round-trips
pub async fn kind1_text_note(ctx: ScenarioContext) -> Result<()> {
    let client = ctx.admin_client()?;
    let content = format!("zooid-test kind1 {}", timestamp());

    let event = client
        .sign(EventBuilder::new(kind(kinds::TEXT_NOTE), content, Vec::new()))
        .await?;
    ensure!(
        event.pubkey.to_hex() == ctx.admin_actor().pubkey,
        "Signed pubkey does not match the admin identity"
    );

    publish_or_fail(&client, &event, "Publish").await?;
    read_back(&client, &event).await?;
    Ok(())
}
