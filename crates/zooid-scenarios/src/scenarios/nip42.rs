//! NIP-42 handshake scenarios
//!
//! These drive a raw connection so they can see the challenge, act before or after
//! authentication, and check the relay's verdict for one exact event or subscription.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use nostr_sdk::{EventBuilder, Filter, Keys};
use tracing::info;
use zooid_nostr::{
    reason, AuthObserver, AuthPolicy, AuthStatus, ClientFrame, Connection, Correlation,
    ObserveError, RelayFrame, Signer,
};

use crate::context::ScenarioContext;
use crate::kinds::{self, kind};

fn is_challenge(frame: &RelayFrame) -> bool {
    matches!(frame, RelayFrame::Auth { .. })
}

/// Give the relay a moment to send its challenge before acting unauthenticated
async fn settle_before_sending(ctx: &ScenarioContext, observer: &mut AuthObserver) -> Result<()> {
    match observer
        .wait_for_frame_within(ctx.timeouts().auth_settle, "auth challenge", is_challenge)
        .await
    {
        Ok(_) | Err(ObserveError::Timeout { .. }) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Connection that authenticates as `keys` and has reached `Ok`
async fn authenticated(
    ctx: &ScenarioContext,
    keys: Keys,
) -> Result<(Arc<Connection>, AuthObserver)> {
    let connection = ctx
        .open_connection(Some(AuthPolicy::eager(Arc::new(keys))))
        .await?;
    let mut observer = AuthObserver::new(&connection, ctx.timeouts().observer);
    observer
        .wait_for_auth(AuthStatus::Ok)
        .await
        .context("Auth failed")?;
    Ok((connection, observer))
}

fn req_one_text_note(subscription_id: &str) -> ClientFrame {
    ClientFrame::Req {
        subscription_id: subscription_id.to_string(),
        filters: vec![Filter::new().kind(kind(kinds::TEXT_NOTE)).limit(1)],
    }
}

/// The relay challenges a fresh connection
pub async fn auth_challenge(ctx: ScenarioContext) -> Result<()> {
    let connection = ctx.open_connection(None).await?;
    let mut observer = AuthObserver::new(&connection, ctx.timeouts().observer);

    let challenge = observer
        .wait_for_frame("AUTH challenge", is_challenge)
        .await?;
    info!("Relay sent {}", challenge.name());
    Ok(())
}

/// EVENT before authenticating is refused with `auth-required:`
pub async fn unauth_event(ctx: ScenarioContext) -> Result<()> {
    let connection = ctx.open_connection(None).await?;
    let mut observer = AuthObserver::new(&connection, ctx.timeouts().observer);
    let event = Signer::sign(
        &Keys::generate(),
        EventBuilder::new(
            kind(kinds::TEXT_NOTE),
            format!("unauth-event-{}", Utc::now().timestamp_millis()),
            Vec::new(),
        ),
    )
    .await?;

    settle_before_sending(&ctx, &mut observer).await?;
    connection.send(ClientFrame::Event(event.clone()))?;

    let reason = observer
        .expect_rejection_prefix(&Correlation::Event(event.id.to_hex()), reason::AUTH_REQUIRED)
        .await?;
    info!("Unauthenticated EVENT refused: {}", reason);
    Ok(())
}

/// REQ before authenticating is closed with `auth-required:`
pub async fn unauth_req(ctx: ScenarioContext) -> Result<()> {
    let connection = ctx.open_connection(None).await?;
    let mut observer = AuthObserver::new(&connection, ctx.timeouts().observer);
    let subscription_id = format!("unauth-req-{}", Utc::now().timestamp_millis());

    settle_before_sending(&ctx, &mut observer).await?;
    connection.send(req_one_text_note(&subscription_id))?;

    let reason = observer
        .expect_rejection_prefix(
            &Correlation::Subscription(subscription_id),
            reason::AUTH_REQUIRED,
        )
        .await?;
    info!("Unauthenticated REQ refused: {}", reason);
    Ok(())
}

/// An authenticated key that is not a member is refused with `restricted:`
pub async fn nonmember_req(ctx: ScenarioContext) -> Result<()> {
    let (connection, mut observer) = authenticated(&ctx, Keys::generate()).await?;
    let subscription_id = format!("nonmember-req-{}", Utc::now().timestamp_millis());

    connection.send(req_one_text_note(&subscription_id))?;

    observer
        .expect_rejection_prefix(&Correlation::Subscription(subscription_id), reason::RESTRICTED)
        .await?;
    Ok(())
}

/// An event signed by another key over an authenticated socket is refused with
/// `restricted:`
pub async fn auth_mismatch_pubkey(ctx: ScenarioContext) -> Result<()> {
    let admin_keys = ctx.admin_actor().keys()?;
    let other_keys = ctx.member_actor()?.keys()?;
    let event = Signer::sign(
        &other_keys,
        EventBuilder::new(
            kind(kinds::TEXT_NOTE),
            format!("mismatch-event-{}", Utc::now().timestamp_millis()),
            Vec::new(),
        ),
    )
    .await?;

    let (connection, mut observer) = authenticated(&ctx, admin_keys).await?;
    connection.send(ClientFrame::Event(event.clone()))?;

    observer
        .expect_rejection_prefix(&Correlation::Event(event.id.to_hex()), reason::RESTRICTED)
        .await?;
    Ok(())
}
