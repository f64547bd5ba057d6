//! NIP-11 relay information scenario

use anyhow::{ensure, Result};
use tracing::info;
use zooid_nostr::fetch_relay_info;

use crate::context::ScenarioContext;

/// NIPs every relay under test must advertise
pub const REQUIRED_NIPS: [u32; 2] = [11, 42];

pub async fn relay_info(ctx: ScenarioContext) -> Result<()> {
    let info = fetch_relay_info(ctx.relay_url(), ctx.timeouts().relay_info).await?;

    for nip in REQUIRED_NIPS {
        ensure!(
            info.supports(nip),
            "supported_nips {:?} does not include {}",
            info.supported_nips,
            nip
        );
    }

    info!(
        "Relay {} advertises NIPs {:?}",
        info.name.as_deref().unwrap_or("<unnamed>"),
        info.supported_nips
    );
    Ok(())
}
