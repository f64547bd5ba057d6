//! Relay information document (NIP-11)

use std::time::Duration;

use reqwest::header::ACCEPT;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::debug;
use url::Url;

use crate::error::RelayInfoError;

const NOSTR_JSON: &str = "application/nostr+json";

/// Subset of the relay information document the harness inspects
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelayInformation {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub pubkey: Option<String>,
    #[serde(default)]
    pub software: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    /// Entries may be numbers or numeric strings; anything else is dropped
    #[serde(default, deserialize_with = "deserialize_nips")]
    pub supported_nips: Vec<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RelayInformation {
    pub fn supports(&self, nip: u32) -> bool {
        self.supported_nips.contains(&nip)
    }
}

fn deserialize_nips<'de, D>(deserializer: D) -> Result<Vec<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Vec<Value>> = Deserialize::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .iter()
        .filter_map(|value| match value {
            Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
        .collect())
}

/// HTTP(S) address of the information document for a websocket relay URL
pub fn relay_info_url(relay_url: &str) -> Result<Url, RelayInfoError> {
    let invalid = |reason: &str| RelayInfoError::InvalidUrl {
        url: relay_url.to_string(),
        reason: reason.to_string(),
    };

    let mut url = Url::parse(relay_url).map_err(|e| invalid(&e.to_string()))?;
    let scheme = match url.scheme() {
        "ws" => "http",
        "wss" => "https",
        "http" | "https" => return Ok(url),
        _ => return Err(invalid("expected a ws or wss URL")),
    };
    url.set_scheme(scheme)
        .map_err(|_| invalid("cannot rewrite scheme"))?;
    Ok(url)
}

/// Fetch and decode the relay's information document
pub async fn fetch_relay_info(
    relay_url: &str,
    timeout: Duration,
) -> Result<RelayInformation, RelayInfoError> {
    let url = relay_info_url(relay_url)?;
    debug!("Fetching relay information from {}", url);

    let response = reqwest::Client::builder()
        .timeout(timeout)
        .build()?
        .get(url)
        .header(ACCEPT, NOSTR_JSON)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(RelayInfoError::Status(status.as_u16()));
    }

    Ok(response.json::<RelayInformation>().await?)
}
