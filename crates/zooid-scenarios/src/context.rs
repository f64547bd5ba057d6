//! Scenario context
//!
//! Hands scenarios the resolved run configuration and creates their clients and raw
//! connections. Everything created here is tracked so the runner can close it exactly
//! once when the scenario ends, whether it passed, failed, timed out or panicked.

use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use tracing::debug;
use zooid_core::{ActorConfig, HarnessConfig, Timeouts};
use zooid_nostr::{AuthPolicy, Connection, TestClient};

#[derive(Default)]
struct Resources {
    clients: Vec<Arc<TestClient>>,
    connections: Vec<Arc<Connection>>,
    torn_down: bool,
}

/// Per-scenario handle on the run configuration and the resources it created
#[derive(Clone)]
pub struct ScenarioContext {
    config: Arc<HarnessConfig>,
    resources: Arc<Mutex<Resources>>,
}

impl ScenarioContext {
    pub fn new(config: Arc<HarnessConfig>) -> Self {
        Self {
            config,
            resources: Arc::new(Mutex::new(Resources::default())),
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn relay_url(&self) -> &str {
        &self.config.relay_url
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.config.timeouts
    }

    pub fn admin_actor(&self) -> &ActorConfig {
        &self.config.admin
    }

    /// The secondary actor; scenarios that need it are skipped when it is absent
    pub fn member_actor(&self) -> Result<&ActorConfig> {
        self.config
            .member
            .as_ref()
            .ok_or_else(|| anyhow!("Secondary identity missing. Provide --identity2 <name>."))
    }

    /// A client for `actor`, closed at teardown
    pub fn client(&self, actor: &ActorConfig) -> Result<Arc<TestClient>> {
        let client = Arc::new(TestClient::new(actor, self.config.timeouts)?);
        self.track(|resources| resources.clients.push(client.clone()))?;
        Ok(client)
    }

    pub fn admin_client(&self) -> Result<Arc<TestClient>> {
        self.client(self.admin_actor())
    }

    pub fn member_client(&self) -> Result<Arc<TestClient>> {
        let actor = self.member_actor()?.clone();
        self.client(&actor)
    }

    /// A fresh actor the relay has never seen, with its client
    pub fn ephemeral_client(&self, name: &str) -> Result<(ActorConfig, Arc<TestClient>)> {
        let actor = ActorConfig::ephemeral(self.relay_url(), name)?;
        let client = self.client(&actor)?;
        Ok((actor, client))
    }

    /// A raw connection; without a policy it never answers auth challenges
    pub async fn open_connection(&self, policy: Option<AuthPolicy>) -> Result<Arc<Connection>> {
        let connection = Arc::new(
            Connection::open(self.relay_url(), policy, self.config.timeouts.connect).await?,
        );
        if let Err(e) = self.track(|resources| resources.connections.push(connection.clone())) {
            connection.close().await;
            return Err(e);
        }
        Ok(connection)
    }

    fn track(&self, register: impl FnOnce(&mut Resources)) -> Result<()> {
        let mut resources = self
            .resources
            .lock()
            .map_err(|_| anyhow!("scenario resources poisoned"))?;
        if resources.torn_down {
            return Err(anyhow!("scenario context already torn down"));
        }
        register(&mut resources);
        Ok(())
    }

    /// Close every client and connection created through this context
    ///
    /// Only the first call does any work.
    pub async fn teardown(&self) {
        let (clients, connections) = {
            let mut resources = match self.resources.lock() {
                Ok(resources) => resources,
                Err(poisoned) => poisoned.into_inner(),
            };
            if resources.torn_down {
                return;
            }
            resources.torn_down = true;
            (
                std::mem::take(&mut resources.clients),
                std::mem::take(&mut resources.connections),
            )
        };

        debug!(
            "Tearing down {} clients and {} connections",
            clients.len(),
            connections.len()
        );
        for client in clients {
            client.close().await;
        }
        for connection in connections {
            connection.close().await;
        }
    }

    /// Number of clients and connections still awaiting teardown
    pub fn open_resources(&self) -> usize {
        match self.resources.lock() {
            Ok(resources) => resources.clients.len() + resources.connections.len(),
            Err(poisoned) => {
                let resources = poisoned.into_inner();
                resources.clients.len() + resources.connections.len()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(with_member: bool) -> ScenarioContext {
        let relay_url = "ws://127.0.0.1:9".to_string();
        let admin = ActorConfig::ephemeral(relay_url.clone(), "relay_admin").unwrap();
        let member = with_member.then(|| ActorConfig::ephemeral(relay_url.clone(), "member_1").unwrap());
        ScenarioContext::new(Arc::new(HarnessConfig {
            relay_url,
            admin,
            member,
            timeouts: Timeouts::default(),
        }))
    }

    #[test]
    fn test_missing_member_is_an_error() {
        let ctx = context(false);
        let err = ctx.member_client().err().unwrap();
        assert!(err.to_string().contains("--identity2"));
    }

    #[tokio::test]
    async fn test_teardown_closes_tracked_clients_once() {
        let ctx = context(true);
        let admin = ctx.admin_client().unwrap();
        let _member = ctx.member_client().unwrap();
        let (actor, _ephemeral) = ctx.ephemeral_client("ephemeral_member").unwrap();
        assert_eq!(actor.identity_name, "ephemeral_member");
        assert_eq!(ctx.open_resources(), 3);

        ctx.teardown().await;
        ctx.teardown().await;
        assert_eq!(ctx.open_resources(), 0);

        // Clients refuse work after teardown
        assert!(admin.fetch_events(Vec::new()).await.is_err());
        assert!(ctx.admin_client().is_err());
    }
}
