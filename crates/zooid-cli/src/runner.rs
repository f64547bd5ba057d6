//! In-process run orchestration
//!
//! Scenarios run one after another. Each runs in its own task under the scenario
//! timeout, so a panic or a hang fails that scenario alone. Clients opened through the
//! scenario context are released once the scenario has finished, whatever the outcome.

use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, error, info, warn};
use zooid_core::HarnessConfig;
use zooid_scenarios::{Scenario, ScenarioContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioStatus {
    Passed,
    Failed,
    Skipped,
}

/// Result of one scenario as it appears in the run report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioOutcome {
    pub name: String,
    pub status: ScenarioStatus,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Why a skipped scenario did not run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ScenarioOutcome {
    fn finished(name: &str, started: Instant, result: Result<(), String>) -> Self {
        let (status, error) = match result {
            Ok(()) => (ScenarioStatus::Passed, None),
            Err(message) => (ScenarioStatus::Failed, Some(message)),
        };
        Self {
            name: name.to_string(),
            status,
            duration_ms: started.elapsed().as_millis() as u64,
            error,
            reason: None,
        }
    }

    fn skipped(name: &str, reason: String) -> Self {
        Self {
            name: name.to_string(),
            status: ScenarioStatus::Skipped,
            duration_ms: 0,
            error: None,
            reason: Some(reason),
        }
    }
}

/// Executes catalog scenarios against one resolved configuration
pub struct Runner {
    config: Arc<HarnessConfig>,
}

impl Runner {
    pub fn new(config: Arc<HarnessConfig>) -> Self {
        Self { config }
    }

    pub async fn run_all(&self, scenarios: &[Scenario]) -> Vec<ScenarioOutcome> {
        let mut outcomes = Vec::with_capacity(scenarios.len());
        for scenario in scenarios {
            outcomes.push(self.run_one(scenario).await);
        }
        outcomes
    }

    pub async fn run_one(&self, scenario: &Scenario) -> ScenarioOutcome {
        if let Some(reason) = scenario.skip_reason(&self.config) {
            warn!("SKIP {}: {}", scenario.name, reason);
            return ScenarioOutcome::skipped(scenario.name, reason);
        }

        info!("RUN  {} ({})", scenario.name, scenario.description);
        let ctx = ScenarioContext::new(self.config.clone());
        let started = Instant::now();
        let deadline = self.config.timeouts.scenario;

        let mut task = tokio::spawn(scenario.run(ctx.clone()));
        let result = match tokio::time::timeout(deadline, &mut task).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(e))) => Err(format!("{e:#}")),
            Ok(Err(join_error)) if join_error.is_panic() => Err(format!(
                "Scenario panicked: {}",
                panic_message(join_error.into_panic())
            )),
            Ok(Err(join_error)) => Err(format!("Scenario task ended: {join_error}")),
            Err(_) => {
                task.abort();
                Err(format!(
                    "Scenario timed out after {}ms",
                    deadline.as_millis()
                ))
            }
        };

        ctx.teardown().await;
        debug!("{} released its relay connections", scenario.name);

        let outcome = ScenarioOutcome::finished(scenario.name, started, result);
        match &outcome.error {
            None => info!("PASS {} ({}ms)", outcome.name, outcome.duration_ms),
            Some(message) => error!("FAIL {} ({}ms): {}", outcome.name, outcome.duration_ms, message),
        }
        outcome
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(_) => "non-string panic payload".to_string(),
    }
}
