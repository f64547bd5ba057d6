//! One complete run: resolve the configuration, run the selected scenarios, report

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{info, warn};
use zooid_core::{HarnessConfig, IdentityStore};

use crate::cli::Cli;
use crate::error::{CliError, Result};
use crate::report::{RunReport, RunStats};
use crate::runner::Runner;

/// Resolve the configuration from `cli`
///
/// Identity and configuration problems surface here, before any scenario starts.
pub fn load_configuration(cli: &Cli) -> Result<HarnessConfig> {
    info!("Loading identities from: {}", cli.identity_file.display());
    let store = IdentityStore::load(&cli.identity_file)?;
    let config = HarnessConfig::resolve(&store, &cli.resolve_request())?;
    info!(
        "Relay {} as {}{}",
        config.relay_url,
        config.admin.identity_name,
        config
            .member
            .as_ref()
            .map(|member| format!(" with member {}", member.identity_name))
            .unwrap_or_default()
    );
    Ok(config)
}

/// Run every selected scenario and write `report.json` into `output_dir`
pub async fn run(cli: &Cli, run_id: &str, output_dir: &Path) -> Result<RunReport> {
    let config = Arc::new(load_configuration(cli)?);

    let scenarios = zooid_scenarios::select(&cli.filters);
    if scenarios.is_empty() {
        return Err(CliError::NoScenarios {
            filters: cli.filters.clone(),
        });
    }

    let started_at = Utc::now();
    let started = Instant::now();
    let outcomes = Runner::new(config.clone()).run_all(&scenarios).await;

    let report = RunReport {
        run_id: run_id.to_string(),
        relay_url: config.relay_url.clone(),
        identity: config.admin.identity_name.clone(),
        identity2: config.member.as_ref().map(|member| member.identity_name.clone()),
        started_at,
        duration_ms: started.elapsed().as_millis() as u64,
        stats: RunStats::from_outcomes(&outcomes),
        scenarios: outcomes,
    };

    let path = report.write_to(output_dir)?;
    let stats = report.stats;
    if report.has_failures() {
        warn!(
            "{} passed, {} failed, {} skipped of {}",
            stats.passed, stats.failed, stats.skipped, stats.total
        );
    } else {
        info!(
            "{} passed, {} skipped of {}",
            stats.passed, stats.skipped, stats.total
        );
    }
    info!("Report written to {}", path.display());
    Ok(report)
}
