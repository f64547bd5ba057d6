//! zooid-test library
//!
//! Argument parsing, logging setup and the in-process run orchestrator behind the
//! `zooid-test` binary.

pub mod app;
pub mod cli;
pub mod error;
pub mod logging;
pub mod report;
pub mod runner;

pub use cli::Cli;
pub use error::{CliError, Result};
pub use report::{RunReport, RunStats};
pub use runner::{Runner, ScenarioOutcome, ScenarioStatus};
