//! Relay conformance scenarios
//!
//! Multi-actor workflows built from the Test Client, the Auth Observer and the
//! convergence poller, plus the sub-protocols they share (auth priming, invite
//! claims, claim-retrying joins, membership and deletion convergence).

pub mod context;
pub mod error;
pub mod kinds;
pub mod scenarios;
pub mod steps;

pub use context::ScenarioContext;
pub use error::ScenarioError;
pub use scenarios::{catalog, select, Actors, Scenario, ScenarioFn};
pub use steps::{classify_join, JoinOutcome};
