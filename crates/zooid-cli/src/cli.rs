//! Command-line interface definitions and parsing

use std::path::PathBuf;

use clap::Parser;
use zooid_core::ResolveRequest;

#[derive(Parser, Debug)]
#[command(name = "zooid-test", author, version, about, long_about = None)]
#[command(after_help = "Examples:
  zooid-test --identity relay_admin --relay ws://localhost:3334
  zooid-test --identity relay_admin --identity2 member_1 --relay ws://localhost:3334 -t nip09
  zooid-test --identity relay_admin --relay wss://relay.example -t kind1")]
pub struct Cli {
    /// Identity key to use from the identity file
    #[arg(short, long, env = "ZOOID_TEST_IDENTITY")]
    pub identity: Option<String>,

    /// Secondary identity key to use from the identity file
    #[arg(long, env = "ZOOID_TEST_IDENTITY2")]
    pub identity2: Option<String>,

    /// Relay websocket URL to test
    #[arg(short, long, env = "ZOOID_TEST_RELAY")]
    pub relay: Option<String>,

    /// Identity file path
    #[arg(long, default_value = "identity.json")]
    pub identity_file: PathBuf,

    /// Root directory for run artifacts
    #[arg(long, env = "ZOOID_TEST_OUTPUT_ROOT", default_value = "test-results")]
    pub output_root: PathBuf,

    /// Only run scenarios whose name contains this text (repeatable)
    #[arg(short = 't', long = "filter", value_name = "SUBSTRING")]
    pub filters: Vec<String>,

    /// List scenarios and exit
    #[arg(long)]
    pub list: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Operator selection for the Config Resolver
    pub fn resolve_request(&self) -> ResolveRequest {
        ResolveRequest {
            relay_url: self.relay.clone(),
            identity: self.identity.clone(),
            identity2: self.identity2.clone(),
        }
    }
}
