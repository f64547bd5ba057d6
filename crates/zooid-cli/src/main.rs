//! zooid-test - relay conformance runner

use clap::Parser;
use chrono::Utc;
use tracing::error;

use zooid_cli::{
    app,
    cli::Cli,
    logging::setup_logging,
    report::{ensure_output_dir, run_id, LOG_FILE},
};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.list {
        for scenario in zooid_scenarios::select(&cli.filters) {
            println!("{:<28} {}", scenario.name, scenario.description);
        }
        return;
    }

    let run_id = run_id(Utc::now());
    let output_dir = match ensure_output_dir(&cli.output_root, &run_id) {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("Error: Failed to create output directory: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = setup_logging(cli.verbose, Some(&output_dir.join(LOG_FILE))) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    match app::run(&cli, &run_id, &output_dir).await {
        Ok(report) if report.has_failures() => std::process::exit(1),
        Ok(_) => {}
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}
