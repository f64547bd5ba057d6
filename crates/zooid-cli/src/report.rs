//! Run artifacts: the run id, the output directory and `report.json`

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;

use crate::error::Result;
use crate::runner::{ScenarioOutcome, ScenarioStatus};

pub const REPORT_FILE: &str = "report.json";
pub const LOG_FILE: &str = "run.log";

/// Sortable UTC run id such as `20240102T030405006Z`
pub fn run_id(at: DateTime<Utc>) -> String {
    at.format("%Y%m%dT%H%M%S%3fZ").to_string()
}

/// Create `<root>/<run_id>` and return its path
pub fn ensure_output_dir(root: &Path, run_id: &str) -> Result<PathBuf> {
    let dir = root.join(run_id);
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Write `data` as 4-space indented JSON followed by a newline
pub fn write_json_file<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    let mut buf = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    data.serialize(&mut serializer)?;
    buf.push(b'\n');
    fs::write(path, buf)?;
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl RunStats {
    pub fn from_outcomes(outcomes: &[ScenarioOutcome]) -> Self {
        let count = |status| outcomes.iter().filter(|o| o.status == status).count();
        Self {
            total: outcomes.len(),
            passed: count(ScenarioStatus::Passed),
            failed: count(ScenarioStatus::Failed),
            skipped: count(ScenarioStatus::Skipped),
        }
    }
}

/// Machine-readable summary of one run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub relay_url: String,
    pub identity: String,
    pub identity2: Option<String>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub stats: RunStats,
    pub scenarios: Vec<ScenarioOutcome>,
}

impl RunReport {
    pub fn has_failures(&self) -> bool {
        self.stats.failed > 0
    }

    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(REPORT_FILE);
        write_json_file(&path, self)?;
        Ok(path)
    }
}
