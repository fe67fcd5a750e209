use crate::runner::{RunOutcome, RunStatus};
use crate::stage::Stage;
use crate::tools::ToolReference;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub lines_echoed: usize,
}

impl StageRecord {
    pub fn from_outcome(stage: Stage, outcome: &RunOutcome) -> Self {
        let exit_code = match outcome.status {
            RunStatus::Exited(code) => code,
            RunStatus::TimedOut | RunStatus::Cancelled => None,
        };
        Self {
            stage,
            elapsed_ms: outcome.elapsed.as_millis() as u64,
            exit_code,
            lines_echoed: outcome.lines_echoed,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecoveryReport {
    pub output: PathBuf,
    pub output_size: u64,
    pub output_sha256: String,
    pub assisted: bool,
    pub frame_rate: f32,
    pub stages: Vec<StageRecord>,
    pub tools: Vec<ToolReference>,
    pub removed: Vec<PathBuf>,
}

impl RecoveryReport {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

pub fn hash_file(path: &Path) -> io::Result<(String, u64)> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let size = io::copy(&mut file, &mut hasher)?;
    let digest = hasher.finalize();
    Ok((format!("{:x}", digest), size))
}

pub fn write_report(path: &Path, report: &RecoveryReport) -> io::Result<()> {
    let json = report.to_json()?;
    fs::write(path, json)
}
