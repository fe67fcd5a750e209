pub mod artifact;
pub mod config;
pub mod locate;
pub mod provision;
pub mod report;
pub mod runner;
pub mod session;
pub mod stage;
pub mod tools;
pub mod wizard;

pub use artifact::{recovered_output_path, Artifact, ArtifactKind};
pub use config::{ConfigError, WizardConfig};
pub use locate::{locate, locate_in};
pub use provision::{extract_compressed, extract_plain, BundledPayload, PayloadEncoding};
pub use report::{write_report, RecoveryReport, StageRecord};
pub use runner::{run_tool, CancelToken, RunError, RunLimits, RunOutcome, RunStatus};
pub use session::SessionConfig;
pub use stage::{Stage, StagePlan};
pub use tools::{Provenance, ToolKind, ToolReference, ToolSpec};
pub use wizard::{
    FailureReason, StageFailure, Wizard, WizardError, WizardOutcome, EXIT_ABORTED, EXIT_FATAL,
    EXIT_STAGE_FAILED, EXIT_SUCCESS,
};
