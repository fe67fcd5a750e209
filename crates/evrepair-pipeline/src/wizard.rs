use crate::artifact::{header_artifacts, numbered_output_path, stream_artifacts, Artifact};
use crate::config::WizardConfig;
use crate::locate::{absolute_path, locate_in, SEARCH_PATH_VAR};
use crate::provision::ProvisionError;
use crate::report::{hash_file, RecoveryReport, StageRecord};
use crate::runner::{run_tool, CancelToken, RunError, RunLimits, RunStatus};
use crate::session::{parse_frame_rate, SessionConfig};
use crate::stage::{plan_analyze, plan_demux, plan_remux, Stage, StagePlan};
use crate::tools::{Provenance, ResolvedTools, ToolKind, ToolReference, ToolSource};
use evrepair_console::{normalize_path_input, PromptError, Prompter};
use std::env;
use std::ffi::OsString;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONTINUE_PROMPT: &str = "Press any key to continue...";
const EXIT_PROMPT: &str = "Press any key to exit...";
const ASSISTED_PROMPT: &str = "Use assisted mode? In assisted mode you only need to drop the \
                               video files in, everything else is done automatically.";
const TEMP_DIR_PROMPT: &str = "Recovery writes a few temporary files, by default into the \
                               user temp directory. Change that directory?";
const REFERENCE_NOTE: &str = "Recovery also needs an intact video recorded with the same \
                              settings as the damaged one. It is used for format analysis.";
const INVALID_FORMAT: &str = "Invalid format";

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_ABORTED: i32 = -1;
pub const EXIT_STAGE_FAILED: i32 = -2;
pub const EXIT_FATAL: i32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum WizardError {
    #[error("input stream closed")]
    Aborted,
    #[error(transparent)]
    Console(PromptError),
    #[error(transparent)]
    Tool(#[from] RunError),
    #[error(transparent)]
    Provision(#[from] ProvisionError),
    #[error("remove {}: {source}", path.display())]
    Cleanup { path: PathBuf, source: io::Error },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl From<PromptError> for WizardError {
    fn from(err: PromptError) -> Self {
        match err {
            PromptError::Aborted => WizardError::Aborted,
            PromptError::Io(err) => WizardError::Io(err),
            other => WizardError::Console(other),
        }
    }
}

impl WizardError {
    pub fn exit_code(&self) -> i32 {
        match self {
            WizardError::Aborted => EXIT_ABORTED,
            _ => EXIT_FATAL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    MissingArtifacts(Vec<Artifact>),
    TimedOut(Duration),
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct StageFailure {
    pub stage: Stage,
    pub reason: FailureReason,
    pub exit_code: Option<i32>,
    pub stderr_tail: Vec<String>,
    pub leftovers: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub enum WizardOutcome {
    Recovered(RecoveryReport),
    StageFailed(StageFailure),
}

impl WizardOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            WizardOutcome::Recovered(_) => EXIT_SUCCESS,
            WizardOutcome::StageFailed(_) => EXIT_STAGE_FAILED,
        }
    }
}

pub struct Wizard<R, W> {
    prompter: Prompter<R, W>,
    config: WizardConfig,
    work_dir: PathBuf,
    assisted: Option<bool>,
    search_path: Option<OsString>,
    cancel: CancelToken,
}

impl<R: BufRead, W: Write> Wizard<R, W> {
    pub fn new(prompter: Prompter<R, W>, config: WizardConfig, work_dir: PathBuf) -> Self {
        Self {
            prompter,
            config,
            work_dir,
            assisted: None,
            search_path: env::var_os(SEARCH_PATH_VAR),
            cancel: CancelToken::new(),
        }
    }

    /// Fixes the mode up front so the assisted-mode question is skipped.
    pub fn with_mode(mut self, assisted: Option<bool>) -> Self {
        self.assisted = assisted;
        self
    }

    pub fn with_search_path(mut self, search_path: Option<OsString>) -> Self {
        self.search_path = search_path;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn into_prompter(self) -> Prompter<R, W> {
        self.prompter
    }

    pub fn run(&mut self) -> Result<WizardOutcome, WizardError> {
        self.show_banner()?;
        self.prompter.request_keypress(CONTINUE_PROMPT)?;

        let assisted = match self.assisted {
            Some(assisted) => assisted,
            None => self.prompter.request_confirmation(ASSISTED_PROMPT, Some(true))?,
        };
        tracing::info!(assisted, "session mode chosen");

        let temp_dir = self.choose_temp_dir(assisted)?;
        let tools = ResolvedTools {
            transcoder: self.resolve_tool(ToolKind::Transcoder, assisted, &temp_dir)?,
            recovery: self.resolve_tool(ToolKind::Recovery, assisted, &temp_dir)?,
        };
        let session = self.collect_inputs(assisted, temp_dir)?;
        self.execute(&session, &tools)
    }

    fn show_banner(&mut self) -> Result<(), WizardError> {
        self.prompter.say(format!(
            "evrepair {} - recovers damaged screen recordings with ffmpeg and recover_mp4",
            env!("CARGO_PKG_VERSION")
        ))?;
        self.prompter.say("")?;
        Ok(())
    }

    fn choose_temp_dir(&mut self, assisted: bool) -> Result<PathBuf, WizardError> {
        let default = self.config.temp_dir.clone().unwrap_or_else(env::temp_dir);
        let change = !assisted && self.prompter.request_confirmation(TEMP_DIR_PROMPT, Some(false))?;
        let chosen = if change {
            self.prompter.request_directory_path("Enter a directory: ")?
        } else {
            default
        };
        if !chosen.is_dir() {
            fs::create_dir_all(&chosen)?;
            tracing::info!(dir = %chosen.display(), "created temp directory");
        }
        Ok(absolute_path(&chosen)?)
    }

    pub fn resolve_tool(
        &mut self,
        kind: ToolKind,
        assisted: bool,
        temp_dir: &Path,
    ) -> Result<ToolReference, WizardError> {
        let spec = self.config.tool(kind).clone();
        if let Some(path) = locate_in(&spec.file_name, self.search_path.as_deref()) {
            tracing::info!(tool = %kind, path = %path.display(), "found existing tool");
            return Ok(ToolReference::new(kind, path, Provenance::FoundOnPath));
        }

        let source = if assisted {
            ToolSource::Bundled
        } else {
            let prompt = format!("{kind} was not found on this computer. What should be done?");
            self.prompter
                .select_variant(&prompt, 1, |source: &ToolSource| source.label(kind))?
        };

        let reference = match source {
            ToolSource::Bundled => {
                let file_name = Path::new(&spec.file_name)
                    .file_name()
                    .and_then(|name| name.to_str())
                    .unwrap_or(&spec.file_name);
                let path = spec.payload.provision(temp_dir, file_name)?;
                ToolReference::new(kind, path, Provenance::ExtractedFromBundle)
            }
            ToolSource::Manual => {
                let prompt = format!("Path of a working {kind} executable: ");
                let path = self.prompter.request_file_path(&prompt)?;
                ToolReference::new(kind, absolute_path(&path)?, Provenance::UserSupplied)
            }
        };
        tracing::info!(
            tool = %kind,
            path = %reference.path.display(),
            provenance = ?reference.provenance,
            "resolved tool"
        );
        Ok(reference)
    }

    fn collect_inputs(
        &mut self,
        assisted: bool,
        temp_dir: PathBuf,
    ) -> Result<SessionConfig, WizardError> {
        let broken = self.prompter.request_file_path("Path of the damaged video: ")?;
        let frame_rate =
            self.prompter
                .request_typed("Frame rate of the video: ", INVALID_FORMAT, parse_frame_rate)?;
        self.prompter.say(REFERENCE_NOTE)?;
        let reference = self.prompter.request_file_path("Path of the intact video: ")?;

        let session = SessionConfig::new(
            assisted,
            temp_dir,
            absolute_path(&broken)?,
            absolute_path(&reference)?,
            frame_rate,
        );
        let output = self.choose_output(assisted, &session)?;
        Ok(session.with_output(output))
    }

    fn choose_output(
        &mut self,
        assisted: bool,
        session: &SessionConfig,
    ) -> Result<PathBuf, WizardError> {
        let default = session.output.as_path();
        let is_input = same_file(default, &session.broken_input)
            || same_file(default, &session.reference_input);
        if !is_input && !default.exists() {
            return Ok(default.to_path_buf());
        }
        if is_input {
            tracing::warn!(path = %default.display(), "derived output path is an input video");
            if assisted {
                return Ok(first_free_numbered(default));
            }
            self.prompter.say(format!(
                "{} is one of the input videos and cannot be replaced.",
                default.display()
            ))?;
        } else if assisted {
            tracing::info!(path = %default.display(), "existing output will be overwritten");
            return Ok(default.to_path_buf());
        } else {
            let prompt = format!("{} already exists. Overwrite it?", default.display());
            if self.prompter.request_confirmation(&prompt, Some(true))? {
                return Ok(default.to_path_buf());
            }
        }
        let chosen = self.prompter.request_typed(
            "Save the recovered video to: ",
            "Choose a new file inside an existing directory",
            |input| {
                let path = Path::new(normalize_path_input(input));
                is_free_output_path(path).then(|| path.to_path_buf())
            },
        )?;
        Ok(absolute_path(&chosen)?)
    }

    fn execute(
        &mut self,
        session: &SessionConfig,
        tools: &ResolvedTools,
    ) -> Result<WizardOutcome, WizardError> {
        let [video, audio] = stream_artifacts(&session.temp_dir);
        let plans = [
            plan_analyze(&tools.recovery.path, &session.reference_input, &self.work_dir),
            plan_demux(&tools.recovery.path, &session.broken_input, &session.temp_dir),
            plan_remux(
                &tools.transcoder.path,
                session.frame_rate,
                &video.path,
                &audio.path,
                &session.output,
            ),
        ];
        let limits = RunLimits {
            timeout: self.config.stage_timeout,
            cancel: self.cancel.clone(),
        };

        let mut stages = Vec::with_capacity(plans.len());
        for plan in &plans {
            if let Err(failure) = self.run_stage(plan, &limits, &mut stages)? {
                return self.fail(failure, session, tools);
            }
        }
        self.finish(session, tools, stages)
    }

    fn run_stage(
        &mut self,
        plan: &StagePlan,
        limits: &RunLimits,
        records: &mut Vec<StageRecord>,
    ) -> Result<Result<(), StageFailure>, WizardError> {
        self.prompter.say(plan.stage.progress_message())?;
        let stale = plan.clear_stale()?;
        if !stale.is_empty() {
            tracing::info!(stage = %plan.stage, files = ?stale, "removed stale artifacts");
        }
        // The output path was vetted against the inputs when it was chosen.
        let replaced = plan.clear_replaced_output()?;
        if !replaced.is_empty() {
            tracing::info!(stage = %plan.stage, files = ?replaced, "replacing existing output");
        }

        let outcome = run_tool(
            &plan.program,
            &plan.args,
            &self.work_dir,
            self.prompter.output(),
            limits,
        )?;
        records.push(StageRecord::from_outcome(plan.stage, &outcome));

        let (reason, exit_code) = match outcome.status {
            RunStatus::Exited(code) => {
                let missing = plan.missing_artifacts();
                if missing.is_empty() {
                    tracing::info!(
                        stage = %plan.stage,
                        elapsed_ms = outcome.elapsed.as_millis() as u64,
                        "stage passed"
                    );
                    return Ok(Ok(()));
                }
                (FailureReason::MissingArtifacts(missing), code)
            }
            RunStatus::TimedOut => (
                FailureReason::TimedOut(limits.timeout.unwrap_or_default()),
                None,
            ),
            RunStatus::Cancelled => (FailureReason::Cancelled, None),
        };
        Ok(Err(StageFailure {
            stage: plan.stage,
            reason,
            exit_code,
            stderr_tail: outcome.stderr_tail,
            leftovers: Vec::new(),
        }))
    }

    fn fail(
        &mut self,
        mut failure: StageFailure,
        session: &SessionConfig,
        tools: &ResolvedTools,
    ) -> Result<WizardOutcome, WizardError> {
        failure.leftovers = self
            .intermediates(session)
            .into_iter()
            .filter(Artifact::exists)
            .map(|artifact| artifact.path)
            .chain(tools.disposable().map(|tool| tool.path.clone()))
            .collect();
        tracing::warn!(
            stage = %failure.stage,
            reason = ?failure.reason,
            exit_code = ?failure.exit_code,
            stderr = ?failure.stderr_tail,
            leftovers = ?failure.leftovers,
            "stage failed"
        );

        self.prompter.say(failure.stage.failure_message())?;
        match &failure.reason {
            FailureReason::MissingArtifacts(_) => {}
            FailureReason::TimedOut(limit) => self.prompter.say(format!(
                "The tool did not finish within {limit:?} and was stopped."
            ))?,
            FailureReason::Cancelled => self.prompter.say("The tool was stopped.")?,
        }
        if !failure.leftovers.is_empty() {
            self.prompter.say("These files were left on disk:")?;
            for path in &failure.leftovers {
                self.prompter.say(format!("  {}", path.display()))?;
            }
        }
        self.prompter.request_keypress(EXIT_PROMPT)?;
        Ok(WizardOutcome::StageFailed(failure))
    }

    fn finish(
        &mut self,
        session: &SessionConfig,
        tools: &ResolvedTools,
        stages: Vec<StageRecord>,
    ) -> Result<WizardOutcome, WizardError> {
        let mut removed = Vec::new();
        for artifact in self.intermediates(session) {
            let deleted = artifact.remove().map_err(|source| WizardError::Cleanup {
                path: artifact.path.clone(),
                source,
            })?;
            if deleted {
                removed.push(artifact.path);
            }
        }
        for tool in tools.disposable() {
            if remove_if_present(&tool.path)? {
                removed.push(tool.path.clone());
            }
        }
        tracing::info!(files = removed.len(), "removed intermediate files");

        let (output_sha256, output_size) = hash_file(&session.output)?;
        self.prompter
            .say("Recovery finished. The recovered video was saved to:")?;
        self.prompter
            .say(format!("  {}", session.output.display()))?;
        self.prompter.request_keypress(CONTINUE_PROMPT)?;

        Ok(WizardOutcome::Recovered(RecoveryReport {
            output: session.output.clone(),
            output_size,
            output_sha256,
            assisted: session.assisted,
            frame_rate: session.frame_rate,
            stages,
            tools: tools.all().into_iter().cloned().collect(),
            removed,
        }))
    }

    fn intermediates(&self, session: &SessionConfig) -> Vec<Artifact> {
        header_artifacts(&self.work_dir)
            .into_iter()
            .chain(stream_artifacts(&session.temp_dir))
            .collect()
    }
}

fn remove_if_present(path: &Path) -> Result<bool, WizardError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(WizardError::Cleanup {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Paths naming one file through different spellings (`..`, symlinks) match.
fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn first_free_numbered(output: &Path) -> PathBuf {
    let mut n = 1;
    loop {
        let candidate = numbered_output_path(output, n);
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

fn is_free_output_path(path: &Path) -> bool {
    if path.as_os_str().is_empty() || path.exists() {
        return false;
    }
    match path.parent() {
        Some(dir) if dir.as_os_str().is_empty() => true,
        Some(dir) => dir.is_dir(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_errors_map_to_exit_codes() {
        assert_eq!(WizardError::from(PromptError::Aborted).exit_code(), EXIT_ABORTED);
        let io_err = PromptError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "gone"));
        assert!(matches!(WizardError::from(io_err), WizardError::Io(_)));
        assert_eq!(
            WizardError::from(PromptError::NoChoices).exit_code(),
            EXIT_FATAL
        );
    }

    #[test]
    fn free_output_path_needs_existing_parent() {
        let temp = tempfile::tempdir().unwrap();
        let taken = temp.path().join("taken.mp4");
        fs::write(&taken, b"x").unwrap();

        assert!(is_free_output_path(&temp.path().join("new.mp4")));
        assert!(!is_free_output_path(&taken));
        assert!(!is_free_output_path(&temp.path().join("missing/new.mp4")));
        assert!(!is_free_output_path(Path::new("")));
        assert!(is_free_output_path(Path::new("surely-not-present-evrepair.mp4")));
    }

    #[test]
    fn same_file_sees_through_parent_components() {
        let temp = tempfile::tempdir().unwrap();
        let video = temp.path().join("a.mp4");
        fs::write(&video, b"x").unwrap();
        fs::create_dir(temp.path().join("sub")).unwrap();
        let detour = temp.path().join("sub").join("..").join("a.mp4");

        assert!(same_file(&video, &video));
        assert!(same_file(&detour, &video));
        assert!(!same_file(&temp.path().join("b.mp4"), &video));
    }

    #[test]
    fn numbered_fallback_skips_taken_names() {
        let temp = tempfile::tempdir().unwrap();
        let output = temp.path().join("a_recovered.mp4");
        fs::write(&output, b"x").unwrap();
        fs::write(temp.path().join("a_recovered_1.mp4"), b"x").unwrap();
        assert_eq!(
            first_free_numbered(&output),
            temp.path().join("a_recovered_2.mp4")
        );
    }

    #[test]
    fn removing_absent_tool_is_fine() {
        let temp = tempfile::tempdir().unwrap();
        assert!(!remove_if_present(&temp.path().join("ffmpeg")).unwrap());
    }
}
