use crate::artifact::{header_artifacts, stream_artifacts, Artifact, ArtifactKind};
use serde::Serialize;
use std::ffi::OsString;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

pub const ANALYZE_FLAG: &str = "--analyze";
pub const AUDIO_BITSTREAM_FILTER: &str = "aac_adtstoasc";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Analyze,
    Demux,
    Remux,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Analyze => "analyze",
            Stage::Demux => "demux",
            Stage::Remux => "remux",
        }
    }

    pub fn progress_message(self) -> &'static str {
        match self {
            Stage::Analyze => "Analyzing the format of the intact video...",
            Stage::Demux => "Separating the audio and video streams from the damaged video...",
            Stage::Remux => "Joining the recovered streams back into a video...",
        }
    }

    pub fn failure_message(self) -> &'static str {
        match self {
            Stage::Analyze => "Format analysis failed.",
            Stage::Demux => "Stream separation failed.",
            Stage::Remux => "Joining the streams failed.",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct StagePlan {
    pub stage: Stage,
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub expected: Vec<Artifact>,
}

impl StagePlan {
    pub fn missing_artifacts(&self) -> Vec<Artifact> {
        self.expected
            .iter()
            .filter(|artifact| !artifact.exists())
            .cloned()
            .collect()
    }

    pub fn present_artifacts(&self) -> Vec<PathBuf> {
        self.expected
            .iter()
            .filter(|artifact| artifact.exists())
            .map(|artifact| artifact.path.clone())
            .collect()
    }

    // Leftovers from an earlier run must not satisfy this stage's gate.
    pub fn clear_stale(&self) -> io::Result<Vec<PathBuf>> {
        self.remove_where(Artifact::is_intermediate)
    }

    /// Removes a final output the operator already agreed to replace.
    pub fn clear_replaced_output(&self) -> io::Result<Vec<PathBuf>> {
        self.remove_where(|artifact| !artifact.is_intermediate())
    }

    fn remove_where<F>(&self, select: F) -> io::Result<Vec<PathBuf>>
    where
        F: Fn(&Artifact) -> bool,
    {
        let mut removed = Vec::new();
        for artifact in self.expected.iter().filter(|artifact| select(*artifact)) {
            if artifact.remove()? {
                removed.push(artifact.path.clone());
            }
        }
        Ok(removed)
    }
}

pub fn plan_analyze(recovery_tool: &Path, reference_input: &Path, work_dir: &Path) -> StagePlan {
    StagePlan {
        stage: Stage::Analyze,
        program: recovery_tool.to_path_buf(),
        args: vec![reference_input.into(), ANALYZE_FLAG.into()],
        expected: header_artifacts(work_dir).to_vec(),
    }
}

pub fn plan_demux(recovery_tool: &Path, broken_input: &Path, temp_dir: &Path) -> StagePlan {
    let expected = stream_artifacts(temp_dir).to_vec();
    let mut args: Vec<OsString> = vec![broken_input.into()];
    args.extend(expected.iter().map(|artifact| artifact.path.clone().into_os_string()));
    StagePlan {
        stage: Stage::Demux,
        program: recovery_tool.to_path_buf(),
        args,
        expected,
    }
}

pub fn plan_remux(
    transcoder: &Path,
    frame_rate: f32,
    video_stream: &Path,
    audio_stream: &Path,
    output: &Path,
) -> StagePlan {
    let args: Vec<OsString> = vec![
        "-r".into(),
        frame_rate.to_string().into(),
        "-i".into(),
        video_stream.into(),
        "-i".into(),
        audio_stream.into(),
        "-bsf:a".into(),
        AUDIO_BITSTREAM_FILTER.into(),
        "-c:v".into(),
        "copy".into(),
        "-c:a".into(),
        "copy".into(),
        output.into(),
    ];
    StagePlan {
        stage: Stage::Remux,
        program: transcoder.to_path_buf(),
        args,
        expected: vec![Artifact::new(ArtifactKind::FinalOutput, output.to_path_buf())],
    }
}
