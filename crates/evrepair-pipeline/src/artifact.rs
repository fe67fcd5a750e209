use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const VIDEO_HEADER: &str = "video.hdr";
pub const AUDIO_HEADER: &str = "audio.hdr";
pub const VIDEO_STREAM: &str = "recovered.h264";
pub const AUDIO_STREAM: &str = "recovered.aac";
pub const OUTPUT_SUFFIX: &str = "_recovered";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    HeaderVideo,
    HeaderAudio,
    StreamVideo,
    StreamAudio,
    FinalOutput,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub path: PathBuf,
}

impl Artifact {
    pub fn new(kind: ArtifactKind, path: PathBuf) -> Self {
        Self { kind, path }
    }

    pub fn is_intermediate(&self) -> bool {
        !matches!(self.kind, ArtifactKind::FinalOutput)
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Removes the artifact, returning whether a file was actually deleted.
    pub fn remove(&self) -> io::Result<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err),
        }
    }
}

pub fn header_artifacts(work_dir: &Path) -> [Artifact; 2] {
    [
        Artifact::new(ArtifactKind::HeaderVideo, work_dir.join(VIDEO_HEADER)),
        Artifact::new(ArtifactKind::HeaderAudio, work_dir.join(AUDIO_HEADER)),
    ]
}

pub fn stream_artifacts(temp_dir: &Path) -> [Artifact; 2] {
    [
        Artifact::new(ArtifactKind::StreamVideo, temp_dir.join(VIDEO_STREAM)),
        Artifact::new(ArtifactKind::StreamAudio, temp_dir.join(AUDIO_STREAM)),
    ]
}

pub fn recovered_output_path(input: &Path) -> PathBuf {
    let mut name = input
        .file_stem()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(OUTPUT_SUFFIX);
    if let Some(ext) = input.extension() {
        name.push(".");
        name.push(ext);
    }
    match input.parent() {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}

/// `clip_recovered.mp4` with `n = 2` becomes `clip_recovered_2.mp4`.
pub fn numbered_output_path(output: &Path, n: u32) -> PathBuf {
    let mut name = output
        .file_stem()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(format!("_{n}"));
    if let Some(ext) = output.extension() {
        name.push(".");
        name.push(ext);
    }
    output.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_path_inserts_suffix_before_extension() {
        assert_eq!(
            recovered_output_path(Path::new("/a/b/clip.mp4")),
            PathBuf::from("/a/b/clip_recovered.mp4")
        );
    }

    #[test]
    fn output_path_keeps_only_last_extension() {
        assert_eq!(
            recovered_output_path(Path::new("/a/clip.part1.mp4")),
            PathBuf::from("/a/clip.part1_recovered.mp4")
        );
    }

    #[test]
    fn output_path_without_extension_or_directory() {
        assert_eq!(
            recovered_output_path(Path::new("clip")),
            PathBuf::from("clip_recovered")
        );
        assert_eq!(
            recovered_output_path(Path::new("dir/clip.mov")),
            PathBuf::from("dir/clip_recovered.mov")
        );
    }

    #[test]
    fn numbered_output_keeps_directory_and_extension() {
        assert_eq!(
            numbered_output_path(Path::new("/a/clip_recovered.mp4"), 2),
            PathBuf::from("/a/clip_recovered_2.mp4")
        );
        assert_eq!(
            numbered_output_path(Path::new("clip_recovered"), 1),
            PathBuf::from("clip_recovered_1")
        );
    }

    #[test]
    fn only_final_output_is_kept() {
        let output = Artifact::new(ArtifactKind::FinalOutput, PathBuf::from("out.mp4"));
        assert!(!output.is_intermediate());
        for artifact in header_artifacts(Path::new("/w")) {
            assert!(artifact.is_intermediate());
        }
        for artifact in stream_artifacts(Path::new("/t")) {
            assert!(artifact.is_intermediate());
        }
    }

    #[test]
    fn removing_absent_artifact_is_not_an_error() {
        let temp = tempfile::tempdir().unwrap();
        let artifact = Artifact::new(ArtifactKind::HeaderVideo, temp.path().join(VIDEO_HEADER));
        assert!(!artifact.remove().unwrap());
        fs::write(&artifact.path, b"hdr").unwrap();
        assert!(artifact.exists());
        assert!(artifact.remove().unwrap());
        assert!(!artifact.exists());
    }
}
