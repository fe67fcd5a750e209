use crate::provision::{BundledPayload, PayloadEncoding};
use evrepair_console::Variants;
use serde::Serialize;
use std::env::consts::EXE_SUFFIX;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Transcoder,
    Recovery,
}

impl ToolKind {
    pub fn display_name(self) -> &'static str {
        match self {
            ToolKind::Transcoder => "ffmpeg",
            ToolKind::Recovery => "recover_mp4",
        }
    }

    pub fn default_file_name(self) -> String {
        format!("{}{EXE_SUFFIX}", self.display_name())
    }

    pub fn default_bundle_file(self) -> (String, PayloadEncoding) {
        match self {
            ToolKind::Transcoder => ("ffmpeg.gz".to_string(), PayloadEncoding::Gzip),
            ToolKind::Recovery => (self.default_file_name(), PayloadEncoding::Plain),
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    FoundOnPath,
    ExtractedFromBundle,
    UserSupplied,
}

impl Provenance {
    /// Only tools this run wrote to disk may be deleted after a successful run.
    pub fn is_disposable(self) -> bool {
        matches!(self, Provenance::ExtractedFromBundle)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolReference {
    pub kind: ToolKind,
    pub name: &'static str,
    pub path: PathBuf,
    pub provenance: Provenance,
}

impl ToolReference {
    pub fn new(kind: ToolKind, path: PathBuf, provenance: Provenance) -> Self {
        Self {
            kind,
            name: kind.display_name(),
            path,
            provenance,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub kind: ToolKind,
    pub file_name: String,
    pub payload: BundledPayload,
}

impl ToolSpec {
    pub fn bundled_in(kind: ToolKind, bundle_dir: &Path) -> Self {
        let (bundle_file, encoding) = kind.default_bundle_file();
        Self {
            kind,
            file_name: kind.default_file_name(),
            payload: BundledPayload::from_file(encoding, bundle_dir.join(bundle_file)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolSource {
    Bundled,
    Manual,
}

impl ToolSource {
    pub fn label(self, kind: ToolKind) -> String {
        match self {
            ToolSource::Bundled => format!("Use the {kind} bundled with this program"),
            ToolSource::Manual => format!("Choose an executable to use as {kind}"),
        }
    }
}

impl Variants for ToolSource {
    const ALL: &'static [Self] = &[ToolSource::Bundled, ToolSource::Manual];
}

#[derive(Debug, Clone)]
pub struct ResolvedTools {
    pub transcoder: ToolReference,
    pub recovery: ToolReference,
}

impl ResolvedTools {
    pub fn all(&self) -> [&ToolReference; 2] {
        [&self.transcoder, &self.recovery]
    }

    pub fn disposable(&self) -> impl Iterator<Item = &ToolReference> {
        self.all()
            .into_iter()
            .filter(|tool| tool.provenance.is_disposable())
    }
}
