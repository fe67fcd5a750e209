use crate::provision::{BundledPayload, PayloadEncoding, PayloadSource};
use crate::tools::{ToolKind, ToolSpec};
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_BUNDLE_DIR: &str = "bundle";
pub const DEFAULT_STAGE_TIMEOUT_SECS: u64 = 1800;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("read config {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawWizardConfig {
    bundle_dir: Option<PathBuf>,
    temp_dir: Option<PathBuf>,
    stage_timeout_secs: Option<u64>,
    #[serde(default)]
    tools: RawTools,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTools {
    transcoder: Option<RawTool>,
    recovery: Option<RawTool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTool {
    file_name: Option<String>,
    bundle: Option<PathBuf>,
    encoding: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WizardConfig {
    pub bundle_dir: PathBuf,
    pub temp_dir: Option<PathBuf>,
    pub stage_timeout: Option<Duration>,
    pub transcoder: ToolSpec,
    pub recovery: ToolSpec,
}

impl WizardConfig {
    /// Defaults with the bundled payloads expected under `base_dir/bundle`.
    pub fn with_base(base_dir: &Path) -> Self {
        let bundle_dir = base_dir.join(DEFAULT_BUNDLE_DIR);
        Self {
            transcoder: ToolSpec::bundled_in(ToolKind::Transcoder, &bundle_dir),
            recovery: ToolSpec::bundled_in(ToolKind::Recovery, &bundle_dir),
            bundle_dir,
            temp_dir: None,
            stage_timeout: timeout_from_secs(DEFAULT_STAGE_TIMEOUT_SECS),
        }
    }

    /// Parses a config file body. Relative paths are resolved against `base_dir`.
    pub fn parse(toml_src: &str, base_dir: &Path) -> Result<Self, ConfigError> {
        let raw: RawWizardConfig = toml::from_str(toml_src)?;
        let bundle_dir = match raw.bundle_dir {
            Some(dir) => base_dir.join(dir),
            None => base_dir.join(DEFAULT_BUNDLE_DIR),
        };
        let temp_dir = raw.temp_dir.map(|dir| base_dir.join(dir));
        let stage_timeout =
            timeout_from_secs(raw.stage_timeout_secs.unwrap_or(DEFAULT_STAGE_TIMEOUT_SECS));
        let transcoder = tool_spec(ToolKind::Transcoder, raw.tools.transcoder, &bundle_dir)?;
        let recovery = tool_spec(ToolKind::Recovery, raw.tools.recovery, &bundle_dir)?;
        Ok(WizardConfig {
            bundle_dir,
            temp_dir,
            stage_timeout,
            transcoder,
            recovery,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let src = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::parse(&src, base_dir)
    }

    /// Points both default payloads at another bundle directory. Tools whose
    /// bundle was configured explicitly keep their file.
    pub fn rebase_bundle_dir(&mut self, bundle_dir: PathBuf) {
        for spec in [&mut self.transcoder, &mut self.recovery] {
            let moved = match &spec.payload.source {
                PayloadSource::File(path) if path.parent() == Some(self.bundle_dir.as_path()) => {
                    path.file_name().map(|name| bundle_dir.join(name))
                }
                _ => None,
            };
            if let Some(path) = moved {
                spec.payload = BundledPayload::from_file(spec.payload.encoding, path);
            }
        }
        self.bundle_dir = bundle_dir;
    }

    pub fn tool(&self, kind: ToolKind) -> &ToolSpec {
        match kind {
            ToolKind::Transcoder => &self.transcoder,
            ToolKind::Recovery => &self.recovery,
        }
    }
}

pub fn timeout_from_secs(secs: u64) -> Option<Duration> {
    if secs == 0 {
        None
    } else {
        Some(Duration::from_secs(secs))
    }
}

fn tool_spec(
    kind: ToolKind,
    raw: Option<RawTool>,
    bundle_dir: &Path,
) -> Result<ToolSpec, ConfigError> {
    let raw = raw.unwrap_or_default();
    let (default_bundle, default_encoding) = kind.default_bundle_file();
    let file_name = match raw.file_name {
        Some(name) if name.trim().is_empty() => {
            return Err(ConfigError::Invalid(format!(
                "tools.{} file_name is empty",
                kind_key(kind)
            )))
        }
        Some(name) => name,
        None => kind.default_file_name(),
    };
    let encoding = match raw.encoding {
        Some(value) => PayloadEncoding::from_str(&value)
            .map_err(|err| ConfigError::Invalid(format!("tools.{}: {err}", kind_key(kind))))?,
        None if raw.bundle.is_some() => guess_encoding(raw.bundle.as_deref()),
        None => default_encoding,
    };
    let bundle = bundle_dir.join(raw.bundle.unwrap_or_else(|| PathBuf::from(default_bundle)));
    Ok(ToolSpec {
        kind,
        file_name,
        payload: BundledPayload::from_file(encoding, bundle),
    })
}

fn guess_encoding(bundle: Option<&Path>) -> PayloadEncoding {
    match bundle.and_then(|path| path.extension()) {
        Some(ext) if ext == "gz" => PayloadEncoding::Gzip,
        _ => PayloadEncoding::Plain,
    }
}

fn kind_key(kind: ToolKind) -> &'static str {
    match kind {
        ToolKind::Transcoder => "transcoder",
        ToolKind::Recovery => "recovery",
    }
}
