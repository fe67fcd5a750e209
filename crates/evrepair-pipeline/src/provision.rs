use flate2::read::GzDecoder;
use std::borrow::Cow;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("read bundled payload {}: {source}", path.display())]
    ReadPayload { path: PathBuf, source: io::Error },
    #[error("write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("decompress into {}: {source}", path.display())]
    Decompress { path: PathBuf, source: io::Error },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadEncoding {
    Plain,
    Gzip,
}

impl FromStr for PayloadEncoding {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "plain" => Ok(PayloadEncoding::Plain),
            "gzip" => Ok(PayloadEncoding::Gzip),
            other => Err(format!("unknown payload encoding: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub enum PayloadSource {
    Bytes(Vec<u8>),
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct BundledPayload {
    pub encoding: PayloadEncoding,
    pub source: PayloadSource,
}

impl BundledPayload {
    pub fn plain(bytes: Vec<u8>) -> Self {
        Self {
            encoding: PayloadEncoding::Plain,
            source: PayloadSource::Bytes(bytes),
        }
    }

    pub fn gzip(bytes: Vec<u8>) -> Self {
        Self {
            encoding: PayloadEncoding::Gzip,
            source: PayloadSource::Bytes(bytes),
        }
    }

    pub fn from_file(encoding: PayloadEncoding, path: PathBuf) -> Self {
        Self {
            encoding,
            source: PayloadSource::File(path),
        }
    }

    pub fn load(&self) -> Result<Cow<'_, [u8]>, ProvisionError> {
        match &self.source {
            PayloadSource::Bytes(bytes) => Ok(Cow::Borrowed(bytes.as_slice())),
            PayloadSource::File(path) => fs::read(path)
                .map(Cow::Owned)
                .map_err(|source| ProvisionError::ReadPayload {
                    path: path.clone(),
                    source,
                }),
        }
    }

    pub fn provision(&self, dir: &Path, file_name: &str) -> Result<PathBuf, ProvisionError> {
        let payload = self.load()?;
        match self.encoding {
            PayloadEncoding::Plain => extract_plain(dir, file_name, &payload),
            PayloadEncoding::Gzip => extract_compressed(dir, file_name, &payload),
        }
    }
}

pub fn extract_plain(
    dir: &Path,
    file_name: &str,
    payload: &[u8],
) -> Result<PathBuf, ProvisionError> {
    let full_path = dir.join(file_name);
    discard_on_error(&full_path, write_plain(&full_path, payload))?;
    tracing::info!(path = %full_path.display(), bytes = payload.len(), "extracted bundled tool");
    Ok(full_path)
}

pub fn extract_compressed(
    dir: &Path,
    file_name: &str,
    payload: &[u8],
) -> Result<PathBuf, ProvisionError> {
    let full_path = dir.join(file_name);
    let written = discard_on_error(&full_path, write_inflated(&full_path, payload))?;
    tracing::info!(
        path = %full_path.display(),
        compressed = payload.len(),
        bytes = written,
        "decompressed bundled tool"
    );
    Ok(full_path)
}

fn write_plain(path: &Path, payload: &[u8]) -> Result<(), ProvisionError> {
    fs::write(path, payload).map_err(|source| ProvisionError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    mark_executable(path)
}

fn write_inflated(path: &Path, payload: &[u8]) -> Result<u64, ProvisionError> {
    let mut file = fs::File::create(path).map_err(|source| ProvisionError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    let mut decoder = GzDecoder::new(payload);
    let written =
        io::copy(&mut decoder, &mut file).map_err(|source| ProvisionError::Decompress {
            path: path.to_path_buf(),
            source,
        })?;
    drop(file);
    mark_executable(path)?;
    Ok(written)
}

/// A half-written tool must not be left where a later lookup could run it.
fn discard_on_error<T>(
    path: &Path,
    result: Result<T, ProvisionError>,
) -> Result<T, ProvisionError> {
    if result.is_err() {
        match fs::remove_file(path) {
            Ok(()) => tracing::debug!(path = %path.display(), "removed partial tool"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to remove partial tool")
            }
        }
    }
    result
}

#[cfg(unix)]
fn mark_executable(path: &Path) -> Result<(), ProvisionError> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).map_err(|source| {
        ProvisionError::Write {
            path: path.to_path_buf(),
            source,
        }
    })
}

#[cfg(not(unix))]
fn mark_executable(_path: &Path) -> Result<(), ProvisionError> {
    Ok(())
}
