use std::env;
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const SEARCH_PATH_VAR: &str = "PATH";

pub fn locate(file_name: &str) -> Option<PathBuf> {
    let search = env::var_os(SEARCH_PATH_VAR);
    locate_in(file_name, search.as_deref())
}

pub fn locate_in(file_name: &str, search: Option<&OsStr>) -> Option<PathBuf> {
    if has_separator(file_name) {
        let literal = Path::new(file_name);
        if !literal.is_file() {
            return None;
        }
        return absolute_path(literal).ok();
    }

    let search = search?;
    for dir in env::split_paths(search) {
        if dir.as_os_str().is_empty() {
            tracing::debug!(file_name, "skipping empty search path entry");
            continue;
        }
        let candidate = dir.join(file_name);
        match fs::metadata(&candidate) {
            Ok(meta) if meta.is_file() => return Some(candidate),
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                tracing::warn!(
                    dir = %dir.display(),
                    file_name,
                    error = %err,
                    "skipping unusable search path entry"
                );
            }
        }
    }
    None
}

fn has_separator(file_name: &str) -> bool {
    file_name.contains(std::path::MAIN_SEPARATOR) || file_name.contains('/')
}

pub(crate) fn absolute_path(path: &Path) -> io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(env::current_dir()?.join(path))
    }
}
