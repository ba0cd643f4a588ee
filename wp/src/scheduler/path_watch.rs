//! Detect redeploys behind a symlinked code directory

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::SchedulerError;

/// Remembers where a directory resolved to at startup
#[derive(Debug, Clone)]
pub struct PathWatch {
    path: PathBuf,
    real_path: PathBuf,
}

impl PathWatch {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, SchedulerError> {
        let path = path.into();
        let real_path = std::fs::canonicalize(&path).map_err(|source| SchedulerError::PathResolve {
            path: path.clone(),
            source,
        })?;
        debug!(?path, ?real_path, "PathWatch::new: resolved");
        Ok(Self { path, real_path })
    }

    /// Watch the directory of `argv0`, relative paths taken against `cwd`
    pub fn from_invocation(argv0: &str, cwd: &Path) -> Result<Self, SchedulerError> {
        let dir = match Path::new(argv0.trim_end()).parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };

        if dir.is_absolute() {
            Self::new(dir)
        } else {
            Self::new(cwd.join(dir))
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn real_path(&self) -> &Path {
        &self.real_path
    }

    /// True when the directory now resolves elsewhere or no longer resolves
    pub fn has_changed(&self) -> bool {
        match std::fs::canonicalize(&self.path) {
            Ok(current) => current != self.real_path,
            Err(e) => {
                warn!(path = ?self.path, error = %e, "Watched path no longer resolves");
                true
            }
        }
    }
}
