//! Discovery by scanning `/proc/*/cmdline`

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use super::{Process, ProcessCollection, ProcessError, ProcessFinder};
use crate::command::create_from_string;

/// Scans a procfs root directly; matches the space-joined argv like `pgrep -f`
#[derive(Debug, Clone)]
pub struct ProcFsFinder {
    root: PathBuf,
}

impl Default for ProcFsFinder {
    fn default() -> Self {
        Self::new("/proc")
    }
}

impl ProcFsFinder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn scan(root: &Path, re: &Regex) -> Result<Vec<Process>, ProcessError> {
        let own_pid = std::process::id() as i32;
        let all_procs = ::procfs::process::all_processes_with_root(root).map_err(|source| ProcessError::Scan {
            root: root.to_path_buf(),
            source,
        })?;

        let mut processes = Vec::new();
        for proc_result in all_procs {
            // Processes may exit between listing and reading
            let Ok(proc) = proc_result else { continue };
            if proc.pid == own_pid {
                continue;
            }

            let argv = match proc.cmdline() {
                Ok(argv) if !argv.is_empty() => argv,
                _ => continue,
            };

            if re.is_match(&argv.join(" ")) {
                debug!(pid = proc.pid, "ProcFsFinder::scan: matched");
                let pid = u32::try_from(proc.pid).ok();
                processes.push(Process::new(create_from_string(&shell_words::join(&argv)), pid));
            }
        }

        processes.sort_by_key(|p| p.pid);
        Ok(processes)
    }
}

#[async_trait]
impl ProcessFinder for ProcFsFinder {
    async fn find(&self, pattern: &str) -> Result<ProcessCollection, ProcessError> {
        debug!(%pattern, root = ?self.root, "ProcFsFinder::find: called");
        let re = Regex::new(pattern)?;
        let root = self.root.clone();

        let processes = tokio::task::spawn_blocking(move || Self::scan(&root, &re)).await??;
        Ok(ProcessCollection::new(processes))
    }
}
