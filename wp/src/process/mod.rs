//! Process discovery and launching
//!
//! A [`Process`] is what discovery observed: a pid and the command line it was
//! started with, parsed back into a [`Command`]. Discovery and launching sit
//! behind the [`ProcessFinder`] and [`Launcher`] traits so the scheduler can be
//! driven by an in-memory process table in tests.

mod error;
mod finder;
mod launcher;
mod procfs;

pub use error::ProcessError;
pub use finder::{PgrepFinder, ProcessFinder};
pub use launcher::{Launcher, ShellLauncher};
pub use self::procfs::ProcFsFinder;

use tracing::debug;

use crate::command::{Command, create_from_string};

/// A process observed in the OS process table
#[derive(Debug, Clone, PartialEq)]
pub struct Process {
    pub command: Command,
    pub pid: Option<u32>,
}

impl Process {
    pub fn new(command: Command, pid: Option<u32>) -> Self {
        Self { command, pid }
    }

    /// Parse a `<pid> <command line>` listing line; `None` when the pid is not numeric
    pub fn from_listing_line(line: &str) -> Option<Self> {
        let (pid, rest) = line.trim().split_once(char::is_whitespace)?;
        let pid = pid.parse::<u32>().ok()?;
        Some(Self::new(create_from_string(rest.trim_start()), Some(pid)))
    }

    pub fn is_running(&self) -> bool {
        self.pid.is_some()
    }
}

/// Ordered result of one discovery query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessCollection {
    processes: Vec<Process>,
}

impl ProcessCollection {
    pub fn new(processes: Vec<Process>) -> Self {
        Self { processes }
    }

    /// Build from listing output, discarding lines that do not start with a pid
    pub fn from_listing<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let processes: Vec<Process> = lines
            .into_iter()
            .filter_map(|line| Process::from_listing_line(line.as_ref()))
            .collect();
        debug!(count = processes.len(), "ProcessCollection::from_listing: parsed");
        Self { processes }
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Process> {
        self.processes.iter()
    }

    pub fn pids(&self) -> Vec<u32> {
        self.processes.iter().filter_map(|p| p.pid).collect()
    }
}

impl IntoIterator for ProcessCollection {
    type Item = Process;
    type IntoIter = std::vec::IntoIter<Process>;

    fn into_iter(self) -> Self::IntoIter {
        self.processes.into_iter()
    }
}

impl<'a> IntoIterator for &'a ProcessCollection {
    type Item = &'a Process;
    type IntoIter = std::slice::Iter<'a, Process>;

    fn into_iter(self) -> Self::IntoIter {
        self.processes.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandKind;

    #[test]
    fn test_from_listing_discards_non_numeric_lines() {
        let collection = ProcessCollection::from_listing([
            "  PID CMD",
            "1234 /app/bin/console --name=Worker/Resize --id=5",
            "",
            "abc php worker.php",
            "77 php /app/worker.php",
        ]);

        assert_eq!(collection.len(), 2);
        assert_eq!(collection.pids(), vec![1234, 77]);

        let first = collection.iter().next().unwrap();
        assert!(first.is_running());
        assert_eq!(first.command.kind(), CommandKind::Console);
        assert_eq!(first.command.arguments().len(), 2);
    }

    #[test]
    fn test_empty_listing_is_empty_collection() {
        let collection = ProcessCollection::from_listing(Vec::<String>::new());
        assert!(collection.is_empty());
    }

    #[test]
    fn test_process_without_pid_is_not_running() {
        let process = Process::new(Command::pgrep("pgrep"), None);
        assert!(!process.is_running());
    }
}
