//! In-memory process table for tests
//!
//! `FakeProcessTable` is both the finder and the launcher: launching a command
//! adds its line to the table, finding matches patterns against the argv of
//! each line in the table.

use std::sync::Mutex;

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use crate::command::{Command, CommandError, create_from_string};
use crate::process::{Launcher, Process, ProcessCollection, ProcessError, ProcessFinder};

#[derive(Debug, Default)]
struct TableState {
    next_pid: u32,
    running: Vec<(u32, String)>,
    launched: Vec<String>,
    failing_finds: usize,
}

#[derive(Debug, Default)]
pub struct FakeProcessTable {
    state: Mutex<TableState>,
}

impl FakeProcessTable {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TableState {
                next_pid: 1000,
                ..Default::default()
            }),
        }
    }

    /// Add a process that was not started through the launcher
    pub fn spawn_line(&self, line: &str) -> u32 {
        let mut state = self.state.lock().unwrap();
        state.next_pid += 1;
        let pid = state.next_pid;
        state.running.push((pid, line.to_string()));
        pid
    }

    pub fn kill(&self, pid: u32) {
        self.state.lock().unwrap().running.retain(|(p, _)| *p != pid);
    }

    pub fn kill_all(&self) {
        self.state.lock().unwrap().running.clear();
    }

    /// Lines handed to the launcher, as built for launch
    pub fn launched(&self) -> Vec<String> {
        self.state.lock().unwrap().launched.clone()
    }

    pub fn running(&self) -> Vec<String> {
        self.state.lock().unwrap().running.iter().map(|(_, l)| l.clone()).collect()
    }

    /// Make the next `count` finds fail
    pub fn fail_next_finds(&self, count: usize) {
        self.state.lock().unwrap().failing_finds = count;
    }
}

/// A shell line as the OS would report its argv: unquoted words joined by spaces
fn argv_line(line: &str) -> String {
    shell_words::split(line)
        .map(|words| words.join(" "))
        .unwrap_or_else(|_| line.to_string())
}

#[async_trait]
impl ProcessFinder for FakeProcessTable {
    async fn find(&self, pattern: &str) -> Result<ProcessCollection, ProcessError> {
        debug!(%pattern, "FakeProcessTable::find: called");
        let mut state = self.state.lock().unwrap();

        if state.failing_finds > 0 {
            state.failing_finds -= 1;
            return Err(ProcessError::Discovery(CommandError::Exit {
                line: format!("pgrep -a -f {}", pattern),
                code: Some(3),
                stderr: "simulated discovery failure".to_string(),
            }));
        }

        let re = Regex::new(pattern)?;
        Ok(ProcessCollection::new(
            state
                .running
                .iter()
                .filter(|(_, line)| re.is_match(&argv_line(line)))
                .map(|(pid, line)| Process::new(create_from_string(line), Some(*pid)))
                .collect(),
        ))
    }
}

#[async_trait]
impl Launcher for FakeProcessTable {
    async fn launch(&self, command: &Command, is_async: bool) -> Result<(), CommandError> {
        command.ensure_executable()?;
        let mut state = self.state.lock().unwrap();
        state.launched.push(command.build(is_async));
        state.next_pid += 1;
        let pid = state.next_pid;
        state.running.push((pid, command.build(false)));
        Ok(())
    }
}
