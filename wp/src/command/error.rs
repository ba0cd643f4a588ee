//! Command error types

use thiserror::Error;

/// Errors raised while constructing or executing a command
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Invalid console command name '{name}' (expected basename: {expected})")]
    InvalidCommandName { name: String, expected: String },

    #[error("Invalid command argument: {0}")]
    InvalidCommandArgument(String),

    #[error("Cannot exec generic command '{name}' in safe mode")]
    Security { name: String },

    #[error("Failed to spawn command: {line}")]
    Spawn {
        line: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command exited with status {}: {line}: {stderr}", describe_code(.code))]
    Exit {
        line: String,
        code: Option<i32>,
        stderr: String,
    },
}

fn describe_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "signal".to_string(), |c| c.to_string())
}

impl CommandError {
    pub(crate) fn exit(line: impl Into<String>, status: std::process::ExitStatus, stderr: &[u8]) -> Self {
        Self::Exit {
            line: line.into(),
            code: status.code(),
            stderr: String::from_utf8_lossy(stderr).trim().to_string(),
        }
    }
}
