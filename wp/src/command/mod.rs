//! Shell command model
//!
//! A [`Command`] is an immutable-by-convention value: an executable name, an
//! ordered list of [`Argument`]s, an optional type argument used to tell
//! worker slots apart in a process listing, and optional log redirection.
//! It renders to a shell line with [`Command::build`] and to a
//! process-listing regex with [`Command::pattern`].

mod argument;
mod error;
mod parser;

pub use argument::{Argument, ArgumentSet, ArgumentValue};
pub use error::CommandError;
pub use parser::{ParsedCommand, create_from_string, parse, parse_argument_line, parse_arguments, tokenize};

use std::path::Path;
use std::process::{Output, Stdio};

use tokio::process::Command as ShellCommand;
use tracing::debug;

/// Executable basenames accepted for console entrypoints
pub const CONSOLE_ENTRYPOINTS: [&str; 2] = ["console", "console.php"];

/// Interpreters recognised as script entrypoints when parsing a listing
pub const SCRIPT_INTERPRETERS: [&str; 6] = ["php", "python", "python3", "node", "ruby", "perl"];

/// Output target used for asynchronous commands without a log
pub const NULL_DEVICE: &str = "/dev/null";

/// The flavour of a command, deciding how it identifies itself and whether it may run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Arbitrary executable; refuses to run while `safe` is set
    Generic { safe: bool },
    /// Console entrypoint (`bin/console`-style dispatcher)
    Console,
    /// Interpreter running a script file given as the first positional argument
    Script,
    /// Process listing (`pgrep`)
    PGrep,
}

impl CommandKind {
    /// Whether `argument` is part of the logical worker identity
    fn is_identity(&self, argument: &Argument) -> bool {
        match self {
            CommandKind::Script => argument.is_positional(),
            _ => argument.name() == "name",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    kind: CommandKind,
    name: String,
    arguments: Vec<Argument>,
    type_argument: Option<Argument>,
    log_stdout: Option<String>,
    log_stderr: Option<String>,
    append_logs: bool,
    env: Vec<(String, String)>,
}

impl Command {
    fn with_kind(kind: CommandKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            arguments: Vec::new(),
            type_argument: None,
            log_stdout: None,
            log_stderr: None,
            append_logs: false,
            env: Vec::new(),
        }
    }

    /// Generic command in safe mode: it can be built and matched, never executed
    pub fn generic(name: impl Into<String>) -> Self {
        Self::with_kind(CommandKind::Generic { safe: true }, name)
    }

    /// Generic command allowed to execute
    pub fn generic_unsafe(name: impl Into<String>) -> Self {
        Self::with_kind(CommandKind::Generic { safe: false }, name)
    }

    /// Console entrypoint; the executable basename must be a known alias
    pub fn console(path: impl Into<String>) -> Result<Self, CommandError> {
        let path = path.into();
        debug!(%path, "Command::console: called");
        let basename = Path::new(&path).file_name().and_then(|n| n.to_str()).unwrap_or_default();

        if !CONSOLE_ENTRYPOINTS.contains(&basename) {
            debug!(%basename, "Command::console: unknown entrypoint");
            return Err(CommandError::InvalidCommandName {
                name: path,
                expected: CONSOLE_ENTRYPOINTS.join(", "),
            });
        }

        Ok(Self::with_kind(CommandKind::Console, path))
    }

    /// Interpreter running `script`; the script file must exist
    pub fn script(interpreter: impl Into<String>, script: impl AsRef<Path>) -> Result<Self, CommandError> {
        let script = script.as_ref();
        debug!(?script, "Command::script: called");

        if !script.is_file() {
            return Err(CommandError::InvalidCommandArgument(format!(
                "Invalid script file: {}",
                script.display()
            )));
        }

        Ok(Self::with_kind(CommandKind::Script, interpreter)
            .with_argument(Argument::positional(script.to_string_lossy())))
    }

    /// Process listing command running `program`
    pub fn pgrep(program: impl Into<String>) -> Self {
        Self::with_kind(CommandKind::PGrep, program)
    }

    /// Command recovered from a process listing, kind chosen by the caller
    pub(crate) fn from_parts(kind: CommandKind, name: impl Into<String>, arguments: Vec<Argument>) -> Self {
        Self {
            arguments,
            ..Self::with_kind(kind, name)
        }
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }

    pub fn type_argument(&self) -> Option<&Argument> {
        self.type_argument.as_ref()
    }

    pub fn with_argument(mut self, argument: Argument) -> Self {
        self.arguments.push(argument);
        self
    }

    pub fn with_arguments(mut self, arguments: impl IntoIterator<Item = Argument>) -> Self {
        self.arguments.extend(arguments);
        self
    }

    /// Set the argument used to distinguish worker slots in a listing
    pub fn with_type(mut self, argument: Argument) -> Self {
        self.type_argument = Some(argument);
        self
    }

    /// Redirect output; without `stderr` both streams go to `stdout`
    pub fn with_log(mut self, stdout: Option<String>, stderr: Option<String>, append: bool) -> Self {
        self.log_stdout = stdout;
        self.log_stderr = stderr;
        self.append_logs = append;
        self
    }

    /// Export a variable to the shell running this command; not part of the rendered line
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn add_argument(&mut self, argument: Argument) -> &mut Self {
        self.arguments.push(argument);
        self
    }

    pub fn add_arguments(&mut self, arguments: impl IntoIterator<Item = Argument>) -> &mut Self {
        self.arguments.extend(arguments);
        self
    }

    /// Replace all arguments
    pub fn set_arguments(&mut self, arguments: Vec<Argument>) -> &mut Self {
        self.arguments = arguments;
        self
    }

    /// Render the full shell line: `name [type] [arguments...] [> logs] [&]`
    pub fn build(&self, is_async: bool) -> String {
        let mut parts = vec![self.name.clone()];

        if let Some(argument) = &self.type_argument {
            parts.push(argument.render());
        }

        parts.extend(self.arguments.iter().map(Argument::render).filter(|a| !a.is_empty()));

        let stdout = match (&self.log_stdout, is_async) {
            (None, true) => Some(NULL_DEVICE),
            (log, _) => log.as_deref(),
        };

        if let Some(output) = render_output(stdout, self.log_stderr.as_deref(), self.append_logs) {
            parts.push(output);
        }

        if is_async {
            parts.push("&".to_string());
        }

        parts.join(" ")
    }

    /// Render a regex matching this command in a process listing.
    ///
    /// `with_type` includes the type argument; `with_arguments` includes every
    /// argument, otherwise only the identity arguments of the command kind.
    /// Values are matched unquoted and literally, since the OS reports raw
    /// argv. Dashes become `[-]` so the listing command never matches itself.
    pub fn pattern(&self, with_arguments: bool, with_type: bool) -> String {
        let mut parts = Vec::new();

        if with_type {
            if let Some(argument) = &self.type_argument {
                parts.push(argument.render_unquoted());
            }
        }

        parts.extend(
            self.arguments
                .iter()
                .filter(|a| with_arguments || self.kind.is_identity(a))
                .map(Argument::render_unquoted),
        );

        let literal = format!(" {}", parts.join(" "));
        literal.split('-').map(regex::escape).collect::<Vec<_>>().join("[-]")
    }

    /// Fail with [`CommandError::Security`] when the command may not run
    pub fn ensure_executable(&self) -> Result<(), CommandError> {
        match self.kind {
            CommandKind::Generic { safe: true } => Err(CommandError::Security {
                name: self.name.clone(),
            }),
            _ => Ok(()),
        }
    }

    /// Execute through `sh -c`.
    ///
    /// Asynchronous runs return once the shell has backgrounded the job.
    /// Synchronous runs return captured stdout lines, or inherit stdio and
    /// return nothing when `use_system` is set. A non-zero exit status is a
    /// [`CommandError::Exit`]; callers with their own status rules use
    /// [`Command::exec_output`].
    pub async fn exec(&self, is_async: bool, use_system: bool) -> Result<Vec<String>, CommandError> {
        if !is_async && !use_system {
            let output = self.exec_output().await?;
            if !output.status.success() {
                return Err(CommandError::exit(self.build(false), output.status, &output.stderr));
            }
            return Ok(String::from_utf8_lossy(&output.stdout)
                .lines()
                .map(str::to_string)
                .collect());
        }

        self.ensure_executable()?;
        let line = self.build(is_async);
        debug!(%line, is_async, use_system, "Command::exec: called");

        let mut shell = self.shell(&line);
        if is_async {
            shell.stdout(Stdio::null()).stderr(Stdio::null());
        }
        let status = shell.status().await.map_err(|source| CommandError::Spawn {
            line: line.clone(),
            source,
        })?;
        debug!(?status, "Command::exec: shell exited");

        if !status.success() {
            return Err(CommandError::exit(line, status, &[]));
        }
        Ok(Vec::new())
    }

    /// Run synchronously and hand back the raw output, whatever the exit status
    pub async fn exec_output(&self) -> Result<Output, CommandError> {
        self.ensure_executable()?;

        let line = self.build(false);
        debug!(%line, "Command::exec_output: called");

        let output = self.shell(&line)
            .output()
            .await
            .map_err(|source| CommandError::Spawn {
                line: line.clone(),
                source,
            })?;
        debug!(status = ?output.status, "Command::exec_output: command completed");
        Ok(output)
    }

    fn shell(&self, line: &str) -> ShellCommand {
        let mut shell = ShellCommand::new("sh");
        shell
            .arg("-c")
            .arg(line)
            .envs(self.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null());
        shell
    }
}

fn render_output(stdout: Option<&str>, stderr: Option<&str>, append: bool) -> Option<String> {
    let sign = if append { ">>" } else { ">" };

    match (stdout, stderr) {
        (None, None) => None,
        (Some(out), None) => Some(format!("{} {} 2>&1", sign, shell_words::quote(out))),
        (Some(out), Some(err)) => Some(format!(
            "1{} {} 2{} {}",
            sign,
            shell_words::quote(out),
            sign,
            shell_words::quote(err)
        )),
        (None, Some(err)) => Some(format!("2{} {}", sign, shell_words::quote(err))),
    }
}
