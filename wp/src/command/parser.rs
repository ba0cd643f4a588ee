//! Parse command lines, as reported by a process listing, back into arguments
//!
//! Accepted grammar: `--name=value`, `--name value`, `--name`, `-c value`,
//! `-abc` (expanded to `-a -b -c`) and at most one bare positional token.
//! Parsing is total: malformed tokens are skipped, extra positionals dropped.

use std::path::Path;

use tracing::debug;

use super::{Argument, CONSOLE_ENTRYPOINTS, Command, CommandKind, SCRIPT_INTERPRETERS};

/// Executable name and arguments recovered from a command line
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedCommand {
    pub name: String,
    pub arguments: Vec<Argument>,
}

impl ParsedCommand {
    /// First argument with the given name
    pub fn get(&self, name: &str) -> Option<&Argument> {
        self.arguments.iter().find(|a| a.name() == name)
    }

    pub fn positional(&self) -> Option<&Argument> {
        self.arguments.iter().find(|a| a.is_positional())
    }
}

/// Split a line into shell words, degrading to whitespace splitting on unbalanced quotes
pub fn tokenize(line: &str) -> Vec<String> {
    match shell_words::split(line) {
        Ok(tokens) => tokens,
        Err(e) => {
            debug!(%line, error = %e, "tokenize: falling back to whitespace split");
            line.split_whitespace()
                .map(|t| t.trim_matches(|c| c == '\'' || c == '"').to_string())
                .filter(|t| !t.is_empty())
                .collect()
        }
    }
}

/// Parse a full command line: the first token is the executable name unless it is a flag
pub fn parse(line: &str) -> ParsedCommand {
    debug!(%line, "parse: called");
    let mut tokens = tokenize(line);

    let name = match tokens.first() {
        Some(first) if !first.starts_with('-') => tokens.remove(0),
        _ => String::new(),
    };

    ParsedCommand {
        name,
        arguments: parse_arguments(&tokens),
    }
}

/// Parse a line holding arguments only
pub fn parse_argument_line(line: &str) -> Vec<Argument> {
    parse_arguments(&tokenize(line))
}

/// Parse argument tokens.
///
/// A token consumed as a flag value is still visited afterwards, so it may
/// also become the positional argument.
pub fn parse_arguments(tokens: &[String]) -> Vec<Argument> {
    let mut arguments = Vec::new();
    let mut has_positional = false;

    for (i, token) in tokens.iter().enumerate() {
        let next = tokens.get(i + 1).filter(|t| !t.starts_with('-'));

        if let Some(body) = token.strip_prefix("--") {
            if let Some((name, value)) = body.split_once('=') {
                if is_valid_name(name) {
                    arguments.push(Argument::long(name, value));
                }
            } else if is_valid_name(body) {
                match next {
                    Some(value) => arguments.push(Argument::long(body, value.as_str())),
                    None => arguments.push(Argument::long_flag(body)),
                }
            }
        } else if let Some(body) = token.strip_prefix('-') {
            let mut letters = body.chars();
            match (letters.next(), letters.next(), next) {
                (Some(letter), None, Some(value)) if letter.is_ascii_alphanumeric() => {
                    arguments.push(Argument::short(letter.to_string(), value.as_str()));
                }
                _ => arguments.extend(
                    body.chars()
                        .filter(char::is_ascii_alphanumeric)
                        .map(|c| Argument::short_flag(c.to_string())),
                ),
            }
        } else if !has_positional && !token.is_empty() {
            has_positional = true;
            arguments.push(Argument::positional(token.as_str()));
        }
    }

    arguments
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Build a command from a raw line, choosing the kind from the executable basename.
///
/// Console entrypoints and known interpreters keep their identity semantics;
/// anything else becomes a safe generic command that can be matched but never run.
pub fn create_from_string(line: &str) -> Command {
    let parsed = parse(line);
    let basename = Path::new(&parsed.name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();

    let kind = if CONSOLE_ENTRYPOINTS.contains(&basename) {
        CommandKind::Console
    } else if SCRIPT_INTERPRETERS.contains(&basename) {
        CommandKind::Script
    } else {
        CommandKind::Generic { safe: true }
    };

    Command::from_parts(kind, parsed.name, parsed.arguments)
}
