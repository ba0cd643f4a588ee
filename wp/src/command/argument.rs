//! Command-line argument value type

use std::borrow::Cow;
use std::fmt;

/// Value carried by an [`Argument`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArgumentValue {
    /// Explicit boolean flag, rendered without a value
    Flag,
    /// Text value, shell-escaped when rendered
    Text(String),
}

impl From<&str> for ArgumentValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ArgumentValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<u64> for ArgumentValue {
    fn from(value: u64) -> Self {
        Self::Text(value.to_string())
    }
}

/// A single flag/value pair of a command line.
///
/// Long arguments render as `--name[=value]`, short ones as `-name[ value]`.
/// An argument with an empty name is positional and renders as its bare value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Argument {
    name: String,
    value: Option<ArgumentValue>,
    full_name: bool,
}

/// One unit of work: the arguments bound to a worker for a single launch
pub type ArgumentSet = Vec<Argument>;

impl Argument {
    pub fn new(name: impl Into<String>, value: Option<ArgumentValue>, full_name: bool) -> Self {
        Self {
            name: name.into(),
            value,
            full_name,
        }
    }

    /// `--name=value`
    pub fn long(name: impl Into<String>, value: impl Into<ArgumentValue>) -> Self {
        Self::new(name, Some(value.into()), true)
    }

    /// `--name`
    pub fn long_flag(name: impl Into<String>) -> Self {
        Self::new(name, Some(ArgumentValue::Flag), true)
    }

    /// `-n value`
    pub fn short(name: impl Into<String>, value: impl Into<ArgumentValue>) -> Self {
        Self::new(name, Some(value.into()), false)
    }

    /// `-n`
    pub fn short_flag(name: impl Into<String>) -> Self {
        Self::new(name, Some(ArgumentValue::Flag), false)
    }

    /// Unnamed argument, rendered as its value only
    pub fn positional(value: impl Into<String>) -> Self {
        Self::new("", Some(ArgumentValue::Text(value.into())), false)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> Option<&ArgumentValue> {
        self.value.as_ref()
    }

    /// Text value, if any
    pub fn text(&self) -> Option<&str> {
        match &self.value {
            Some(ArgumentValue::Text(text)) => Some(text),
            _ => None,
        }
    }

    pub fn is_full_name(&self) -> bool {
        self.full_name
    }

    /// True when the argument renders as a bare flag
    pub fn is_flag(&self) -> bool {
        !self.name.is_empty() && !matches!(self.value, Some(ArgumentValue::Text(_)))
    }

    pub fn is_positional(&self) -> bool {
        self.name.is_empty()
    }

    /// Render the argument for a shell command line
    pub fn render(&self) -> String {
        self.render_with(|text| shell_words::quote(text))
    }

    /// Render the argument as it appears in a process's argv, without shell quoting
    pub fn render_unquoted(&self) -> String {
        self.render_with(Cow::Borrowed)
    }

    fn render_with<'a>(&'a self, quote: impl Fn(&'a str) -> Cow<'a, str>) -> String {
        let value = match &self.value {
            Some(ArgumentValue::Text(text)) => Some(quote(text.as_str())),
            _ => None,
        };

        if self.name.is_empty() {
            return value.map(Cow::into_owned).unwrap_or_default();
        }

        let prefix = if self.full_name { "--" } else { "-" };
        match value {
            Some(value) => {
                let separator = if self.full_name { "=" } else { " " };
                format!("{}{}{}{}", prefix, self.name, separator, value)
            }
            None => format!("{}{}", prefix, self.name),
        }
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_long_with_value() {
        assert_eq!(Argument::long("x", "v").render(), "--x=v");
    }

    #[test]
    fn test_render_long_flag() {
        assert_eq!(Argument::long_flag("x").render(), "--x");
        assert_eq!(Argument::new("x", None, true).render(), "--x");
    }

    #[test]
    fn test_render_short_with_value() {
        assert_eq!(Argument::short("x", "v").render(), "-x v");
    }

    #[test]
    fn test_render_short_flag() {
        assert_eq!(Argument::short_flag("a").render(), "-a");
    }

    #[test]
    fn test_render_positional() {
        assert_eq!(Argument::positional("/app/worker.php").render(), "/app/worker.php");
        assert_eq!(Argument::positional("with space").render(), "'with space'");
    }

    #[test]
    fn test_render_escapes_single_quote() {
        let rendered = Argument::long("msg", "it's").render();
        assert_eq!(rendered, r#"--msg='it'\''s'"#);

        // The escaped value must come back intact through a shell tokenizer
        let tokens = shell_words::split(&rendered).unwrap();
        assert_eq!(tokens, vec!["--msg=it's".to_string()]);
    }

    #[test]
    fn test_render_unquoted_keeps_raw_value() {
        assert_eq!(Argument::long("msg", "it's a(b)").render_unquoted(), "--msg=it's a(b)");
        assert_eq!(Argument::short("f", "a b").render_unquoted(), "-f a b");
        assert_eq!(Argument::positional("x y").render_unquoted(), "x y");
        assert_eq!(Argument::long_flag("dry-run").render_unquoted(), "--dry-run");
    }

    #[test]
    fn test_render_quotes_spaces() {
        assert_eq!(Argument::short("f", "a b").render(), "-f 'a b'");
    }

    #[test]
    fn test_flag_and_positional_predicates() {
        assert!(Argument::long_flag("verbose").is_flag());
        assert!(!Argument::long("id", "5").is_flag());
        assert!(Argument::positional("x").is_positional());
        assert!(!Argument::positional("x").is_flag());
        assert_eq!(Argument::long("id", "5").text(), Some("5"));
        assert_eq!(Argument::long_flag("id").text(), None);
    }

    #[test]
    fn test_value_from_number() {
        assert_eq!(Argument::long("id", 42u64).render(), "--id=42");
    }

    #[test]
    fn test_display_matches_render() {
        let arg = Argument::long("pool-index", "premium.0");
        assert_eq!(arg.to_string(), arg.render());
    }
}
