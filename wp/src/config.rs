//! workpool configuration types and loading

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Context, Result, eyre};
use serde::{Deserialize, Serialize};

use crate::command::{Argument, ArgumentValue, Command, CommandError};
use crate::pool::{CallbackContext, ContextRange, PoolConfig};
use crate::scheduler::{DEFAULT_MAX_RETRY, DEFAULT_TIME_BEFORE_RETRY_SECS, Retry, SchedulerConfig};

/// Main workpool configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Poll loop settings
    pub scheduler: SchedulerConfig,

    /// Error budget; without it any tick error stops the daemon
    pub retry: Option<RetryConfig>,

    /// The command every worker slot runs
    pub worker: WorkerConfig,

    /// Where work comes from
    pub source: SourceConfig,

    /// Process discovery backend
    pub finder: FinderKind,

    /// Pools, in scheduling order
    pub pools: Vec<PoolEntry>,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .workpool.yml
        let local_config = PathBuf::from(".workpool.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/workpool/workpool.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("workpool").join("workpool.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is set up
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let candidates: Vec<PathBuf> = match config_path {
            Some(path) => vec![path.clone()],
            None => {
                let mut paths = vec![PathBuf::from(".workpool.yml")];
                if let Some(config_dir) = dirs::config_dir() {
                    paths.push(config_dir.join("workpool").join("workpool.yml"));
                }
                paths
            }
        };

        candidates
            .iter()
            .filter(|p| p.exists())
            .find_map(|p| Self::load_from_file(p).ok())
            .and_then(|config| config.log_level)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Validate configuration before use
    ///
    /// Everything the scheduler would reject at construction is checked here,
    /// so startup fails before any process is spawned.
    pub fn validate(&self) -> Result<()> {
        self.scheduler.validate().context("Invalid scheduler configuration")?;

        if self.pools.is_empty() {
            return Err(eyre!("No pools configured"));
        }

        let mut names = BTreeSet::new();
        let mut shared = None;
        for entry in &self.pools {
            if !names.insert(entry.name.as_str()) {
                return Err(eyre!("Duplicate pool name '{}'", entry.name));
            }
            if entry.shared {
                if let Some(existing) = shared.replace(entry.name.as_str()) {
                    return Err(eyre!(
                        "Only one shared pool is allowed ('{}' and '{}')",
                        existing,
                        entry.name
                    ));
                }
            }
            entry
                .pool_config()
                .context(format!("Invalid pool '{}'", entry.name))?;
            entry
                .callback_context(self.scheduler.max_processes)
                .context(format!("Invalid range for pool '{}'", entry.name))?;
        }

        self.worker.template().context("Invalid worker command")?;
        self.worker.validate_identity_order()?;
        Ok(())
    }

    pub fn retry(&self) -> Option<Retry> {
        self.retry
            .as_ref()
            .map(|r| Retry::new(r.max_retry, r.time_before_retry_secs))
    }
}

/// Retry budget settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    #[serde(rename = "max-retry")]
    pub max_retry: u32,

    #[serde(rename = "time-before-retry-secs")]
    pub time_before_retry_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retry: DEFAULT_MAX_RETRY,
            time_before_retry_secs: DEFAULT_TIME_BEFORE_RETRY_SECS,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkerKind {
    #[default]
    Console,
    Script,
    Generic,
}

/// Worker command settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub kind: WorkerKind,

    /// Console entrypoint, script file, or executable
    pub path: String,

    /// Interpreter for script workers
    pub interpreter: String,

    /// Argument naming the pool slot in process listings
    #[serde(rename = "type-argument")]
    pub type_argument: String,

    /// Static arguments, in order
    pub arguments: Vec<ArgumentConfig>,

    #[serde(rename = "log-stdout")]
    pub log_stdout: Option<String>,

    #[serde(rename = "log-stderr")]
    pub log_stderr: Option<String>,

    #[serde(rename = "append-logs")]
    pub append_logs: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            kind: WorkerKind::Console,
            path: "bin/console".to_string(),
            interpreter: "php".to_string(),
            type_argument: "pool-index".to_string(),
            arguments: Vec::new(),
            log_stdout: None,
            log_stderr: None,
            append_logs: false,
        }
    }
}

impl WorkerConfig {
    /// Build the template command shared by every slot.
    ///
    /// Generic workers come from the operator's own config, so they are built
    /// in unsafe mode and allowed to execute.
    pub fn template(&self) -> Result<Command, CommandError> {
        let command = match self.kind {
            WorkerKind::Console => Command::console(self.path.as_str())?,
            WorkerKind::Script => Command::script(self.interpreter.as_str(), &self.path)?,
            WorkerKind::Generic => Command::generic_unsafe(self.path.as_str()),
        };

        Ok(command
            .with_arguments(self.arguments.iter().map(ArgumentConfig::to_argument))
            .with_log(self.log_stdout.clone(), self.log_stderr.clone(), self.append_logs))
    }
}

impl WorkerConfig {
    /// Running workers are matched on the type argument followed directly by
    /// the `name` arguments, so those must lead the static arguments
    fn validate_identity_order(&self) -> Result<()> {
        if self.kind == WorkerKind::Script {
            return Ok(());
        }

        let first_other = self.arguments.iter().position(|a| a.name != "name");
        if let Some(index) = first_other {
            if self.arguments[index..].iter().any(|a| a.name == "name") {
                return Err(eyre!(
                    "Worker argument 'name' must come before the other static arguments"
                ));
            }
        }
        Ok(())
    }
}

/// One static worker argument
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArgumentConfig {
    /// Empty for a positional argument
    pub name: String,
    pub value: Option<String>,
    pub short: bool,
}

impl ArgumentConfig {
    pub fn to_argument(&self) -> Argument {
        match (&self.value, self.name.is_empty()) {
            (Some(value), true) => Argument::positional(value.as_str()),
            (Some(value), false) => Argument::new(
                self.name.as_str(),
                Some(ArgumentValue::Text(value.clone())),
                !self.short,
            ),
            (None, _) => Argument::new(self.name.as_str(), Some(ArgumentValue::Flag), !self.short),
        }
    }
}

/// Work source settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Shell line printing one argument-set per line
    pub command: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinderKind {
    #[default]
    Pgrep,
    Procfs,
}

/// One pool definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolEntry {
    pub name: String,
    pub ratio: f64,

    #[serde(default)]
    pub shared: bool,

    /// Prefix of slot labels, the pool name when unset
    #[serde(default)]
    pub index: Option<String>,

    /// Free-form data handed to the work source
    #[serde(default)]
    pub context: BTreeMap<String, serde_json::Value>,

    #[serde(default)]
    pub range: Option<RangeConfig>,
}

impl PoolEntry {
    pub fn pool_config(&self) -> Result<PoolConfig> {
        Ok(PoolConfig::new(self.ratio, self.shared, self.index.clone())?)
    }

    pub fn callback_context(&self, max_processes: usize) -> Result<CallbackContext> {
        let mut context = CallbackContext::new(self.name.as_str(), max_processes).with_data(self.context.clone());
        if let Some(range) = &self.range {
            context = context.with_range(ContextRange::new(range.offset, range.limit, range.step, range.repeat)?);
        }
        Ok(context)
    }
}

/// Offset window for paging sources
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RangeConfig {
    pub offset: i64,
    pub limit: i64,
    pub step: i64,
    pub repeat: i64,
}

impl Default for RangeConfig {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 100,
            step: 300,
            repeat: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::SharedFeed;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"
log-level: debug
scheduler:
  delay-secs: 2
  safe: true
  shared-feed: leftover
  max-processes: 10
retry:
  max-retry: 3
worker:
  kind: console
  path: /app/bin/console
  arguments:
    - name: name
      value: Worker/Resize
    - name: v
      short: true
  log-stdout: /var/log/worker.log
  append-logs: true
source:
  command: "bin/feeder --limit=50"
finder: procfs
pools:
  - name: premium
    ratio: 0.3
    context:
      tier: gold
  - name: basic
    ratio: 0.5
    range:
      limit: 50
  - name: shared
    ratio: 0.2
    shared: true
"#;

    fn sample() -> Config {
        serde_yaml::from_str(SAMPLE).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.log_level.is_none());
        assert!(config.retry.is_none());
        assert_eq!(config.worker.kind, WorkerKind::Console);
        assert_eq!(config.worker.type_argument, "pool-index");
        assert_eq!(config.finder, FinderKind::Pgrep);
        assert!(config.pools.is_empty());
    }

    #[test]
    fn test_deserialize_config() {
        let config = sample();
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.scheduler.delay_secs, 2);
        assert_eq!(config.scheduler.shared_feed, SharedFeed::Leftover);
        assert_eq!(config.retry.as_ref().unwrap().max_retry, 3);
        assert_eq!(config.retry.as_ref().unwrap().time_before_retry_secs, 30);
        assert_eq!(config.finder, FinderKind::Procfs);
        assert_eq!(config.pools.len(), 3);
        assert!(config.pools[2].shared);
        assert_eq!(config.source.command.as_deref(), Some("bin/feeder --limit=50"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_worker_template() {
        let template = sample().worker.template().unwrap();
        assert_eq!(
            template.build(true),
            "/app/bin/console --name=Worker/Resize -v >> /var/log/worker.log 2>&1 &"
        );
    }

    #[test]
    fn test_pool_context_carries_data_and_range() {
        let config = sample();
        let premium = config.pools[0].callback_context(10).unwrap();
        assert_eq!(premium.data["tier"], "gold");
        assert!(premium.range.is_none());

        let basic = config.pools[1].callback_context(10).unwrap();
        assert_eq!(basic.range.unwrap().limit(), 50);
    }

    #[test]
    fn test_validate_rejects_bad_ratio() {
        let mut config = sample();
        config.pools[0].ratio = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_two_shared_pools() {
        let mut config = sample();
        config.pools[0].shared = true;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("shared"));
    }

    #[test]
    fn test_validate_rejects_bad_console_name() {
        let mut config = sample();
        config.worker.path = "/usr/bin/php".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_negative_range() {
        let mut config = sample();
        config.pools[1].range = Some(RangeConfig {
            step: 0,
            ..Default::default()
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_overflowing_range() {
        let mut config = sample();
        config.pools[1].range = Some(RangeConfig {
            offset: 0,
            limit: i64::MAX,
            step: i64::MAX,
            repeat: 3,
        });
        let err = config.validate().unwrap_err();
        assert!(format!("{:#}", err).contains("overflows"));
    }

    #[test]
    fn test_validate_rejects_name_after_static_arguments() {
        let mut config = sample();
        config.worker.arguments.reverse();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("'name'"));

        config.worker.kind = WorkerKind::Generic;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_leading_name_arguments() {
        let mut config = sample();
        config.worker.arguments.insert(
            1,
            ArgumentConfig {
                name: "name".to_string(),
                value: Some("Worker/Second".to_string()),
                short: false,
            },
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_pools() {
        assert!(Config::default().validate().is_err());
    }

    #[test]
    fn test_load_explicit_path() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let path = file.path().to_path_buf();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.pools.len(), 3);
        assert_eq!(Config::load_log_level(Some(&path)).as_deref(), Some("debug"));
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let path = PathBuf::from("/definitely/not/workpool.yml");
        assert!(Config::load(Some(&path)).is_err());
        assert!(Config::load_log_level(Some(&path)).is_none());
    }

    #[test]
    fn test_retry_from_config() {
        let retry = sample().retry().unwrap();
        assert_eq!(retry.max_retry(), 3);
        assert!(Config::default().retry().is_none());
    }
}
