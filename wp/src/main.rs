//! wp - worker-pool scheduler
//!
//! CLI entry point for running and inspecting the scheduler.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use workpool::cli::{Cli, Command};
use workpool::command::{Argument, ArgumentValue, parse};
use workpool::config::Config;
use workpool::daemon::{build_finder, build_scheduler, build_source};
use workpool::pool::{WorkerSpec, build_pool};
use workpool::process::ShellLauncher;
use workpool::scheduler::{PathWatch, StopReason};

fn parse_level(level_str: Option<&str>) -> tracing::Level {
    match level_str.map(str::to_uppercase).as_deref() {
        Some("TRACE") => tracing::Level::TRACE,
        Some("DEBUG") => tracing::Level::DEBUG,
        Some("INFO") | None => tracing::Level::INFO,
        Some("WARN") | Some("WARNING") => tracing::Level::WARN,
        Some("ERROR") => tracing::Level::ERROR,
        Some(other) => {
            eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", other);
            tracing::Level::INFO
        }
    }
}

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>, to_stderr: bool) -> Result<()> {
    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = parse_level(cli_log_level.or(config_log_level));
    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

    if to_stderr {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .init();
    } else {
        let log_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("workpool")
            .join("logs");

        fs::create_dir_all(&log_dir).context("Failed to create log directory")?;
        let log_file = fs::File::create(log_dir.join("workpool.log")).context("Failed to create log file")?;

        tracing_subscriber::fmt()
            .with_writer(log_file)
            .with_ansi(false)
            .with_env_filter(filter)
            .init();
    }

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());

    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref(), cli.stderr)
        .context("Failed to setup logging")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Run { once } => {
            let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
            cmd_run(&config, once).await
        }
        Command::Check => {
            let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
            cmd_check(&config)
        }
        Command::Find { pattern } => {
            let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
            cmd_find(&config, &pattern).await
        }
        Command::Parse { line } => cmd_parse(&line),
    }
}

/// Path watch over the directory this binary was invoked from
fn invocation_watch() -> Result<PathWatch> {
    let argv0 = std::env::args().next().unwrap_or_default();
    let cwd = match std::env::var_os("PWD") {
        Some(pwd) => PathBuf::from(pwd),
        None => std::env::current_dir().context("Failed to read current directory")?,
    };
    Ok(PathWatch::from_invocation(&argv0, &cwd)?)
}

async fn cmd_run(config: &Config, once: bool) -> Result<()> {
    debug!(once, "cmd_run: called");
    let finder = build_finder(config.finder);
    let source = build_source(&config.source)?;
    let path_watch = if config.scheduler.detect_path_changes && !once {
        Some(invocation_watch()?)
    } else {
        None
    };

    let mut scheduler = build_scheduler(config, finder, Arc::new(ShellLauncher::new()), source, path_watch)?;

    if once {
        let report = scheduler.tick().await?;
        for dispatch in &report.dispatched {
            println!(
                "{} {} {}",
                dispatch.pool.cyan(),
                dispatch.worker.bold(),
                render_arguments(&dispatch.arguments)
            );
        }
        println!("{} dispatched, {} fed to shared pool", report.dispatched.len(), report.shared_feed);
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    spawn_signal_handler(shutdown_tx)?;

    match scheduler.run_until(shutdown_rx).await? {
        StopReason::PathChanged => {
            println!("{}", "Source path has changed, scheduler is ending now".red());
        }
        StopReason::Shutdown => {
            info!("Scheduler stopped");
        }
    }
    Ok(())
}

fn spawn_signal_handler(shutdown_tx: mpsc::Sender<()>) -> Result<()> {
    debug!("spawn_signal_handler: setting up signal handlers");
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::spawn(async move {
            tokio::select! {
                _ = sigint.recv() => {
                    warn!("SIGINT received");
                }
                _ = sigterm.recv() => {
                    warn!("SIGTERM received");
                }
            }
            let _ = shutdown_tx.send(()).await;
        });
    }

    #[cfg(not(unix))]
    {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Ctrl+C received");
            }
            let _ = shutdown_tx.send(()).await;
        });
    }

    Ok(())
}

fn cmd_check(config: &Config) -> Result<()> {
    debug!("cmd_check: called");
    config.validate()?;

    let max_processes = config.scheduler.max_processes;
    let spec = WorkerSpec::new(
        config.worker.template()?,
        config.worker.type_argument.as_str(),
        build_finder(config.finder),
        Arc::new(ShellLauncher::new()),
    );
    println!(
        "{} max-processes={} delay={}s safe={} shared-feed={:?}",
        "scheduler".bold(),
        max_processes,
        config.scheduler.delay_secs,
        config.scheduler.safe,
        config.scheduler.shared_feed
    );

    for entry in &config.pools {
        let pool = build_pool(
            &entry.name,
            &entry.pool_config()?,
            max_processes,
            &spec,
            entry.callback_context(max_processes)?,
        )?;
        let shared = if pool.is_shared() { " (shared)".yellow().to_string() } else { String::new() };
        println!("{} ratio={} workers={}{}", pool.name().cyan().bold(), pool.ratio(), pool.len(), shared);

        for worker in pool.workers() {
            println!("  {}", worker.command().build(true));
        }
    }

    if config.source.command.is_none() {
        println!("{}", "warning: no source.command configured, `wp run` will refuse to start".yellow());
    }
    println!("{}", "config OK".green());
    Ok(())
}

async fn cmd_find(config: &Config, pattern: &str) -> Result<()> {
    debug!(%pattern, "cmd_find: called");
    let found = build_finder(config.finder).find(pattern).await?;
    for process in &found {
        let pid = process.pid.map(|p| p.to_string()).unwrap_or_default();
        println!("{} {}", pid.bold(), process.command.build(false));
    }
    Ok(())
}

fn cmd_parse(line: &str) -> Result<()> {
    debug!(%line, "cmd_parse: called");
    let parsed = parse(line);
    println!("name: {}", parsed.name);
    for argument in &parsed.arguments {
        println!("  {}", describe(argument));
    }
    Ok(())
}

fn describe(argument: &Argument) -> String {
    let kind = if argument.is_positional() {
        "positional"
    } else if argument.is_full_name() {
        "long"
    } else {
        "short"
    };

    match argument.value() {
        Some(ArgumentValue::Text(value)) if argument.is_positional() => format!("{} {}", kind, value),
        Some(ArgumentValue::Text(value)) => format!("{} {}={}", kind, argument.name(), value),
        _ => format!("{} {} (flag)", kind, argument.name()),
    }
}

fn render_arguments(arguments: &[Argument]) -> String {
    arguments.iter().map(Argument::render).collect::<Vec<_>>().join(" ")
}
