use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use stallguard_config::{ConfigLoad, ConfigLoadError, ConfigLoader, Settings};
use stallguard_core::{
    BatchCheck, BatchError, BatchSettings, ConfigurationError, DirectoryWatch,
    LogObserver, SmtpMailer, WatchConfig, WatchError, WatchEvent,
    WatchObserver,
};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "stallguard", version)]
#[command(
    about = "Alert when files sit in a hand-off directory for too long"
)]
struct Cli {
    /// Watch the directory and log creations, deletions and renames instead
    /// of running a single check (`-watch` is also accepted)
    #[arg(long)]
    watch: bool,

    /// Path to the TOML configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Path to a .env file loaded before reading the environment
    #[arg(long, value_name = "PATH")]
    env_file: Option<PathBuf>,

    /// Scan and report stalled files without sending an alert
    #[arg(long, conflicts_with = "watch")]
    dry_run: bool,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,
}

const EXIT_STARTUP: u8 = 1;
const EXIT_PATH_UNAVAILABLE: u8 = 3;
const EXIT_CONFIGURATION: u8 = 4;
const EXIT_DELIVERY: u8 = 5;

fn main() -> ExitCode {
    let cli = Cli::parse_from(normalize_args(std::env::args_os()));

    // Load before the subscriber so RUST_LOG from .env takes effect.
    let loaded = load_config(&cli);
    init_tracing(cli.verbose);

    let result = loaded.and_then(|load| {
        log_config_load(&load);
        if cli.watch {
            run_watch(&load.settings)
        } else {
            run_batch(&load.settings, cli.dry_run)
        }
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            // Batch failures are logged where they happen.
            if err.downcast_ref::<BatchError>().is_none() {
                error!("{err:#}");
            }
            ExitCode::from(exit_code(&err))
        }
    }
}

/// Accept the legacy single-dash `-watch` spelling.
fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .map(|arg| {
            if arg == "-watch" {
                OsString::from("--watch")
            } else {
                arg
            }
        })
        .collect()
}

fn load_config(cli: &Cli) -> anyhow::Result<ConfigLoad> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_config_path(path);
    }
    if let Some(path) = &cli.env_file {
        loader = loader.with_env_file(path);
    }
    loader.load().context("failed to load configuration")
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn log_config_load(load: &ConfigLoad) {
    if let Some(path) = &load.config_path {
        info!(path = %path.display(), "configuration loaded");
    }
    for warning in &load.warnings.items {
        match &warning.hint {
            Some(hint) => {
                warn!(
                    message = %warning.message,
                    hint = %hint,
                    "configuration warning"
                )
            }
            None => {
                warn!(message = %warning.message, "configuration warning")
            }
        }
    }
}

fn run_batch(settings: &Settings, dry_run: bool) -> anyhow::Result<()> {
    let mailer = SmtpMailer::new();
    BatchCheck::new(settings, &mailer).dry_run(dry_run).run()?;
    Ok(())
}

fn run_watch(settings: &Settings) -> anyhow::Result<()> {
    let directory = settings.monitored_directory()?;
    let config = WatchConfig {
        recheck_interval: settings.watch_recheck()?,
        ..WatchConfig::default()
    };
    if let Some(interval) = config.recheck_interval {
        info!(
            every = %humantime::format_duration(interval),
            "stalled-file checks enabled while watching"
        );
    }

    let watch = DirectoryWatch::start(&directory, config)?;
    info!(path = %watch.root().display(), "watching for file changes");

    let mut observer = WatchLog {
        log: LogObserver,
        settings,
        mailer: SmtpMailer::new(),
    };
    match watch.run(&mut observer) {
        Ok(never) => match never {},
        Err(err) => Err(err.into()),
    }
}

/// Logs watch events and runs the batch check whenever a re-check is due.
struct WatchLog<'a> {
    log: LogObserver,
    settings: &'a Settings,
    mailer: SmtpMailer,
}

impl std::fmt::Debug for WatchLog<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchLog").finish_non_exhaustive()
    }
}

impl WatchObserver for WatchLog<'_> {
    fn on_event(&mut self, event: &WatchEvent) {
        self.log.on_event(event);
    }

    fn on_error(&mut self, error: &WatchError) {
        self.log.on_error(error);
    }

    fn on_recheck(&mut self) {
        // Failures are already logged by the check; watching carries on.
        if let Err(err) = BatchCheck::new(self.settings, &self.mailer).run() {
            debug!("periodic check failed: {err}");
        }
    }
}

fn exit_code(err: &anyhow::Error) -> u8 {
    if let Some(batch) = err.downcast_ref::<BatchError>() {
        return match batch {
            BatchError::PathUnavailable { .. } => EXIT_PATH_UNAVAILABLE,
            BatchError::Configuration(_) => EXIT_CONFIGURATION,
            BatchError::Delivery(_) => EXIT_DELIVERY,
        };
    }
    if let Some(watch) = err.downcast_ref::<WatchError>() {
        return match watch {
            WatchError::PathUnavailable { .. } => EXIT_PATH_UNAVAILABLE,
            _ => EXIT_STARTUP,
        };
    }
    if err.downcast_ref::<ConfigurationError>().is_some()
        || err.downcast_ref::<ConfigLoadError>().is_some()
    {
        return EXIT_CONFIGURATION;
    }
    EXIT_STARTUP
}
