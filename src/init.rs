use crate::console::ConsoleTarget;
use crate::env::{
    env_flag, env_opt, LOG_SINK_AUDIT_WEBHOOK_URL_ENV, LOG_SINK_BUILD_PATHS_ENV, LOG_SINK_DISABLE_ENV,
    LOG_SINK_JSON_ENV, LOG_SINK_PROJECT_PREFIX_ENV, LOG_SINK_QUIET_ENV, LOG_SINK_TOOLCHAIN_PATHS_ENV,
    LOG_SINK_WEBHOOK_URL_ENV,
};
use crate::layer::LoggerLayer;
use crate::logger::Logger;
use crate::trace::{TraceCollector, TrimRules};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Startup configuration of the [`Logger`].
///
/// **Fields**
/// - `build_paths`: path lists (`:`/`;` separated) of build roots; each
///   root's `src/` prefix is trimmed from trace file names.
/// - `project_prefix`: extra prefix trimmed after the root rules.
/// - `console`: register a [`ConsoleTarget`] for error logs.
/// - `webhook_url` / `audit_webhook_url`: register HTTP targets (feature
///   `http`) for error logs and audit entries.
#[derive(Clone, Debug, Default)]
pub struct LoggerConfig {
    pub json: bool,
    pub quiet: bool,
    pub disabled: bool,
    pub build_paths: Vec<String>,
    pub project_prefix: Option<String>,
    pub console: bool,
    pub webhook_url: Option<String>,
    pub audit_webhook_url: Option<String>,
}

impl LoggerConfig {
    /// Configuration from `LOG_SINK_*` variables, with the cargo registry
    /// and this build's manifest directory as default trim roots.
    pub fn from_env() -> Self {
        let mut build_paths = default_build_paths();
        build_paths.extend(env_opt(LOG_SINK_BUILD_PATHS_ENV));
        build_paths.extend(env_opt(LOG_SINK_TOOLCHAIN_PATHS_ENV));

        LoggerConfig {
            json: env_flag(LOG_SINK_JSON_ENV),
            quiet: env_flag(LOG_SINK_QUIET_ENV),
            disabled: env_flag(LOG_SINK_DISABLE_ENV),
            build_paths,
            project_prefix: env_opt(LOG_SINK_PROJECT_PREFIX_ENV),
            console: true,
            webhook_url: env_opt(LOG_SINK_WEBHOOK_URL_ENV),
            audit_webhook_url: env_opt(LOG_SINK_AUDIT_WEBHOOK_URL_ENV),
        }
    }
}

/// Cargo registry (`$CARGO_HOME/registry`, so `registry/src/` is trimmed)
/// and the manifest directory this crate was built from.
pub fn default_build_paths() -> Vec<String> {
    let cargo_home = std::env::var_os("CARGO_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".cargo")));

    let mut paths = Vec::new();
    if let Some(home) = cargo_home {
        paths.push(home.join("registry").to_string_lossy().into_owned());
    }
    paths.push(env!("CARGO_MANIFEST_DIR").to_string());
    paths
}

/// Build the process logger from `config`.
///
/// Trim rules are computed here, once, before any entry point can run.
/// More targets can be added to the returned logger before it is shared.
pub fn build_logger(config: &LoggerConfig) -> Logger {
    let rules = TrimRules::from_roots(&config.build_paths, config.project_prefix.as_deref());
    let mut logger = Logger::new(TraceCollector::new(rules));

    if config.quiet {
        logger.enable_quiet();
    }
    if config.json {
        logger.enable_json();
    }
    logger.set_disabled(config.disabled);

    if config.console {
        let console = Arc::new(ConsoleTarget::for_logger(&logger));
        logger.add_target(console);
    }

    #[cfg(feature = "http")]
    {
        use crate::http_target::{HttpTarget, HttpTargetConfig};

        if let Some(url) = &config.webhook_url {
            logger.add_target(Arc::new(HttpTarget::new(HttpTargetConfig::new(url.as_str()))));
        }
        if let Some(url) = &config.audit_webhook_url {
            logger.add_audit_target(Arc::new(HttpTarget::new(HttpTargetConfig::new(url.as_str()))));
        }
    }

    #[cfg(not(feature = "http"))]
    {
        if config.webhook_url.is_some() || config.audit_webhook_url.is_some() {
            tracing::warn!("webhook url configured but the `http` feature is disabled");
        }
    }

    logger
}

/// Configuration of the diagnostic `tracing` subscriber.
///
/// **Fields**
/// - `enable_stdout`: if `true`, a `tracing_subscriber::fmt` layer is added
///   next to [`LoggerLayer`]; it prints JSON when the logger is in JSON mode.
#[derive(Clone, Debug)]
pub struct LayerConfig {
    pub enable_stdout: bool,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self { enable_stdout: true }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error("failed to install global subscriber: {0}")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Install the global `tracing` subscriber: [`LoggerLayer`] forwarding
/// `ERROR` events into `logger`, plus an optional console `fmt` layer.
pub fn init_tracing_with_config(logger: Arc<Logger>, config: LayerConfig) -> Result<(), InitError> {
    let json = logger.is_json();
    let plain = (config.enable_stdout && !json).then(|| tracing_subscriber::fmt::layer());
    let structured = (config.enable_stdout && json).then(|| tracing_subscriber::fmt::layer().json());

    let subscriber = Registry::default()
        .with(LoggerLayer::new(logger))
        .with(plain)
        .with(structured);
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Initialize tracing with [`LayerConfig::default`].
pub fn init_tracing(logger: Arc<Logger>) -> Result<(), InitError> {
    init_tracing_with_config(logger, LayerConfig::default())
}
