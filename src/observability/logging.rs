//! # Structured Logging
//!
//! Logging goes through `tracing`. [`init_logging`] installs a global
//! subscriber with an `EnvFilter` (honouring `RUST_LOG`) and either the plain
//! or the JSON formatter.

use tracing_subscriber::EnvFilter;

use crate::config::ObservabilityConfig;

/// Create the span wrapping one instance's state machine.
///
/// The `decision` field is empty until the machine records it.
///
/// ```rust,ignore
/// let span = instance_span!("prod-orders-db", RunMode::Force);
/// let span = instance_span!("prod-orders-db", RunMode::Force, engine = "postgres");
/// ```
#[macro_export]
macro_rules! instance_span {
    ($instance:expr, $mode:expr) => {
        tracing::info_span!(
            "provision_instance",
            instance = %$instance,
            mode = %$mode,
            decision = tracing::field::Empty
        )
    };
    ($instance:expr, $mode:expr, $($field:tt)*) => {
        tracing::info_span!(
            "provision_instance",
            instance = %$instance,
            mode = %$mode,
            decision = tracing::field::Empty,
            $($field)*
        )
    };
}

/// Install the global subscriber.
///
/// `verbose` raises the default filter to `debug`. An explicit `RUST_LOG`
/// always wins. Installing twice is not an error.
pub fn init_logging(config: &ObservabilityConfig, verbose: bool) {
    let default_level = if verbose { "debug" } else { config.log_level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    let installed = if config.json_logs {
        tracing::subscriber::set_global_default(builder.json().flatten_event(true).finish())
    } else {
        tracing::subscriber::set_global_default(builder.with_target(false).finish())
    };

    if installed.is_err() {
        tracing::debug!("Global subscriber already installed, keeping it");
    }
}

/// Log configuration at startup
pub fn log_config_info(config: &crate::config::AppConfig) {
    tracing::info!(
        username = %config.provisioning.username,
        secret_id_template = %config.provisioning.secret_id_template,
        concurrency = config.provisioning.concurrency,
        inventory_source = ?config.inventory.source,
        secret_backend = ?config.secrets.backend,
        engines = ?config.inventory.engines,
        "credplane configuration"
    );
}
