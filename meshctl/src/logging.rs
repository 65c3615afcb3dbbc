//! Tracing setup with a runtime-swappable filter.

use std::sync::Mutex;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, reload};

use crate::error::Error;

/// Something that can replace the active log filter
pub trait LogLevelControl: Send + Sync {
    fn apply(&self, directive: &str) -> eyre::Result<()>;

    fn current(&self) -> String;
}

/// Handle onto the reloadable `EnvFilter` installed by [`init`]
pub struct LogHandle {
    handle: reload::Handle<EnvFilter, tracing_subscriber::Registry>,
    current: Mutex<String>,
}

impl std::fmt::Debug for LogHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogHandle")
            .field("current", &self.current())
            .finish()
    }
}

impl LogHandle {
    pub fn new(
        handle: reload::Handle<EnvFilter, tracing_subscriber::Registry>,
        current: impl Into<String>,
    ) -> Self {
        Self {
            handle,
            current: Mutex::new(current.into()),
        }
    }
}

impl LogLevelControl for LogHandle {
    fn apply(&self, directive: &str) -> eyre::Result<()> {
        let filter = EnvFilter::try_new(directive)?;
        self.handle.reload(filter)?;
        *self
            .current
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = directive.to_string();
        tracing::info!(directive, "log filter changed");
        Ok(())
    }

    fn current(&self) -> String {
        self.current
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

/// Install the global subscriber. `RUST_LOG` overrides `default_filter`.
pub fn init(default_filter: &str) -> eyre::Result<LogHandle> {
    let (filter, directive) = match std::env::var("RUST_LOG") {
        Ok(env) if !env.is_empty() => (EnvFilter::try_new(&env)?, env),
        _ => (EnvFilter::try_new(default_filter)?, default_filter.to_string()),
    };
    let (layer, handle) = reload::Layer::new(filter);
    tracing_subscriber::registry()
        .with(layer)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init()?;
    Ok(LogHandle::new(handle, directive))
}

/// Build a filter directive from an optional target namespace and a level
pub fn directive(namespace: Option<&str>, level: &str) -> Result<String, Error> {
    let level = level.trim().to_ascii_lowercase();
    level
        .parse::<LevelFilter>()
        .map_err(|_| Error::InvalidArguments(format!("unknown log level '{level}'")))?;

    let directive = match namespace.map(str::trim).filter(|n| !n.is_empty()) {
        Some(namespace) => {
            let valid = namespace
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | ':' | '-'));
            if !valid {
                return Err(Error::InvalidArguments(format!(
                    "invalid log namespace '{namespace}'"
                )));
            }
            format!("{namespace}={level}")
        }
        None => level,
    };
    Ok(directive)
}
