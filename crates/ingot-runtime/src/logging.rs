//! Logging setup.
//!
//! A thin builder over `tracing-subscriber`: an `EnvFilter` directive from
//! configuration (with `RUST_LOG` taking precedence when set) and a compact
//! fmt layer, optionally mirrored into a file through a non-blocking
//! appender.
//!
//! ```rust,ignore
//! let config = BotConfig::load()?;
//! let _guard = logging::init_from_config(&config.logging);
//! ```

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Builder for the global tracing subscriber.
#[derive(Debug, Default)]
pub struct LoggingBuilder {
    directive: String,
    file: Option<std::path::PathBuf>,
}

impl LoggingBuilder {
    pub fn new() -> Self {
        Self {
            directive: "info".to_owned(),
            file: None,
        }
    }

    /// Sets the fallback filter directive (ignored when `RUST_LOG` is set).
    pub fn directive(mut self, directive: impl Into<String>) -> Self {
        self.directive = directive.into();
        self
    }

    /// Mirrors output into `path` instead of stderr.
    pub fn file(mut self, path: Option<std::path::PathBuf>) -> Self {
        self.file = path;
        self
    }

    /// Installs the global subscriber.
    ///
    /// Returns the appender guard when logging to a file; hold it for the
    /// process lifetime or buffered lines are lost on exit.  Installing a
    /// second subscriber (tests) is a silent no-op.
    pub fn init(self) -> Option<WorkerGuard> {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.directive));

        match self.file {
            Some(path) => {
                let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
                let name = path.file_name().map(std::path::PathBuf::from);
                let appender = tracing_appender::rolling::never(
                    dir.unwrap_or_else(|| std::path::Path::new(".")),
                    name.unwrap_or_else(|| std::path::PathBuf::from("bot.log")),
                );
                let (writer, guard) = tracing_appender::non_blocking(appender);
                tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_writer(writer)
                    .with_ansi(false)
                    .try_init()
                    .ok();
                Some(guard)
            }
            None => {
                tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .try_init()
                    .ok();
                None
            }
        }
    }
}

/// Initializes logging from the loaded configuration section.
pub fn init_from_config(config: &LoggingConfig) -> Option<WorkerGuard> {
    LoggingBuilder::new()
        .directive(config.directive.clone())
        .file(config.file.clone())
        .init()
}
