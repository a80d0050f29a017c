//! Application context.
//!
//! Groups the long-lived state a host needs: configuration, the API facade
//! (with its info cache) and the background worker. Created once at startup
//! and torn down with [`AppContext::shutdown`].

use crate::api::ConanApi;
use crate::backend::{self, ConanBackend};
use crate::config::Config;
use crate::error::BackendError;
use crate::logging;
use crate::paths;
use crate::worker::ConanWorker;
use std::fmt;
use std::sync::Arc;

pub struct AppContext {
    /// Settings the context was started with.
    pub config: Config,
    /// Facade shared with the worker threads.
    pub api: Arc<ConanApi>,
    /// Background install and version queues.
    pub worker: ConanWorker,
}

impl fmt::Debug for AppContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppContext")
            .field("config", &self.config)
            .field("api", &self.api)
            .finish_non_exhaustive()
    }
}

impl AppContext {
    /// Load `config.toml` from the application home, install the log
    /// subscriber and connect to Conan.
    pub fn from_home() -> Result<Self, BackendError> {
        let config = Config::load_or_default(&paths::config_path());
        if let Err(e) = logging::init(&config.log_filter) {
            tracing::debug!("Keeping the existing log subscriber: {e}");
        }
        Self::start(config)
    }

    /// Detect the installed Conan and set everything up.
    ///
    /// # Errors
    ///
    /// Fails if no usable `conan` executable is found.
    pub fn start(config: Config) -> Result<Self, BackendError> {
        let backend = backend::connect(&config)?;
        Ok(Self::with_backend(config, backend))
    }

    /// Set up on top of an existing backend.
    pub fn with_backend(config: Config, backend: Arc<dyn ConanBackend>) -> Self {
        let api = Arc::new(ConanApi::new(backend, &config));
        let worker = ConanWorker::new(Arc::clone(&api), config.enable_version_queue);
        Self {
            config,
            api,
            worker,
        }
    }

    /// Stop the worker, waiting at most `shutdown_timeout_secs`.
    pub fn shutdown(&self) {
        tracing::debug!("Shutting down");
        self.worker.finish_working(self.config.shutdown_timeout());
    }
}
