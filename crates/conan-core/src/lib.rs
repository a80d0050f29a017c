pub mod api;
pub mod backend;
pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod paths;
pub mod worker;

pub use api::{ConanApi, InstalledPackage};
pub use backend::{ConanBackend, InstallRequest};
pub use cache::InfoCache;
pub use config::Config;
pub use context::AppContext;
pub use error::BackendError;
pub use worker::{ConanWorker, ConanWorkerElement, WorkerCallback};
