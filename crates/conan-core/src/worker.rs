//! Background install and version discovery.
//!
//! Two FIFO queues, each drained by at most one thread. A thread is spawned
//! on the first enqueue after its queue went idle and exits once the queue
//! is empty. Results are reported through a per-item callback, invoked on
//! the worker thread with `(canonical_reference, package_id)`.
//!
//! Cancellation is cooperative: [`ConanWorker::finish_working`] raises a
//! flag that is checked before the next item is taken. An item already
//! taken runs to completion and reports back. If it outlives the timeout
//! its thread is abandoned and stays silent.

use crate::api::ConanApi;
use conan_schema::{BinaryReference, Options, PackageReference, Settings};
use parking_lot::{Condvar, Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Completion callback: `(canonical_reference, package_id)`.
pub type WorkerCallback = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// One unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConanWorkerElement {
    /// `reference` or `reference:package_id`. With an id, options, settings
    /// and `auto_install` are ignored.
    pub ref_pkg_id: String,
    #[serde(default)]
    pub options: Options,
    #[serde(default)]
    pub settings: Settings,
    /// Profile to install with instead of the default one.
    #[serde(default)]
    pub profile: String,
    /// Check remotes for newer recipes and binaries.
    #[serde(default)]
    pub update: bool,
    /// Pick the best matching binary instead of the exact configuration.
    #[serde(default = "default_auto_install")]
    pub auto_install: bool,
}

fn default_auto_install() -> bool {
    true
}

impl ConanWorkerElement {
    /// Auto-installing element without options.
    pub fn new(ref_pkg_id: impl Into<String>) -> Self {
        Self {
            ref_pkg_id: ref_pkg_id.into(),
            options: Options::new(),
            settings: Settings::new(),
            profile: String::new(),
            update: false,
            auto_install: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueueKind {
    Install,
    Version,
}

impl QueueKind {
    fn name(self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Version => "version",
        }
    }
}

struct Job {
    element: ConanWorkerElement,
    callback: Option<WorkerCallback>,
}

#[derive(Default)]
struct QueueState {
    jobs: VecDeque<Job>,
    /// Epoch of the live consumer thread, if any.
    running: Option<u64>,
    handle: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct Queue {
    state: Mutex<QueueState>,
    idle: Condvar,
}

impl Queue {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock()
    }
}

struct Shared {
    api: Arc<ConanApi>,
    install: Queue,
    version: Queue,
    shutdown: AtomicBool,
    /// Bumped by every `finish_working`; threads from an older epoch stay silent.
    epoch: AtomicU64,
}

impl Shared {
    fn queue(&self, kind: QueueKind) -> &Queue {
        match kind {
            QueueKind::Install => &self.install,
            QueueKind::Version => &self.version,
        }
    }

    /// A thread of an older epoch was abandoned by `finish_working`.
    fn detached(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) != epoch
    }

    /// Work on `first`, then on queued jobs until the queue is empty or
    /// shutdown is requested.
    fn drain(&self, kind: QueueKind, epoch: u64, first: Job) {
        let queue = self.queue(kind);
        let mut next = Some(first);
        loop {
            let job = if let Some(job) = next.take() {
                job
            } else {
                let mut state = queue.lock();
                let popped = if self.shutdown.load(Ordering::SeqCst) || self.detached(epoch) {
                    None
                } else {
                    state.jobs.pop_front()
                };
                let Some(job) = popped else {
                    if state.running == Some(epoch) {
                        state.running = None;
                    }
                    queue.idle.notify_all();
                    return;
                };
                job
            };

            let ref_pkg_id = job.element.ref_pkg_id.clone();
            let outcome = catch_unwind(AssertUnwindSafe(|| match kind {
                QueueKind::Install => self.process_install(&job.element),
                QueueKind::Version => self.process_version(&job.element),
            }));
            let result = match outcome {
                Ok(Some(result)) => result,
                Ok(None) => continue,
                Err(_) => {
                    tracing::error!("Worker panicked while working on {ref_pkg_id}");
                    continue;
                }
            };
            tracing::debug!("Finish working on {ref_pkg_id}");

            let Some(callback) = job.callback else { continue };
            let (reference, package_id) = result;
            if self.detached(epoch) {
                tracing::debug!("Dropping result for {reference}, the worker was stopped");
                continue;
            }
            if catch_unwind(AssertUnwindSafe(|| callback(&reference, &package_id))).is_err() {
                tracing::error!("Callback for {reference} panicked");
            }
        }
    }

    /// `(canonical_reference, package_id)`; the id is empty if nothing was installed.
    fn process_install(&self, element: &ConanWorkerElement) -> Option<(String, String)> {
        let api = &self.api;
        if element.ref_pkg_id.contains(':') {
            let binary = BinaryReference::parse(&element.ref_pkg_id)
                .inspect_err(|e| tracing::warn!("Skipping '{}': {e}", element.ref_pkg_id))
                .ok()?;
            let installed = match api.get_remote_pkg_from_id(&binary) {
                Some(package) => api.install_package(&binary.reference, &package, element.update),
                None => {
                    tracing::warn!("Can't find package {binary} in any remote");
                    None
                }
            };
            return Some((
                binary.reference.canonical(),
                installed.map(|i| i.package_id).unwrap_or_default(),
            ));
        }

        let reference = parse_reference(&element.ref_pkg_id)?;
        let installed = if element.auto_install {
            api.get_path_or_auto_install(&reference, &element.options, element.update)
        } else {
            api.install_reference(
                &reference,
                &element.settings,
                &element.options,
                &element.profile,
                element.update,
            )
        };
        Some((
            reference.canonical(),
            installed.map(|i| i.package_id).unwrap_or_default(),
        ))
    }

    fn process_version(&self, element: &ConanWorkerElement) -> Option<(String, String)> {
        let text = element
            .ref_pkg_id
            .split_once(':')
            .map_or(element.ref_pkg_id.as_str(), |(reference, _)| reference);
        let reference = parse_reference(text)?;
        let alternatives = self.api.search_recipe_alternatives_in_remotes(&reference);
        tracing::debug!("Found {} alternatives of {reference}", alternatives.len());
        Some((reference.canonical(), String::new()))
    }
}

fn parse_reference(text: &str) -> Option<PackageReference> {
    PackageReference::parse(text)
        .inspect_err(|e| tracing::warn!("Skipping '{text}': {e}"))
        .ok()
}

/// Runs installs and version searches off the calling thread.
pub struct ConanWorker {
    shared: Arc<Shared>,
    enable_version_queue: bool,
}

impl fmt::Debug for ConanWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConanWorker")
            .field("enable_version_queue", &self.enable_version_queue)
            .finish_non_exhaustive()
    }
}

impl ConanWorker {
    pub fn new(api: Arc<ConanApi>, enable_version_queue: bool) -> Self {
        Self {
            shared: Arc::new(Shared {
                api,
                install: Queue::default(),
                version: Queue::default(),
                shutdown: AtomicBool::new(false),
                epoch: AtomicU64::new(0),
            }),
            enable_version_queue,
        }
    }

    /// Queue every element for install and, if enabled, version discovery.
    pub fn update_all_info(&self, elements: Vec<ConanWorkerElement>, callback: Option<WorkerCallback>) {
        for element in elements {
            if self.enable_version_queue {
                self.put_ref_in_version_queue(element.clone(), callback.clone());
            }
            self.put_ref_in_install_queue(element, callback.clone());
        }
    }

    pub fn put_ref_in_install_queue(&self, element: ConanWorkerElement, callback: Option<WorkerCallback>) {
        self.enqueue(QueueKind::Install, Job { element, callback });
    }

    pub fn put_ref_in_version_queue(&self, element: ConanWorkerElement, callback: Option<WorkerCallback>) {
        self.enqueue(QueueKind::Version, Job { element, callback });
    }

    fn enqueue(&self, kind: QueueKind, job: Job) {
        let queue = self.shared.queue(kind);
        let mut state = queue.lock();
        if state.running.is_some() {
            state.jobs.push_back(job);
            return;
        }

        // the previous consumer cleared `running` on its way out
        if let Some(handle) = state.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("The previous {} worker panicked", kind.name());
            }
        }
        // a fresh consumer owns its first job from the start
        let ref_pkg_id = job.element.ref_pkg_id.clone();
        let shared = Arc::clone(&self.shared);
        let epoch = self.shared.epoch.load(Ordering::SeqCst);
        let spawned = thread::Builder::new()
            .name(format!("conan-{}", kind.name()))
            .spawn(move || shared.drain(kind, epoch, job));
        match spawned {
            Ok(handle) => {
                state.running = Some(epoch);
                state.handle = Some(handle);
            }
            Err(e) => tracing::error!("Can't start the {} worker, dropping {ref_pkg_id}: {e}", kind.name()),
        }
    }

    /// Block until both queues are drained, or `timeout` passed.
    ///
    /// Returns whether the worker is idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        for queue in [&self.shared.install, &self.shared.version] {
            let mut state = queue.lock();
            let remaining = deadline.saturating_duration_since(Instant::now());
            queue.idle.wait_while_for(
                &mut state,
                |s| s.running.is_some() || !s.jobs.is_empty(),
                remaining,
            );
            if state.running.is_some() || !state.jobs.is_empty() {
                return false;
            }
        }
        true
    }

    /// Whether a consumer thread is alive for either queue.
    pub fn is_running(&self) -> bool {
        self.shared.install.lock().running.is_some() || self.shared.version.lock().running.is_some()
    }

    /// Stop both queues, waiting up to `timeout` for the current items.
    ///
    /// Items already taken finish and report back; pending items are
    /// dropped. A thread stuck in a backend call past the timeout is left
    /// behind and never reports back. The worker can be used again afterwards.
    pub fn finish_working(&self, timeout: Duration) {
        let shared = &self.shared;
        shared.shutdown.store(true, Ordering::SeqCst);
        let deadline = Instant::now() + timeout;

        for kind in [QueueKind::Install, QueueKind::Version] {
            let handle = shared.queue(kind).lock().handle.take();
            let Some(handle) = handle else { continue };
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(10));
            }
            if !handle.is_finished() {
                tracing::warn!("The {} worker did not stop in time, detaching it", kind.name());
                continue;
            }
            if handle.join().is_err() {
                tracing::warn!("The {} worker panicked", kind.name());
            }
        }

        let stale = shared.epoch.fetch_add(1, Ordering::SeqCst);
        for kind in [QueueKind::Install, QueueKind::Version] {
            let queue = shared.queue(kind);
            let mut state = queue.lock();
            let dropped = state.jobs.len();
            state.jobs.clear();
            // consumers of older epochs are detached and never clear this themselves
            if state.running.is_some_and(|e| e <= stale) {
                state.running = None;
            }
            queue.idle.notify_all();
            if dropped > 0 {
                tracing::debug!("Dropped {dropped} pending {} items", kind.name());
            }
        }
        shared.shutdown.store(false, Ordering::SeqCst);
    }
}
