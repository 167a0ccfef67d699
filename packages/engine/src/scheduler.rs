//! Bounded worker pool running transfer jobs.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, unbounded};
use game_transfer_copy::{CopyResult, FileSystem, LocalFileSystem, copy_tree, estimate_tree_size};
use game_transfer_power::{SleepBackend, SleepInhibitor};

use crate::error::EngineError;
use crate::job::{JobId, JobOutcome, JobState, TransferJob};
use crate::monitor::ProgressMonitor;
use crate::snapshot::ProgressSnapshot;

/// Default number of transfers allowed to run at once.
pub const DEFAULT_WORKERS: usize = 2;

/// Default progress sampling interval.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Shortest sampling interval; smaller values are raised to this.
pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(10);

/// Default time [`Scheduler::shutdown`] waits for running copies to stop.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Number of retired jobs whose final state is kept for lookups.
pub const RETIRED_LIMIT: usize = 256;

/// Scheduler tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Maximum number of jobs running at once (at least 1).
    pub workers: usize,
    /// How often the progress monitor samples jobs (at least
    /// [`MIN_TICK_INTERVAL`]).
    pub tick_interval: Duration,
    /// How long shutdown waits for in-flight copies before returning.
    pub shutdown_timeout: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            tick_interval: DEFAULT_TICK_INTERVAL,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

/// A queued or running job as tracked by the scheduler.
struct Entry {
    job: Arc<TransferJob>,
    state: JobState,
    subscribers: Vec<Sender<ProgressSnapshot>>,
}

/// What is remembered about a job after it retires.
struct Retired {
    state: JobState,
    snapshot: ProgressSnapshot,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    /// Queued and running jobs, in submission order.
    jobs: BTreeMap<JobId, Entry>,
    queue: VecDeque<JobId>,
    running: usize,
    /// Jobs between leaving `jobs` and releasing their sleep reference.
    retiring: usize,
    /// The last [`RETIRED_LIMIT`] retired jobs, oldest first in `retired_order`.
    retired: HashMap<JobId, Retired>,
    retired_order: VecDeque<JobId>,
    listeners: Vec<Sender<ProgressSnapshot>>,
    shut_down: bool,
}

impl Inner {
    fn is_idle(&self) -> bool {
        self.jobs.is_empty() && self.retiring == 0
    }

    /// Send `snapshot` to every global listener, dropping disconnected ones.
    fn broadcast(&mut self, snapshot: &ProgressSnapshot) {
        self.listeners.retain(|tx| tx.send(snapshot.clone()).is_ok());
    }

    /// Deliver a job's last snapshot and close its subscriptions.
    fn publish_terminal(&mut self, entry: Entry, snapshot: ProgressSnapshot) {
        for tx in entry.subscribers {
            let _ = tx.send(snapshot.clone());
        }
        self.broadcast(&snapshot);

        let id = entry.job.id();
        self.retired.insert(
            id,
            Retired {
                state: entry.state,
                snapshot,
            },
        );
        self.retired_order.push_back(id);
        while self.retired_order.len() > RETIRED_LIMIT {
            if let Some(oldest) = self.retired_order.pop_front() {
                self.retired.remove(&oldest);
            }
        }
    }
}

/// State shared between the scheduler handle, its workers and the monitor.
pub(crate) struct Shared {
    fs: Arc<dyn FileSystem>,
    inhibitor: SleepInhibitor,
    pool: rayon::ThreadPool,
    capacity: usize,
    inner: Mutex<Inner>,
    idle: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sample every queued and running job and push the snapshots out.
    pub(crate) fn publish_samples(&self) {
        let mut inner = self.lock();
        let Inner {
            jobs, listeners, ..
        } = &mut *inner;

        for entry in jobs.values_mut() {
            let snapshot = ProgressSnapshot::sample(&entry.job, entry.state);
            entry
                .subscribers
                .retain(|tx| tx.send(snapshot.clone()).is_ok());
            listeners.retain(|tx| tx.send(snapshot.clone()).is_ok());
        }
    }

    /// Move queued jobs into free worker slots, in FIFO order.
    ///
    /// Each started job takes its sleep reference here, under the same lock
    /// that counts it as running, so a concurrent retirement can never see the
    /// count drop to zero while a dispatched job is about to start. Must be
    /// followed by [`Self::launch`] once the lock is dropped.
    fn dispatch(&self, inner: &mut Inner) -> Vec<Arc<TransferJob>> {
        let mut started = Vec::new();
        if inner.shut_down {
            return started;
        }

        while inner.running < self.capacity {
            let Some(id) = inner.queue.pop_front() else {
                break;
            };
            let Some(entry) = inner.jobs.get_mut(&id) else {
                continue;
            };

            entry.state = JobState::Running;
            inner.running += 1;
            self.inhibitor.acquire();
            started.push(Arc::clone(&entry.job));
        }

        started
    }

    /// Start dispatched jobs on the worker pool.
    fn launch(self: &Arc<Self>, jobs: Vec<Arc<TransferJob>>) {
        for job in jobs {
            let shared = Arc::clone(self);
            self.pool.spawn(move || shared.run(&job));
        }
    }

    /// Worker body: size the tree in the background and copy it.
    fn run(self: &Arc<Self>, job: &Arc<TransferJob>) {
        job.mark_started();
        log::info!(
            "Starting download for game {}, from {} to {}",
            job.name(),
            job.source().display(),
            job.destination().display()
        );

        self.spawn_estimator(job);

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            copy_tree(
                &*self.fs,
                job.source(),
                job.destination(),
                job.tracker(),
                job.cancel_token(),
            )
        }));

        let outcome = match result {
            Ok(Ok(CopyResult::Completed(stats))) => {
                log::info!(
                    "Downloaded {}: {} files copied, {} already present",
                    job.name(),
                    stats.files_copied,
                    stats.files_skipped
                );
                JobOutcome::Completed
            }
            Ok(Ok(CopyResult::Cancelled(_))) => {
                log::info!("Download task for {} cancelled", job.name());
                JobOutcome::Cancelled
            }
            Ok(Err(e)) => {
                log::error!("Could not copy files for {}: {e}", job.name());
                JobOutcome::Failed(e.to_string())
            }
            Err(_) => {
                log::error!("Download task for {} panicked", job.name());
                JobOutcome::Failed("transfer panicked".to_string())
            }
        };

        self.retire(job, &outcome);
    }

    fn spawn_estimator(&self, job: &Arc<TransferJob>) {
        let fs = Arc::clone(&self.fs);
        let job_ref = Arc::clone(job);

        let spawned = thread::Builder::new()
            .name(format!("size-{}", job.id()))
            .spawn(move || {
                if let Some(total) =
                    estimate_tree_size(&*fs, job_ref.source(), job_ref.size_cancel_token())
                {
                    job_ref.tracker().set_total(total);
                }
            });

        if let Err(e) = spawned {
            log::warn!("Could not start size estimation for {}: {e}", job.name());
        }
    }

    /// Take a finished job off its worker and hand the slot to the next one.
    ///
    /// Queued jobs are dispatched, taking their sleep references, before this
    /// job's reference is released, so sleep stays prevented across the handoff.
    fn retire(self: &Arc<Self>, job: &TransferJob, outcome: &JobOutcome) {
        job.mark_finished();

        let started = {
            let mut inner = self.lock();
            inner.running = inner.running.saturating_sub(1);
            inner.retiring += 1;

            if let Some(mut entry) = inner.jobs.remove(&job.id()) {
                entry.state = outcome.state();
                let snapshot = ProgressSnapshot::terminal(job, outcome);
                inner.publish_terminal(entry, snapshot);
            }

            self.dispatch(&mut inner)
        };

        self.launch(started);
        self.inhibitor.release();

        let idle = {
            let mut inner = self.lock();
            inner.retiring -= 1;
            inner.is_idle()
        };
        if idle {
            self.idle.notify_all();
        }
    }
}

/// Runs transfers on a bounded pool and reports their progress.
///
/// At most `workers` jobs run at once; the rest wait in submission order. The
/// sleep inhibitor is held from the first job starting until the last one
/// retires.
pub struct Scheduler {
    shared: Arc<Shared>,
    monitor: Mutex<Option<ProgressMonitor>>,
    tick_interval: Duration,
    shutdown_timeout: Duration,
}

impl Scheduler {
    /// Create a scheduler over `fs`, preventing sleep through `backend`.
    ///
    /// # Errors
    ///
    /// * If the worker pool cannot be built
    /// * If the progress monitor thread cannot be started
    pub fn new(
        fs: Arc<dyn FileSystem>,
        backend: Box<dyn SleepBackend>,
        options: EngineOptions,
    ) -> Result<Self, EngineError> {
        let capacity = options.workers.max(1);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(capacity)
            .thread_name(|i| format!("transfer-worker-{i}"))
            .build()?;

        let shared = Arc::new(Shared {
            fs,
            inhibitor: SleepInhibitor::new(backend),
            pool,
            capacity,
            inner: Mutex::new(Inner::default()),
            idle: Condvar::new(),
        });

        let tick_interval = options.tick_interval.max(MIN_TICK_INTERVAL);
        let monitor = ProgressMonitor::spawn(Arc::clone(&shared), tick_interval)
            .map_err(EngineError::Monitor)?;

        log::debug!("Scheduler started with {capacity} workers, ticking every {tick_interval:?}");

        Ok(Self {
            shared,
            monitor: Mutex::new(Some(monitor)),
            tick_interval,
            shutdown_timeout: options.shutdown_timeout,
        })
    }

    /// Create a scheduler over the local filesystem.
    ///
    /// # Errors
    ///
    /// * If the worker pool cannot be built
    /// * If the progress monitor thread cannot be started
    pub fn local(
        backend: Box<dyn SleepBackend>,
        options: EngineOptions,
    ) -> Result<Self, EngineError> {
        Self::new(Arc::new(LocalFileSystem::new()), backend, options)
    }

    /// Number of jobs allowed to run at once.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Interval the progress monitor samples at.
    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// Submit a transfer of `source` into `destination_root/<source name>`.
    ///
    /// The destination folder is created before this returns. The job starts
    /// at once if a worker is free and is queued otherwise.
    ///
    /// # Errors
    ///
    /// * If `source` has no folder name
    /// * If the destination folder cannot be created
    /// * If the scheduler has been shut down
    pub fn submit(
        &self,
        source: impl AsRef<Path>,
        destination_root: impl AsRef<Path>,
    ) -> Result<JobId, EngineError> {
        let source = source.as_ref();
        let destination_root = destination_root.as_ref();

        if self.shared.lock().shut_down {
            return Err(EngineError::ShutDown);
        }

        let name = source
            .file_name()
            .ok_or_else(|| EngineError::InvalidSource {
                path: source.to_path_buf(),
            })?
            .to_string_lossy()
            .to_string();
        let destination = destination_root.join(&name);

        log::debug!(
            "Create folder for game in target {} if it doesn't exist",
            destination.display()
        );
        if !self.shared.fs.is_dir(&destination) {
            self.shared
                .fs
                .create_dir_all(&destination)
                .map_err(|e| EngineError::DestinationSetup {
                    path: destination.clone(),
                    source: e,
                })?;
        }

        let (id, started) = {
            let mut inner = self.shared.lock();
            if inner.shut_down {
                return Err(EngineError::ShutDown);
            }

            inner.next_id += 1;
            let id = JobId::new(inner.next_id);
            let job = Arc::new(TransferJob::new(
                id,
                name,
                source.to_path_buf(),
                destination,
            ));

            log::info!("Downloading {} ({id})", job.name());
            inner.jobs.insert(
                id,
                Entry {
                    job,
                    state: JobState::Queued,
                    subscribers: Vec::new(),
                },
            );
            inner.queue.push_back(id);

            (id, self.shared.dispatch(&mut inner))
        };

        self.shared.launch(started);
        Ok(id)
    }

    /// Cancel a job.
    ///
    /// A queued job is removed without ever starting. A running job stops at
    /// the next directory or file boundary. Returns `false` if the job is
    /// unknown or already retired.
    pub fn cancel(&self, id: JobId) -> bool {
        let idle = {
            let mut inner = self.shared.lock();

            let Some(state) = inner.jobs.get(&id).map(|entry| {
                entry.job.cancel();
                entry.state
            }) else {
                return false;
            };

            if state != JobState::Queued {
                log::info!("Cancelling running job {id}");
                return true;
            }

            log::info!("Cancelling queued job {id}");
            inner.queue.retain(|queued| *queued != id);
            if let Some(mut entry) = inner.jobs.remove(&id) {
                entry.state = JobState::Cancelled;
                let snapshot = ProgressSnapshot::terminal(&entry.job, &JobOutcome::Cancelled);
                inner.publish_terminal(entry, snapshot);
            }
            inner.is_idle()
        };

        if idle {
            self.shared.idle.notify_all();
        }
        true
    }

    /// Stream of snapshots for one job.
    ///
    /// The current snapshot is sent at once and then one per monitor tick. The
    /// stream ends after the terminal snapshot; for a job that has already
    /// retired it yields only that snapshot.
    ///
    /// # Errors
    ///
    /// * If no job with this id was submitted, or it retired more than
    ///   [`RETIRED_LIMIT`] retirements ago
    pub fn subscribe(&self, id: JobId) -> Result<Receiver<ProgressSnapshot>, EngineError> {
        let (tx, rx) = unbounded();
        let mut inner = self.shared.lock();

        if let Some(entry) = inner.jobs.get_mut(&id) {
            let _ = tx.send(ProgressSnapshot::sample(&entry.job, entry.state));
            entry.subscribers.push(tx);
            return Ok(rx);
        }

        if let Some(retired) = inner.retired.get(&id) {
            let _ = tx.send(retired.snapshot.clone());
            return Ok(rx);
        }

        Err(EngineError::UnknownJob(id))
    }

    /// Stream of snapshots for every job, including terminal ones.
    ///
    /// Starts with the current snapshot of each active job. Ends on shutdown.
    #[must_use]
    pub fn subscribe_all(&self) -> Receiver<ProgressSnapshot> {
        let (tx, rx) = unbounded();
        let mut inner = self.shared.lock();

        if !inner.shut_down {
            for entry in inner.jobs.values() {
                let _ = tx.send(ProgressSnapshot::sample(&entry.job, entry.state));
            }
            inner.listeners.push(tx);
        }

        rx
    }

    /// Current state of a job, including the last [`RETIRED_LIMIT`] retired ones.
    #[must_use]
    pub fn state(&self, id: JobId) -> Option<JobState> {
        let inner = self.shared.lock();
        inner
            .jobs
            .get(&id)
            .map(|entry| entry.state)
            .or_else(|| inner.retired.get(&id).map(|retired| retired.state))
    }

    /// Current snapshot of a job, including the last [`RETIRED_LIMIT`] retired
    /// ones.
    #[must_use]
    pub fn snapshot(&self, id: JobId) -> Option<ProgressSnapshot> {
        let inner = self.shared.lock();
        inner
            .jobs
            .get(&id)
            .map(|entry| ProgressSnapshot::sample(&entry.job, entry.state))
            .or_else(|| inner.retired.get(&id).map(|retired| retired.snapshot.clone()))
    }

    /// Queued and running jobs, in submission order.
    #[must_use]
    pub fn active_jobs(&self) -> Vec<JobId> {
        self.shared.lock().jobs.keys().copied().collect()
    }

    /// Number of jobs currently running.
    #[must_use]
    pub fn running_jobs(&self) -> usize {
        self.shared.lock().running
    }

    /// Whether system sleep is currently being prevented.
    #[must_use]
    pub fn is_preventing_sleep(&self) -> bool {
        self.shared.inhibitor.is_preventing()
    }

    /// Block until no job is queued or running.
    pub fn wait_idle(&self) {
        let mut inner = self.shared.lock();
        while !inner.is_idle() {
            inner = self
                .shared
                .idle
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Block until no job is queued or running, or `timeout` passes.
    ///
    /// Returns `true` if the scheduler became idle.
    #[must_use]
    pub fn wait_idle_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inner = self.shared.lock();

        while !inner.is_idle() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            inner = self
                .shared
                .idle
                .wait_timeout(inner, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }

        true
    }

    /// Cancel everything and release sleep prevention.
    ///
    /// Queued jobs retire as cancelled at once and running jobs are cancelled.
    /// Sleep is allowed again straight away, before waiting for anything, so
    /// a copy stuck on a slow file cannot keep the machine awake. Running jobs
    /// are then waited for up to the configured shutdown timeout; any still
    /// going after that finish in the background. Only the first call does
    /// anything.
    pub fn shutdown(&self) {
        {
            let mut inner = self.shared.lock();
            if inner.shut_down {
                return;
            }
            inner.shut_down = true;
            log::info!("Shutting down scheduler");

            for entry in inner.jobs.values() {
                entry.job.cancel();
            }

            let queued: Vec<JobId> = inner.queue.drain(..).collect();
            for id in queued {
                if let Some(mut entry) = inner.jobs.remove(&id) {
                    entry.state = JobState::Cancelled;
                    let snapshot = ProgressSnapshot::terminal(&entry.job, &JobOutcome::Cancelled);
                    inner.publish_terminal(entry, snapshot);
                }
            }
        }

        self.shared.inhibitor.shutdown();

        let monitor = self
            .monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(monitor) = monitor {
            monitor.stop();
        }

        if !self.wait_idle_timeout(self.shutdown_timeout) {
            log::warn!(
                "Transfers still stopping after {:?}; leaving them to finish in the background",
                self.shutdown_timeout
            );
        }

        self.shared.lock().listeners.clear();
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.shared.lock();
        f.debug_struct("Scheduler")
            .field("capacity", &self.shared.capacity)
            .field("running", &inner.running)
            .field("queued", &inner.queue.len())
            .field("shut_down", &inner.shut_down)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::ProgressStatus;
    use crate::test_support::{Calls, GatedFs, RecordingBackend, make_game, wait_until};
    use game_transfer_power::PowerError;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{OnceLock, Weak};
    use tempfile::TempDir;

    const TIMEOUT: Duration = Duration::from_secs(10);

    fn options(workers: usize) -> EngineOptions {
        EngineOptions {
            workers,
            tick_interval: Duration::from_millis(10),
            shutdown_timeout: TIMEOUT,
        }
    }

    #[test]
    fn test_submit_copies_tree() {
        let dir = TempDir::new().unwrap();
        let source = make_game(&dir.path().join("remote"), "Portal", &[("a", 100), ("b", 200)]);
        let local = dir.path().join("local");
        let (backend, calls) = RecordingBackend::new();

        let scheduler = Scheduler::local(Box::new(backend), options(2)).unwrap();
        let id = scheduler.submit(&source, &local).unwrap();
        let rx = scheduler.subscribe(id).unwrap();

        assert!(scheduler.wait_idle_timeout(TIMEOUT));

        let snapshots: Vec<_> = rx.iter().collect();
        let last = snapshots.last().unwrap();
        assert_eq!(last.status, ProgressStatus::Done);
        assert_eq!(last.fraction, Some(1.0));
        assert_eq!(last.bytes_transferred, 300);
        assert!(last.elapsed.is_some());

        assert_eq!(fs::read(local.join("Portal/a")).unwrap().len(), 100);
        assert_eq!(fs::read(local.join("Portal/b")).unwrap().len(), 200);
        assert_eq!(scheduler.state(id), Some(JobState::Completed));
        assert!(scheduler.active_jobs().is_empty());

        assert_eq!(calls.prevented.load(Ordering::SeqCst), 1);
        assert_eq!(calls.allowed.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_preventing_sleep());
    }

    #[test]
    fn test_setup_error_is_synchronous() {
        let dir = TempDir::new().unwrap();
        let source = make_game(&dir.path().join("remote"), "Portal", &[("a", 10)]);
        let blocked = dir.path().join("not-a-dir");
        fs::write(&blocked, "file").unwrap();
        let (backend, calls) = RecordingBackend::new();

        let scheduler = Scheduler::local(Box::new(backend), options(2)).unwrap();
        let err = scheduler.submit(&source, &blocked).unwrap_err();

        assert!(matches!(err, EngineError::DestinationSetup { .. }));
        assert!(scheduler.active_jobs().is_empty());
        assert_eq!(calls.prevented.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_invalid_source() {
        let dir = TempDir::new().unwrap();
        let (backend, _calls) = RecordingBackend::new();

        let scheduler = Scheduler::local(Box::new(backend), options(2)).unwrap();
        let err = scheduler.submit("/", dir.path()).unwrap_err();

        assert!(matches!(err, EngineError::InvalidSource { .. }));
    }

    #[test]
    fn test_third_job_waits_for_free_worker() {
        let dir = TempDir::new().unwrap();
        let remote = dir.path().join("remote");
        let local = dir.path().join("local");
        let games: Vec<_> = ["One", "Two", "Three"]
            .iter()
            .map(|name| make_game(&remote, name, &[("data", 64)]))
            .collect();

        let (gated, gate) = GatedFs::new();
        let (backend, calls) = RecordingBackend::new();
        let scheduler =
            Scheduler::new(gated.clone(), Box::new(backend), options(2)).unwrap();

        let ids: Vec<_> = games
            .iter()
            .map(|game| scheduler.submit(game, &local).unwrap())
            .collect();

        assert!(wait_until(TIMEOUT, || gated.started.load(Ordering::SeqCst) == 2));
        assert_eq!(scheduler.running_jobs(), 2);
        assert_eq!(scheduler.state(ids[2]), Some(JobState::Queued));

        let waiting = scheduler.snapshot(ids[2]).unwrap();
        assert_eq!(waiting.status, ProgressStatus::Waiting);
        assert_eq!(waiting.fraction, Some(0.0));

        let rx = scheduler.subscribe(ids[2]).unwrap();

        thread::sleep(Duration::from_millis(30));
        assert_eq!(gated.started.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.state(ids[2]), Some(JobState::Queued));

        drop(gate);
        assert!(scheduler.wait_idle_timeout(TIMEOUT));

        for id in &ids {
            assert_eq!(scheduler.state(*id), Some(JobState::Completed));
        }
        assert!(gated.max_active.load(Ordering::SeqCst) <= 2);

        let statuses: Vec<_> = rx.iter().map(|s| s.status).collect();
        assert_eq!(statuses.first(), Some(&ProgressStatus::Waiting));
        assert_eq!(statuses.last(), Some(&ProgressStatus::Done));

        // Held across the handoff from job one or two to job three
        assert_eq!(calls.prevented.load(Ordering::SeqCst), 1);
        assert_eq!(calls.allowed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_burst_never_exceeds_capacity() {
        let dir = TempDir::new().unwrap();
        let remote = dir.path().join("remote");
        let local = dir.path().join("local");

        let (gated, gate) = GatedFs::new();
        let (backend, calls) = RecordingBackend::new();
        let scheduler =
            Scheduler::new(gated.clone(), Box::new(backend), options(2)).unwrap();

        for i in 0..8 {
            let game = make_game(&remote, &format!("Game{i}"), &[("a", 8), ("b", 8)]);
            scheduler.submit(&game, &local).unwrap();
        }

        // Let copies through one at a time
        for _ in 0..16 {
            gate.send(()).unwrap();
            assert!(scheduler.running_jobs() <= 2);
        }

        assert!(scheduler.wait_idle_timeout(TIMEOUT));
        assert_eq!(gated.started.load(Ordering::SeqCst), 16);
        assert!(gated.max_active.load(Ordering::SeqCst) <= 2);
        assert_eq!(calls.prevented.load(Ordering::SeqCst), 1);
        assert_eq!(calls.allowed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancel_queued_job() {
        let dir = TempDir::new().unwrap();
        let remote = dir.path().join("remote");
        let local = dir.path().join("local");
        let first = make_game(&remote, "First", &[("a", 10)]);
        let second = make_game(&remote, "Second", &[("a", 10)]);

        let (gated, gate) = GatedFs::new();
        let (backend, calls) = RecordingBackend::new();
        let scheduler =
            Scheduler::new(gated.clone(), Box::new(backend), options(1)).unwrap();

        let running = scheduler.submit(&first, &local).unwrap();
        let queued = scheduler.submit(&second, &local).unwrap();
        assert!(wait_until(TIMEOUT, || gated.started.load(Ordering::SeqCst) == 1));

        let rx = scheduler.subscribe(queued).unwrap();
        assert!(scheduler.cancel(queued));
        assert_eq!(scheduler.state(queued), Some(JobState::Cancelled));
        assert_eq!(scheduler.active_jobs(), vec![running]);

        let statuses: Vec<_> = rx.iter().map(|s| s.status).collect();
        let (last, before) = statuses.split_last().unwrap();
        assert_eq!(*last, ProgressStatus::Cancelled);
        assert!(before.iter().all(|s| *s == ProgressStatus::Waiting));

        // Already retired
        assert!(!scheduler.cancel(queued));

        drop(gate);
        assert!(scheduler.wait_idle_timeout(TIMEOUT));

        assert_eq!(scheduler.state(running), Some(JobState::Completed));
        assert_eq!(gated.started.load(Ordering::SeqCst), 1);
        assert!(!local.join("Second/a").exists());
        // Only the running job ever took a sleep reference
        assert_eq!(calls.prevented.load(Ordering::SeqCst), 1);
        assert_eq!(calls.allowed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancel_queued_then_running_job() {
        let dir = TempDir::new().unwrap();
        let remote = dir.path().join("remote");
        let local = dir.path().join("local");
        let first = make_game(&remote, "First", &[("a", 10)]);
        let second = make_game(&remote, "Second", &[("a", 10)]);

        let (gated, gate) = GatedFs::new();
        let (backend, calls) = RecordingBackend::new();
        let scheduler =
            Scheduler::new(gated.clone(), Box::new(backend), options(1)).unwrap();

        let running = scheduler.submit(&first, &local).unwrap();
        let queued = scheduler.submit(&second, &local).unwrap();
        assert!(wait_until(TIMEOUT, || gated.started.load(Ordering::SeqCst) == 1));

        assert!(scheduler.cancel(queued));
        assert!(scheduler.is_preventing_sleep());
        assert!(scheduler.cancel(running));

        drop(gate);
        assert!(scheduler.wait_idle_timeout(TIMEOUT));
        assert_eq!(calls.prevented.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_preventing_sleep());
    }

    #[test]
    fn test_cancel_mid_copy_keeps_finished_files() {
        let dir = TempDir::new().unwrap();
        let source = make_game(
            &dir.path().join("remote"),
            "Portal",
            &[("a", 10), ("b", 20), ("c", 30)],
        );
        let local = dir.path().join("local");

        let (gated, gate) = GatedFs::new();
        let (backend, calls) = RecordingBackend::new();
        let scheduler =
            Scheduler::new(gated.clone(), Box::new(backend), options(2)).unwrap();

        // Let `a` through; `b` blocks in flight
        gate.send(()).unwrap();
        let id = scheduler.submit(&source, &local).unwrap();
        assert!(wait_until(TIMEOUT, || gated.started.load(Ordering::SeqCst) == 2));

        assert!(scheduler.cancel(id));
        drop(gate);
        assert!(scheduler.wait_idle_timeout(TIMEOUT));

        assert_eq!(scheduler.state(id), Some(JobState::Cancelled));
        assert!(local.join("Portal/a").exists());
        assert!(local.join("Portal/b").exists());
        assert!(!local.join("Portal/c").exists());
        assert_eq!(gated.started.load(Ordering::SeqCst), 2);

        let snapshot = scheduler.snapshot(id).unwrap();
        assert_eq!(snapshot.status, ProgressStatus::Cancelled);
        assert_eq!(snapshot.bytes_transferred, 30);
        assert_eq!(calls.prevented.load(Ordering::SeqCst), 1);
        assert_eq!(calls.allowed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_size_failure_stays_indeterminate() {
        let dir = TempDir::new().unwrap();
        let source = make_game(&dir.path().join("remote"), "Portal", &[("a", 100), ("b", 200)]);
        let local = dir.path().join("local");

        let (gated, gate) = GatedFs::failing_size();
        let (backend, _calls) = RecordingBackend::new();
        let scheduler =
            Scheduler::new(gated.clone(), Box::new(backend), options(2)).unwrap();

        let rx = scheduler.subscribe_all();
        let id = scheduler.submit(&source, &local).unwrap();

        // Hold the copy long enough for several ticks
        thread::sleep(Duration::from_millis(30));
        drop(gate);
        assert!(scheduler.wait_idle_timeout(TIMEOUT));

        let snapshots: Vec<_> = rx.try_iter().filter(|s| s.job_id == id).collect();
        let (last, running) = snapshots.split_last().unwrap();
        for snapshot in running {
            assert!(matches!(
                snapshot.status,
                ProgressStatus::Waiting | ProgressStatus::Sizing
            ));
            assert!(snapshot.status != ProgressStatus::Sizing || snapshot.fraction.is_none());
        }

        assert_eq!(last.status, ProgressStatus::Done);
        assert_eq!(last.total_bytes, None);
        assert_eq!(last.bytes_transferred, 300);
        assert!(local.join("Portal/b").exists());
    }

    #[test]
    fn test_copy_failure_fails_only_that_job() {
        let dir = TempDir::new().unwrap();
        let remote = dir.path().join("remote");
        let local = dir.path().join("local");
        let good = make_game(&remote, "Good", &[("a", 10)]);
        let missing = remote.join("Missing");
        let (backend, _calls) = RecordingBackend::new();

        let scheduler = Scheduler::local(Box::new(backend), options(2)).unwrap();
        let bad_id = scheduler.submit(&missing, &local).unwrap();
        let good_id = scheduler.submit(&good, &local).unwrap();
        assert!(scheduler.wait_idle_timeout(TIMEOUT));

        assert_eq!(scheduler.state(bad_id), Some(JobState::Failed));
        assert_eq!(scheduler.state(good_id), Some(JobState::Completed));

        let failed = scheduler.snapshot(bad_id).unwrap();
        assert_eq!(failed.status, ProgressStatus::Failed);
        assert!(failed.error.unwrap().contains("Missing"));
        assert!(!scheduler.is_preventing_sleep());
    }

    #[test]
    fn test_resume_into_partial_destination() {
        let dir = TempDir::new().unwrap();
        let source = make_game(&dir.path().join("remote"), "Portal", &[("a", 100), ("b", 200)]);
        let local = dir.path().join("local");
        fs::create_dir_all(local.join("Portal")).unwrap();
        fs::write(local.join("Portal/a"), "kept").unwrap();
        let (backend, _calls) = RecordingBackend::new();

        let scheduler = Scheduler::local(Box::new(backend), options(2)).unwrap();
        let id = scheduler.submit(&source, &local).unwrap();
        assert!(scheduler.wait_idle_timeout(TIMEOUT));

        assert_eq!(scheduler.state(id), Some(JobState::Completed));
        assert_eq!(fs::read_to_string(local.join("Portal/a")).unwrap(), "kept");
        assert_eq!(fs::read(local.join("Portal/b")).unwrap().len(), 200);
        assert_eq!(scheduler.snapshot(id).unwrap().bytes_transferred, 300);
    }

    #[test]
    fn test_bytes_never_decrease() {
        let dir = TempDir::new().unwrap();
        let names: Vec<String> = (0..20).map(|i| format!("f{i:02}")).collect();
        let files: Vec<(&str, usize)> = names.iter().map(|n| (n.as_str(), 1000)).collect();
        let source = make_game(&dir.path().join("remote"), "Portal", &files);
        let local = dir.path().join("local");

        let (gated, gate) = GatedFs::new();
        let (backend, _calls) = RecordingBackend::new();
        let scheduler =
            Scheduler::new(gated.clone(), Box::new(backend), options(2)).unwrap();

        let id = scheduler.submit(&source, &local).unwrap();
        let rx = scheduler.subscribe(id).unwrap();
        for _ in 0..20 {
            gate.send(()).unwrap();
            thread::sleep(Duration::from_millis(2));
        }
        assert!(scheduler.wait_idle_timeout(TIMEOUT));

        let bytes: Vec<u64> = rx.iter().map(|s| s.bytes_transferred).collect();
        assert!(bytes.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(bytes.last(), Some(&20_000));
    }

    #[test]
    fn test_subscribe_unknown_job() {
        let (backend, _calls) = RecordingBackend::new();
        let scheduler = Scheduler::local(Box::new(backend), options(2)).unwrap();

        assert!(matches!(
            scheduler.subscribe(JobId::new(42)),
            Err(EngineError::UnknownJob(_))
        ));
        assert!(!scheduler.cancel(JobId::new(42)));
        assert_eq!(scheduler.state(JobId::new(42)), None);
    }

    #[test]
    fn test_shutdown_cancels_everything() {
        let dir = TempDir::new().unwrap();
        let remote = dir.path().join("remote");
        let local = dir.path().join("local");
        let first = make_game(&remote, "First", &[("a", 10), ("b", 10)]);
        let second = make_game(&remote, "Second", &[("a", 10)]);

        let (gated, gate) = GatedFs::new();
        let (backend, calls) = RecordingBackend::new();
        let scheduler =
            Scheduler::new(gated.clone(), Box::new(backend), options(1)).unwrap();

        let running = scheduler.submit(&first, &local).unwrap();
        let queued = scheduler.submit(&second, &local).unwrap();
        let all = scheduler.subscribe_all();
        assert!(wait_until(TIMEOUT, || gated.started.load(Ordering::SeqCst) == 1));

        // Release the in-flight copy once shutdown is waiting on it
        let opener = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            drop(gate);
        });
        scheduler.shutdown();
        opener.join().unwrap();

        assert_eq!(scheduler.state(running), Some(JobState::Cancelled));
        assert_eq!(scheduler.state(queued), Some(JobState::Cancelled));
        assert!(!local.join("First/b").exists());
        assert!(!scheduler.is_preventing_sleep());
        assert_eq!(calls.prevented.load(Ordering::SeqCst), 1);
        assert!(calls.allowed.load(Ordering::SeqCst) >= 1);

        // Listener stream is closed
        let terminal: Vec<_> = all.iter().filter(ProgressSnapshot::is_terminal).collect();
        assert_eq!(terminal.len(), 2);

        assert!(matches!(
            scheduler.submit(&first, &local),
            Err(EngineError::ShutDown)
        ));

        let allowed = calls.allowed.load(Ordering::SeqCst);
        scheduler.shutdown();
        assert_eq!(calls.allowed.load(Ordering::SeqCst), allowed);
    }

    #[test]
    fn test_shutdown_allows_sleep_before_copy_stops() {
        let dir = TempDir::new().unwrap();
        let remote = dir.path().join("remote");
        let local = dir.path().join("local");
        let game = make_game(&remote, "Stuck", &[("a", 10), ("b", 10)]);

        let (gated, gate) = GatedFs::new();
        let (backend, calls) = RecordingBackend::new();
        let scheduler =
            Arc::new(Scheduler::new(gated.clone(), Box::new(backend), options(1)).unwrap());

        let id = scheduler.submit(&game, &local).unwrap();
        assert!(wait_until(TIMEOUT, || gated.started.load(Ordering::SeqCst) == 1));

        let stopper = {
            let scheduler = Arc::clone(&scheduler);
            thread::spawn(move || scheduler.shutdown())
        };

        // Sleep is allowed while the copy is still blocked in the filesystem
        assert!(wait_until(TIMEOUT, || calls.allowed.load(Ordering::SeqCst) == 1));
        assert!(!scheduler.is_preventing_sleep());
        assert_eq!(gated.active.load(Ordering::SeqCst), 1);
        assert!(!stopper.is_finished());

        drop(gate);
        stopper.join().unwrap();

        assert_eq!(scheduler.state(id), Some(JobState::Cancelled));
        assert_eq!(calls.prevented.load(Ordering::SeqCst), 1);
        assert_eq!(calls.allowed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_shutdown_stops_waiting_after_timeout() {
        let dir = TempDir::new().unwrap();
        let remote = dir.path().join("remote");
        let local = dir.path().join("local");
        let game = make_game(&remote, "Stuck", &[("a", 10), ("b", 10)]);

        let (gated, gate) = GatedFs::new();
        let (backend, _calls) = RecordingBackend::new();
        let options = EngineOptions {
            shutdown_timeout: Duration::from_millis(50),
            ..options(1)
        };
        let scheduler = Scheduler::new(gated.clone(), Box::new(backend), options).unwrap();

        let id = scheduler.submit(&game, &local).unwrap();
        assert!(wait_until(TIMEOUT, || gated.started.load(Ordering::SeqCst) == 1));

        scheduler.shutdown();
        assert_eq!(scheduler.state(id), Some(JobState::Running));
        assert!(!scheduler.is_preventing_sleep());

        // The abandoned copy still retires once its file operation returns
        drop(gate);
        assert!(scheduler.wait_idle_timeout(TIMEOUT));
        assert_eq!(scheduler.state(id), Some(JobState::Cancelled));
    }

    /// Counts `allow_sleep` calls made while the scheduler has running jobs.
    struct HandoffBackend {
        shared: Arc<OnceLock<Weak<Shared>>>,
        calls: Arc<Calls>,
        premature: Arc<AtomicUsize>,
    }

    impl SleepBackend for HandoffBackend {
        fn prevent_sleep(&self) -> Result<(), PowerError> {
            self.calls.prevented.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn allow_sleep(&self) -> Result<(), PowerError> {
            self.calls.allowed.fetch_add(1, Ordering::SeqCst);
            // A held lock means a dispatch is in progress and will acquire next
            if let Some(shared) = self.shared.get().and_then(Weak::upgrade) {
                if let Ok(inner) = shared.inner.try_lock() {
                    if inner.running > 0 {
                        self.premature.fetch_add(1, Ordering::SeqCst);
                    }
                }
            }
            Ok(())
        }
    }

    #[test]
    fn test_sleep_never_allowed_while_jobs_run() {
        let dir = TempDir::new().unwrap();
        let remote = dir.path().join("remote");
        let local = dir.path().join("local");

        let cell = Arc::new(OnceLock::new());
        let calls = Arc::new(Calls::default());
        let premature = Arc::new(AtomicUsize::new(0));
        let backend = HandoffBackend {
            shared: Arc::clone(&cell),
            calls: Arc::clone(&calls),
            premature: Arc::clone(&premature),
        };

        let scheduler = Scheduler::local(Box::new(backend), options(2)).unwrap();
        cell.set(Arc::downgrade(&scheduler.shared)).unwrap();

        let games: Vec<_> = (0..8)
            .map(|i| make_game(&remote, &format!("Game{i}"), &[("a", 1)]))
            .collect();

        thread::scope(|scope| {
            for (i, game) in games.iter().enumerate() {
                let scheduler = &scheduler;
                let local = &local;
                scope.spawn(move || {
                    for n in 0..12 {
                        scheduler.submit(game, local.join(format!("{i}-{n}"))).unwrap();
                    }
                });
            }
        });

        assert!(scheduler.wait_idle_timeout(TIMEOUT));
        assert_eq!(premature.load(Ordering::SeqCst), 0);
        assert_eq!(
            calls.prevented.load(Ordering::SeqCst),
            calls.allowed.load(Ordering::SeqCst)
        );
        assert!(!scheduler.is_preventing_sleep());
    }

    #[test]
    fn test_retired_jobs_are_forgotten_past_limit() {
        let dir = TempDir::new().unwrap();
        let remote = dir.path().join("remote");
        let local = dir.path().join("local");
        let first = make_game(&remote, "First", &[("a", 10)]);
        let second = make_game(&remote, "Second", &[("a", 10)]);

        let (gated, gate) = GatedFs::new();
        let (backend, _calls) = RecordingBackend::new();
        let scheduler = Scheduler::new(gated.clone(), Box::new(backend), options(1)).unwrap();

        let running = scheduler.submit(&first, &local).unwrap();
        let cancelled: Vec<JobId> = (0..RETIRED_LIMIT + 5)
            .map(|_| {
                let id = scheduler.submit(&second, &local).unwrap();
                assert!(scheduler.cancel(id));
                id
            })
            .collect();

        let oldest = cancelled[0];
        let newest = cancelled[cancelled.len() - 1];
        assert_eq!(scheduler.state(oldest), None);
        assert!(scheduler.snapshot(oldest).is_none());
        assert!(matches!(
            scheduler.subscribe(oldest),
            Err(EngineError::UnknownJob(id)) if id == oldest
        ));
        assert_eq!(scheduler.state(newest), Some(JobState::Cancelled));
        assert_eq!(scheduler.state(cancelled[5]), Some(JobState::Cancelled));
        assert_eq!(scheduler.state(cancelled[4]), None);
        assert_eq!(scheduler.state(running), Some(JobState::Running));

        drop(gate);
        assert!(scheduler.wait_idle_timeout(TIMEOUT));
        assert_eq!(scheduler.state(running), Some(JobState::Completed));
    }

    #[test]
    fn test_zero_tick_interval_is_raised() {
        let dir = TempDir::new().unwrap();
        let remote = dir.path().join("remote");
        let local = dir.path().join("local");
        let game = make_game(&remote, "Tiny", &[("a", 10)]);

        let (backend, _calls) = RecordingBackend::new();
        let options = EngineOptions {
            tick_interval: Duration::ZERO,
            ..options(1)
        };
        let scheduler = Scheduler::local(Box::new(backend), options).unwrap();
        assert_eq!(scheduler.tick_interval(), MIN_TICK_INTERVAL);

        let id = scheduler.submit(&game, &local).unwrap();
        assert!(scheduler.wait_idle_timeout(TIMEOUT));
        assert_eq!(scheduler.state(id), Some(JobState::Completed));
    }
}
