//! Filesystem and sleep backend doubles for scheduler tests.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, unbounded};
use game_transfer_copy::{CancelToken, DirEntry, FileSystem, LocalFileSystem};
use game_transfer_power::{PowerError, SleepBackend};

/// Local filesystem whose file copies wait for a permit on `gate`.
///
/// Each copy consumes one permit. Dropping the sender opens the gate for good.
pub struct GatedFs {
    inner: LocalFileSystem,
    gate: Receiver<()>,
    fail_size: AtomicBool,
    pub started: AtomicUsize,
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
}

impl GatedFs {
    pub fn new() -> (Arc<Self>, Sender<()>) {
        let (tx, rx) = unbounded();
        let fs = Self {
            inner: LocalFileSystem::new(),
            gate: rx,
            fail_size: AtomicBool::new(false),
            started: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        };
        (Arc::new(fs), tx)
    }

    /// Like [`Self::new`], but size estimation always fails.
    pub fn failing_size() -> (Arc<Self>, Sender<()>) {
        let (fs, tx) = Self::new();
        fs.fail_size.store(true, Ordering::SeqCst);
        (fs, tx)
    }
}

impl FileSystem for GatedFs {
    fn is_dir(&self, path: &Path) -> bool {
        self.inner.is_dir(path)
    }

    fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        self.inner.create_dir_all(path)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        self.inner.read_dir(path)
    }

    fn copy_file(&self, source: &Path, target: &Path) -> io::Result<u64> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        // Err means the sender is gone and the gate is open
        let _ = self.gate.recv();

        let result = self.inner.copy_file(source, target);
        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn tree_size(&self, path: &Path, cancel: &CancelToken) -> io::Result<u64> {
        if self.fail_size.load(Ordering::SeqCst) {
            return Err(io::Error::other("size scan refused"));
        }
        self.inner.tree_size(path, cancel)
    }
}

#[derive(Default)]
pub struct Calls {
    pub prevented: AtomicUsize,
    pub allowed: AtomicUsize,
}

/// Sleep backend that only counts calls.
pub struct RecordingBackend {
    calls: Arc<Calls>,
}

impl RecordingBackend {
    pub fn new() -> (Self, Arc<Calls>) {
        let calls = Arc::new(Calls::default());
        (
            Self {
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }
}

impl SleepBackend for RecordingBackend {
    fn prevent_sleep(&self) -> Result<(), PowerError> {
        self.calls.prevented.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn allow_sleep(&self) -> Result<(), PowerError> {
        self.calls.allowed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Create `root/name` holding files of the given sizes.
pub fn make_game(root: &Path, name: &str, files: &[(&str, usize)]) -> PathBuf {
    let game = root.join(name);
    fs::create_dir_all(&game).unwrap();
    for (file, size) in files {
        fs::write(game.join(file), vec![7u8; *size]).unwrap();
    }
    game
}
