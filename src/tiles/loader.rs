//! Worker pool resolving tile tasks in the background.
//!
//! Tasks sit on one shared stack and the most recently pushed task that is
//! ready runs first, so tiles for where the user is looking now win over
//! tiles for where they looked a moment ago. Results come back over a channel
//! that the UI thread drains with [`TileLoader::try_recv_results`].

use crate::core::config::{LoaderConfig, StorageConfig};
use crate::tiles::cache::{TileCache, TileKey};
use crate::tiles::fetch::TileFetcher;
use crate::tiles::grid::SlotId;
use crate::tiles::image::TileImage;
use crate::tiles::resolver::{Resolution, TileResolver};
use crate::tiles::source::TileServer;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Request to produce the image for one grid slot.
#[derive(Debug, Clone)]
pub struct TileTask {
    pub key: TileKey,
    pub slot: SlotId,
    pub server: Arc<TileServer>,
    /// Number of earlier attempts that ended in a retry
    pub attempt: u32,
    /// The task is not picked up before this instant
    pub ready_at: Instant,
}

impl TileTask {
    pub fn new(key: TileKey, slot: SlotId, server: Arc<TileServer>) -> Self {
        Self {
            key,
            slot,
            server,
            attempt: 0,
            ready_at: Instant::now(),
        }
    }
}

/// Outcome of a task, addressed back to the slot that asked for it.
#[derive(Debug, Clone)]
pub struct TileResult {
    pub key: TileKey,
    pub slot: SlotId,
    pub image: TileImage,
}

struct Shared {
    tasks: Mutex<Vec<TileTask>>,
    available: Condvar,
    shutdown: AtomicBool,
    in_flight: AtomicUsize,
}

impl Shared {
    /// Removes the newest task that is ready to run, or reports how long
    /// until the earliest deferred one becomes ready.
    fn take_ready(tasks: &mut Vec<TileTask>, now: Instant) -> Result<TileTask, Option<Duration>> {
        match tasks.iter().rposition(|task| task.ready_at <= now) {
            Some(i) => Ok(tasks.remove(i)),
            None => Err(tasks.iter().map(|task| task.ready_at - now).min()),
        }
    }
}

pub struct TileLoader {
    shared: Arc<Shared>,
    results: Receiver<TileResult>,
    workers: Vec<JoinHandle<()>>,
}

impl TileLoader {
    /// Starts `config.worker_count` workers. Each worker opens its own
    /// connection to the configured store.
    pub fn new(
        config: &LoaderConfig,
        storage: &StorageConfig,
        cache: TileCache,
        fetcher: Arc<dyn TileFetcher>,
    ) -> Self {
        let shared = Arc::new(Shared {
            tasks: Mutex::new(Vec::new()),
            available: Condvar::new(),
            shutdown: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
        });
        let (tx, results) = unbounded();

        let workers = (0..config.worker_count.max(1))
            .filter_map(|index| {
                let worker = Worker {
                    shared: Arc::clone(&shared),
                    results: tx.clone(),
                    config: config.clone(),
                    storage: storage.clone(),
                    cache: cache.clone(),
                    fetcher: Arc::clone(&fetcher),
                };
                thread::Builder::new()
                    .name(format!("tile-loader-{index}"))
                    .spawn(move || worker.run())
                    .map_err(|e| log::error!("failed to spawn tile loader {}: {}", index, e))
                    .ok()
            })
            .collect::<Vec<_>>();

        log::debug!("tile loader started with {} workers", workers.len());
        Self {
            shared,
            results,
            workers,
        }
    }

    /// Queues one task on top of the stack
    pub fn submit(&self, task: TileTask) {
        if let Ok(mut tasks) = self.shared.tasks.lock() {
            tasks.push(task);
        }
        self.shared.available.notify_one();
    }

    /// Queues several tasks; the last one runs first
    pub fn submit_batch(&self, batch: impl IntoIterator<Item = TileTask>) {
        let pushed = match self.shared.tasks.lock() {
            Ok(mut tasks) => {
                let before = tasks.len();
                tasks.extend(batch);
                tasks.len() - before
            }
            Err(_) => 0,
        };
        match pushed {
            0 => {}
            1 => self.shared.available.notify_one(),
            _ => self.shared.available.notify_all(),
        }
    }

    /// Drops every queued task, returning how many were dropped. Tasks
    /// already running finish; their results are filtered out downstream.
    pub fn clear_pending(&self) -> usize {
        let dropped = self
            .shared
            .tasks
            .lock()
            .map(|mut tasks| tasks.drain(..).count())
            .unwrap_or(0);
        if dropped > 0 {
            log::debug!("dropped {} pending tile tasks", dropped);
        }
        dropped
    }

    /// All results available right now, without blocking
    pub fn try_recv_results(&self) -> Vec<TileResult> {
        self.results.try_iter().collect()
    }

    /// Waits up to `timeout` for the next result
    pub fn recv_timeout(&self, timeout: Duration) -> Option<TileResult> {
        self.results.recv_timeout(timeout).ok()
    }

    /// Tasks queued or currently being resolved
    pub fn pending_count(&self) -> usize {
        match self.shared.tasks.lock() {
            Ok(tasks) => tasks.len() + self.shared.in_flight.load(Ordering::SeqCst),
            Err(_) => self.shared.in_flight.load(Ordering::SeqCst),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.pending_count() == 0
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for TileLoader {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.available.notify_all();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::warn!("tile loader worker panicked");
            }
        }
        log::debug!("tile loader stopped");
    }
}

struct Worker {
    shared: Arc<Shared>,
    results: Sender<TileResult>,
    config: LoaderConfig,
    storage: StorageConfig,
    cache: TileCache,
    fetcher: Arc<dyn TileFetcher>,
}

impl Worker {
    fn run(self) {
        let resolver = TileResolver::open(self.cache.clone(), &self.storage, Arc::clone(&self.fetcher), &self.config);
        let idle = self.config.idle_poll();

        while let Some(mut task) = self.next_task(idle) {
            let outcome = resolver.resolve(&task.server, task.key, task.attempt);
            let image = match outcome {
                Resolution::Image(image) => Some(TileImage::Loaded(image)),
                Resolution::Empty => Some(TileImage::Empty),
                Resolution::Retry => None,
            };

            match image {
                Some(image) => {
                    let result = TileResult {
                        key: task.key,
                        slot: task.slot,
                        image,
                    };
                    // the receiver only goes away while the loader is dropped
                    let _ = self.results.send(result);
                    self.shared.in_flight.fetch_sub(1, Ordering::SeqCst);
                }
                None => {
                    task.attempt += 1;
                    task.ready_at = Instant::now() + self.config.retry_delay(task.attempt);
                    // requeue and release under one lock so the task always
                    // counts as queued or in flight
                    match self.shared.tasks.lock() {
                        Ok(mut tasks) => {
                            tasks.push(task);
                            self.shared.in_flight.fetch_sub(1, Ordering::SeqCst);
                        }
                        Err(_) => {
                            self.shared.in_flight.fetch_sub(1, Ordering::SeqCst);
                        }
                    }
                }
            }
        }
    }

    /// Blocks until a ready task is available or shutdown is requested
    fn next_task(&self, idle: Duration) -> Option<TileTask> {
        let mut tasks = self.shared.tasks.lock().ok()?;
        loop {
            if self.shared.shutdown.load(Ordering::SeqCst) {
                return None;
            }
            match Shared::take_ready(&mut tasks, Instant::now()) {
                Ok(task) => {
                    self.shared.in_flight.fetch_add(1, Ordering::SeqCst);
                    return Some(task);
                }
                Err(wait) => {
                    let wait = wait.map_or(idle, |w| w.min(idle));
                    tasks = self.shared.available.wait_timeout(tasks, wait).ok()?.0;
                }
            }
        }
    }
}
