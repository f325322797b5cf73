//! Named execution queues.

use crate::config::Config;
use crate::error::CoreResult;
use parking_lot::{Condvar, Mutex};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::debug;

/// A unit of work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Where a job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Queue {
    /// Single thread; jobs run in dispatch order.
    Main,
    /// Single thread for network work; jobs run in dispatch order.
    Network,
    /// Pool, served before the lower bands.
    HighPriority,
    /// Pool.
    LowPriority,
    /// Pool, served last.
    Background,
}

impl Queue {
    fn band(self) -> Option<usize> {
        match self {
            Queue::Main | Queue::Network => None,
            Queue::HighPriority => Some(0),
            Queue::LowPriority => Some(1),
            Queue::Background => Some(2),
        }
    }
}

const BANDS: usize = 3;

struct JobQueue {
    state: Mutex<JobQueueState>,
    ready: Condvar,
}

struct JobQueueState {
    bands: [VecDeque<Job>; BANDS],
    shutdown: bool,
}

impl JobQueue {
    fn new() -> Self {
        Self {
            state: Mutex::new(JobQueueState {
                bands: Default::default(),
                shutdown: false,
            }),
            ready: Condvar::new(),
        }
    }

    fn push(&self, band: usize, job: Job) -> bool {
        let mut state = self.state.lock();
        if state.shutdown {
            return false;
        }
        state.bands[band].push_back(job);
        drop(state);
        self.ready.notify_one();
        true
    }

    /// Blocks for the next job, highest band first. `None` after shutdown.
    fn pop(&self) -> Option<Job> {
        let mut state = self.state.lock();
        loop {
            if state.shutdown {
                return None;
            }
            if let Some(job) = state.bands.iter_mut().find_map(VecDeque::pop_front) {
                return Some(job);
            }
            self.ready.wait(&mut state);
        }
    }

    fn close(&self) -> Vec<Job> {
        let mut state = self.state.lock();
        state.shutdown = true;
        let drained = state.bands.iter_mut().flat_map(|band| band.drain(..)).collect();
        drop(state);
        self.ready.notify_all();
        drained
    }
}

struct Timed {
    due: Instant,
    order: u64,
    queue: Queue,
    job: Job,
}

impl PartialEq for Timed {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Timed {}

impl PartialOrd for Timed {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timed {
    // Reversed so the max-heap yields the earliest deadline first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.order.cmp(&self.order))
    }
}

#[derive(Default)]
struct TimerState {
    heap: BinaryHeap<Timed>,
    next_order: u64,
    shutdown: bool,
}

struct Shared {
    main: JobQueue,
    network: JobQueue,
    pool: JobQueue,
    timers: Mutex<TimerState>,
    timer_ready: Condvar,
}

impl Shared {
    fn submit(&self, queue: Queue, job: Job) -> bool {
        match queue.band() {
            None if queue == Queue::Main => self.main.push(0, job),
            None => self.network.push(0, job),
            Some(band) => self.pool.push(band, job),
        }
    }
}

/// Runs jobs on named queues.
///
/// `Main` and `Network` are each served by one thread, so jobs dispatched to
/// one of them run one at a time in dispatch order. The three pool bands
/// share `pool_threads` workers; a worker always takes from the highest
/// non-empty band. Delayed jobs wait on a timer thread and are then
/// dispatched normally.
///
/// Dropping the dispatcher stops its threads. Jobs still queued are dropped
/// without running.
pub struct Dispatcher {
    shared: Arc<Shared>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Starts a dispatcher with `pool_threads` pool workers (at least one).
    ///
    /// # Errors
    ///
    /// Returns an I/O error if a thread cannot be spawned.
    pub fn new(pool_threads: usize) -> CoreResult<Self> {
        let shared = Arc::new(Shared {
            main: JobQueue::new(),
            network: JobQueue::new(),
            pool: JobQueue::new(),
            timers: Mutex::new(TimerState::default()),
            timer_ready: Condvar::new(),
        });
        let dispatcher = Self {
            shared,
            threads: Mutex::new(Vec::new()),
        };

        dispatcher.spawn("shoebox-main".into(), |shared| worker(&shared.main))?;
        dispatcher.spawn("shoebox-network".into(), |shared| worker(&shared.network))?;
        for i in 0..pool_threads.max(1) {
            dispatcher.spawn(format!("shoebox-pool-{i}"), |shared| worker(&shared.pool))?;
        }
        dispatcher.spawn("shoebox-timer".into(), timer_loop)?;

        debug!(pool_threads = pool_threads.max(1), "dispatcher started");
        Ok(dispatcher)
    }

    /// Starts a dispatcher sized by `config`.
    pub fn from_config(config: &Config) -> CoreResult<Self> {
        Self::new(config.pool_threads)
    }

    fn spawn(&self, name: String, body: fn(Arc<Shared>)) -> CoreResult<()> {
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || body(shared))?;
        self.threads.lock().push(handle);
        Ok(())
    }

    /// Queues `job` on `queue`. Returns false after shutdown.
    pub fn dispatch(&self, queue: Queue, job: impl FnOnce() + Send + 'static) -> bool {
        self.shared.submit(queue, Box::new(job))
    }

    /// Queues `job` on `queue` once `delay` has elapsed. Returns false after
    /// shutdown.
    pub fn dispatch_after(
        &self,
        queue: Queue,
        delay: Duration,
        job: impl FnOnce() + Send + 'static,
    ) -> bool {
        let mut timers = self.shared.timers.lock();
        if timers.shutdown {
            return false;
        }
        let order = timers.next_order;
        timers.next_order += 1;
        timers.heap.push(Timed {
            due: Instant::now() + delay,
            order,
            queue,
            job: Box::new(job),
        });
        drop(timers);
        self.shared.timer_ready.notify_one();
        true
    }

    /// Stops all threads. Jobs not yet started are dropped.
    ///
    /// Safe to call from a dispatcher thread; that thread is not joined.
    pub fn shutdown(&self) {
        let mut dropped = Vec::new();
        {
            let mut timers = self.shared.timers.lock();
            timers.shutdown = true;
            dropped.extend(timers.heap.drain().map(|timed| timed.job));
        }
        self.shared.timer_ready.notify_all();
        dropped.extend(self.shared.main.close());
        dropped.extend(self.shared.network.close());
        dropped.extend(self.shared.pool.close());
        let pending = dropped.len();
        drop(dropped);

        let current = thread::current().id();
        let threads = std::mem::take(&mut *self.threads.lock());
        for handle in threads {
            if handle.thread().id() != current {
                let _ = handle.join();
            }
        }
        if pending > 0 {
            debug!(pending, "dispatcher stopped with queued jobs");
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("threads", &self.threads.lock().len())
            .finish()
    }
}

fn worker(queue: &JobQueue) {
    while let Some(job) = queue.pop() {
        job();
    }
}

fn timer_loop(shared: Arc<Shared>) {
    let mut timers = shared.timers.lock();
    loop {
        if timers.shutdown {
            return;
        }
        let now = Instant::now();
        match timers.heap.peek().map(|timed| timed.due) {
            None => {
                shared.timer_ready.wait(&mut timers);
            }
            Some(due) if due > now => {
                shared.timer_ready.wait_until(&mut timers, due);
            }
            Some(_) => {
                if let Some(timed) = timers.heap.pop() {
                    drop(timers);
                    shared.submit(timed.queue, timed.job);
                    timers = shared.timers.lock();
                }
            }
        }
    }
}
