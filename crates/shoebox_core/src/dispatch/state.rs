//! Hierarchical bookkeeping for dispatched work.

use super::epoch::Epoch;
use super::queue::{Dispatcher, Job, Queue};
use parking_lot::{Condvar, Mutex};
use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, trace};

static NEXT_STATE_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Ids of the states whose blocks are executing on this thread,
    /// innermost last.
    static RUNNING: RefCell<Vec<u64>> = const { RefCell::new(Vec::new()) };
}

type BodySlot = Mutex<Option<Job>>;

/// Tracks the work one component has dispatched so it can be cancelled as a
/// unit.
///
/// Every dispatched closure becomes an [`AsyncBlock`] that is counted as
/// inflight until it starts and as running until it returns. After
/// [`kill`](AsyncState::kill) no new work is admitted and queued blocks are
/// dropped without running.
///
/// ```rust,ignore
/// let state = AsyncState::new(dispatcher);
/// state.dispatch_network(|| fetch());
/// state.kill(); // waits for `fetch` if it already started
/// ```
#[derive(Clone)]
pub struct AsyncState {
    inner: Arc<StateInner>,
}

struct StateInner {
    id: u64,
    dispatcher: Arc<Dispatcher>,
    counters: Mutex<Counters>,
    idle: Condvar,
}

struct Counters {
    alive: bool,
    inflight: usize,
    running: usize,
    children: Vec<AsyncState>,
    queued: Vec<Weak<BodySlot>>,
}

impl AsyncState {
    /// Creates a root state dispatching onto `dispatcher`.
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            inner: Arc::new(StateInner {
                id: NEXT_STATE_ID.fetch_add(1, Ordering::Relaxed),
                dispatcher,
                counters: Mutex::new(Counters {
                    alive: true,
                    inflight: 0,
                    running: 0,
                    children: Vec::new(),
                    queued: Vec::new(),
                }),
                idle: Condvar::new(),
            }),
        }
    }

    /// Creates a child that is killed along with this state. A child of a
    /// dead state starts dead.
    #[must_use]
    pub fn child(&self) -> AsyncState {
        let child = AsyncState::new(Arc::clone(&self.inner.dispatcher));
        let mut counters = self.inner.counters.lock();
        if counters.alive {
            counters.children.retain(AsyncState::alive);
            counters.children.push(child.clone());
        } else {
            child.inner.counters.lock().alive = false;
        }
        child
    }

    /// False once killed.
    #[must_use]
    pub fn alive(&self) -> bool {
        self.inner.counters.lock().alive
    }

    /// Blocks queued but not started.
    #[must_use]
    pub fn inflight(&self) -> usize {
        self.inner.counters.lock().inflight
    }

    /// Blocks currently executing.
    #[must_use]
    pub fn running(&self) -> usize {
        self.inner.counters.lock().running
    }

    fn admit(&self, body: Job) -> Option<AsyncBlock> {
        let mut counters = self.inner.counters.lock();
        if !counters.alive {
            return None;
        }
        counters.inflight += 1;
        let slot = Arc::new(Mutex::new(Some(body)));
        counters.queued.retain(|queued| queued.strong_count() > 0);
        counters.queued.push(Arc::downgrade(&slot));
        Some(AsyncBlock {
            state: Arc::clone(&self.inner),
            body: slot,
            settled: false,
        })
    }

    /// Runs `f` on `queue`. Returns false, dropping `f`, if the state is dead.
    pub fn dispatch(&self, queue: Queue, f: impl FnOnce() + Send + 'static) -> bool {
        match self.admit(Box::new(f)) {
            Some(block) => self.inner.dispatcher.dispatch(queue, move || block.run()),
            None => false,
        }
    }

    /// Runs `f` on `queue` after `delay`.
    ///
    /// The pending timer holds the state weakly: if every handle to the state
    /// is gone when the delay expires, `f` is dropped unexecuted.
    pub fn dispatch_after(
        &self,
        queue: Queue,
        delay: Duration,
        f: impl FnOnce() + Send + 'static,
    ) -> bool {
        match self.admit(Box::new(f)) {
            Some(block) => {
                let delayed = block.into_delayed();
                self.inner
                    .dispatcher
                    .dispatch_after(queue, delay, move || delayed.fire())
            }
            None => false,
        }
    }

    /// Runs `f` on `queue` unless `epoch` advances before it starts.
    pub fn dispatch_guarded(
        &self,
        queue: Queue,
        epoch: &Epoch,
        f: impl FnOnce() + Send + 'static,
    ) -> bool {
        let token = epoch.token();
        self.dispatch(queue, move || {
            if token.is_current() {
                f();
            } else {
                trace!(captured = token.captured(), "dropping stale completion");
            }
        })
    }

    /// Runs `f` on the main queue.
    pub fn dispatch_main(&self, f: impl FnOnce() + Send + 'static) -> bool {
        self.dispatch(Queue::Main, f)
    }

    /// Runs `f` on the network queue.
    pub fn dispatch_network(&self, f: impl FnOnce() + Send + 'static) -> bool {
        self.dispatch(Queue::Network, f)
    }

    /// Runs `f` in the pool's high priority band.
    pub fn dispatch_high_priority(&self, f: impl FnOnce() + Send + 'static) -> bool {
        self.dispatch(Queue::HighPriority, f)
    }

    /// Runs `f` in the pool's low priority band.
    pub fn dispatch_low_priority(&self, f: impl FnOnce() + Send + 'static) -> bool {
        self.dispatch(Queue::LowPriority, f)
    }

    /// Runs `f` in the pool's background band.
    pub fn dispatch_background(&self, f: impl FnOnce() + Send + 'static) -> bool {
        self.dispatch(Queue::Background, f)
    }

    /// Runs `f` on the main queue after `delay`.
    pub fn dispatch_after_main(&self, delay: Duration, f: impl FnOnce() + Send + 'static) -> bool {
        self.dispatch_after(Queue::Main, delay, f)
    }

    /// Runs `f` on the network queue after `delay`.
    pub fn dispatch_after_network(
        &self,
        delay: Duration,
        f: impl FnOnce() + Send + 'static,
    ) -> bool {
        self.dispatch_after(Queue::Network, delay, f)
    }

    /// Runs `f` in the high priority band after `delay`.
    pub fn dispatch_after_high_priority(
        &self,
        delay: Duration,
        f: impl FnOnce() + Send + 'static,
    ) -> bool {
        self.dispatch_after(Queue::HighPriority, delay, f)
    }

    /// Runs `f` in the low priority band after `delay`.
    pub fn dispatch_after_low_priority(
        &self,
        delay: Duration,
        f: impl FnOnce() + Send + 'static,
    ) -> bool {
        self.dispatch_after(Queue::LowPriority, delay, f)
    }

    /// Runs `f` in the background band after `delay`.
    pub fn dispatch_after_background(
        &self,
        delay: Duration,
        f: impl FnOnce() + Send + 'static,
    ) -> bool {
        self.dispatch_after(Queue::Background, delay, f)
    }

    /// Stops admitting work, kills children depth-first, waits for running
    /// blocks to finish and releases the closures of queued blocks.
    ///
    /// Blocks of this state running on the calling thread are not waited
    /// for, so a block may kill its own state.
    pub fn kill(&self) {
        let (children, queued) = {
            let mut counters = self.inner.counters.lock();
            counters.alive = false;
            (
                std::mem::take(&mut counters.children),
                std::mem::take(&mut counters.queued),
            )
        };
        for child in &children {
            child.kill();
        }
        drop(children);

        let own = RUNNING.with(|running| {
            running
                .borrow()
                .iter()
                .filter(|&&id| id == self.inner.id)
                .count()
        });
        {
            let mut counters = self.inner.counters.lock();
            while counters.running > own {
                self.inner.idle.wait(&mut counters);
            }
        }

        let mut cleared = Vec::new();
        for slot in queued.iter().filter_map(Weak::upgrade) {
            if let Some(body) = slot.lock().take() {
                cleared.push(body);
            }
        }
        debug!(state = self.inner.id, cleared = cleared.len(), "async state killed");
        drop(cleared);
    }
}

impl fmt::Debug for AsyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counters = self.inner.counters.lock();
        f.debug_struct("AsyncState")
            .field("id", &self.inner.id)
            .field("alive", &counters.alive)
            .field("inflight", &counters.inflight)
            .field("running", &counters.running)
            .field("children", &counters.children.len())
            .finish()
    }
}

/// A dispatched closure owned by one [`AsyncState`].
pub struct AsyncBlock {
    state: Arc<StateInner>,
    body: Arc<BodySlot>,
    settled: bool,
}

impl AsyncBlock {
    /// Executes the closure unless its state has died since dispatch.
    pub fn run(mut self) {
        let (body, admitted) = {
            let mut counters = self.state.counters.lock();
            counters.inflight -= 1;
            self.settled = true;
            let body = self.body.lock().take();
            let admitted = counters.alive && body.is_some();
            if admitted {
                counters.running += 1;
            }
            (body, admitted)
        };

        if !admitted {
            self.state.idle.notify_all();
            if body.is_some() {
                trace!(state = self.state.id, "dropping block of dead state");
            }
            return;
        }

        let _running = RunningGuard::enter(&self.state);
        if let Some(body) = body {
            body();
        }
    }
}

impl AsyncBlock {
    fn into_delayed(mut self) -> DelayedBlock {
        self.settled = true;
        DelayedBlock {
            state: Arc::downgrade(&self.state),
            body: Arc::clone(&self.body),
            fired: false,
        }
    }
}

impl Drop for AsyncBlock {
    fn drop(&mut self) {
        if !self.settled {
            self.state.counters.lock().inflight -= 1;
            self.state.idle.notify_all();
        }
    }
}

/// An [`AsyncBlock`] parked on the dispatcher's timer.
struct DelayedBlock {
    state: Weak<StateInner>,
    body: Arc<BodySlot>,
    fired: bool,
}

impl DelayedBlock {
    fn fire(mut self) {
        self.fired = true;
        let Some(state) = self.state.upgrade() else {
            trace!("dropping delayed block of a released state");
            return;
        };
        AsyncBlock {
            state,
            body: Arc::clone(&self.body),
            settled: false,
        }
        .run();
    }
}

impl Drop for DelayedBlock {
    fn drop(&mut self) {
        if self.fired {
            return;
        }
        if let Some(state) = self.state.upgrade() {
            state.counters.lock().inflight -= 1;
            state.idle.notify_all();
        }
    }
}

/// Marks a block as executing on this thread until dropped, also on panic.
struct RunningGuard<'a> {
    state: &'a StateInner,
}

impl<'a> RunningGuard<'a> {
    fn enter(state: &'a StateInner) -> Self {
        RUNNING.with(|running| running.borrow_mut().push(state.id));
        Self { state }
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        RUNNING.with(|running| {
            running.borrow_mut().pop();
        });
        self.state.counters.lock().running -= 1;
        self.state.idle.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::sync::mpsc;
    use std::time::Instant;

    fn setup() -> (Arc<Dispatcher>, AsyncState) {
        let dispatcher = Arc::new(Dispatcher::new(2).unwrap());
        let state = AsyncState::new(Arc::clone(&dispatcher));
        (dispatcher, state)
    }

    /// Holds the main queue until the returned sender fires.
    fn block_main(dispatcher: &Dispatcher) -> mpsc::Sender<()> {
        let (tx, rx) = mpsc::channel::<()>();
        dispatcher.dispatch(Queue::Main, move || {
            let _ = rx.recv();
        });
        tx
    }

    fn drain_main(dispatcher: &Dispatcher) {
        let (tx, rx) = mpsc::channel();
        dispatcher.dispatch(Queue::Main, move || tx.send(()).unwrap());
        rx.recv().unwrap();
    }

    #[test]
    fn kill_before_run_skips_every_body() {
        let (dispatcher, state) = setup();
        let gate = block_main(&dispatcher);
        let ran = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let ran = Arc::clone(&ran);
            assert!(state.dispatch_main(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            }));
        }
        assert_eq!(state.inflight(), 10);

        state.kill();
        gate.send(()).unwrap();
        drain_main(&dispatcher);

        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(state.inflight(), 0);
        assert!(!state.dispatch_main(|| {}));
    }

    #[test]
    fn kill_waits_for_running_block() {
        let (_dispatcher, state) = setup();
        let finished = Arc::new(AtomicBool::new(false));
        let (started_tx, started_rx) = mpsc::channel();
        {
            let finished = Arc::clone(&finished);
            state.dispatch_network(move || {
                started_tx.send(()).unwrap();
                std::thread::sleep(Duration::from_millis(50));
                finished.store(true, Ordering::SeqCst);
            });
        }
        started_rx.recv().unwrap();
        assert_eq!(state.running(), 1);
        state.kill();
        assert!(finished.load(Ordering::SeqCst));
        assert_eq!(state.running(), 0);
    }

    #[test]
    fn block_can_kill_its_own_state() {
        let (_dispatcher, state) = setup();
        let (tx, rx) = mpsc::channel();
        let inner = state.clone();
        state.dispatch_background(move || {
            inner.kill();
            tx.send(inner.alive()).unwrap();
        });
        assert!(!rx.recv_timeout(Duration::from_secs(5)).unwrap());
    }

    #[test]
    fn children_die_with_parent() {
        let (_dispatcher, parent) = setup();
        let child = parent.child();
        let grandchild = child.child();
        parent.kill();
        assert!(!child.alive());
        assert!(!grandchild.alive());
        assert!(!parent.child().alive());
    }

    #[test]
    fn stale_epoch_drops_completion() {
        let (dispatcher, state) = setup();
        let epoch = Epoch::new();
        let gate = block_main(&dispatcher);
        let ran = Arc::new(AtomicBool::new(false));
        {
            let ran = Arc::clone(&ran);
            state.dispatch_guarded(Queue::Main, &epoch, move || ran.store(true, Ordering::SeqCst));
        }
        epoch.advance();
        gate.send(()).unwrap();
        drain_main(&dispatcher);
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn pending_timer_does_not_keep_killed_state_alive() {
        let (_dispatcher, state) = setup();
        let ran = Arc::new(AtomicBool::new(false));
        {
            let ran = Arc::clone(&ran);
            assert!(state.dispatch_after_background(Duration::from_secs(60), move || {
                ran.store(true, Ordering::SeqCst);
            }));
        }
        assert_eq!(state.inflight(), 1);

        let inner = Arc::downgrade(&state.inner);
        state.kill();
        drop(state);
        assert!(inner.upgrade().is_none());
        // The killed body was released along with its captures.
        assert_eq!(Arc::strong_count(&ran), 1);
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn delayed_dispatch_runs_later() {
        let (_dispatcher, state) = setup();
        let (tx, rx) = mpsc::channel();
        let start = Instant::now();
        state.dispatch_after_low_priority(Duration::from_millis(30), move || {
            tx.send(()).unwrap();
        });
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}
