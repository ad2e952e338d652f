//! Task Coordinator
//!
//! A bounded-priority worker pool. Construction spawns one worker thread per
//! priority level (0..3); a task's priority selects the worker whose queue it
//! lands on, so tasks submitted at the same priority run FIFO while separate
//! priorities never block each other.
//!
//! Workers use a non-blocking dequeue and sleep ~1 ms when idle. Completion
//! callbacks are never run on a worker: finished tasks are pushed onto a
//! completion queue that the main thread drains one entry per frame via
//! [`TaskCoordinator::tick`], so completions are serialized with each other
//! and with all other main-thread work.
//!
//! A panic inside a work function is caught at the worker boundary, logged,
//! and the task's completion is discarded; the worker keeps running.

use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashSet;

/// Number of worker threads (one per priority level).
pub const WORKER_COUNT: usize = 4;

/// Size of the inline context buffer carried from work to completion.
pub const TASK_CONTEXT_SIZE: usize = 1024;

/// Inline per-task scratch space. Work functions stash small Pod structs
/// here; the matching completion reads them back on the main thread.
pub struct TaskContext {
    bytes: [u8; TASK_CONTEXT_SIZE],
}

impl TaskContext {
    fn new() -> Self {
        Self {
            bytes: [0; TASK_CONTEXT_SIZE],
        }
    }

    /// Copies a Pod value into the context buffer.
    ///
    /// # Panics
    ///
    /// Panics if `T` is larger than [`TASK_CONTEXT_SIZE`].
    pub fn set<T: bytemuck::Pod>(&mut self, value: &T) {
        let src = bytemuck::bytes_of(value);
        assert!(src.len() <= TASK_CONTEXT_SIZE, "task context overflow");
        self.bytes[..src.len()].copy_from_slice(src);
    }

    /// Reads a Pod value previously stored with [`set`](Self::set).
    #[must_use]
    pub fn get<T: bytemuck::Pod>(&self) -> T {
        let size = std::mem::size_of::<T>();
        assert!(size <= TASK_CONTEXT_SIZE, "task context overflow");
        bytemuck::pod_read_unaligned(&self.bytes[..size])
    }
}

/// Work / completion callback. Receives the task's mutable context.
pub type TaskFn = Box<dyn FnMut(&mut TaskContext) + Send + 'static>;

struct Task {
    id: u32,
    work: TaskFn,
    complete: Option<TaskFn>,
    context: TaskContext,
    /// Set for parallel tasks: the cancellation epoch the task was submitted
    /// in. Completions from an older epoch are discarded at drain time.
    parallel_epoch: Option<u64>,
}

struct TsQueue<T> {
    inner: Mutex<VecDeque<T>>,
}

impl<T> TsQueue<T> {
    fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
        }
    }

    fn enqueue(&self, value: T) {
        self.inner.lock().push_back(value);
    }

    fn dequeue(&self) -> Option<T> {
        self.inner.lock().pop_front()
    }

    fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    fn drain(&self) -> Vec<T> {
        self.inner.lock().drain(..).collect()
    }
}

struct WorkerShared {
    queue: TsQueue<Task>,
    terminate: AtomicBool,
    busy: AtomicBool,
}

struct TaskThread {
    shared: Arc<WorkerShared>,
    handle: Option<JoinHandle<()>>,
}

impl TaskThread {
    fn spawn(
        index: usize,
        complete_queue: Arc<TsQueue<Task>>,
        pending: Arc<Mutex<FxHashSet<u32>>>,
    ) -> Self {
        let shared = Arc::new(WorkerShared {
            queue: TsQueue::new(),
            terminate: AtomicBool::new(false),
            busy: AtomicBool::new(false),
        });

        let worker = shared.clone();
        let handle = std::thread::Builder::new()
            .name(format!("ember-worker-{index}"))
            .spawn(move || {
                loop {
                    // Raised before the dequeue so idle checks never observe
                    // an empty queue while a task is still in hand.
                    worker.busy.store(true, Ordering::Release);
                    if let Some(task) = worker.queue.dequeue() {
                        run_task(task, &complete_queue, &pending);
                    } else {
                        worker.busy.store(false, Ordering::Release);
                        if worker.terminate.load(Ordering::Acquire) {
                            // Shutdown drains the queue first, then exits.
                            break;
                        }
                        std::thread::sleep(Duration::from_millis(1));
                    }
                }
            })
            .expect("failed to spawn worker thread");

        Self {
            shared,
            handle: Some(handle),
        }
    }

    fn is_idle(&self) -> bool {
        self.shared.queue.is_empty() && !self.shared.busy.load(Ordering::Acquire)
    }
}

impl Drop for TaskThread {
    fn drop(&mut self) {
        self.shared.terminate.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run_task(
    mut task: Task,
    complete_queue: &TsQueue<Task>,
    pending: &Mutex<FxHashSet<u32>>,
) {
    let result = catch_unwind(AssertUnwindSafe(|| {
        (task.work)(&mut task.context);
    }));

    pending.lock().remove(&task.id);

    match result {
        Ok(()) => {
            if task.complete.is_some() {
                complete_queue.enqueue(task);
            }
        }
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(ToString::to_string)
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            log::error!("worker task {} panicked: {message}", task.id);
        }
    }
}

/// The worker-pool primitive used by probe baking, async scene loading and
/// screenshot encoding.
pub struct TaskCoordinator {
    threads: Vec<TaskThread>,
    main_thread_queue: TsQueue<Task>,
    complete_queue: Arc<TsQueue<Task>>,
    pending: Arc<Mutex<FxHashSet<u32>>>,
    next_task_id: AtomicU32,
    parallel_epoch: AtomicU64,
}

impl Default for TaskCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskCoordinator {
    /// Spawns the worker pool.
    #[must_use]
    pub fn new() -> Self {
        let complete_queue = Arc::new(TsQueue::new());
        let pending = Arc::new(Mutex::new(FxHashSet::default()));

        let threads = (0..WORKER_COUNT)
            .map(|i| TaskThread::spawn(i, complete_queue.clone(), pending.clone()))
            .collect();

        Self {
            threads,
            main_thread_queue: TsQueue::new(),
            complete_queue,
            pending,
            next_task_id: AtomicU32::new(0),
            parallel_epoch: AtomicU64::new(0),
        }
    }

    /// Submits a task at the given priority (0..3) and returns its id.
    ///
    /// On platforms without a usable worker pool (Apple), every task is
    /// routed onto the main-thread queue instead and runs inline during
    /// [`tick`](Self::tick); this is the only platform branch in the core.
    pub fn add_task(
        &self,
        work: impl FnMut(&mut TaskContext) + Send + 'static,
        complete: Option<TaskFn>,
        priority: u8,
    ) -> u32 {
        self.add_task_inner(Box::new(work), complete, priority, None)
    }

    /// Submits a priority-0 task whose id participates in the parallel batch
    /// tracked by [`is_all_tasks_complete`](Self::is_all_tasks_complete).
    pub fn add_parallel_task(
        &self,
        work: impl FnMut(&mut TaskContext) + Send + 'static,
        complete: Option<TaskFn>,
    ) -> u32 {
        let epoch = self.parallel_epoch.load(Ordering::Acquire);
        self.add_task_inner(Box::new(work), complete, 0, Some(epoch))
    }

    fn add_task_inner(
        &self,
        work: TaskFn,
        complete: Option<TaskFn>,
        priority: u8,
        parallel_epoch: Option<u64>,
    ) -> u32 {
        let id = self.next_task_id.fetch_add(1, Ordering::Relaxed);
        let task = Task {
            id,
            work,
            complete,
            context: TaskContext::new(),
            parallel_epoch,
        };
        self.pending.lock().insert(id);

        if cfg!(target_os = "macos") {
            self.main_thread_queue.enqueue(task);
            return id;
        }

        let slot = (priority as usize).min(WORKER_COUNT - 1);
        self.threads[slot].shared.queue.enqueue(task);
        id
    }

    /// True once every task in `ids` has finished its work function.
    #[must_use]
    pub fn is_all_tasks_complete(&self, ids: &[u32]) -> bool {
        let pending = self.pending.lock();
        ids.iter().all(|id| !pending.contains(id))
    }

    /// Drops all undispatched parallel tasks. Tasks already picked up by a
    /// worker run to completion, but their completion callbacks are
    /// discarded.
    pub fn cancel_all_parallel_tasks(&self) {
        self.parallel_epoch.fetch_add(1, Ordering::AcqRel);

        let mut cancelled = Vec::new();
        {
            let mut queue = self.threads[0].shared.queue.inner.lock();
            queue.retain(|task| {
                if task.parallel_epoch.is_some() {
                    cancelled.push(task.id);
                    false
                } else {
                    true
                }
            });
        }

        if !cancelled.is_empty() {
            let mut pending = self.pending.lock();
            for id in &cancelled {
                pending.remove(id);
            }
            log::debug!("cancelled {} undispatched parallel tasks", cancelled.len());
        }
    }

    /// Blocks the caller until every worker queue is empty and no worker is
    /// executing a task.
    pub fn wait_for_all_parallel_tasks(&self) {
        loop {
            if self.threads.iter().all(TaskThread::is_idle) {
                return;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// Main-thread pump: runs at most one main-thread task and one
    /// completion callback per call.
    pub fn tick(&self) {
        if let Some(mut task) = self.main_thread_queue.dequeue() {
            (task.work)(&mut task.context);
            self.pending.lock().remove(&task.id);
            if task.complete.is_some() {
                self.complete_queue.enqueue(task);
            }
        }

        if let Some(mut task) = self.complete_queue.dequeue() {
            let current = self.parallel_epoch.load(Ordering::Acquire);
            let stale = task
                .parallel_epoch
                .is_some_and(|epoch| epoch != current);
            if stale {
                log::debug!("discarding completion of cancelled task {}", task.id);
            } else if let Some(complete) = task.complete.as_mut() {
                complete(&mut task.context);
            }
        }
    }

    /// Drains and discards everything still queued. Used by tests and by
    /// shutdown paths that do not care about pending completions.
    pub fn flush(&self) {
        self.cancel_all_parallel_tasks();
        self.wait_for_all_parallel_tasks();
        let _ = self.main_thread_queue.drain();
        let _ = self.complete_queue.drain();
    }

    /// True when no worker holds queued or running work and both main-thread
    /// queues are empty.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.threads.iter().all(TaskThread::is_idle)
            && self.main_thread_queue.is_empty()
            && self.complete_queue.is_empty()
    }
}

impl Drop for TaskCoordinator {
    fn drop(&mut self) {
        log::debug!("task coordinator shutting down ({} workers)", self.threads.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
    #[repr(C)]
    struct Payload {
        value: u64,
    }

    #[test]
    fn context_round_trip() {
        let mut ctx = TaskContext::new();
        ctx.set(&Payload { value: 42 });
        let out: Payload = ctx.get();
        assert_eq!(out.value, 42);
    }

    #[test]
    fn task_ids_are_monotonic() {
        let coordinator = TaskCoordinator::new();
        let a = coordinator.add_task(|_| {}, None, 0);
        let b = coordinator.add_task(|_| {}, None, 1);
        assert!(b > a);
        coordinator.wait_for_all_parallel_tasks();
    }
}
