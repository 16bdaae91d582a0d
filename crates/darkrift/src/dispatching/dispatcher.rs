use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use super::task::{
    run_guarded, ActionDispatcherTask, DispatcherTask, DispatcherTaskState,
    FunctionDispatcherTask, TaskCore, TaskFailure,
};
use crate::cache::ObjectCache;
use crate::error::{DispatcherClosed, DispatcherError};

/// Runs a task body and records the outcome on its core. The flag is `true`
/// when running inline on the invoking thread.
type Job = Box<dyn FnOnce(bool) -> Result<(), TaskFailure> + Send>;

struct QueuedTask {
    core: Arc<TaskCore>,
    job: Job,
    // Action cores come from the cache and go back to it.
    pooled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Executor {
    Thread(ThreadId),
    Direct,
}

/// Moves work from any thread onto a single executor thread.
///
/// Work invoked from the executor thread runs immediately. Work invoked from
/// any other thread is queued and runs, in arrival order, the next time the
/// executor calls [`execute_dispatcher_tasks`](Self::execute_dispatcher_tasks).
/// Game logic written against a dispatcher therefore never sees two
/// callbacks at once.
///
/// Share a dispatcher between threads through an [`Arc`].
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use std::thread;
///
/// use darkrift::{CacheSettings, Dispatcher, DispatcherTask, DispatcherTaskState, ObjectCache};
///
/// let cache = ObjectCache::new(CacheSettings::default())?;
/// let dispatcher = Arc::new(Dispatcher::new(&cache));
///
/// let remote = dispatcher.clone();
/// let task = thread::spawn(move || remote.invoke_async(|| Ok(()))).join().unwrap();
/// assert_eq!(task.state(), DispatcherTaskState::Queued);
///
/// assert_eq!(dispatcher.execute_dispatcher_tasks()?, 1);
/// assert_eq!(task.state(), DispatcherTaskState::CompletedQueued);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct Dispatcher {
    executor: Executor,
    queue: Mutex<VecDeque<QueuedTask>>,
    available: Condvar,
    report_failures: bool,
    cache: ObjectCache,
}

impl Dispatcher {
    /// Creates a dispatcher owned by the calling thread.
    pub fn new(cache: &ObjectCache) -> Self {
        Self::with_executor(cache, thread::current().id())
    }

    /// Creates a dispatcher owned by `executor`.
    pub fn with_executor(cache: &ObjectCache, executor: ThreadId) -> Self {
        debug!(?executor, "🧵 Dispatcher created");
        Self::build(cache, Executor::Thread(executor))
    }

    /// Creates a dispatcher that runs every invocation inline on the
    /// invoking thread. Nothing is ever queued.
    pub fn direct(cache: &ObjectCache) -> Self {
        debug!("🧵 Direct dispatcher created");
        Self::build(cache, Executor::Direct)
    }

    fn build(cache: &ObjectCache, executor: Executor) -> Self {
        Self {
            executor,
            queue: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
            report_failures: true,
            cache: cache.clone(),
        }
    }

    /// Chooses whether [`execute_dispatcher_tasks`](Self::execute_dispatcher_tasks)
    /// returns task failures to the executor. When disabled, failures are
    /// only logged and recorded on their task handles. Enabled by default.
    pub fn report_failures(mut self, report: bool) -> Self {
        self.report_failures = report;
        self
    }

    /// The executor thread, or `None` for a direct dispatcher.
    pub fn executor_thread(&self) -> Option<ThreadId> {
        match self.executor {
            Executor::Thread(id) => Some(id),
            Executor::Direct => None,
        }
    }

    pub fn is_direct(&self) -> bool {
        self.executor == Executor::Direct
    }

    /// Whether work invoked from the calling thread runs inline.
    pub fn runs_inline(&self) -> bool {
        match self.executor {
            Executor::Thread(id) => thread::current().id() == id,
            Executor::Direct => true,
        }
    }

    /// Runs `action` on the executor thread.
    ///
    /// On the executor thread (or on a direct dispatcher) the action runs
    /// before this returns and the task is already terminal. Elsewhere it is
    /// queued and the task reports [`DispatcherTaskState::Queued`]. Never
    /// blocks.
    pub fn invoke_async<F>(&self, action: F) -> ActionDispatcherTask
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.invoke_action(action, |_| {})
    }

    /// Like [`invoke_async`](Self::invoke_async), then calls `callback` with
    /// the completed state on the thread that ran the action. The callback
    /// is skipped if the action fails.
    pub fn invoke_async_with_callback<F, C>(&self, action: F, callback: C) -> ActionDispatcherTask
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
        C: FnOnce(DispatcherTaskState) + Send + 'static,
    {
        self.invoke_action(action, callback)
    }

    /// Runs `function` on the executor thread, keeping its value for
    /// [`FunctionDispatcherTask::take_result`].
    pub fn invoke_async_fn<T, F>(&self, function: F) -> FunctionDispatcherTask<T>
    where
        T: Send + 'static,
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        self.invoke_function(function, |_: &T| {})
    }

    /// Like [`invoke_async_fn`](Self::invoke_async_fn), then calls `callback`
    /// with the produced value on the thread that ran the function.
    pub fn invoke_async_fn_with_callback<T, F, C>(
        &self,
        function: F,
        callback: C,
    ) -> FunctionDispatcherTask<T>
    where
        T: Send + 'static,
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
        C: FnOnce(&T) + Send + 'static,
    {
        self.invoke_function(function, callback)
    }

    /// Runs `action` on the executor thread and blocks until it has run.
    ///
    /// Called from any thread but the executor, this waits for the executor's
    /// next pump, so the executor must not itself be blocked on the caller.
    pub fn invoke_wait<F>(&self, action: F) -> Result<(), DispatcherError>
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        let task = self.invoke_async(action);
        task.wait();
        match task.failure() {
            Some(source) => Err(DispatcherError::TaskFailed { source, failed: 1 }),
            None => Ok(()),
        }
    }

    /// Runs `function` on the executor thread, blocks until it has run and
    /// returns its value.
    pub fn invoke_wait_fn<T, F>(&self, function: F) -> Result<T, DispatcherError>
    where
        T: Send + 'static,
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        let task = self.invoke_async_fn(function);
        task.wait();
        if let Some(source) = task.failure() {
            return Err(DispatcherError::TaskFailed { source, failed: 1 });
        }
        task.take_result().ok_or(DispatcherError::MissingResult)
    }

    /// Runs the tasks that were queued when the call began, in FIFO order.
    ///
    /// Tasks queued while draining wait for the next call. A failing task is
    /// marked [`DispatcherTaskState::Failed`] and draining carries on.
    ///
    /// # Returns
    ///
    /// The number of tasks executed.
    ///
    /// # Errors
    ///
    /// * [`DispatcherError::WrongThread`] when called from any thread but the
    ///   executor; nothing runs
    /// * [`DispatcherError::TaskFailed`] carrying the first failure and the
    ///   number of failed tasks, once every task has run
    pub fn execute_dispatcher_tasks(&self) -> Result<usize, DispatcherError> {
        if let Executor::Thread(expected) = self.executor {
            let actual = thread::current().id();
            if actual != expected {
                return Err(DispatcherError::WrongThread { expected, actual });
            }
        }

        let count_at_start = self.count();
        let mut executed = 0;
        let mut failed = 0;
        let mut first_failure = None;

        for _ in 0..count_at_start {
            let Some(task) = self.queue.lock().pop_front() else {
                break;
            };
            executed += 1;

            if let Err(failure) = (task.job)(false) {
                warn!(error = %failure, "⚠️ Dispatcher task failed");
                failed += 1;
                first_failure.get_or_insert(failure);
            }
            if task.pooled {
                self.recycle(task.core);
            }
        }

        match first_failure {
            Some(source) if self.report_failures => {
                Err(DispatcherError::TaskFailed { source, failed })
            }
            _ => Ok(executed),
        }
    }

    /// Number of tasks waiting to run.
    pub fn count(&self) -> usize {
        self.queue.lock().len()
    }

    /// Blocks until at least one task is queued or `timeout` elapses.
    /// Returns `true` if tasks are waiting.
    pub fn wait_for_tasks(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut queue = self.queue.lock();
        while queue.is_empty() {
            if self.available.wait_until(&mut queue, deadline).timed_out() {
                break;
            }
        }
        !queue.is_empty()
    }

    fn invoke_action<F, C>(&self, action: F, callback: C) -> ActionDispatcherTask
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
        C: FnOnce(DispatcherTaskState) + Send + 'static,
    {
        let core = self.cache.task_cores().get_instance();
        let job_core = core.clone();
        let job: Job = Box::new(move |immediate| {
            let outcome = run_guarded(|| {
                action()?;
                callback(DispatcherTaskState::completed(immediate));
                Ok(())
            });
            settle(&job_core, immediate, outcome)
        });

        self.submit(core.clone(), job, true);
        ActionDispatcherTask::new(core, self.cache.clone())
    }

    fn invoke_function<T, F, C>(&self, function: F, callback: C) -> FunctionDispatcherTask<T>
    where
        T: Send + 'static,
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
        C: FnOnce(&T) + Send + 'static,
    {
        let core = Arc::new(TaskCore::new());
        let result = Arc::new(Mutex::new(None));

        let job_core = core.clone();
        let slot = result.clone();
        let job: Job = Box::new(move |immediate| {
            let outcome = run_guarded(|| {
                let value = function()?;
                callback(&value);
                Ok(value)
            })
            .map(|value| {
                *slot.lock() = Some(value);
            });
            settle(&job_core, immediate, outcome)
        });

        self.submit(core.clone(), job, false);
        FunctionDispatcherTask::new(core, result)
    }

    fn submit(&self, core: Arc<TaskCore>, job: Job, pooled: bool) {
        if self.runs_inline() {
            if let Err(failure) = job(true) {
                warn!(error = %failure, "⚠️ Dispatcher task failed while running inline");
            }
            return;
        }

        self.queue.lock().push_back(QueuedTask { core, job, pooled });
        self.available.notify_all();
    }

    /// Returns a finished action core to the cache once its handle is gone.
    /// While the handle lives, its own drop does this instead.
    fn recycle(&self, mut core: Arc<TaskCore>) {
        if Arc::get_mut(&mut core).is_some() {
            core.reset();
            self.cache.task_cores().return_instance(core);
        }
    }
}

/// Records a task's outcome on its core and hands the failure back.
fn settle(core: &TaskCore, immediate: bool, outcome: Result<(), TaskFailure>) -> Result<(), TaskFailure> {
    match outcome {
        Ok(()) => {
            core.complete(immediate);
            Ok(())
        }
        Err(failure) => {
            core.fail(failure.clone());
            Err(failure)
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        let pending: Vec<QueuedTask> = self.queue.get_mut().drain(..).collect();
        if pending.is_empty() {
            return;
        }

        debug!(pending = pending.len(), "🧵 Dispatcher dropped with queued tasks");
        let closed: TaskFailure = Arc::new(DispatcherClosed);
        for task in pending {
            task.core.fail(closed.clone());
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("executor", &self.executor)
            .field("queued", &self.count())
            .field("report_failures", &self.report_failures)
            .finish()
    }
}
