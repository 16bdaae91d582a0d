//! Task handles and their shared completion state.

use std::any::Any;
use std::error::Error;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::cache::ObjectCache;
use crate::error::TaskPanicked;

/// A failure captured from a dispatcher task.
pub type TaskFailure = Arc<dyn Error + Send + Sync + 'static>;

/// Lifecycle of a dispatched task. Every state but `Queued` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatcherTaskState {
    /// Waiting in the dispatcher's queue.
    Queued,
    /// Ran successfully from the executor's pump.
    CompletedQueued,
    /// Ran successfully inline, on the thread that invoked it.
    CompletedImmediate,
    /// Returned an error or panicked; see [`DispatcherTask::failure`].
    Failed,
}

impl DispatcherTaskState {
    pub fn is_terminal(self) -> bool {
        self != Self::Queued
    }

    pub(crate) fn completed(immediate: bool) -> Self {
        if immediate {
            Self::CompletedImmediate
        } else {
            Self::CompletedQueued
        }
    }
}

struct TaskStatus {
    state: DispatcherTaskState,
    failure: Option<TaskFailure>,
}

/// Completion state shared between a task handle and the queue entry that
/// runs it. Pooled through [`ObjectCache`] for action tasks.
pub(crate) struct TaskCore {
    status: Mutex<TaskStatus>,
    finished: Condvar,
}

impl TaskCore {
    pub(crate) fn new() -> Self {
        Self {
            status: Mutex::new(TaskStatus {
                state: DispatcherTaskState::Queued,
                failure: None,
            }),
            finished: Condvar::new(),
        }
    }

    pub(crate) fn reset(&self) {
        let mut status = self.status.lock();
        status.state = DispatcherTaskState::Queued;
        status.failure = None;
    }

    pub(crate) fn complete(&self, immediate: bool) {
        self.finish(DispatcherTaskState::completed(immediate), None);
    }

    pub(crate) fn fail(&self, failure: TaskFailure) {
        self.finish(DispatcherTaskState::Failed, Some(failure));
    }

    /// Terminal states are final; a second transition is ignored.
    fn finish(&self, state: DispatcherTaskState, failure: Option<TaskFailure>) {
        {
            let mut status = self.status.lock();
            if status.state.is_terminal() {
                return;
            }
            status.state = state;
            status.failure = failure;
        }
        self.finished.notify_all();
    }

    pub(crate) fn state(&self) -> DispatcherTaskState {
        self.status.lock().state
    }

    pub(crate) fn failure(&self) -> Option<TaskFailure> {
        self.status.lock().failure.clone()
    }

    pub(crate) fn wait(&self) -> DispatcherTaskState {
        let mut status = self.status.lock();
        while !status.state.is_terminal() {
            self.finished.wait(&mut status);
        }
        status.state
    }

    pub(crate) fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut status = self.status.lock();
        while !status.state.is_terminal() {
            if self.finished.wait_until(&mut status, deadline).timed_out() {
                break;
            }
        }
        status.state.is_terminal()
    }
}

/// Runs a task body, turning both an `Err` and a panic into a [`TaskFailure`].
pub(crate) fn run_guarded<T>(body: impl FnOnce() -> anyhow::Result<T>) -> Result<T, TaskFailure> {
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(Arc::from(Box::<dyn Error + Send + Sync>::from(error))),
        Err(payload) => Err(Arc::new(TaskPanicked {
            message: panic_message(payload.as_ref()),
        })),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

/// Operations common to every kind of task handle.
pub trait DispatcherTask {
    /// Current state of the task.
    fn state(&self) -> DispatcherTaskState;

    /// The error or panic the task failed with, once it has failed.
    fn failure(&self) -> Option<TaskFailure>;

    /// Whether the task has reached a terminal state, successfully or not.
    fn is_completed(&self) -> bool {
        self.state().is_terminal()
    }

    /// Blocks until the task reaches a terminal state and returns it.
    fn wait(&self) -> DispatcherTaskState;

    /// Blocks for at most `timeout`. Returns `true` if the task finished.
    fn wait_timeout(&self, timeout: Duration) -> bool;
}

/// Handle to a dispatched closure with no result.
///
/// Its completion state is pooled: dropping a finished handle returns the
/// state object to the cache for the next invocation.
pub struct ActionDispatcherTask {
    core: Arc<TaskCore>,
    cache: ObjectCache,
}

impl ActionDispatcherTask {
    pub(crate) fn new(core: Arc<TaskCore>, cache: ObjectCache) -> Self {
        Self { core, cache }
    }
}

impl DispatcherTask for ActionDispatcherTask {
    fn state(&self) -> DispatcherTaskState {
        self.core.state()
    }

    fn failure(&self) -> Option<TaskFailure> {
        self.core.failure()
    }

    fn wait(&self) -> DispatcherTaskState {
        self.core.wait()
    }

    fn wait_timeout(&self, timeout: Duration) -> bool {
        self.core.wait_timeout(timeout)
    }
}

impl Drop for ActionDispatcherTask {
    fn drop(&mut self) {
        // Still queued elsewhere: the queue entry owns the last reference.
        if Arc::get_mut(&mut self.core).is_none() {
            return;
        }
        self.core.reset();
        self.cache.task_cores().return_instance(Arc::clone(&self.core));
    }
}

impl fmt::Debug for ActionDispatcherTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionDispatcherTask")
            .field("state", &self.state())
            .finish()
    }
}

/// Handle to a dispatched closure producing a `T`.
pub struct FunctionDispatcherTask<T> {
    core: Arc<TaskCore>,
    result: Arc<Mutex<Option<T>>>,
}

impl<T> FunctionDispatcherTask<T> {
    pub(crate) fn new(core: Arc<TaskCore>, result: Arc<Mutex<Option<T>>>) -> Self {
        Self { core, result }
    }

    /// Takes the produced value. `None` until the task completes
    /// successfully, and after the value has been taken.
    pub fn take_result(&self) -> Option<T> {
        self.result.lock().take()
    }
}

impl<T> DispatcherTask for FunctionDispatcherTask<T> {
    fn state(&self) -> DispatcherTaskState {
        self.core.state()
    }

    fn failure(&self) -> Option<TaskFailure> {
        self.core.failure()
    }

    fn wait(&self) -> DispatcherTaskState {
        self.core.wait()
    }

    fn wait_timeout(&self, timeout: Duration) -> bool {
        self.core.wait_timeout(timeout)
    }
}

impl<T> fmt::Debug for FunctionDispatcherTask<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDispatcherTask")
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_terminal_state_is_final() {
        let core = TaskCore::new();
        core.complete(false);
        core.fail(Arc::new(TaskPanicked { message: "late".into() }));
        assert_eq!(core.state(), DispatcherTaskState::CompletedQueued);
        assert!(core.failure().is_none());

        core.reset();
        assert_eq!(core.state(), DispatcherTaskState::Queued);
    }

    #[test]
    fn test_wait_wakes_on_completion() {
        let core = Arc::new(TaskCore::new());
        let completer = core.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            completer.complete(false);
        });

        assert_eq!(core.wait(), DispatcherTaskState::CompletedQueued);
        handle.join().unwrap();
    }

    #[test]
    fn test_wait_timeout_expires() {
        let core = TaskCore::new();
        assert!(!core.wait_timeout(Duration::from_millis(10)));
        core.complete(true);
        assert!(core.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn test_run_guarded_captures_errors_and_panics() {
        assert_eq!(run_guarded(|| Ok(3)).ok(), Some(3));

        let failure = run_guarded::<()>(|| Err(anyhow::anyhow!("bad input"))).unwrap_err();
        assert_eq!(failure.to_string(), "bad input");

        let failure = run_guarded::<()>(|| panic!("boom")).unwrap_err();
        let panicked = failure.downcast_ref::<TaskPanicked>().unwrap();
        assert_eq!(panicked.message, "boom");
    }
}
