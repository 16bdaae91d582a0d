//! Single-thread task dispatching
//!
//! Network threads receive messages concurrently, but game logic is far
//! simpler when it only ever runs on one thread. A [`Dispatcher`] bridges the
//! two: any thread may invoke work, and the owning ("executor") thread runs
//! it in arrival order from its own loop.
//!
//! ## Task Lifecycle
//!
//! ```text
//! Queued ──> CompletedQueued     (ran from the executor's pump)
//!   │
//!   ├──────> CompletedImmediate  (ran inline on the executor thread)
//!   │
//!   └──────> Failed              (returned an error, panicked, or the
//!                                 dispatcher was dropped first)
//! ```
//!
//! A task body is a closure returning `anyhow::Result`. Errors and panics are
//! both captured on the task handle as a [`TaskFailure`] and never unwind
//! into the dispatcher.

mod dispatcher;
pub(crate) mod task;

pub use dispatcher::Dispatcher;
pub use task::{
    ActionDispatcherTask, DispatcherTask, DispatcherTaskState, FunctionDispatcherTask,
    TaskFailure,
};
