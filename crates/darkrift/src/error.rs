//! Error types for serialization, framing, dispatching and configuration.
//!
//! Pool conditions (an empty pool on acquire, a full pool on return) are
//! deliberately absent: they degrade to an allocation or a dropped value and
//! are only visible through [`crate::PoolStats`].

use std::thread::ThreadId;

use crate::dispatching::TaskFailure;
use crate::encoding::Encoding;

/// Errors raised by [`crate::DarkRiftReader`].
///
/// A failed read never moves the reader's position, so the reader stays
/// usable after any of these.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReadError {
    #[error("not enough data remaining: expected {expected} bytes but the reader only has {remaining} bytes remaining")]
    NotEnoughData { expected: usize, remaining: usize },

    #[error("string data is not valid {encoding}")]
    InvalidString { encoding: Encoding },

    #[error("expected exactly one character but decoded {count}")]
    InvalidChar { count: usize },

    #[error("{0}")]
    Custom(String),
}

impl ReadError {
    /// Creates a free-form error, for use by [`crate::DarkRiftSerializable`]
    /// implementations that validate what they read.
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom(message.into())
    }
}

/// An offset/count pair fell outside the bytes it addresses.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("range of {count} bytes at offset {offset} is outside of {length} available bytes")]
pub struct RangeError {
    pub offset: usize,
    pub count: usize,
    pub length: usize,
}

impl RangeError {
    pub(crate) fn check(offset: usize, count: usize, length: usize) -> Result<(), Self> {
        match offset.checked_add(count) {
            Some(end) if end <= length => Ok(()),
            _ => Err(Self { offset, count, length }),
        }
    }
}

/// Errors raised while framing or manipulating a [`crate::Message`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageError {
    #[error("received {length} bytes but the message header needs {required}")]
    HeaderTooShort { length: usize, required: usize },

    #[error("message to acknowledge is not a ping message")]
    NotAPing,

    #[error(transparent)]
    Read(#[from] ReadError),
}

/// Errors surfaced by [`crate::Dispatcher`].
#[derive(Debug, thiserror::Error)]
pub enum DispatcherError {
    /// One or more tasks failed. `source` is the first failure encountered.
    #[error("an unhandled error was raised inside a dispatcher task ({failed} failed in total)")]
    TaskFailed {
        #[source]
        source: TaskFailure,
        failed: usize,
    },

    #[error("dispatcher tasks can only be executed from the executor thread {expected:?}, not {actual:?}")]
    WrongThread { expected: ThreadId, actual: ThreadId },

    #[error("the task completed but its result had already been taken")]
    MissingResult,
}

impl DispatcherError {
    /// The first captured task failure, if this error carries one.
    pub fn task_failure(&self) -> Option<&TaskFailure> {
        match self {
            Self::TaskFailed { source, .. } => Some(source),
            Self::WrongThread { .. } | Self::MissingResult => None,
        }
    }
}

/// Captured failure of a task whose closure panicked.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("dispatcher task panicked: {message}")]
pub struct TaskPanicked {
    pub message: String,
}

/// Captured failure of a task still queued when its dispatcher was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("the dispatcher was dropped before the task was executed")]
pub struct DispatcherClosed;

/// Invalid [`crate::CacheSettings`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("memory tier '{tier}' has a block size of zero")]
    ZeroBlockSize { tier: &'static str },

    #[error("memory tier '{tier}' block size {size} must be larger than the previous tier's {previous}")]
    TiersNotAscending {
        tier: &'static str,
        size: usize,
        previous: usize,
    },
}
