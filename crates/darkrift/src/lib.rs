//! # DarkRift
//!
//! The message serialization, pooling and dispatching core of a client/server
//! game networking runtime. Clients and servers exchange tagged binary
//! messages; this crate produces and consumes those messages without a heap
//! allocation per message, and moves networking callbacks onto a single
//! designated thread so game logic never sees concurrent callbacks.
//!
//! ## Core Features
//!
//! - **Byte-exact wire format**: big-endian primitives, length-prefixed
//!   UTF-16LE strings and MSB-first bit-packed boolean arrays
//! - **Tiered memory pooling**: five size classes of byte blocks shared by
//!   every writer, buffer and message
//! - **Thread-safe object pools**: lock-free bounded pools that degrade to
//!   plain allocation instead of failing
//! - **RAII recycling**: every pooled resource goes back to its pool when its
//!   owner drops it, on every exit path
//! - **Single-thread dispatch**: work queued from network threads runs in
//!   FIFO order on the owning thread's pump
//!
//! ## Quick Start Example
//!
//! ```
//! use darkrift::{CacheSettings, DarkRiftWriter, Dispatcher, DispatcherTask, Message, ObjectCache};
//!
//! let cache = ObjectCache::new(CacheSettings::default()).expect("default settings are valid");
//!
//! let mut writer = DarkRiftWriter::create(&cache);
//! writer.write_string("hello");
//! writer.write_u32(42);
//!
//! let message = Message::create(7, writer);
//! let mut reader = message.get_reader();
//! assert_eq!(reader.read_string().unwrap(), "hello");
//! assert_eq!(reader.read_u32().unwrap(), 42);
//!
//! let dispatcher = Dispatcher::new(&cache);
//! let task = dispatcher.invoke_async(|| Ok(()));
//! assert!(task.is_completed());
//! ```
//!
//! ## Ownership
//!
//! Pools are never global. An [`ObjectCache`] is built from [`CacheSettings`]
//! and handed to the constructors that need pooled memory. Cloning a cache
//! clones a handle to the same pools.

pub mod buffer;
pub mod cache;
pub mod dispatching;
pub mod encoding;
pub mod error;
pub mod memory;
pub mod message;
pub mod pool;
pub mod reader;
pub mod serializable;
pub mod settings;
pub mod writer;

pub use buffer::MessageBuffer;
pub use cache::{CacheStatistics, ObjectCache};
pub use dispatching::{
    ActionDispatcherTask, Dispatcher, DispatcherTask, DispatcherTaskState,
    FunctionDispatcherTask, TaskFailure,
};
pub use encoding::Encoding;
pub use error::{
    ConfigError, DispatcherClosed, DispatcherError, MessageError, RangeError, ReadError,
    TaskPanicked,
};
pub use memory::{MemoryPool, TierStats};
pub use message::Message;
pub use pool::{ObjectPool, PoolStats};
pub use reader::DarkRiftReader;
pub use serializable::DarkRiftSerializable;
pub use settings::{CacheSettings, MemoryBlockSettings};
pub use writer::DarkRiftWriter;
