//! Job queue and job status store.
//!
//! This crate provides:
//! - Job enqueueing and consumption via Redis Streams (at-least-once)
//! - An in-process queue for single-instance deployments and tests
//! - The job status store, backed by Redis or memory

pub mod error;
pub mod job;
pub mod memory;
pub mod queue;
pub mod store;

pub use error::{QueueError, QueueResult, StoreError, StoreResult};
pub use job::{Delivery, GenerateVideoJob};
pub use memory::{MemoryQueue, MemoryStatusStore};
pub use queue::{JobQueue, QueueConfig, WorkQueue};
pub use store::{JobStatusStore, RedisStatusStore, StoreConfig, JOB_STATUS_TTL_SECS};
