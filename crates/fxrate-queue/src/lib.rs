//! Beanstalkd work-queue client.
//!
//! This crate provides:
//! - The `QueueClient` capability trait used by the worker
//! - A beanstalkd TCP client with reconnect and tube replay
//! - A `Producer` that serializes payloads and enqueues jobs

pub mod client;
pub mod error;
pub mod producer;
pub mod queue;

pub use client::{QueueClient, ReservedJob};
pub use error::{QueueError, QueueResult};
pub use producer::{Producer, PutOptions};
pub use queue::{BeanstalkQueue, QueueConfig};
