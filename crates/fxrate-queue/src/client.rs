//! Queue capability trait.

use async_trait::async_trait;
use fxrate_models::JobId;

use crate::error::QueueResult;

/// A job handed out by `reserve`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservedJob {
    pub id: JobId,
    pub body: Vec<u8>,
}

impl ReservedJob {
    pub fn new(id: impl Into<JobId>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            body: body.into(),
        }
    }

    /// Body as text for logging.
    pub fn body_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// Operations the worker needs from a work queue.
///
/// Delays and TTRs are in whole seconds.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Add a tube to the watch list. Returns the number of watched tubes.
    async fn watch(&self, tube: &str) -> QueueResult<u32>;

    /// Remove a tube from the watch list. Returns the number of tubes
    /// still watched.
    async fn ignore(&self, tube: &str) -> QueueResult<u32>;

    /// Select the tube that `put` enqueues into.
    async fn use_tube(&self, tube: &str) -> QueueResult<String>;

    /// Block until a job is available, failing with `QueueError::TimedOut`
    /// when the wait policy elapses.
    async fn reserve(&self) -> QueueResult<ReservedJob>;

    async fn delete(&self, id: JobId) -> QueueResult<()>;

    /// Move a reserved job to the buried (quarantine) state.
    async fn bury(&self, id: JobId, priority: u32) -> QueueResult<()>;

    /// Enqueue a job body. Returns the new job id.
    async fn put(&self, priority: u32, delay: u32, ttr: u32, body: &[u8]) -> QueueResult<JobId>;

    /// Close the connection.
    async fn quit(&self) -> QueueResult<()>;
}
