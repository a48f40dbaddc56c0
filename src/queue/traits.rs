//! Queue trait
//!
//! The orchestrator only talks to queues through [`TaskQueue`], so a durable
//! broker can replace the in-memory implementation without touching the
//! stages.

use crate::queue::{QueueError, Stage, StageTask};
use async_trait::async_trait;

/// Outcome of handing a failed task back to its queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redelivery {
    /// The task will be delivered again
    Requeued { attempt: u32 },

    /// The task used up its deliveries and was discarded
    Exhausted { attempts: u32 },
}

/// A FIFO of tasks for a single stage
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// The stage this queue feeds
    fn stage(&self) -> Stage;

    /// Enqueues a task
    ///
    /// Fails if the queue is closed or the task belongs to another stage.
    async fn produce(&self, task: StageTask) -> Result<(), QueueError>;

    /// Waits for the next task
    ///
    /// Returns `None` once the queue is closed and drained. The returned
    /// task's `attempt` counts this delivery.
    async fn consume(&self) -> Option<StageTask>;

    /// Hands back a task whose handler failed
    async fn retry(&self, task: StageTask) -> Result<Redelivery, QueueError>;

    /// Stops accepting tasks; consumers drain what is left
    fn close(&self);

    /// Tasks waiting for delivery
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
