use crate::queue::{QueueError, Redelivery, Stage, StageTask, TaskQueue};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct QueueState {
    tasks: VecDeque<StageTask>,
    closed: bool,
}

/// In-process queue for one stage
#[derive(Debug)]
pub struct InMemoryQueue {
    stage: Stage,
    max_attempts: u32,
    state: Mutex<QueueState>,
    available: Notify,
}

impl InMemoryQueue {
    /// Creates a queue that delivers each task at most `max_attempts` times
    pub fn new(stage: Stage, max_attempts: u32) -> Self {
        Self {
            stage,
            max_attempts: max_attempts.max(1),
            state: Mutex::new(QueueState::default()),
            available: Notify::new(),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_stage(&self, task: &StageTask) -> Result<(), QueueError> {
        if task.stage != self.stage {
            return Err(QueueError::StageMismatch {
                expected: self.stage,
                found: task.stage,
            });
        }
        Ok(())
    }

    fn push(&self, task: StageTask) -> Result<(), QueueError> {
        {
            let mut state = self.lock();
            if state.closed {
                return Err(QueueError::Closed(self.stage));
            }
            state.tasks.push_back(task);
        }
        self.available.notify_one();
        Ok(())
    }
}

#[async_trait]
impl TaskQueue for InMemoryQueue {
    fn stage(&self) -> Stage {
        self.stage
    }

    async fn produce(&self, task: StageTask) -> Result<(), QueueError> {
        self.check_stage(&task)?;
        tracing::trace!("Queued {} task {} for job {}", self.stage, task.task_id, task.job_id);
        self.push(task)
    }

    async fn consume(&self) -> Option<StageTask> {
        loop {
            let available = self.available.notified();

            {
                let mut state = self.lock();
                if let Some(mut task) = state.tasks.pop_front() {
                    task.attempt += 1;
                    return Some(task);
                }
                if state.closed {
                    return None;
                }
            }

            available.await;
        }
    }

    async fn retry(&self, task: StageTask) -> Result<Redelivery, QueueError> {
        self.check_stage(&task)?;

        if task.attempt >= self.max_attempts {
            return Ok(Redelivery::Exhausted {
                attempts: task.attempt,
            });
        }

        let attempt = task.attempt + 1;
        self.push(task)?;
        Ok(Redelivery::Requeued { attempt })
    }

    fn close(&self) {
        self.lock().closed = true;
        self.available.notify_waiters();
    }

    fn len(&self) -> usize {
        self.lock().tasks.len()
    }
}
