use std::future::Future;

use tracing::debug;

use crate::data::TaskHandle;
use crate::effects::delegate::ClientDelegate;
use crate::error::{Error, Result};

/// What a retry policy gets to look at.
#[derive(Debug)]
pub struct RetryContext {
    /// Attempts made so far, starting at 1.
    pub attempts: u32,
    /// Task of the failed attempt.
    pub task:     TaskHandle,
    pub error:    Error,
}

/// A failure tied to the task that produced it.
#[derive(Debug)]
pub struct TaskFailure {
    pub task:  TaskHandle,
    pub error: Error,
}

/// Failure of a single attempt.
#[derive(Debug)]
pub enum Attempt {
    /// The task failed; the policy decides whether to try again.
    Task(TaskFailure),
    /// Failed before or outside a task; never retried.
    Other(Error),
}

impl Attempt {
    pub fn task(task: TaskHandle, error: Error) -> Self {
        Attempt::Task(TaskFailure { task, error })
    }
}

/// Run `work` until it succeeds or the delegate declines another attempt.
///
/// `work` receives the attempt number, starting at 1, and must start from
/// scratch each time. The error surfaced after a declined retry is the one
/// the last attempt failed with.
pub async fn perform_with_retries<V, F, Fut>(delegate: &dyn ClientDelegate, mut work: F) -> Result<V>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = std::result::Result<V, Attempt>>,
{
    let mut attempts = 1;
    loop {
        let failure = match work(attempts).await {
            Ok(value) => return Ok(value),
            Err(Attempt::Other(error)) => return Err(error),
            Err(Attempt::Task(failure)) => failure,
        };

        let context = RetryContext {
            attempts,
            task: failure.task,
            error: failure.error,
        };
        if !delegate.should_retry(&context).await? {
            debug!(task = %context.task, attempts, "giving up");
            return Err(context.error);
        }
        debug!(task = %context.task, attempts, error = %context.error, "retrying");
        attempts += 1;
    }
}
