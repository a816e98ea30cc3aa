//! CPU-bound jobs on the blocking pool, under a deadline

use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("processing exceeded the {0:?} deadline")]
    TimedOut(Duration),

    #[error("processing worker failed: {0}")]
    Panicked(String),
}

/// Run `job` on the blocking pool and wait at most `deadline` for it
///
/// The job receives a token that is cancelled when the deadline passes or
/// when the awaiting future is dropped (client went away). Jobs poll the
/// token between stages; the thread itself cannot be interrupted.
pub async fn run_with_deadline<T, F>(deadline: Duration, job: F) -> Result<T, JobError>
where
    F: FnOnce(CancellationToken) -> T + Send + 'static,
    T: Send + 'static,
{
    let cancel = CancellationToken::new();
    let _cancel_on_drop = cancel.clone().drop_guard();

    let token = cancel.clone();
    let handle = tokio::task::spawn_blocking(move || job(token));

    match tokio::time::timeout(deadline, handle).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(join_err)) => Err(JobError::Panicked(join_err.to_string())),
        Err(_) => {
            cancel.cancel();
            tracing::warn!(?deadline, "Processing deadline exceeded, job cancelled");
            Err(JobError::TimedOut(deadline))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_job_result_is_returned() {
        let value = run_with_deadline(Duration::from_secs(5), |_| 21 * 2).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_deadline_cancels_token() {
        let observed = Arc::new(AtomicBool::new(false));
        let flag = observed.clone();

        let result = run_with_deadline(Duration::from_millis(50), move |cancel| {
            for _ in 0..200 {
                if cancel.is_cancelled() {
                    flag.store(true, Ordering::SeqCst);
                    return;
                }
                std::thread::sleep(Duration::from_millis(10));
            }
        })
        .await;

        assert!(matches!(result, Err(JobError::TimedOut(_))));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(observed.load(Ordering::SeqCst));
    }
}
