//! Bounded worker pool for provider calls.
//!
//! A fixed number of tokio tasks drain one shared queue. Every item runs
//! through [`run_with_retry`] so a slow or failing item only ever occupies
//! its own worker.

use std::collections::VecDeque;
use std::fmt::Debug;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::retry::{run_with_retry, RetryConfig, TaskFailure};
use crate::source::SourceError;
use crate::throttle::RequestThrottle;

#[derive(Debug, Clone)]
pub struct WorkerPool {
    workers: usize,
    retry: RetryConfig,
    attempt_timeout: Duration,
    throttle: Option<RequestThrottle>,
}

impl WorkerPool {
    pub fn new(workers: usize, retry: RetryConfig, attempt_timeout: Duration) -> Self {
        Self {
            workers: workers.max(1),
            retry,
            attempt_timeout,
            throttle: None,
        }
    }

    pub fn with_throttle(mut self, throttle: Option<RequestThrottle>) -> Self {
        self.throttle = throttle;
        self
    }

    pub const fn workers(&self) -> usize {
        self.workers
    }

    /// Runs `operation` once per item and returns the results in input order.
    ///
    /// Items whose worker task died before reporting come back as an
    /// internal `TaskFailure` with zero attempts.
    pub async fn run<K, T, F, Fut>(
        &self,
        label: &'static str,
        items: Vec<K>,
        operation: F,
    ) -> Vec<(K, Result<T, TaskFailure>)>
    where
        K: Clone + Debug + Send + Sync + 'static,
        T: Send + 'static,
        F: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, SourceError>> + Send + 'static,
    {
        if items.is_empty() {
            return Vec::new();
        }

        let total = items.len();
        let queue: Arc<Mutex<VecDeque<(usize, K)>>> =
            Arc::new(Mutex::new(items.iter().cloned().enumerate().collect()));
        let operation = Arc::new(operation);
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let worker_count = self.workers.min(total);

        tracing::debug!(label, items = total, workers = worker_count, "worker pool started");

        let mut tasks = JoinSet::new();
        for _ in 0..worker_count {
            let queue = Arc::clone(&queue);
            let operation = Arc::clone(&operation);
            let sender = sender.clone();
            let retry = self.retry.clone();
            let throttle = self.throttle.clone();
            let attempt_timeout = self.attempt_timeout;

            tasks.spawn(async move {
                loop {
                    let next = queue
                        .lock()
                        .expect("worker queue lock is not poisoned")
                        .pop_front();
                    let Some((index, item)) = next else {
                        break;
                    };

                    let result = run_with_retry(&retry, attempt_timeout, throttle.as_ref(), || {
                        (*operation)(item.clone())
                    })
                    .await;

                    if let Err(failure) = &result {
                        tracing::warn!(
                            label,
                            item = ?item,
                            attempts = failure.attempts,
                            code = failure.error.code(),
                            error = failure.error.message(),
                            "work item failed"
                        );
                    }
                    if sender.send((index, result)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(sender);

        while let Some(joined) = tasks.join_next().await {
            if let Err(error) = joined {
                tracing::warn!(label, %error, "worker task aborted");
            }
        }

        let mut slots: Vec<Option<Result<T, TaskFailure>>> = (0..total).map(|_| None).collect();
        while let Ok((index, result)) = receiver.try_recv() {
            slots[index] = Some(result);
        }

        items
            .into_iter()
            .zip(slots)
            .map(|(item, slot)| {
                let result = slot.unwrap_or_else(|| {
                    Err(TaskFailure {
                        attempts: 0,
                        error: SourceError::internal("worker task aborted before reporting"),
                    })
                });
                (item, result)
            })
            .collect()
    }
}
