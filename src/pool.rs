//! Bounded Worker Pool
//!
//! Fixed-concurrency job runner for fan-outs that can grow large, such as
//! per-item calls inside a single scope. Jobs are queued with
//! [`WorkerPool::add_job`] and executed by [`WorkerPool::run`], which
//! returns exactly one [`JobResult`] per submitted job. A job that panics
//! yields an error result instead of taking its worker down.

use anyhow::{anyhow, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// A unit of work: called once, resolves to a value or an error
pub type Work<T> = Box<dyn FnOnce() -> BoxFuture<'static, Result<T>> + Send>;

/// Outcome of one job, tagged with its submission index
#[derive(Debug)]
pub struct JobResult<T> {
    pub index: usize,
    pub value: Result<T>,
}

/// Fixed-concurrency job runner. Consumed by [`WorkerPool::run`].
pub struct WorkerPool<T> {
    concurrency: usize,
    jobs: Vec<Work<T>>,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Create a pool running at most `concurrency` jobs at once (zero is treated as one)
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            jobs: Vec::new(),
        }
    }

    /// Queue a job
    pub fn add_job<F, Fut>(&mut self, job: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.jobs.push(Box::new(move || job().boxed()));
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Run every queued job and wait for all of them.
    ///
    /// Results are sorted by submission index.
    pub async fn run(self) -> Vec<JobResult<T>> {
        let total = self.jobs.len();
        if total == 0 {
            return Vec::new();
        }

        let workers = self.concurrency.min(total);
        tracing::debug!("worker pool: {} jobs on {} workers", total, workers);

        let (job_tx, job_rx) = mpsc::channel::<(usize, Work<T>)>(workers);
        let job_rx = Arc::new(Mutex::new(job_rx));
        let (result_tx, mut result_rx) = mpsc::channel::<JobResult<T>>(total);

        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let job_rx = Arc::clone(&job_rx);
            let result_tx = result_tx.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    let next = job_rx.lock().await.recv().await;
                    let Some((index, work)) = next else {
                        break;
                    };
                    let value = run_guarded(work).await;
                    if result_tx.send(JobResult { index, value }).await.is_err() {
                        break;
                    }
                }
            }));
        }
        drop(result_tx);

        let jobs = self.jobs;
        let feeder = tokio::spawn(async move {
            for (index, work) in jobs.into_iter().enumerate() {
                if job_tx.send((index, work)).await.is_err() {
                    break;
                }
            }
        });

        let mut results = Vec::with_capacity(total);
        while results.len() < total {
            match result_rx.recv().await {
                Some(result) => results.push(result),
                None => break,
            }
        }

        // Workers exit once the feeder has dropped the job sender
        let _ = feeder.await;
        for handle in futures::future::join_all(handles).await {
            if let Err(e) = handle {
                tracing::error!("worker task failed: {}", e);
            }
        }

        if results.len() < total {
            let mut seen = vec![false; total];
            for result in &results {
                seen[result.index] = true;
            }
            for (index, _) in seen.iter().enumerate().filter(|(_, done)| !**done) {
                results.push(JobResult {
                    index,
                    value: Err(anyhow!("job {} was lost before reporting", index)),
                });
            }
        }

        results.sort_by_key(|r| r.index);
        results
    }
}

async fn run_guarded<T>(work: Work<T>) -> Result<T> {
    let future = match std::panic::catch_unwind(AssertUnwindSafe(work)) {
        Ok(future) => future,
        Err(payload) => return Err(anyhow!("job panicked: {}", panic_message(payload.as_ref()))),
    };

    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(value) => value,
        Err(payload) => Err(anyhow!("job panicked: {}", panic_message(payload.as_ref()))),
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_every_job_reports_once() {
        let mut pool = WorkerPool::new(3);
        for i in 0..10u32 {
            pool.add_job(move || async move { Ok(i * 2) });
        }

        let results = pool.run().await;

        assert_eq!(results.len(), 10);
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.index, i);
            assert_eq!(*result.value.as_ref().unwrap(), i as u32 * 2);
        }
    }

    #[tokio::test]
    async fn test_panicking_job_becomes_error() {
        let mut pool = WorkerPool::new(2);
        for i in 0..5u32 {
            pool.add_job(move || async move {
                if i == 3 {
                    panic!("boom on job {}", i);
                }
                Ok(i)
            });
        }

        let results = pool.run().await;

        assert_eq!(results.len(), 5);
        let err = results[3].value.as_ref().unwrap_err();
        assert!(err.to_string().contains("boom on job 3"));
        for i in [0, 1, 2, 4] {
            assert!(results[i].value.is_ok(), "job {} should succeed", i);
        }
    }

    #[tokio::test]
    async fn test_synchronous_panic_is_caught() {
        let mut pool: WorkerPool<()> = WorkerPool::new(1);
        pool.add_job(|| -> futures::future::Ready<Result<()>> { panic!("before the future") });
        pool.add_job(|| async { Ok(()) });

        let results = pool.run().await;

        assert_eq!(results.len(), 2);
        assert!(results[0].value.is_err());
        assert!(results[1].value.is_ok());
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut pool = WorkerPool::new(3);
        for _ in 0..12 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            pool.add_job(move || async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            });
        }

        let results = pool.run().await;

        assert_eq!(results.len(), 12);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_empty_pool() {
        let pool: WorkerPool<u8> = WorkerPool::new(0);
        assert!(pool.is_empty());
        assert!(pool.run().await.is_empty());
    }
}
