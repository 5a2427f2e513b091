//! Fire-and-forget execution of report work off the measured thread
//!
//! The monitor hands every report to a [`Dispatcher`] so that string
//! formatting and sink I/O never run inside a tick or GC callback.

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A unit of deferred work
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs jobs at an unspecified later time
///
/// There is no result and no error channel back to the caller.
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, job: Job);
}

/// Dispatcher backed by an unbounded channel and a single tokio worker task
///
/// Jobs run in submission order on the worker. Submitting never blocks
/// and there is no backpressure.
#[derive(Clone)]
pub struct TokioDispatcher {
    job_tx: mpsc::UnboundedSender<Job>,
}

impl TokioDispatcher {
    /// Spawn the worker on the given runtime
    ///
    /// The worker exits once every dispatcher clone has been dropped and the
    /// queue is drained.
    pub fn spawn(runtime: &Handle) -> (Self, JoinHandle<()>) {
        let (job_tx, job_rx) = mpsc::unbounded_channel();
        let worker = runtime.spawn(run_worker(job_rx));
        (Self { job_tx }, worker)
    }

    /// Spawn the worker on the current runtime
    ///
    /// Panics when called outside a tokio runtime.
    pub fn spawn_current() -> (Self, JoinHandle<()>) {
        Self::spawn(&Handle::current())
    }
}

async fn run_worker(mut job_rx: mpsc::UnboundedReceiver<Job>) {
    let mut executed = 0u64;
    while let Some(job) = job_rx.recv().await {
        job();
        executed += 1;
    }
    debug!(jobs_executed = executed, "Report dispatcher stopped");
}

impl Dispatcher for TokioDispatcher {
    fn dispatch(&self, job: Job) {
        if self.job_tx.send(job).is_err() {
            warn!("Report dispatcher worker has stopped, dropping report");
        }
    }
}

/// Dispatcher that runs each job immediately on the calling thread
///
/// Meant for tests and single-threaded embeddings where there is no
/// separate thread to hand work to.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineDispatcher;

impl Dispatcher for InlineDispatcher {
    fn dispatch(&self, job: Job) {
        job();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_inline_dispatcher_runs_immediately() {
        let hits = Arc::new(Mutex::new(0));
        let counter = hits.clone();

        InlineDispatcher.dispatch(Box::new(move || *counter.lock().unwrap() += 1));

        assert_eq!(*hits.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_tokio_dispatcher_preserves_submission_order() {
        let (dispatcher, worker) = TokioDispatcher::spawn_current();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..10 {
            let seen = seen.clone();
            dispatcher.dispatch(Box::new(move || seen.lock().unwrap().push(i)));
        }

        drop(dispatcher);
        worker.await.unwrap();

        assert_eq!(*seen.lock().unwrap(), (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_dispatch_does_not_run_job_synchronously() {
        let (dispatcher, worker) = TokioDispatcher::spawn_current();
        let ran = Arc::new(Mutex::new(false));
        let flag = ran.clone();

        dispatcher.dispatch(Box::new(move || *flag.lock().unwrap() = true));
        // current_thread runtime: the worker cannot have run yet
        assert!(!*ran.lock().unwrap());

        drop(dispatcher);
        worker.await.unwrap();
        assert!(*ran.lock().unwrap());
    }

    #[tokio::test]
    async fn test_dispatch_after_worker_stopped_is_dropped() {
        let (dispatcher, worker) = TokioDispatcher::spawn_current();
        worker.abort();
        let _ = worker.await;

        // Must not panic
        dispatcher.dispatch(Box::new(|| {}));
    }
}
