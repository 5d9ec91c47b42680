//! Fixed-size worker pool with timed task submission.
//!
//! A task is a zero-argument unit of work producing exactly one result value,
//! opaque to the pool. Submitters block until their task's result arrives;
//! the timed variant bounds only how long a task may wait to be *admitted*
//! (handed to a worker), never how long an admitted task may run. Admission
//! is gated on worker availability: a task enters the shared queue only when
//! one of the `concurrency` slots is free, so a saturated pool rejects timed
//! submissions instead of buffering them.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::error::{Error, Result};

/// A submitted task plus its per-submission completion state: a single-use
/// result channel and the admission slot it occupies. Both live exactly as
/// long as this one execution.
struct Job<R> {
    work: BoxFuture<'static, R>,
    reply: oneshot::Sender<R>,
    slot: OwnedSemaphorePermit,
}

/// Worker pool. Concurrency is fixed at construction.
///
/// Lifecycle: `new` allocates the queue but starts nothing; `run` spawns the
/// workers and opens admission; `stop` closes admission, drains what was
/// already admitted, and waits for every worker to exit.
pub struct Pool<R> {
    concurrency: usize,
    /// Admission gate. Zero permits until `run`; one permit per worker after.
    /// A permit is held from admission until the task's result is delivered,
    /// so available permits == workers able to take a task now.
    slots: Arc<Semaphore>,
    sender: Mutex<Option<mpsc::UnboundedSender<Job<R>>>>,
    intake: Mutex<Option<mpsc::UnboundedReceiver<Job<R>>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
}

impl<R: Send + 'static> Pool<R> {
    /// Create a pool with the given number of workers, not yet running.
    ///
    /// Fails on zero concurrency rather than clamping.
    pub fn new(concurrency: usize) -> Result<Self> {
        if concurrency == 0 {
            return Err(Error::InvalidPoolSize(concurrency));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        Ok(Self {
            concurrency,
            slots: Arc::new(Semaphore::new(0)),
            sender: Mutex::new(Some(tx)),
            intake: Mutex::new(Some(rx)),
            workers: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        })
    }

    /// Number of workers.
    pub fn size(&self) -> usize {
        self.concurrency
    }

    /// Spawn the workers and open admission. Idempotent: repeated calls are
    /// ignored, the pool never holds more than `concurrency` workers.
    ///
    /// Until `run` is called no task can be admitted: blocking submissions
    /// wait, timed submissions time out.
    ///
    /// Must be called from within a tokio runtime.
    pub fn run(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("pool already running, ignoring duplicate run()");
            return;
        }

        let intake = self
            .intake
            .lock()
            .expect("pool mutex poisoned")
            .take()
            .expect("intake consumed exactly once by run()");
        let intake = Arc::new(tokio::sync::Mutex::new(intake));

        let mut workers = self.workers.lock().expect("pool mutex poisoned");
        for id in 0..self.concurrency {
            workers.push(tokio::spawn(worker_loop(id, Arc::clone(&intake))));
        }
        self.slots.add_permits(self.concurrency);
    }

    /// Close admission and wait for all workers to exit.
    ///
    /// Tasks already admitted (including one mid-execution) run to completion
    /// and deliver their results before this returns. Submissions racing or
    /// following `stop` fail with [`Error::PoolStopped`]; waiters parked on
    /// admission are woken with the same error.
    pub async fn stop(&self) {
        self.slots.close();
        drop(self.sender.lock().expect("pool mutex poisoned").take());

        let handles = std::mem::take(&mut *self.workers.lock().expect("pool mutex poisoned"));
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Submit a task and wait for its result, without any time bound.
    ///
    /// Blocks until a worker is free to take the task and then until the
    /// task finishes; callers on latency-sensitive paths should prefer
    /// [`Pool::submit_timed`].
    pub async fn submit<F>(&self, task: F) -> Result<R>
    where
        F: Future<Output = R> + Send + 'static,
    {
        let slot = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| Error::PoolStopped)?;
        self.dispatch(task, slot).await
    }

    /// Submit a task, waiting at most `timeout` for a worker to accept it.
    ///
    /// If no slot frees up in time the task is dropped unexecuted and
    /// [`Error::JobTimedOut`] is returned. A timed-out task has had no side
    /// effects. The timeout bounds admission only: once a worker has the
    /// task, the wait for its result is unbounded.
    pub async fn submit_timed<F>(&self, task: F, timeout: Duration) -> Result<R>
    where
        F: Future<Output = R> + Send + 'static,
    {
        let slot = match tokio::time::timeout(timeout, Arc::clone(&self.slots).acquire_owned()).await
        {
            Err(_) => return Err(Error::JobTimedOut),
            Ok(Err(_)) => return Err(Error::PoolStopped),
            Ok(Ok(slot)) => slot,
        };
        self.dispatch(task, slot).await
    }

    /// Hand an admitted task to the queue and wait for its result.
    async fn dispatch<F>(&self, task: F, slot: OwnedSemaphorePermit) -> Result<R>
    where
        F: Future<Output = R> + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job = Job {
            work: task.boxed(),
            reply: reply_tx,
            slot,
        };

        let sender = self
            .sender
            .lock()
            .expect("pool mutex poisoned")
            .clone()
            .ok_or(Error::PoolStopped)?;
        sender.send(job).map_err(|_| Error::PoolStopped)?;

        reply_rx.await.map_err(|_| Error::TaskLost)
    }
}

/// One worker: take a job, execute it, deliver the result, release the slot.
/// Exits when the queue is closed and drained. A panicking task is caught
/// and logged; the worker keeps serving.
async fn worker_loop<R: Send + 'static>(
    id: usize,
    intake: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Job<R>>>>,
) {
    loop {
        let job = { intake.lock().await.recv().await };
        let Some(Job { work, reply, slot }) = job else {
            break;
        };

        match AssertUnwindSafe(work).catch_unwind().await {
            Ok(result) => {
                // The submitter may have gone away; nothing to do then.
                let _ = reply.send(result);
            }
            Err(_) => {
                error!(worker = id, "task panicked, dropping its result slot");
            }
        }

        // Slot released only now: an admitted-but-unfinished task keeps its
        // worker counted as busy.
        drop(slot);
    }
    debug!(worker = id, "worker exited");
}
