use std::thread;

use crossbeam::channel::{self, Receiver, Sender};
use tracing::{debug, error, instrument};

use super::{ThreadPool, WORKER_NAME};
use crate::Result;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A thread pool implemented with a shared job queue (i.e. channel).
///
/// This implementation uses the MPMC [`channel`] provided by the crossbeam crate as a single
/// producer (the pool itself), multiple consumer (the worker threads) queue.
///
/// If a job panics, its worker thread is replaced by a new one. Failing to start the
/// replacement is only logged, so the pool can shrink; once no worker is left, spawned jobs
/// are dropped with an error.
///
/// [`channel`]: https://docs.rs/crossbeam/0.8.1/crossbeam/channel/index.html
pub struct SharedQueueThreadPool {
    /// the sending part of the channel
    tx: Sender<Job>,
}

impl ThreadPool for SharedQueueThreadPool {
    /// create a new thread pool with the given number of `threads`.
    /// Every thread created will have a handle to the receiving end of the channel
    fn new(threads: u32) -> Result<Self> {
        let (tx, rx) = channel::unbounded::<Job>();
        for _ in 0..threads {
            start_worker(TaskReceiver(rx.clone()))?;
        }
        debug!("created shared queue pool with {} threads", threads);
        Ok(SharedQueueThreadPool { tx })
    }

    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.tx.send(Box::new(job)).is_err() {
            error!("there are no threads left in the pool, job dropped");
        }
    }
}

fn start_worker(rx: TaskReceiver) -> std::io::Result<()> {
    thread::Builder::new()
        .name(WORKER_NAME.into())
        .spawn(move || run_tasks(rx))
        .map(|_| ())
}

/// Receives jobs from the channel and runs them. Dropping it while panicking starts a
/// replacement worker.
#[derive(Clone)]
struct TaskReceiver(Receiver<Job>);

impl Drop for TaskReceiver {
    fn drop(&mut self) {
        if thread::panicking() {
            debug!("worker panicked, starting a new one");
            if let Err(e) = start_worker(self.clone()) {
                error!("failed to start a worker thread: {}", e);
            }
        }
    }
}

#[instrument(skip(rx))]
fn run_tasks(rx: TaskReceiver) {
    while let Ok(job) = rx.0.recv() {
        job();
    }
    debug!("worker exiting, the pool was dropped");
}
