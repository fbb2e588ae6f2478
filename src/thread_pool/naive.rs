use std::thread;

use tracing::error;

use super::{ThreadPool, WORKER_NAME};
use crate::Result;

/// a simple thread-pool that is not actually a pool. It starts a new thread on every spawn
/// request, so the thread count is ignored
#[derive(Debug)]
pub struct NaiveThreadPool;

impl ThreadPool for NaiveThreadPool {
    fn new(_threads: u32) -> Result<Self> {
        Ok(NaiveThreadPool)
    }

    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Err(e) = thread::Builder::new().name(WORKER_NAME.into()).spawn(job) {
            error!("could not start a thread: {}", e);
        }
    }
}
