use tracing::{debug, error};

use super::{ThreadPool, WORKER_NAME};
use crate::{MarketError, Result};

/// A thread pool that uses a work stealing strategy as implemented by the [`Rayon`] library.
///
/// [`Rayon`]: https://docs.rs/rayon/latest/rayon/index.html
pub struct RayonThreadPool {
    pool: rayon::ThreadPool,
}

impl ThreadPool for RayonThreadPool {
    fn new(threads: u32) -> Result<Self>
    where
        Self: Sized,
    {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads as usize)
            .thread_name(|i| format!("{}-{}", WORKER_NAME, i))
            // rayon aborts the process on a panicking job unless a handler is installed
            .panic_handler(|_| error!("a job panicked on the rayon pool"))
            .build()
            .map_err(|e| {
                MarketError::ThreadPool(format!("could not build thread pool: {:?}", &e))
            })?;
        debug!("created rayon pool with {} threads", threads);
        Ok(Self { pool })
    }

    /// queues `job` without blocking the caller
    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.pool.spawn(job);
    }
}
