//! Thread pools that run one job per accepted connection.
use crate::Result;

mod naive;
mod rayon_pool;
mod shared_queue;

pub use self::naive::NaiveThreadPool;
pub use self::rayon_pool::RayonThreadPool;
pub use self::shared_queue::SharedQueueThreadPool;

/// name given to every thread a pool starts
pub(crate) const WORKER_NAME: &str = "market-worker";

/// A pool of threads the server hands connection jobs to.
pub trait ThreadPool {
    /// creates a pool with `threads` threads
    ///
    /// # Errors
    /// if a thread (or the underlying pool) could not be created
    fn new(threads: u32) -> Result<Self>
    where
        Self: Sized;

    /// runs `job` on one of the pool's threads. A panicking job must not take the pool down.
    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel;
    use std::time::Duration;

    fn runs_every_job<P: ThreadPool>() {
        let pool = P::new(3).unwrap();
        let (tx, rx) = channel::unbounded();
        for i in 0..20 {
            let tx = tx.clone();
            pool.spawn(move || {
                let _ = tx.send(i);
            });
        }
        let mut seen: Vec<i32> = (0..20)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..20).collect::<Vec<_>>());
    }

    fn survives_a_panicking_job<P: ThreadPool>() {
        let pool = P::new(1).unwrap();
        pool.spawn(|| panic!("job failed"));
        let (tx, rx) = channel::bounded(1);
        pool.spawn(move || {
            let _ = tx.send(());
        });
        assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn naive_pool() {
        runs_every_job::<NaiveThreadPool>();
        survives_a_panicking_job::<NaiveThreadPool>();
    }

    #[test]
    fn shared_queue_pool() {
        runs_every_job::<SharedQueueThreadPool>();
        survives_a_panicking_job::<SharedQueueThreadPool>();
    }

    #[test]
    fn rayon_pool() {
        runs_every_job::<RayonThreadPool>();
        survives_a_panicking_job::<RayonThreadPool>();
    }
}
