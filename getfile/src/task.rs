//! This module provides required thread pooling features.

use std::io;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use thiserror::Error;

/// A worker thread panicked instead of returning from its routine.
#[derive(Debug, Error)]
#[error("worker {id} panicked")]
pub struct JoinError {
    id: usize,
}

impl JoinError {
    /// Id of the worker that panicked.
    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }
}

/// A fixed-size pool of named worker threads all running the same blocking routine.
///
/// Each worker receives its own unique id and runs the routine exactly once, which usually loops over some shared
/// source of work (a queue, a workload...) until it is exhausted or shut down. The pool never grows nor shrinks.
///
/// # Example
/// ```
/// # use getfile::task::Pool;
/// let pool = Pool::spawn("hello", 3.try_into().unwrap(), |id| {
///     println!("Hello from worker #{id}!");
///     id
/// })
/// .unwrap();
///
/// assert_eq!(pool.join().unwrap().len(), 3);
/// ```
#[derive(Debug)]
pub struct Pool<T> {
    /// The pool of workers.
    workers: Vec<Worker<T>>,
}

impl<T: Send + 'static> Pool<T> {
    /// Spawn a pool with `size` workers named after `name`, each one running `routine` with its own id.
    ///
    /// _Note: if the OS refuses to create a thread, the error is returned and the workers spawned so far keep running detached._
    pub fn spawn<F>(name: &str, size: NonZeroUsize, routine: F) -> io::Result<Self>
    where
        F: Fn(usize) -> T + Send + Sync + 'static,
    {
        let routine = Arc::new(routine);

        static WORKER_ID: AtomicUsize = AtomicUsize::new(0);
        let size = size.get();
        let id = WORKER_ID.fetch_add(size, Ordering::Relaxed);

        let workers = (0..size)
            .map(|i| Worker::new(name, id.wrapping_add(i), Arc::clone(&routine)))
            .collect::<io::Result<_>>()?;

        Ok(Self { workers })
    }

    /// Number of workers in the pool.
    #[inline]
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Always `false` since a pool is spawned with at least one worker.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Wait for every worker to return, collecting their results in spawn order.
    ///
    /// This blocks as long as any routine is still running: routines looping forever must first be told to stop
    /// through whatever shared state they are watching.
    pub fn join(self) -> Result<Vec<T>, JoinError> {
        self.workers.into_iter().map(Worker::join).collect()
    }
}

#[derive(Debug)]
struct Worker<T> {
    id: usize,
    handle: thread::JoinHandle<T>,
}

impl<T: Send + 'static> Worker<T> {
    fn new<F>(name: &str, id: usize, routine: Arc<F>) -> io::Result<Worker<T>>
    where
        F: Fn(usize) -> T + Send + Sync + 'static,
    {
        tracing::debug!("Starting {name} worker {id}...");

        let handle = thread::Builder::new().name(format!("{name}-{id}")).spawn(move || routine(id))?;

        Ok(Worker { id, handle })
    }

    fn join(self) -> Result<T, JoinError> {
        tracing::debug!("Joining worker {}...", self.id);

        self.handle.join().map_err(|_| JoinError { id: self.id })
    }
}
