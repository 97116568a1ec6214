//! This module provides the download client: a fixed pool of workers pulling request paths from a shared source and
//! storing each response into its own local file.
//!
//! Every download is independent: a failed request or a non-OK response only removes its own local file, and the
//! worker moves on to its next request. Only setup failures and oversized request paths stop the whole pool.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use url::Host;

use crate::proto::{self, Status, Transfer};
use crate::task::{JoinError, Pool};

mod local;
pub use local::LocalPathAllocator;

mod workload;
pub use workload::{PathSource, Workload, MAX_PATH_LEN};

pub const DEFAULT_SERVER: &str = "localhost";
pub const DEFAULT_PORT: u16 = 6200;
pub const DEFAULT_WORKERS: NonZeroUsize = match NonZeroUsize::new(4) {
    Some(workers) => workers,
    None => unreachable!(),
};
pub const DEFAULT_REQUESTS: NonZeroUsize = match NonZeroUsize::new(4) {
    Some(requests) => requests,
    None => unreachable!(),
};
pub const DEFAULT_WORKLOAD: &str = "workload.txt";

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to load workload `{}`: {source}", path.display())]
    Workload { path: PathBuf, source: io::Error },
    #[error("workload `{}` is empty", path.display())]
    EmptyWorkload { path: PathBuf },
    #[error("request path exceeds {} bytes ({len} bytes)", MAX_PATH_LEN)]
    PathTooLong { len: usize },
    #[error("failed to create directory `{}`: {source}", path.display())]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("failed to create file `{}`: {source}", path.display())]
    CreateFile { path: PathBuf, source: io::Error },
    #[error("failed to spawn download workers: {0}")]
    Spawn(#[source] io::Error),
    #[error(transparent)]
    Join(#[from] JoinError),
}

/// Client settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub server: Host,
    pub port: u16,
    pub workers: NonZeroUsize,
    pub requests_per_worker: NonZeroUsize,
    pub workload: PathBuf,
    /// Directory downloaded files are stored under.
    pub output_dir: PathBuf,
}

impl ClientConfig {
    #[inline]
    pub fn job(&self) -> DownloadJob {
        DownloadJob {
            server: self.server.clone(),
            port: self.port,
            requests_per_worker: self.requests_per_worker,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: Host::Domain(DEFAULT_SERVER.to_owned()),
            port: DEFAULT_PORT,
            workers: DEFAULT_WORKERS,
            requests_per_worker: DEFAULT_REQUESTS,
            workload: PathBuf::from(DEFAULT_WORKLOAD),
            output_dir: PathBuf::from("."),
        }
    }
}

/// What every download worker is asked to do, shared read-only among them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    pub server: Host,
    pub port: u16,
    pub requests_per_worker: NonZeroUsize,
}

/// Report of a single download.
#[derive(Debug)]
pub struct Outcome {
    pub request_path: String,
    /// Local file holding the response, only kept for complete OK responses.
    pub local_path: Option<PathBuf>,
    pub status: Status,
    pub bytes_received: u64,
    pub file_len: u64,
    /// Transport-level failure, if any.
    pub error: Option<proto::Error>,
}

impl Outcome {
    #[inline]
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.status == Status::Ok
    }
}

struct Shared<I> {
    job: DownloadJob,
    source: PathSource<I>,
    allocator: LocalPathAllocator,
    /// Raised by the first worker hitting a fatal error, so that its siblings stop early.
    halted: AtomicBool,
}

/// A fixed pool of download workers, each one performing [`DownloadJob::requests_per_worker`] downloads.
#[derive(Debug)]
pub struct DownloadPool {
    pool: Pool<Result<Vec<Outcome>, Error>>,
}

impl DownloadPool {
    pub fn start<I>(workers: NonZeroUsize, job: DownloadJob, source: PathSource<I>, allocator: LocalPathAllocator) -> Result<Self, Error>
    where
        I: Iterator<Item = String> + Send + 'static,
    {
        let shared = Arc::new(Shared {
            job,
            source,
            allocator,
            halted: AtomicBool::new(false),
        });

        let pool = Pool::spawn("download", workers, move |id| run_worker(id, &shared)).map_err(Error::Spawn)?;

        Ok(Self { pool })
    }

    /// Wait for every worker to be done, returning all their reports or the first fatal error.
    pub fn join(self) -> Result<Vec<Outcome>, Error> {
        let mut outcomes = Vec::new();
        let mut failure = None;

        for result in self.pool.join()? {
            match result {
                Ok(reports) => outcomes.extend(reports),
                Err(err) => {
                    failure.get_or_insert(err);
                }
            }
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(outcomes),
        }
    }
}

/// Download the configured workload with the configured number of workers.
pub fn run(config: &ClientConfig) -> Result<Vec<Outcome>, Error> {
    let workload = Workload::load(&config.workload)?;

    DownloadPool::start(
        config.workers,
        config.job(),
        PathSource::new(workload),
        LocalPathAllocator::new(&config.output_dir),
    )?
    .join()
}

fn run_worker<I: Iterator<Item = String>>(id: usize, shared: &Shared<I>) -> Result<Vec<Outcome>, Error> {
    let requests = shared.job.requests_per_worker.get();
    let mut outcomes = Vec::with_capacity(requests);

    for _ in 0..requests {
        if shared.halted.load(Ordering::Acquire) {
            tracing::debug!("Halting download worker {id}.");
            break;
        }

        match download(&shared.job, &shared.source, &shared.allocator) {
            Ok(Some(outcome)) => outcomes.push(outcome),
            Ok(None) => {
                tracing::debug!("Workload exhausted, shutting down worker {id}.");
                break;
            }
            Err(err) => {
                tracing::error!("Download worker {id} failed: {err}");
                shared.halted.store(true, Ordering::Release);
                return Err(err);
            }
        }
    }

    Ok(outcomes)
}

/// Download the next path of `source` into a freshly allocated local file.
///
/// Returns `None` when the source is exhausted. Failed requests are reported in the returned [`Outcome`], only
/// oversized paths and local file creation failures are errors.
pub fn download<I>(job: &DownloadJob, source: &PathSource<I>, allocator: &LocalPathAllocator) -> Result<Option<Outcome>, Error>
where
    I: Iterator<Item = String>,
{
    let Some(request_path) = source.next_path()? else {
        return Ok(None);
    };

    let local_path = allocator.allocate(&request_path);
    let mut writer = BufWriter::new(allocator.create(&local_path)?);
    let mut transfer = Transfer::new(job.server.clone(), job.port, request_path.as_str());

    tracing::info!("Requesting {}:{}{}", transfer.host(), transfer.port(), transfer.path());

    let result = transfer
        .perform(|chunk| writer.write_all(chunk))
        .and_then(|()| writer.flush().map_err(proto::Error::Write));

    // close before any removal
    drop(writer);

    if let Err(err) = &result {
        tracing::warn!("Request for {request_path} returned an error: {err}");
    }

    let keep = result.is_ok() && transfer.status() == Status::Ok;

    if !keep {
        if let Err(err) = fs::remove_file(&local_path) {
            tracing::error!("Failed to remove `{}`: {err}", local_path.display());
        }
    }

    tracing::info!(
        "Status: {}, received {} of {} bytes for {request_path}",
        transfer.status(),
        transfer.bytes_received(),
        transfer.file_len()
    );

    Ok(Some(Outcome {
        request_path,
        local_path: keep.then_some(local_path),
        status: transfer.status(),
        bytes_received: transfer.bytes_received(),
        file_len: transfer.file_len(),
        error: result.err(),
    }))
}
