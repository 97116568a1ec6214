//! This module provides the file server: a fixed pool of workers draining a shared request queue.
//!
//! ```text
//!     acceptor ──▶ connections ──▶ reader 0..N ──▶ RequestQueue ──recv──▶ worker 0..N ──▶ resolve ──▶ header ──▶ stream chunks
//! ```
//!
//! The acceptor only accepts connections and the readers only read request headers, everything else (content
//! resolution, file reads, sends) happens on the workers, each one owning the request it dequeued until it is done
//! with it.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;

use crate::proto::{self, server::read_request, Context, Status, TcpContext};
use crate::task::{JoinError, Pool};

mod content;
pub use content::{ContentMap, ContentResolver, Error as ContentError};

mod queue;
pub use queue::RequestQueue;

mod stream;
pub use stream::{stream_file, StreamError};

#[cfg(test)]
pub(crate) mod mock;

pub const DEFAULT_PORT: u16 = 6200;
pub const DEFAULT_WORKERS: NonZeroUsize = match NonZeroUsize::new(8) {
    Some(workers) => workers,
    None => unreachable!(),
};
pub const DEFAULT_CONTENT_MAP: &str = "content.txt";

/// Time given to a client to send its request header once connected.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Content(#[from] ContentError),
    #[error("failed to spawn server threads: {0}")]
    Spawn(#[source] io::Error),
    #[error(transparent)]
    Join(#[from] JoinError),
}

/// Server settings, fixed once the server is started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub address: IpAddr,
    pub port: u16,
    pub workers: NonZeroUsize,
    pub content_map: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            workers: DEFAULT_WORKERS,
            content_map: PathBuf::from(DEFAULT_CONTENT_MAP),
        }
    }
}

/// A pending request: the context to respond through and the requested path.
#[derive(Debug)]
pub struct Request<C> {
    context: C,
    path: String,
}

impl<C: Context> Request<C> {
    #[inline]
    pub fn new(context: C, path: impl Into<String>) -> Self {
        Self {
            context,
            path: path.into(),
        }
    }

    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// State shared by all the workers of a pool.
#[derive(Debug)]
struct Shared<C, R> {
    queue: RequestQueue<Request<C>>,
    /// Serializes file reads across workers.
    files: Mutex<()>,
    resolver: R,
}

/// A fixed pool of server workers, each one looping over: dequeue, resolve, send header, stream, release.
///
/// Idle workers block on the queue until a request is submitted or the pool is shut down.
#[derive(Debug)]
pub struct WorkerPool<C, R> {
    shared: Arc<Shared<C, R>>,
    pool: Pool<usize>,
}

impl<C: Context + 'static, R: ContentResolver> WorkerPool<C, R> {
    /// Start `size` workers serving content from `resolver`.
    pub fn start(size: NonZeroUsize, resolver: R) -> io::Result<Self> {
        let shared = Arc::new(Shared {
            queue: RequestQueue::new(),
            files: Mutex::new(()),
            resolver,
        });

        let pool = Pool::spawn("server", size, {
            let shared = Arc::clone(&shared);
            move |id| run_worker(id, &shared)
        })?;

        Ok(Self { shared, pool })
    }

    /// Queue a request for the next available worker, handing it back if the pool is shutting down.
    #[inline]
    pub fn submit(&self, request: Request<C>) -> Result<(), Request<C>> {
        self.shared.queue.enqueue(request)
    }

    /// Number of requests waiting for a worker.
    #[inline]
    pub fn pending(&self) -> usize {
        self.shared.queue.len()
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.pool.len()
    }

    /// Stop accepting requests and wake up idle workers, without waiting for busy ones.
    ///
    /// Requests still queued are dropped, which releases their connections unanswered.
    #[inline]
    pub fn close(&self) {
        self.shared.queue.close();
    }

    /// Close the pool and wait for every worker to finish its current request, returning how many requests were served.
    pub fn shutdown(self) -> Result<usize, JoinError> {
        self.close();

        Ok(self.pool.join()?.into_iter().sum())
    }
}

fn run_worker<C: Context, R: ContentResolver>(id: usize, shared: &Shared<C, R>) -> usize {
    let mut served = 0;

    while let Some(request) = shared.queue.recv() {
        tracing::debug!("Serving {} on worker {id}...", request.path);

        serve(request, &shared.resolver, &shared.files);
        served += 1;
    }

    tracing::debug!("Request queue closed, shutting down worker {id}.");

    served
}

/// Respond to a single request, then release it.
///
/// Every failure is reported through the context when still possible and only ever affects this request.
pub fn serve<C, R>(request: Request<C>, resolver: &R, files: &Mutex<()>)
where
    C: Context,
    R: ContentResolver + ?Sized,
{
    let Request { mut context, path } = request;

    let Some(file) = resolver.resolve(&path) else {
        tracing::info!("No content found for {path}");

        if let Err(err) = context.send_header(Status::FileNotFound, 0) {
            tracing::warn!("Failed to send header for {path}: {err}");
        }
        return;
    };

    let file_len = match file.metadata() {
        Ok(metadata) => metadata.len(),
        Err(err) => {
            tracing::error!("Failed to stat content for {path}: {err}");

            if let Err(err) = context.send_header(Status::Error, 0) {
                tracing::warn!("Failed to send header for {path}: {err}");
            }
            return;
        }
    };

    tracing::info!("Serving {path}, file size: {file_len} bytes");

    if let Err(err) = context.send_header(Status::Ok, file_len) {
        tracing::warn!("Failed to send header for {path}: {err}");
        context.abort();
        return;
    }

    if file_len == 0 {
        context.abort();
        return;
    }

    match stream_file(&mut context, &file, file_len, files) {
        Ok(sent) => tracing::debug!("Sent {sent} bytes for {path}"),
        Err(err) => {
            tracing::warn!("Streaming {path} aborted: {err}");
            context.abort();
        }
    }
}

/// Start a server as configured, loading its content mapping file.
pub fn start(config: &ServerConfig) -> Result<ServerHandle<ContentMap>, Error> {
    let content = ContentMap::load(&config.content_map)?;

    start_with(config, content)
}

/// Start a server serving content from `resolver`: bind, spawn the workers and request readers, then spawn the acceptor
/// thread.
pub fn start_with<R: ContentResolver>(config: &ServerConfig, resolver: R) -> Result<ServerHandle<R>, Error> {
    let listener = TcpListener::bind((config.address, config.port))?;
    let local_addr = listener.local_addr()?;

    let pool = WorkerPool::start(config.workers, resolver).map_err(Error::Spawn)?;
    let connections = Arc::new(RequestQueue::new());

    let readers = Pool::spawn("reader", config.workers, {
        let connections = Arc::clone(&connections);
        let shared = Arc::clone(&pool.shared);
        move |id| read_requests(id, &connections, &shared.queue)
    })
    .map_err(Error::Spawn)?;

    let stopper = Stopper {
        local_addr,
        stopping: Arc::new(AtomicBool::new(false)),
    };

    let acceptor = thread::Builder::new()
        .name("acceptor".into())
        .spawn({
            let connections = Arc::clone(&connections);
            let stopping = Arc::clone(&stopper.stopping);
            move || accept(listener, &connections, &stopping)
        })
        .map_err(Error::Spawn)?;

    tracing::info!("Listening on {local_addr} with {} workers", pool.size());

    Ok(ServerHandle {
        stopper,
        acceptor,
        connections,
        readers,
        pool,
    })
}

/// Accept connections and hand them over to the request readers until stopped.
fn accept(listener: TcpListener, connections: &RequestQueue<TcpStream>, stopping: &AtomicBool) {
    for stream in listener.incoming() {
        if stopping.load(Ordering::Acquire) {
            break;
        }

        match stream {
            Ok(stream) => {
                if connections.enqueue(stream).is_err() {
                    break;
                }
            }
            Err(err) => tracing::warn!("Failed to accept connection: {err}"),
        }
    }

    tracing::debug!("Acceptor stopped.");
}

/// Read the request header of every accepted connection and queue the request for the workers.
///
/// A connection slow to send its header only holds up the reader it landed on.
fn read_requests(id: usize, connections: &RequestQueue<TcpStream>, requests: &RequestQueue<Request<TcpContext>>) {
    while let Some(mut stream) = connections.recv() {
        match receive(&mut stream) {
            Ok(path) => {
                tracing::trace!("Queueing request for {path}");

                if requests.enqueue(Request::new(TcpContext::new(stream), path)).is_err() {
                    break;
                }
            }
            Err(err) => {
                tracing::warn!("Rejecting request: {err}");

                let _ = TcpContext::new(stream).send_header(Status::Invalid, 0);
            }
        }
    }

    tracing::debug!("Connection queue closed, shutting down reader {id}.");
}

fn receive(stream: &mut TcpStream) -> Result<String, proto::Error> {
    stream.set_read_timeout(Some(REQUEST_TIMEOUT))?;
    let path = read_request(stream)?;
    stream.set_read_timeout(None)?;

    Ok(path)
}

/// A running server.
#[derive(Debug)]
pub struct ServerHandle<R> {
    stopper: Stopper,
    acceptor: thread::JoinHandle<()>,
    /// Accepted connections waiting for their request header to be read.
    connections: Arc<RequestQueue<TcpStream>>,
    readers: Pool<()>,
    pool: WorkerPool<TcpContext, R>,
}

impl<R: ContentResolver> ServerHandle<R> {
    #[inline]
    pub fn local_addr(&self) -> SocketAddr {
        self.stopper.local_addr
    }

    /// A handle able to stop the server from anywhere, a signal handler for instance.
    #[inline]
    pub fn stopper(&self) -> Stopper {
        self.stopper.clone()
    }

    /// Block until the server is stopped, then close both queues without waiting for busy readers or workers.
    ///
    /// In-flight requests are left to whatever happens next, usually process exit.
    pub fn wait(self) {
        if self.acceptor.join().is_err() {
            tracing::error!("Acceptor panicked");
        }

        self.connections.close();
        self.pool.close();
    }

    /// Stop the server and wait for every reader and worker to finish its current request, returning how many requests
    /// were served.
    pub fn shutdown(self) -> Result<usize, Error> {
        self.stopper.stop();

        if self.acceptor.join().is_err() {
            tracing::error!("Acceptor panicked");
        }

        self.connections.close();
        self.readers.join()?;

        Ok(self.pool.shutdown()?)
    }
}

/// Stops the acceptor of a running server.
#[derive(Debug, Clone)]
pub struct Stopper {
    local_addr: SocketAddr,
    stopping: Arc<AtomicBool>,
}

impl Stopper {
    pub fn stop(&self) {
        if self.stopping.swap(true, Ordering::AcqRel) {
            return;
        }

        // wake up the acceptor blocked on `accept()`
        let mut addr = self.local_addr;
        match addr.ip() {
            IpAddr::V4(ip) if ip.is_unspecified() => addr.set_ip(Ipv4Addr::LOCALHOST.into()),
            IpAddr::V6(ip) if ip.is_unspecified() => addr.set_ip(Ipv6Addr::LOCALHOST.into()),
            _ => {}
        }

        if let Err(err) = TcpStream::connect(addr) {
            tracing::warn!("Failed to wake up acceptor on {addr}: {err}");
        }
    }
}
