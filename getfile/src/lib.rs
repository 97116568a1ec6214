//! A concurrent GETFILE file server and download client.
//!
//! Both ends are built the same way: a fixed pool of blocking worker threads (see [`task::Pool`]) draining a shared
//! source of work, with as little shared state as possible and every lock held only for the few instructions it guards.
//!
//! - The [`server`] accepts connections on a dedicated thread and queues their requests into an unbounded FIFO
//!   [`server::RequestQueue`]. Idle workers block on it until a request shows up, then resolve the requested path to a
//!   local file and stream it back chunk by chunk through the request context, resuming short sends exactly where they
//!   stopped. Low-level file reads are serialized by a single lock, sends are not.
//! - The [`client`] workers pull request paths from a shared [`client::PathSource`] and download each one into its own
//!   local file, named after the request path and a process-wide counter. A failed request or a non-OK response never
//!   leaves a local file behind and never stops the other downloads.
//!
//! The [`proto`] module holds the wire format both ends speak:
//!
//! ```text
//!     client                                     server
//!       L GETFILE GET /path\r\n\r\n       ──▶
//!                                         ◀──    GETFILE OK <len>\r\n\r\n<len bytes>
//!                                         ◀──    GETFILE FILE_NOT_FOUND\r\n\r\n
//! ```
//!
//! Errors local to a single request are logged and reported, never propagated to sibling requests or workers: only setup
//! failures (unreadable workload or content map, thread creation, local directory creation) and oversized request paths
//! are fatal.

pub mod client;
pub mod logging;
pub mod proto;
pub mod server;
pub mod task;
