//! GETFILE wire format.
//!
//! A request is a single header line and a response is a header line optionally followed by the file content:
//!
//! ```text
//!     GETFILE GET /path/to/file\r\n\r\n
//!     GETFILE OK 1234\r\n\r\n<1234 bytes>
//!     GETFILE FILE_NOT_FOUND\r\n\r\n
//!     GETFILE ERROR\r\n\r\n
//!     GETFILE INVALID\r\n\r\n
//! ```
//!
//! Both ends are blocking, one connection per request.

use std::fmt;
use std::io::{self, Read};
use std::str::FromStr;

use bytes::BytesMut;
use thiserror::Error;

pub mod client;
pub mod server;

pub use client::Transfer;
pub use server::{Context, TcpContext};

/// Protocol scheme leading every header.
pub const SCHEME: &str = "GETFILE";

/// Header terminator.
pub const MARKER: &[u8] = b"\r\n\r\n";

/// Maximum length of a header, terminator included.
pub const MAX_HEADER_LEN: usize = 1024;

/// Size of the body chunks read from files and sockets.
pub const CHUNK_SIZE: usize = 4096;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("malformed header: {0:?}")]
    MalformedHeader(String),
    #[error("header exceeds {} bytes", MAX_HEADER_LEN)]
    HeaderTooLong,
    #[error("connection closed before end of header")]
    UnexpectedEof,
    #[error("connection closed after {received} of {expected} bytes")]
    Truncated { received: u64, expected: u64 },
    #[error("write callback failed: {0}")]
    Write(#[source] io::Error),
}

/// Protocol-level outcome of a request, distinct from the transport-level success of the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Ok,
    FileNotFound,
    Error,
    Invalid,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::FileNotFound => "FILE_NOT_FOUND",
            Status::Error => "ERROR",
            Status::Invalid => "INVALID",
        }
    }
}

impl fmt::Display for Status {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OK" => Ok(Status::Ok),
            "FILE_NOT_FOUND" => Ok(Status::FileNotFound),
            "ERROR" => Ok(Status::Error),
            "INVALID" => Ok(Status::Invalid),
            _ => Err(Error::MalformedHeader(s.to_owned())),
        }
    }
}

/// Encode a request header for `path`.
pub fn request_header(path: &str) -> String {
    format!("{SCHEME} GET {path}\r\n\r\n")
}

/// Encode a response header. The length is only part of the header for [`Status::Ok`].
pub fn response_header(status: Status, file_len: u64) -> String {
    match status {
        Status::Ok => format!("{SCHEME} {status} {file_len}\r\n\r\n"),
        _ => format!("{SCHEME} {status}\r\n\r\n"),
    }
}

/// Parse a request header (terminator excluded) into the requested path.
pub fn parse_request(header: &str) -> Result<String, Error> {
    match header.split(' ').collect::<Vec<_>>()[..] {
        [SCHEME, "GET", path] if path.starts_with('/') && !path.contains(char::is_whitespace) => Ok(path.to_owned()),
        _ => Err(Error::MalformedHeader(header.to_owned())),
    }
}

/// Parse a response header (terminator excluded) into its status and, for [`Status::Ok`], the announced length.
pub fn parse_response(header: &str) -> Result<(Status, Option<u64>), Error> {
    let malformed = || Error::MalformedHeader(header.to_owned());

    match header.split(' ').collect::<Vec<_>>()[..] {
        [SCHEME, "OK", len] => Ok((Status::Ok, Some(len.parse().map_err(|_| malformed())?))),
        [SCHEME, status] => match status.parse()? {
            Status::Ok => Err(malformed()),
            status => Ok((status, None)),
        },
        _ => Err(malformed()),
    }
}

/// Position of the header terminator within `buf`, if any.
pub fn find_marker(buf: &[u8]) -> Option<usize> {
    buf.windows(MARKER.len()).position(|window| window == MARKER)
}

/// Read from `reader` into `buf` until a full header is buffered, then split it off `buf`.
///
/// Whatever was read past the terminator is left in `buf`, which is how the first body bytes of a response reach the caller.
pub(crate) fn read_header<R: Read>(reader: &mut R, buf: &mut BytesMut) -> Result<String, Error> {
    let mut chunk = [0; 512];

    loop {
        if let Some(end) = find_marker(buf) {
            if end + MARKER.len() > MAX_HEADER_LEN {
                return Err(Error::HeaderTooLong);
            }

            let header = buf.split_to(end + MARKER.len());

            return String::from_utf8(header[..end].to_vec())
                .map_err(|err| Error::MalformedHeader(String::from_utf8_lossy(err.as_bytes()).into_owned()));
        }

        if buf.len() >= MAX_HEADER_LEN {
            return Err(Error::HeaderTooLong);
        }

        match reader.read(&mut chunk) {
            Ok(0) => return Err(Error::UnexpectedEof),
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        }
    }
}
