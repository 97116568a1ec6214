//! Server side of the wire: the per-request response context and the request reader used by the accept path.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};

use bytes::BytesMut;

use super::{parse_request, read_header, response_header, Error, Status};

/// Per-request response handle, hiding the connection it writes to.
///
/// A context is exclusively owned by the worker serving its request and dropping it releases the underlying connection.
pub trait Context: Send {
    /// Send the response header announcing `status` and, for [`Status::Ok`], the `file_len` bytes that follow.
    fn send_header(&mut self, status: Status, file_len: u64) -> io::Result<()>;

    /// Send some body bytes, returning how many of them were actually accepted.
    ///
    /// _Note: like [`Write::write()`], this may accept fewer bytes than offered._
    fn send(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Terminate the response now, whatever has been sent so far.
    fn abort(&mut self);
}

/// A [`Context`] writing to an accepted TCP connection.
#[derive(Debug)]
pub struct TcpContext {
    stream: TcpStream,
}

impl TcpContext {
    #[inline]
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    #[inline]
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.stream.peer_addr()
    }
}

impl Context for TcpContext {
    fn send_header(&mut self, status: Status, file_len: u64) -> io::Result<()> {
        self.stream.write_all(response_header(status, file_len).as_bytes())
    }

    #[inline]
    fn send(&mut self, data: &[u8]) -> io::Result<usize> {
        self.stream.write(data)
    }

    fn abort(&mut self) {
        // peer may already be gone
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

/// Read a request header from `reader` and return the requested path.
pub fn read_request<R: Read>(reader: &mut R) -> Result<String, Error> {
    let mut buf = BytesMut::with_capacity(super::MAX_HEADER_LEN);

    parse_request(&read_header(reader, &mut buf)?)
}
