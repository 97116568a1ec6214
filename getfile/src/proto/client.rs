//! Client side of the wire: a single request performed against a remote server.

use std::io::{self, Read, Write};
use std::net::TcpStream;

use bytes::BytesMut;
use url::Host;

use super::{parse_response, read_header, request_header, Error, Status, CHUNK_SIZE, MAX_HEADER_LEN};

/// One GETFILE request, along with what is known about its response so far.
///
/// ```no_run
/// # use getfile::proto::Transfer;
/// let mut transfer = Transfer::new(url::Host::parse("localhost").unwrap(), 6200, "/a.txt");
/// let mut content = Vec::new();
///
/// transfer.perform(|chunk| {
///     content.extend_from_slice(chunk);
///     Ok(())
/// })?;
///
/// println!("{}: {} of {} bytes", transfer.status(), transfer.bytes_received(), transfer.file_len());
/// # Ok::<_, getfile::proto::Error>(())
/// ```
#[derive(Debug)]
pub struct Transfer {
    host: Host,
    port: u16,
    path: String,
    status: Status,
    file_len: u64,
    bytes_received: u64,
}

impl Transfer {
    pub fn new(host: Host, port: u16, path: impl Into<String>) -> Self {
        Self {
            host,
            port,
            path: path.into(),
            status: Status::Invalid,
            file_len: 0,
            bytes_received: 0,
        }
    }

    #[inline]
    pub fn host(&self) -> &Host {
        &self.host
    }

    #[inline]
    pub fn port(&self) -> u16 {
        self.port
    }

    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Status announced by the server, [`Status::Invalid`] until a well-formed header has been received.
    #[inline]
    pub fn status(&self) -> Status {
        self.status
    }

    /// Length announced by the server, `0` unless the status is [`Status::Ok`].
    #[inline]
    pub fn file_len(&self) -> u64 {
        self.file_len
    }

    /// Body bytes handed to the write callback so far.
    #[inline]
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    /// Perform the request, handing every received body chunk to `write` in order.
    ///
    /// A well-formed non-OK response is not an error: check [`Transfer::status()`] afterwards. An error means the exchange itself
    /// failed (connection, malformed header, early close or callback failure) and the body may be incomplete.
    pub fn perform<F>(&mut self, mut write: F) -> Result<(), Error>
    where
        F: FnMut(&[u8]) -> io::Result<()>,
    {
        let mut stream = self.connect()?;
        stream.write_all(request_header(&self.path).as_bytes())?;

        let mut buf = BytesMut::with_capacity(MAX_HEADER_LEN);
        let header = read_header(&mut stream, &mut buf).inspect_err(|_| self.status = Status::Invalid)?;
        let (status, file_len) = parse_response(&header).inspect_err(|_| self.status = Status::Invalid)?;

        self.status = status;

        let Some(file_len) = file_len else {
            return Ok(());
        };

        self.file_len = file_len;

        // body bytes read along with the header
        let leftover = buf.split_to(buf.len().min(usize::try_from(file_len).unwrap_or(usize::MAX)));
        self.receive(&leftover, &mut write)?;

        let mut chunk = [0; CHUNK_SIZE];

        while self.bytes_received < file_len {
            let wanted = (file_len - self.bytes_received).min(CHUNK_SIZE as u64) as usize;

            match stream.read(&mut chunk[..wanted]) {
                Ok(0) => {
                    return Err(Error::Truncated {
                        received: self.bytes_received,
                        expected: file_len,
                    })
                }
                Ok(n) => self.receive(&chunk[..n], &mut write)?,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }

        Ok(())
    }

    fn receive<F>(&mut self, data: &[u8], write: &mut F) -> Result<(), Error>
    where
        F: FnMut(&[u8]) -> io::Result<()>,
    {
        if !data.is_empty() {
            write(data).map_err(Error::Write)?;
            self.bytes_received += data.len() as u64;
        }

        Ok(())
    }

    fn connect(&self) -> io::Result<TcpStream> {
        match &self.host {
            Host::Domain(domain) => TcpStream::connect((domain.as_str(), self.port)),
            Host::Ipv4(ip) => TcpStream::connect((*ip, self.port)),
            Host::Ipv6(ip) => TcpStream::connect((*ip, self.port)),
        }
    }
}
