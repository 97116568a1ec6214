use std::fs::File;
use std::io;

use parking_lot::Mutex;
use thiserror::Error;

use crate::proto::{Context, CHUNK_SIZE};

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("failed to read file at offset {offset}: {source}")]
    Read { offset: u64, source: io::Error },
    #[error("file ended at offset {offset} instead of {expected}")]
    UnexpectedEof { offset: u64, expected: u64 },
    #[error("failed to send to client at offset {offset}: {source}")]
    Send { offset: u64, source: io::Error },
}

/// Stream the first `file_len` bytes of `file` through `ctx`, chunk by chunk, and return how many bytes were sent.
///
/// Every low-level read happens under `lock`, shared by all the workers of a server, whereas sends are not synchronized
/// at all. Both the read offset and the position within the current chunk only ever move by what the context reports as
/// accepted, so short sends are simply resumed where they stopped.
pub fn stream_file<C: Context + ?Sized>(ctx: &mut C, file: &File, file_len: u64, lock: &Mutex<()>) -> Result<u64, StreamError> {
    let mut buf = [0; CHUNK_SIZE];
    let mut offset = 0;
    let mut remaining = file_len;

    while remaining > 0 {
        let wanted = remaining.min(CHUNK_SIZE as u64) as usize;

        let len = {
            let _guard = lock.lock();
            read_at(file, &mut buf[..wanted], offset)
        }
        .map_err(|source| StreamError::Read { offset, source })?;

        if len == 0 {
            return Err(StreamError::UnexpectedEof { offset, expected: file_len });
        }

        let mut cursor = 0;

        while cursor < len {
            let sent = match ctx.send(&buf[cursor..len]) {
                Ok(0) => {
                    return Err(StreamError::Send {
                        offset,
                        source: io::ErrorKind::WriteZero.into(),
                    })
                }
                Ok(sent) => sent,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(source) => return Err(StreamError::Send { offset, source }),
            };

            cursor += sent;
            offset += sent as u64;
            remaining -= sent as u64;

            tracing::trace!("Sent {sent} bytes, offset {offset} remaining {remaining}");
        }
    }

    Ok(offset)
}

#[cfg(unix)]
#[inline]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    std::os::unix::fs::FileExt::read_at(file, buf, offset)
}

#[cfg(windows)]
#[inline]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    std::os::windows::fs::FileExt::seek_read(file, buf, offset)
}
