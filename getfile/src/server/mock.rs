//! In-memory response context for tests.

use std::io;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::proto::{Context, Status};

/// Everything a [`RecordingContext`] has been asked to do.
#[derive(Debug, Default)]
pub(crate) struct Recording {
    pub header: Option<(Status, u64)>,
    pub body: Vec<u8>,
    pub sends: Vec<usize>,
    pub aborted: bool,
    pub released: bool,
}

/// A [`Context`] recording what goes through it, optionally accepting fewer bytes than offered on each send.
#[derive(Debug, Default)]
pub(crate) struct RecordingContext {
    recording: Arc<Mutex<Recording>>,
    /// Maximum bytes accepted by successive sends, cycling.
    caps: Vec<usize>,
    /// Fail any send that would bring the body past this length.
    limit: Option<usize>,
}

impl RecordingContext {
    pub fn with_caps(mut self, caps: Vec<usize>) -> Self {
        self.caps = caps;
        self
    }

    pub fn failing_after(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Shared view on the recording, still readable once the context has been consumed.
    pub fn recording(&self) -> Arc<Mutex<Recording>> {
        Arc::clone(&self.recording)
    }

    pub fn body(&self) -> Vec<u8> {
        self.recording.lock().body.clone()
    }

    pub fn sends(&self) -> Vec<usize> {
        self.recording.lock().sends.clone()
    }
}

impl Context for RecordingContext {
    fn send_header(&mut self, status: Status, file_len: u64) -> io::Result<()> {
        let mut recording = self.recording.lock();
        assert!(recording.header.is_none(), "header sent twice");
        recording.header = Some((status, file_len));
        Ok(())
    }

    fn send(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut recording = self.recording.lock();

        let cap = match self.caps[..] {
            [] => data.len(),
            ref caps => caps[recording.sends.len() % caps.len()],
        };
        let accepted = data.len().min(cap);

        if self.limit.is_some_and(|limit| recording.body.len() + accepted > limit) {
            return Err(io::ErrorKind::BrokenPipe.into());
        }

        recording.body.extend_from_slice(&data[..accepted]);
        recording.sends.push(accepted);

        Ok(accepted)
    }

    fn abort(&mut self) {
        self.recording.lock().aborted = true;
    }
}

impl Drop for RecordingContext {
    fn drop(&mut self) {
        self.recording.lock().released = true;
    }
}
