use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::version::{Direction, Version};

/// Default prefetch hint for how many bytes of a migration body get read
/// ahead into the pipe before the runner starts draining it.
pub const DEFAULT_BUFFER_SIZE: usize = 100_000;

/// Observability timestamps carried by a `Migration`. Not used for
/// control flow anywhere in the engine.
#[derive(Debug, Clone, Default)]
pub struct MigrationTiming {
    pub scheduled: Option<Instant>,
    pub started_buffering: Option<Instant>,
    pub finished_buffering: Option<Instant>,
    pub finished_reading: Option<Instant>,
    pub bytes_read: u64,
}

impl MigrationTiming {
    pub fn read_duration(&self) -> Option<Duration> {
        match (self.started_buffering, self.finished_reading) {
            (Some(s), Some(f)) => Some(f.saturating_duration_since(s)),
            _ => None,
        }
    }
}

/// The unit of work flowing through the prefetch pipeline.
///
/// A `Migration` exclusively owns its `body` stream and pipe endpoints.
/// `body` is consumed by a buffering thread that copies it into
/// `buffered_body`, which is what the database driver actually reads from.
/// `timing` is shared with that buffering thread (via `Arc<Mutex<_>>`) so it
/// can keep stamping progress after the `Migration` itself has been handed
/// off to the runner over the pipeline channel.
pub struct Migration {
    pub identifier: String,
    pub version: Version,
    pub target_version: Version,
    pub direction: Direction,
    pub body: Option<Box<dyn Read + Send>>,
    pub buffered_body: Option<PipeReader>,
    pub buffer_size: usize,
    pub timing: Arc<Mutex<MigrationTiming>>,
}

impl Migration {
    /// A migration whose script exists and has a body.
    pub fn with_body(
        identifier: String,
        version: Version,
        target_version: Version,
        direction: Direction,
        body: Box<dyn Read + Send>,
    ) -> Self {
        Self {
            identifier,
            version,
            target_version,
            direction,
            body: Some(body),
            buffered_body: None,
            buffer_size: DEFAULT_BUFFER_SIZE,
            timing: Arc::new(Mutex::new(MigrationTiming {
                scheduled: Some(Instant::now()),
                ..Default::default()
            })),
        }
    }

    /// A no-op version step: the source has no script for this direction,
    /// but the version transition must still be recorded.
    pub fn empty(version: Version, target_version: Version, direction: Direction) -> Self {
        Self {
            identifier: "<empty>".to_string(),
            version,
            target_version,
            direction,
            body: None,
            buffered_body: None,
            buffer_size: DEFAULT_BUFFER_SIZE,
            timing: Arc::new(Mutex::new(MigrationTiming {
                scheduled: Some(Instant::now()),
                ..Default::default()
            })),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_none()
    }
}

impl std::fmt::Debug for Migration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migration")
            .field("identifier", &self.identifier)
            .field("version", &self.version)
            .field("target_version", &self.target_version)
            .field("direction", &self.direction)
            .field("is_empty", &self.is_empty())
            .finish()
    }
}

/// A bounded, blocking, in-memory pipe: the Rust-side analogue of the
/// standard-library pipe the distilled spec assumes for streaming a
/// migration body from its buffering thread to the runner thread.
///
/// Writes block once `capacity` bytes are buffered and unread; reads block
/// until data is available or the writer half is closed.
struct PipeState {
    buf: VecDeque<u8>,
    capacity: usize,
    writer_closed: bool,
}

struct Pipe {
    state: Mutex<PipeState>,
    not_empty: Condvar,
    not_full: Condvar,
}

pub struct PipeReader(Arc<Pipe>);
pub struct PipeWriter(Arc<Pipe>);

/// Create a bounded pipe with room for `capacity` unread bytes.
pub fn pipe(capacity: usize) -> (PipeWriter, PipeReader) {
    let pipe = Arc::new(Pipe {
        state: Mutex::new(PipeState {
            buf: VecDeque::with_capacity(capacity.min(8192)),
            capacity,
            writer_closed: false,
        }),
        not_empty: Condvar::new(),
        not_full: Condvar::new(),
    });
    (PipeWriter(pipe.clone()), PipeReader(pipe))
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut state = self.0.state.lock().unwrap();
        while state.buf.len() >= state.capacity {
            state = self.0.not_full.wait(state).unwrap();
        }
        let room = state.capacity - state.buf.len();
        let n = room.min(buf.len());
        state.buf.extend(&buf[..n]);
        self.0.not_empty.notify_one();
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        let mut state = self.0.state.lock().unwrap();
        state.writer_closed = true;
        self.0.not_empty.notify_all();
    }
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut state = self.0.state.lock().unwrap();
        while state.buf.is_empty() && !state.writer_closed {
            state = self.0.not_empty.wait(state).unwrap();
        }
        let n = state.buf.len().min(buf.len());
        for (i, byte) in state.buf.drain(..n).enumerate() {
            buf[i] = byte;
        }
        self.0.not_full.notify_one();
        Ok(n)
    }
}
