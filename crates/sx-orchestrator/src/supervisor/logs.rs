//! Bounded capture of engine output

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use sx_core::api::{LogLine, LogStream};
use sx_core::time::current_time_millis;

/// Ring buffer of the most recent engine output lines
///
/// Once `capacity` lines are held, each new line evicts the oldest one.
pub struct LogBuffer {
    lines: Mutex<VecDeque<LogLine>>,
    capacity: usize,
}

impl LogBuffer {
    /// Create a buffer holding at most `capacity` lines
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
        }
    }

    /// Append a line, dropping the oldest when full
    pub fn push(&self, stream: LogStream, line: impl Into<String>) {
        if self.capacity == 0 {
            return;
        }
        let mut lines = self.lines.lock();
        while lines.len() >= self.capacity {
            lines.pop_front();
        }
        lines.push_back(LogLine {
            stream,
            line: line.into(),
            at: current_time_millis(),
        });
    }

    /// Copy of all buffered lines, oldest first
    pub fn snapshot(&self) -> Vec<LogLine> {
        self.lines.lock().iter().cloned().collect()
    }

    /// Last `n` lines, oldest first
    pub fn tail(&self, n: usize) -> Vec<LogLine> {
        let lines = self.lines.lock();
        let skip = lines.len().saturating_sub(n);
        lines.iter().skip(skip).cloned().collect()
    }

    /// Last line written to stderr, if any
    pub fn last_stderr(&self) -> Option<String> {
        self.lines
            .lock()
            .iter()
            .rev()
            .find(|l| l.stream == LogStream::Stderr)
            .map(|l| l.line.clone())
    }

    /// Number of buffered lines
    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    /// Check if the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }

    /// Maximum number of lines held
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Read `reader` line by line into `buffer` until EOF.
pub(crate) async fn capture<R>(reader: R, stream: LogStream, buffer: Arc<LogBuffer>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                tracing::debug!(target: "engine", stream = ?stream, "{}", line);
                buffer.push(stream, line);
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!("Engine {:?} read error: {}", stream, e);
                break;
            }
        }
    }
}
