//! Transport sink contract. AIR hands finished TS bytes to whatever is
//! attached; `try_consume_bytes` must never block the tick loop.

use std::collections::VecDeque;
use std::fs::File;
use std::io::Write;
use std::sync::Mutex;

pub trait Sink: Send + Sync {
    /// Attempt to hand off `buf`. Returns `false` if the sink cannot accept
    /// it right now — the caller counts this as dropped, never retries
    /// synchronously.
    fn try_consume_bytes(&self, buf: &[u8]) -> bool;
}

/// Legal "unattached" state: discards everything, counts nothing itself —
/// the adapter above it is responsible for `bytes_dropped_total`.
pub struct NullSink;

impl Sink for NullSink {
    fn try_consume_bytes(&self, _buf: &[u8]) -> bool {
        true
    }
}

/// Stand-in for a real socket/transport sink: buffers into a bounded queue
/// and a writer drains it. Bounded so a slow disk cannot back up into the
/// tick loop.
pub struct FileSink {
    queue: Mutex<VecDeque<u8>>,
    capacity: usize,
    file: Mutex<File>,
}

impl FileSink {
    pub fn create(path: &std::path::Path, capacity: usize) -> anyhow::Result<Self> {
        Ok(Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            file: Mutex::new(File::create(path)?),
        })
    }

    /// Drain whatever fits out to disk. Called by a dedicated writer thread,
    /// never by the tick loop itself.
    pub fn flush_pending(&self) -> std::io::Result<()> {
        let drained: Vec<u8> = {
            let mut q = self.queue.lock().unwrap();
            q.drain(..).collect()
        };
        if !drained.is_empty() {
            self.file.lock().unwrap().write_all(&drained)?;
        }
        Ok(())
    }
}

impl Sink for FileSink {
    fn try_consume_bytes(&self, buf: &[u8]) -> bool {
        let mut q = self.queue.lock().unwrap();
        if q.len() + buf.len() > self.capacity {
            return false;
        }
        q.extend(buf.iter().copied());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowSink;
    impl Sink for SlowSink {
        fn try_consume_bytes(&self, _buf: &[u8]) -> bool {
            false
        }
    }

    #[test]
    fn slow_sink_never_blocks_and_reports_rejection() {
        let sink = SlowSink;
        assert!(!sink.try_consume_bytes(&[0u8; 188]));
    }

    #[test]
    fn null_sink_always_accepts() {
        assert!(NullSink.try_consume_bytes(&[0u8; 188]));
    }

    #[test]
    fn file_sink_rejects_past_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::create(&dir.path().join("out.ts"), 10).unwrap();
        assert!(sink.try_consume_bytes(&[0u8; 8]));
        assert!(!sink.try_consume_bytes(&[0u8; 8]));
    }
}
