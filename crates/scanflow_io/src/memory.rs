use bytes::Bytes;
use scanflow_core::{Result, ScanError, Transport};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// An in-memory raw stream.
///
/// Hands out at most `max_chunk` bytes per read, counts every read call in a
/// shared counter, and can be told to fail with an I/O error once a given
/// offset is reached.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    data: Bytes,
    position: usize,
    max_chunk: usize,
    fail_at: Option<usize>,
    reads: Arc<AtomicUsize>,
}

impl MemoryTransport {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            position: 0,
            max_chunk: usize::MAX,
            fail_at: None,
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[must_use]
    pub fn with_max_chunk(mut self, max_chunk: usize) -> Self {
        self.max_chunk = max_chunk.max(1);
        self
    }

    /// Every read that would touch `offset` or later fails.
    #[must_use]
    pub fn with_failure_at(mut self, offset: usize) -> Self {
        self.fail_at = Some(offset);
        self
    }

    /// Counter of `read` calls, shared with every clone of this handle.
    #[must_use]
    pub fn read_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.reads)
    }

    #[inline]
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    #[inline]
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }
}

impl Transport for MemoryTransport {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        self.reads.fetch_add(1, Ordering::SeqCst);

        let mut n = buffer.len().min(self.max_chunk).min(self.remaining());
        if let Some(fail_at) = self.fail_at {
            if self.position >= fail_at {
                return Err(ScanError::Io(std::io::Error::other(format!(
                    "simulated transfer error at offset {fail_at}"
                ))));
            }
            n = n.min(fail_at - self.position);
        }

        buffer[..n].copy_from_slice(&self.data[self.position..self.position + n]);
        self.position += n;
        Ok(n)
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunked_reads() {
        let mut transport = MemoryTransport::new(vec![1u8, 2, 3, 4, 5]).with_max_chunk(2);
        let counter = transport.read_counter();
        let mut buffer = [0u8; 8];

        assert_eq!(transport.read(&mut buffer).unwrap(), 2);
        assert_eq!(transport.read(&mut buffer).unwrap(), 2);
        assert_eq!(transport.read(&mut buffer).unwrap(), 1);
        assert_eq!(buffer[0], 5);
        assert_eq!(transport.read(&mut buffer).unwrap(), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_failure_offset() {
        let mut transport = MemoryTransport::new(vec![0u8; 10]).with_failure_at(6);
        let mut buffer = [0u8; 4];
        assert_eq!(transport.read(&mut buffer).unwrap(), 4);
        assert_eq!(transport.read(&mut buffer).unwrap(), 2);
        assert!(matches!(transport.read(&mut buffer), Err(ScanError::Io(_))));
    }
}
