use scanflow_core::{Result, Transport};
use std::time::Duration;

/// Wraps a transport to behave like a slow device link: every read first
/// waits `latency` and then returns at most `max_chunk` bytes.
#[derive(Debug)]
pub struct Throttled<T> {
    inner: T,
    latency: Duration,
    max_chunk: usize,
}

impl<T: Transport> Throttled<T> {
    pub fn new(inner: T, latency: Duration) -> Self {
        Self {
            inner,
            latency,
            max_chunk: usize::MAX,
        }
    }

    #[must_use]
    pub fn with_max_chunk(mut self, max_chunk: usize) -> Self {
        self.max_chunk = max_chunk.max(1);
        self
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Transport> Transport for Throttled<T> {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
        let len = buffer.len().min(self.max_chunk);
        self.inner.read(&mut buffer[..len])
    }

    fn begin_page(&mut self, expected_bytes: u64) -> Result<()> {
        self.inner.begin_page(expected_bytes)
    }

    fn end_page(&mut self) -> Result<()> {
        self.inner.end_page()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryTransport;
    use std::time::Instant;

    #[test]
    fn test_throttled_limits_chunk_and_waits() {
        let inner = MemoryTransport::new(vec![7u8; 100]);
        let mut transport = Throttled::new(inner, Duration::from_millis(20)).with_max_chunk(10);
        let mut buffer = [0u8; 64];

        let started = Instant::now();
        assert_eq!(transport.read(&mut buffer).unwrap(), 10);
        assert!(started.elapsed() >= Duration::from_millis(20));
        assert_eq!(transport.into_inner().position(), 10);
    }
}
