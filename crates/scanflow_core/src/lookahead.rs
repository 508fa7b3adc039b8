use crate::buffer::try_with_capacity;
use crate::error::{Result, ScanError};

/// Lines captured after the end-of-page marker that belong to the next
/// sheet of a feeder batch.
///
/// The buffer outlives the session that filled it and is drained line by
/// line by the next one.
#[derive(Debug)]
pub struct LookaheadBuffer {
    data: Vec<u8>,
    bytes_per_line: usize,
    position: usize,
}

impl LookaheadBuffer {
    /// Reserves room for `lines` lines up front.
    pub fn with_capacity(bytes_per_line: usize, lines: usize) -> Result<Self> {
        let bytes = bytes_per_line
            .checked_mul(lines)
            .ok_or(ScanError::OutOfMemory { bytes: usize::MAX })?;
        Ok(Self {
            data: try_with_capacity(bytes)?,
            bytes_per_line,
            position: 0,
        })
    }

    pub fn push_line(&mut self, line: &[u8]) -> Result<()> {
        if line.len() != self.bytes_per_line {
            return Err(ScanError::InvalidArgument(format!(
                "lookahead line is {} bytes, expected {}",
                line.len(),
                self.bytes_per_line
            )));
        }
        self.data
            .try_reserve(line.len())
            .map_err(|_| ScanError::OutOfMemory { bytes: line.len() })?;
        self.data.extend_from_slice(line);
        Ok(())
    }

    /// Copies the next captured line into `out`; `false` once drained.
    pub fn take_line(&mut self, out: &mut [u8]) -> bool {
        if out.len() != self.bytes_per_line || self.len() < self.bytes_per_line {
            return false;
        }
        let end = self.position + self.bytes_per_line;
        out.copy_from_slice(&self.data[self.position..end]);
        self.position = end;
        true
    }

    /// Bytes not yet drained.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len() - self.position
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    #[must_use]
    pub fn lines(&self) -> usize {
        self.len().checked_div(self.bytes_per_line).unwrap_or(0)
    }

    #[inline]
    #[must_use]
    pub fn bytes_per_line(&self) -> usize {
        self.bytes_per_line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_and_drain() {
        let mut buffer = LookaheadBuffer::with_capacity(3, 2).unwrap();
        buffer.push_line(&[1, 2, 3]).unwrap();
        buffer.push_line(&[4, 5, 6]).unwrap();
        assert_eq!(buffer.len(), 6);
        assert_eq!(buffer.lines(), 2);

        let mut line = [0u8; 3];
        assert!(buffer.take_line(&mut line));
        assert_eq!(line, [1, 2, 3]);

        let mut short = [0u8; 2];
        assert!(!buffer.take_line(&mut short));
        assert_eq!(buffer.lines(), 1);

        assert!(buffer.take_line(&mut line));
        assert_eq!(line, [4, 5, 6]);
        assert!(!buffer.take_line(&mut line));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_rejects_wrong_line_size() {
        let mut buffer = LookaheadBuffer::with_capacity(3, 1).unwrap();
        assert!(buffer.push_line(&[1, 2]).is_err());
    }
}
