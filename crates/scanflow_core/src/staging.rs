use crate::buffer::try_zeroed;
use crate::error::Result;

/// Holds one produced line while a caller reads it in pieces smaller than
/// a line.
#[derive(Debug)]
pub struct LineStaging {
    line: Vec<u8>,
    position: usize,
    filled: bool,
}

impl LineStaging {
    pub fn new(bytes_per_line: usize) -> Result<Self> {
        Ok(Self {
            line: try_zeroed(bytes_per_line)?,
            position: 0,
            filled: false,
        })
    }

    /// The line buffer to produce into. Only valid while empty.
    pub fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.line
    }

    pub fn mark_filled(&mut self) {
        self.position = 0;
        self.filled = true;
    }

    #[inline]
    #[must_use]
    pub fn has_data(&self) -> bool {
        self.filled && self.position < self.line.len()
    }

    #[inline]
    #[must_use]
    pub fn remaining(&self) -> usize {
        if self.filled {
            self.line.len() - self.position
        } else {
            0
        }
    }

    /// Copies as much of the staged line as fits into `out`.
    pub fn drain_into(&mut self, out: &mut [u8]) -> usize {
        if !self.filled {
            return 0;
        }
        let n = out.len().min(self.line.len() - self.position);
        out[..n].copy_from_slice(&self.line[self.position..self.position + n]);
        self.position += n;
        if self.position == self.line.len() {
            self.filled = false;
        }
        n
    }

    pub fn clear(&mut self) {
        self.position = 0;
        self.filled = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_in_pieces() {
        let mut staging = LineStaging::new(5).unwrap();
        assert!(!staging.has_data());
        staging.buffer_mut().copy_from_slice(&[1, 2, 3, 4, 5]);
        staging.mark_filled();

        let mut out = [0u8; 2];
        assert_eq!(staging.drain_into(&mut out), 2);
        assert_eq!(out, [1, 2]);
        assert_eq!(staging.drain_into(&mut out), 2);
        assert_eq!(out, [3, 4]);
        assert_eq!(staging.remaining(), 1);
        assert_eq!(staging.drain_into(&mut out), 1);
        assert_eq!(out[0], 5);
        assert!(!staging.has_data());
        assert_eq!(staging.drain_into(&mut out), 0);
    }
}
