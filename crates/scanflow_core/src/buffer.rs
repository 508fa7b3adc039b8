use crate::error::{Result, ScanError};

/// Allocates a zero-filled buffer of `len` bytes, reporting allocation
/// failure as [`ScanError::OutOfMemory`] instead of aborting.
pub fn try_zeroed(len: usize) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|_| ScanError::OutOfMemory { bytes: len })?;
    buffer.resize(len, 0);
    Ok(buffer)
}

/// Same as [`try_zeroed`] for a buffer that will be appended to.
pub fn try_with_capacity(len: usize) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|_| ScanError::OutOfMemory { bytes: len })?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_zeroed() {
        let buffer = try_zeroed(64).unwrap();
        assert_eq!(buffer.len(), 64);
        assert!(buffer.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_huge_allocation_fails_cleanly() {
        let err = try_zeroed(usize::MAX).unwrap_err();
        assert!(matches!(err, ScanError::OutOfMemory { .. }));
    }
}
