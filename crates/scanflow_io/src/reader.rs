//! Sequential replay of a raw capture file.

use scanflow_core::{Result, Transport};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// A transport that streams a recorded raw scan (for example a dump of the
/// bulk-in endpoint) from disk, front to back.
///
/// The capture is read with plain buffered syscalls; on Linux the kernel is
/// told the access is sequential and will not be reused.
///
/// # Example
///
/// ```ignore
/// use scanflow_io::CaptureReader;
/// use scanflow_core::Transport;
///
/// let mut reader = CaptureReader::new("page1.raw")?;
/// let mut buffer = vec![0u8; 65536];
/// let n = reader.read(&mut buffer)?;
/// ```
pub struct CaptureReader {
    file: File,
    size: u64,
    position: u64,
}

impl CaptureReader {
    /// Opens the capture at `path` read-only.
    ///
    /// # Errors
    ///
    /// Fails if the file does not exist, is not readable, or its size
    /// cannot be determined.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(false)
            .open(path.as_ref())?;

        #[cfg(target_os = "linux")]
        {
            use rustix::fs::{Advice, fadvise};

            let _ = fadvise(&file, 0, None, Advice::Sequential);
            let _ = fadvise(&file, 0, None, Advice::NoReuse);
        }

        let size = file.seek(SeekFrom::End(0))?;
        file.seek(SeekFrom::Start(0))?;

        tracing::debug!(path = %path.as_ref().display(), bytes = size, "opened capture");
        Ok(Self {
            file,
            size,
            position: 0,
        })
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[inline]
    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.size.saturating_sub(self.position)
    }
}

impl Transport for CaptureReader {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let n = self.file.read(buffer)?;
        self.position += n as u64;
        Ok(n)
    }

    fn name(&self) -> &str {
        "capture-file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_capture_reader_sequential() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"RRRRGGGGBBBB").unwrap();
        temp_file.flush().unwrap();
        let mut reader = CaptureReader::new(temp_file.path()).unwrap();
        assert_eq!(reader.size(), 12);

        let mut buffer = vec![0u8; 4];
        assert_eq!(reader.read(&mut buffer).unwrap(), 4);
        assert_eq!(&buffer, b"RRRR");
        assert_eq!(reader.read(&mut buffer).unwrap(), 4);
        assert_eq!(&buffer, b"GGGG");
        assert_eq!(reader.remaining(), 4);
    }

    #[test]
    fn test_capture_reader_eof() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"abc").unwrap();
        temp_file.flush().unwrap();

        let mut reader = CaptureReader::new(temp_file.path()).unwrap();
        let mut buffer = vec![0u8; 100];
        assert_eq!(reader.read(&mut buffer).unwrap(), 3);
        assert_eq!(reader.read(&mut buffer).unwrap(), 0);
    }

    #[test]
    fn test_capture_reader_missing_file() {
        assert!(CaptureReader::new("/nonexistent/scan.raw").is_err());
    }
}
