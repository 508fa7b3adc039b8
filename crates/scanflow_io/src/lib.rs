mod memory;
mod mmap_reader;
mod reader;
pub mod synthetic;
mod throttle;

pub use memory::MemoryTransport;
pub use mmap_reader::MmapCapture;
pub use reader::CaptureReader;
pub use synthetic::SyntheticScan;
pub use throttle::Throttled;

use scanflow_core::{Result, Transport};
use std::path::Path;

/// Opens a raw capture for replay, preferring a memory mapping and falling
/// back to plain reads when the file cannot be mapped.
pub fn open_capture(path: impl AsRef<Path>) -> Result<Box<dyn Transport>> {
    let path_ref = path.as_ref();

    match MmapCapture::new(path_ref) {
        Ok(capture) => Ok(Box::new(capture)),
        Err(e) => {
            tracing::debug!(error = %e, "mmap unavailable, reading capture sequentially");
            Ok(Box::new(CaptureReader::new(path_ref)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_open_capture_falls_back_for_empty_file() {
        let temp_file = NamedTempFile::new().unwrap();
        let mut transport = open_capture(temp_file.path()).unwrap();
        assert_eq!(transport.name(), "capture-file");
        let mut buffer = [0u8; 4];
        assert_eq!(transport.read(&mut buffer).unwrap(), 0);
    }

    #[test]
    fn test_open_capture_maps_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(&[1, 2, 3]).unwrap();
        temp_file.flush().unwrap();
        let transport = open_capture(temp_file.path()).unwrap();
        assert_eq!(transport.name(), "capture-mmap");
    }
}
