use memmap2::Mmap;
use scanflow_core::{Result, ScanError, Transport};
use std::fs::File;
use std::path::Path;

/// Memory-mapped replay of a raw capture file.
pub struct MmapCapture {
    mmap: Mmap,
    position: usize,
}

impl MmapCapture {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let size = file.metadata()?.len();
        if size == 0 {
            return Err(ScanError::InvalidArgument(
                "cannot map an empty capture".to_string(),
            ));
        }

        // SAFETY: the mapping is read-only and the capture is not expected to
        // change while it is replayed.
        let mmap = unsafe { Mmap::map(&file) }?;

        #[cfg(target_os = "linux")]
        {
            use memmap2::Advice;
            let _ = mmap.advise(Advice::Sequential);
        }

        tracing::debug!(path = %path.as_ref().display(), bytes = size, "mapped capture");
        Ok(Self { mmap, position: 0 })
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    /// The part of the capture not yet handed out.
    #[inline]
    #[must_use]
    pub fn rest(&self) -> &[u8] {
        &self.mmap[self.position..]
    }
}

impl Transport for MmapCapture {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let rest = self.rest();
        let n = buffer.len().min(rest.len());
        buffer[..n].copy_from_slice(&rest[..n]);
        self.position += n;
        Ok(n)
    }

    fn name(&self) -> &str {
        "capture-mmap"
    }
}
