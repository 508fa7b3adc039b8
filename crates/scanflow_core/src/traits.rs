//! The transport seam between the pipeline and the physical link.
//!
//! Everything below this trait (parallel-port handshakes, SCSI commands,
//! USB bulk endpoints) belongs to a device backend. The pipeline only ever
//! asks for "the next bytes of the stream".

use crate::error::Result;

/// A synchronous source of raw scan bytes.
///
/// Implementations are driven from a dedicated acquisition worker, never
/// from the caller's thread, so a blocking `read` is expected and fine.
///
/// # Example
///
/// ```ignore
/// struct UsbBulk { /* ... */ }
///
/// impl Transport for UsbBulk {
///     fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
///         // Issue a bulk-in transfer of at most buffer.len() bytes
///     }
/// }
/// ```
pub trait Transport: Send {
    /// Reads the next raw bytes of the stream into `buffer`.
    ///
    /// # Arguments
    ///
    /// * `buffer` - Destination; at most `buffer.len()` bytes are written
    ///
    /// # Returns
    ///
    /// The number of bytes read. `Ok(0)` means the link has no more data,
    /// which the worker treats as a premature end of the page.
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Called by the worker before the first read of a page.
    ///
    /// # Arguments
    ///
    /// * `expected_bytes` - The exact number of bytes the worker will pull
    fn begin_page(&mut self, _expected_bytes: u64) -> Result<()> {
        Ok(())
    }

    /// Called by the worker once the page's byte count has been read.
    fn end_page(&mut self) -> Result<()> {
        Ok(())
    }

    /// Short human-readable name used in log output.
    fn name(&self) -> &str {
        "transport"
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        (**self).read(buffer)
    }

    fn begin_page(&mut self, expected_bytes: u64) -> Result<()> {
        (**self).begin_page(expected_bytes)
    }

    fn end_page(&mut self) -> Result<()> {
        (**self).end_page()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
