use bytes::BytesMut;

use crate::align::{ChannelAligner, merge_planes, split_planes};
use crate::error::{Result, ScanError};
use crate::types::{CHANNELS, ChannelDelays, ChannelLayout, LineFormat, WarmupPolicy};

/// Cuts the raw byte stream into lines and undoes the sensor's channel
/// delays.
///
/// Raw bytes may arrive in chunks of any size; every byte is consumed
/// exactly once and in arrival order. Color lines are emitted
/// pixel-interleaved regardless of the raw layout. Gray and lineart lines
/// pass through unchanged.
#[derive(Debug)]
pub struct LineAssembler {
    format: LineFormat,
    layout: ChannelLayout,
    delays: ChannelDelays,
    warmup: WarmupPolicy,
    pending: BytesMut,
    aligner: Option<ChannelAligner>,
    scratch: [Vec<u8>; CHANNELS],
    lines: u64,
    consumed: u64,
}

impl LineAssembler {
    #[must_use]
    pub fn new(
        format: LineFormat,
        layout: ChannelLayout,
        delays: ChannelDelays,
        warmup: WarmupPolicy,
    ) -> Self {
        Self {
            format,
            layout,
            delays,
            warmup,
            pending: BytesMut::new(),
            aligner: None,
            scratch: Default::default(),
            lines: 0,
            consumed: 0,
        }
    }

    #[inline]
    #[must_use]
    pub fn format(&self) -> &LineFormat {
        &self.format
    }

    pub fn feed(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
    }

    #[inline]
    #[must_use]
    pub fn has_line(&self) -> bool {
        self.pending.len() >= self.format.bytes_per_line()
    }

    /// Bytes received but not yet part of a complete line.
    #[inline]
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Lines emitted so far.
    #[inline]
    #[must_use]
    pub fn lines(&self) -> u64 {
        self.lines
    }

    #[inline]
    #[must_use]
    pub fn consumed_bytes(&self) -> u64 {
        self.consumed
    }

    /// Writes the next reassembled line into `out`.
    ///
    /// Returns `Ok(false)` without touching `out` when less than one full
    /// raw line has been fed.
    pub fn next_line(&mut self, out: &mut [u8]) -> Result<bool> {
        let bpl = self.format.bytes_per_line();
        if out.len() != bpl {
            return Err(ScanError::InvalidArgument(format!(
                "line buffer is {} bytes, expected {bpl}",
                out.len()
            )));
        }
        if !self.has_line() {
            return Ok(false);
        }

        let raw = self.pending.split_to(bpl);
        self.consumed += bpl as u64;
        self.lines += 1;

        if !self.format.mode.is_color() {
            out.copy_from_slice(&raw);
            return Ok(true);
        }

        let aligner = match &mut self.aligner {
            Some(aligner) => aligner,
            slot @ None => slot.insert(ChannelAligner::new(
                self.delays,
                self.format.plane_len(),
                self.warmup,
            )?),
        };

        let planes: [&[u8]; CHANNELS] = match self.layout {
            ChannelLayout::Planar => {
                let plane_len = self.format.plane_len();
                let (red, rest) = raw.split_at(plane_len);
                let (green, blue) = rest.split_at(plane_len);
                [red, green, blue]
            }
            ChannelLayout::Interleaved => {
                split_planes(&raw, &self.format, &mut self.scratch);
                [&self.scratch[0], &self.scratch[1], &self.scratch[2]]
            }
        };

        let aligned = aligner.push(planes)?;
        merge_planes(aligned, &self.format, out);

        tracing::trace!(line = self.lines - 1, "reassembled line");
        Ok(true)
    }
}
