//! End-of-page detection for reassembled lines.
//!
//! The scanner keeps streaming for the whole requested length even when the
//! sheet is shorter, and flags the last real line by setting the final
//! channel of its last pixel. [`PageBoundary`] watches for that flag once per
//! session, replaces everything after it with a filler and, for feeder
//! batches, keeps the trailing lines because they already belong to the next
//! sheet.

use crate::buffer::try_zeroed;
use crate::error::{Result, ScanError};
use crate::lookahead::LookaheadBuffer;
use crate::types::{CHANNELS, FillMode, LineFormat};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundaryOptions {
    /// Look for the end-of-page marker at all.
    pub detect: bool,
    /// Paint over the marker pixel of every line with its left neighbour
    /// while detection is on.
    pub hide_marker: bool,
    pub fill: FillMode,
    /// Keep the lines after the marker for the next sheet.
    pub capture_next_page: bool,
    /// Invert every delivered byte (negative film).
    pub invert: bool,
}

impl Default for BoundaryOptions {
    fn default() -> Self {
        Self {
            detect: false,
            hide_marker: true,
            fill: FillMode::RepeatLast,
            capture_next_page: false,
            invert: false,
        }
    }
}

/// What happened to a line passed through [`PageBoundary::process`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineDisposition {
    /// Regular page content.
    Passed,
    /// The line carried the end-of-page marker; it has been replaced by the
    /// filler (a no-op for repeat-last and raw).
    Marker,
    /// The line lies after the marker and now holds the filler, or the raw
    /// bytes when filling is off.
    Filled,
}

#[derive(Debug)]
pub struct PageBoundary {
    format: LineFormat,
    options: BoundaryOptions,
    marker_offset: Option<usize>,
    total_lines: usize,
    seen: usize,
    marker_line: Option<usize>,
    fill_line: Vec<u8>,
    lookahead: Option<LookaheadBuffer>,
}

impl PageBoundary {
    pub fn new(format: LineFormat, total_lines: usize, options: BoundaryOptions) -> Result<Self> {
        let marker_offset = format.marker_offset();
        let mut options = options;
        if options.detect && marker_offset.is_none() {
            tracing::debug!(mode = %format.mode, "mode carries no page marker, detection off");
            options.detect = false;
        }
        let fill_line = if options.detect && options.fill != FillMode::Raw {
            try_zeroed(format.bytes_per_line())?
        } else {
            Vec::new()
        };
        Ok(Self {
            format,
            options,
            marker_offset,
            total_lines,
            seen: 0,
            marker_line: None,
            fill_line,
            lookahead: None,
        })
    }

    #[inline]
    #[must_use]
    pub fn options(&self) -> &BoundaryOptions {
        &self.options
    }

    /// Index of the line that carried the marker, if it has been seen.
    #[inline]
    #[must_use]
    pub fn marker_line(&self) -> Option<usize> {
        self.marker_line
    }

    #[inline]
    #[must_use]
    pub fn lines_seen(&self) -> usize {
        self.seen
    }

    /// Processes the next line of the page in place.
    pub fn process(&mut self, line: &mut [u8]) -> Result<LineDisposition> {
        if line.len() != self.format.bytes_per_line() {
            return Err(ScanError::InvalidArgument(format!(
                "boundary input is {} bytes, expected {}",
                line.len(),
                self.format.bytes_per_line()
            )));
        }
        if self.seen >= self.total_lines {
            return Err(ScanError::InvalidArgument(format!(
                "page has {} lines, got one more",
                self.total_lines
            )));
        }
        let index = self.seen;
        self.seen += 1;

        if self.marker_line.is_some() {
            if let Some(lookahead) = self.lookahead.as_mut() {
                lookahead.push_line(line)?;
            }
            if self.options.fill == FillMode::Raw {
                self.hide_marker(line);
                self.invert(line);
            } else {
                line.copy_from_slice(&self.fill_line);
            }
            return Ok(LineDisposition::Filled);
        }

        let marked = self.options.detect
            && self
                .marker_offset
                .is_some_and(|offset| line[offset] != 0);
        self.hide_marker(line);
        if !marked {
            self.invert(line);
            return Ok(LineDisposition::Passed);
        }

        self.marker_line = Some(index);
        tracing::debug!(line = index, total = self.total_lines, "end of page marker");

        self.invert(line);
        self.derive_fill(line);
        if self.options.fill != FillMode::Raw {
            line.copy_from_slice(&self.fill_line);
        }

        let remaining = self.total_lines - index - 1;
        if self.options.capture_next_page && remaining > 0 {
            self.lookahead = Some(LookaheadBuffer::with_capacity(
                self.format.bytes_per_line(),
                remaining,
            )?);
            tracing::debug!(lines = remaining, "capturing next page");
        }
        Ok(LineDisposition::Marker)
    }

    /// Hands out the captured next-page lines, if any were collected.
    pub fn take_lookahead(&mut self) -> Option<LookaheadBuffer> {
        self.lookahead.take().filter(|buffer| !buffer.is_empty())
    }

    fn invert(&self, line: &mut [u8]) {
        if self.options.invert {
            line.iter_mut().for_each(|b| *b ^= 0xff);
        }
    }

    fn hide_marker(&self, line: &mut [u8]) {
        if !(self.options.detect && self.options.hide_marker) {
            return;
        }
        let pixel = self.format.bytes_per_pixel();
        let last = line.len() - pixel;
        if last >= pixel {
            line.copy_within(last - pixel..last, last);
        } else {
            line[last..].fill(0);
        }
    }

    fn derive_fill(&mut self, marker: &[u8]) {
        let pixel = self.format.bytes_per_pixel();
        let sample = self.format.sample_bytes();
        let color = self.format.mode.is_color();
        let fill = &mut self.fill_line;
        match self.options.fill {
            FillMode::Raw => {}
            FillMode::RepeatLast => fill.copy_from_slice(marker),
            FillMode::White => fill.fill(0xff),
            FillMode::Black => fill.fill(0x00),
            FillMode::Raster => {
                for (index, px) in fill.chunks_exact_mut(pixel).enumerate() {
                    px.fill(if index % 2 == 0 { 0xff } else { 0x00 });
                }
            }
            FillMode::Color(rgb) => {
                if color {
                    for px in fill.chunks_exact_mut(pixel) {
                        for (channel, bytes) in px.chunks_exact_mut(sample).enumerate() {
                            let shift = 8 * (CHANNELS - 1 - channel);
                            bytes.fill(((rgb >> shift) & 0xff) as u8);
                        }
                    }
                } else {
                    fill.fill((rgb & 0xff) as u8);
                }
            }
        }
    }
}
