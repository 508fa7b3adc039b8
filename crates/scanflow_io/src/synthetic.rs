//! Generators for raw streams with known content.
//!
//! Every sample of a generated raw line carries a tag byte naming the output
//! line it belongs to once the sensor's channel delays are undone, so a
//! reassembled line can be checked by looking at its bytes alone.

use bytes::{BufMut, Bytes, BytesMut};
use scanflow_core::{CHANNELS, ChannelDelays, ChannelLayout, LineFormat};

/// Value written into the marker sample of the end-of-page line.
pub const MARKER_VALUE: u8 = 0xff;

#[derive(Debug, Clone, Copy)]
pub struct SyntheticScan {
    format: LineFormat,
    layout: ChannelLayout,
    delays: ChannelDelays,
}

impl SyntheticScan {
    #[must_use]
    pub fn new(format: LineFormat, layout: ChannelLayout, delays: ChannelDelays) -> Self {
        Self {
            format,
            layout,
            delays,
        }
    }

    #[must_use]
    pub fn format(&self) -> &LineFormat {
        &self.format
    }

    /// Tag carried by every sample of output line `line` after alignment.
    #[inline]
    #[must_use]
    pub fn tag(line: usize) -> u8 {
        (line % 251) as u8 + 1
    }

    /// Raw stream of `lines` lines as the sensor would deliver it.
    ///
    /// Channel `c` of raw line `m` carries the tag of output line
    /// `m + delay[c]`. The last pixel's final channel is zero on every line
    /// except output line `marker_line`, where it holds [`MARKER_VALUE`].
    /// The marker only lands exactly when `marker_line` is at least the
    /// largest delay.
    #[must_use]
    pub fn row_tagged(&self, lines: usize, marker_line: Option<usize>) -> Bytes {
        let delays = if self.format.mode.is_color() {
            self.delays.as_array()
        } else {
            [0; CHANNELS]
        };
        let marker_raw = marker_line.map(|k| k.saturating_sub(delays[CHANNELS - 1]));
        self.build(lines, |raw, channel, last_pixel| {
            let final_channel = channel == self.format.channels() - 1;
            if last_pixel && final_channel {
                if marker_raw == Some(raw) {
                    MARKER_VALUE
                } else {
                    0
                }
            } else {
                Self::tag(raw + delays[channel])
            }
        })
    }

    /// Raw stream where every byte of raw line `m` equals `m`.
    #[must_use]
    pub fn uniform_rows(&self, lines: usize) -> Bytes {
        self.build(lines, |raw, _, _| raw as u8)
    }

    fn build(&self, lines: usize, sample: impl Fn(usize, usize, bool) -> u8) -> Bytes {
        let bpl = self.format.bytes_per_line();
        let mut out = BytesMut::with_capacity(bpl * lines);

        if !self.format.mode.is_color() {
            let width = self.format.sample_bytes();
            let samples = bpl / width;
            for raw in 0..lines {
                for pixel in 0..samples {
                    out.put_bytes(sample(raw, 0, pixel + 1 == samples), width);
                }
            }
            return out.freeze();
        }

        let pixels = self.format.pixels_per_line;
        let width = self.format.sample_bytes();
        for raw in 0..lines {
            match self.layout {
                ChannelLayout::Planar => {
                    for channel in 0..CHANNELS {
                        for pixel in 0..pixels {
                            out.put_bytes(sample(raw, channel, pixel + 1 == pixels), width);
                        }
                    }
                }
                ChannelLayout::Interleaved => {
                    for pixel in 0..pixels {
                        for channel in 0..CHANNELS {
                            out.put_bytes(sample(raw, channel, pixel + 1 == pixels), width);
                        }
                    }
                }
            }
        }
        out.freeze()
    }
}
