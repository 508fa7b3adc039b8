//! Per-channel delay lines.
//!
//! A linear color sensor sees one document row with its red, green and blue
//! rows at different moments, so each channel of a raw line belongs to a
//! different output line. [`ChannelAligner`] keeps a short history of every
//! channel plane and, for each pushed raw line, hands back the three planes
//! that belong together.
//!
//! Channel `c` of output line `n` is taken from raw line `n - delay[c]`.
//! For the first `max(delay)` lines that history does not exist yet and the
//! configured [`WarmupPolicy`] decides what is emitted instead.

use crate::buffer::try_zeroed;
use crate::error::{Result, ScanError};
use crate::types::{CHANNELS, ChannelDelays, LineFormat, WarmupPolicy};

/// Fixed-capacity ring of equally sized planes, stored in one allocation.
#[derive(Debug)]
pub struct PlaneRing {
    storage: Vec<u8>,
    plane_len: usize,
    slots: usize,
    head: usize,
    pushed: u64,
}

impl PlaneRing {
    pub fn new(plane_len: usize, slots: usize) -> Result<Self> {
        let slots = slots.max(1);
        let bytes = plane_len
            .checked_mul(slots)
            .ok_or(ScanError::OutOfMemory { bytes: usize::MAX })?;
        Ok(Self {
            storage: try_zeroed(bytes)?,
            plane_len,
            slots,
            head: 0,
            pushed: 0,
        })
    }

    pub fn push(&mut self, plane: &[u8]) {
        let start = self.head * self.plane_len;
        self.storage[start..start + self.plane_len].copy_from_slice(plane);
        self.head = (self.head + 1) % self.slots;
        self.pushed += 1;
    }

    /// Plane pushed `age` pushes ago; `0` is the most recent one.
    ///
    /// Returns `None` if that plane was never pushed or already overwritten.
    #[must_use]
    pub fn back(&self, age: usize) -> Option<&[u8]> {
        if age >= self.slots || age as u64 >= self.pushed {
            return None;
        }
        let slot = (self.head + self.slots - 1 - age) % self.slots;
        let start = slot * self.plane_len;
        Some(&self.storage[start..start + self.plane_len])
    }

    #[inline]
    #[must_use]
    pub fn pushed(&self) -> u64 {
        self.pushed
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots
    }
}

/// Reorders channel planes according to a delay table.
#[derive(Debug)]
pub struct ChannelAligner {
    delays: [usize; CHANNELS],
    window: usize,
    plane_len: usize,
    warmup: WarmupPolicy,
    rings: [PlaneRing; CHANNELS],
    zero: Vec<u8>,
    lines: u64,
}

impl ChannelAligner {
    /// Allocates one ring of `max(delay) + 1` planes per channel.
    pub fn new(delays: ChannelDelays, plane_len: usize, warmup: WarmupPolicy) -> Result<Self> {
        let window = delays.max();
        let slots = window + 1;
        let rings = [
            PlaneRing::new(plane_len, slots)?,
            PlaneRing::new(plane_len, slots)?,
            PlaneRing::new(plane_len, slots)?,
        ];
        let zero = match warmup {
            WarmupPolicy::ZeroFill => try_zeroed(plane_len)?,
            WarmupPolicy::RepeatEarliest => Vec::new(),
        };

        tracing::debug!(
            ?delays,
            plane_len,
            ?warmup,
            "allocated channel delay rings"
        );

        Ok(Self {
            delays: delays.as_array(),
            window,
            plane_len,
            warmup,
            rings,
            zero,
            lines: 0,
        })
    }

    #[inline]
    #[must_use]
    pub fn window(&self) -> usize {
        self.window
    }

    /// Lines pushed so far in this session.
    #[inline]
    #[must_use]
    pub fn lines(&self) -> u64 {
        self.lines
    }

    /// Whether the next pushed line still lacks full history.
    #[inline]
    #[must_use]
    pub fn in_warmup(&self) -> bool {
        self.lines < self.window as u64
    }

    /// Pushes the raw planes of the next line and returns the aligned planes
    /// for the same output position.
    pub fn push<'a>(&'a mut self, planes: [&[u8]; CHANNELS]) -> Result<[&'a [u8]; CHANNELS]> {
        for (channel, plane) in planes.iter().enumerate() {
            if plane.len() != self.plane_len {
                return Err(ScanError::InvalidArgument(format!(
                    "channel {channel} plane is {} bytes, expected {}",
                    plane.len(),
                    self.plane_len
                )));
            }
        }

        for (ring, plane) in self.rings.iter_mut().zip(planes) {
            ring.push(plane);
        }
        let position = self.lines as usize;
        self.lines += 1;

        let this = &*self;
        let warm = position < this.window;
        let pick = move |channel: usize| -> &'a [u8] {
            let ring = &this.rings[channel];
            let age = if warm {
                match this.warmup {
                    WarmupPolicy::RepeatEarliest => position,
                    WarmupPolicy::ZeroFill => return this.zero.as_slice(),
                }
            } else {
                this.delays[channel]
            };
            ring.back(age).unwrap_or(this.zero.as_slice())
        };

        Ok([pick(0), pick(1), pick(2)])
    }
}

/// Splits a pixel-interleaved line into one contiguous plane per channel.
pub fn split_planes(line: &[u8], format: &LineFormat, planes: &mut [Vec<u8>; CHANNELS]) {
    let sample = format.sample_bytes();
    let pixel = format.bytes_per_pixel();
    for plane in planes.iter_mut() {
        plane.resize(format.plane_len(), 0);
    }
    for (index, px) in line.chunks_exact(pixel).enumerate() {
        let at = index * sample;
        for (channel, plane) in planes.iter_mut().enumerate() {
            let from = channel * sample;
            plane[at..at + sample].copy_from_slice(&px[from..from + sample]);
        }
    }
}

/// Interleaves three channel planes into `line`, pixel by pixel.
pub fn merge_planes(planes: [&[u8]; CHANNELS], format: &LineFormat, line: &mut [u8]) {
    let sample = format.sample_bytes();
    let pixel = format.bytes_per_pixel();
    for (index, px) in line.chunks_exact_mut(pixel).enumerate() {
        let at = index * sample;
        for (channel, plane) in planes.iter().enumerate() {
            let to = channel * sample;
            px[to..to + sample].copy_from_slice(&plane[at..at + sample]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ColorMode;

    fn planes(r: u8, g: u8, b: u8, len: usize) -> [Vec<u8>; CHANNELS] {
        [vec![r; len], vec![g; len], vec![b; len]]
    }

    #[test]
    fn test_ring_back() {
        let mut ring = PlaneRing::new(2, 3).unwrap();
        assert!(ring.back(0).is_none());
        ring.push(&[1, 1]);
        ring.push(&[2, 2]);
        assert_eq!(ring.back(0).unwrap(), &[2, 2]);
        assert_eq!(ring.back(1).unwrap(), &[1, 1]);
        assert!(ring.back(2).is_none());
        ring.push(&[3, 3]);
        ring.push(&[4, 4]);
        assert_eq!(ring.back(2).unwrap(), &[2, 2]);
        assert!(ring.back(3).is_none());
    }

    #[test]
    fn test_aligner_repeat_earliest() {
        let delays = ChannelDelays::new(2, 1, 0);
        let mut aligner = ChannelAligner::new(delays, 4, WarmupPolicy::RepeatEarliest).unwrap();

        let mut out = Vec::new();
        for row in 0..5u8 {
            let raw = planes(row, row, row, 4);
            let aligned = aligner.push([&raw[0], &raw[1], &raw[2]]).unwrap();
            out.push([aligned[0][0], aligned[1][0], aligned[2][0]]);
        }

        assert_eq!(out[0], [0, 0, 0]);
        assert_eq!(out[1], [0, 0, 0]);
        assert_eq!(out[2], [0, 1, 2]);
        assert_eq!(out[3], [1, 2, 3]);
        assert_eq!(out[4], [2, 3, 4]);
    }

    #[test]
    fn test_aligner_zero_fill() {
        let delays = ChannelDelays::new(0, 1, 0);
        let mut aligner = ChannelAligner::new(delays, 2, WarmupPolicy::ZeroFill).unwrap();

        let first = planes(7, 7, 7, 2);
        let aligned = aligner.push([&first[0], &first[1], &first[2]]).unwrap();
        assert_eq!(aligned, [&[0, 0][..], &[0, 0][..], &[0, 0][..]]);

        let second = planes(8, 8, 8, 2);
        let aligned = aligner.push([&second[0], &second[1], &second[2]]).unwrap();
        assert_eq!(aligned, [&[8, 8][..], &[7, 7][..], &[8, 8][..]]);
    }

    #[test]
    fn test_aligner_no_delay_is_passthrough() {
        let mut aligner =
            ChannelAligner::new(ChannelDelays::none(), 3, WarmupPolicy::RepeatEarliest).unwrap();
        let raw = planes(1, 2, 3, 3);
        let aligned = aligner.push([&raw[0], &raw[1], &raw[2]]).unwrap();
        assert_eq!(aligned, [&raw[0][..], &raw[1][..], &raw[2][..]]);
        assert!(!aligner.in_warmup());
    }

    #[test]
    fn test_aligner_rejects_wrong_plane() {
        let mut aligner =
            ChannelAligner::new(ChannelDelays::none(), 3, WarmupPolicy::RepeatEarliest).unwrap();
        let short = [0u8; 2];
        let full = [0u8; 3];
        assert!(matches!(
            aligner.push([&full, &short, &full]),
            Err(ScanError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_split_merge_16bit() {
        let format = LineFormat::new(ColorMode::Color48, 2);
        let line: Vec<u8> = (0..12).collect();
        let mut planes: [Vec<u8>; CHANNELS] = Default::default();
        split_planes(&line, &format, &mut planes);
        assert_eq!(planes[0], vec![0, 1, 6, 7]);
        assert_eq!(planes[1], vec![2, 3, 8, 9]);
        assert_eq!(planes[2], vec![4, 5, 10, 11]);

        let mut back = vec![0u8; 12];
        merge_planes([&planes[0], &planes[1], &planes[2]], &format, &mut back);
        assert_eq!(back, line);
    }
}
