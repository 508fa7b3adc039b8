use crate::align::{ChannelAligner, merge_planes, split_planes};
use crate::error::{Result, ScanError};
use crate::types::{CHANNELS, LineFormat, SkewShift, WarmupPolicy};

/// Second alignment pass for the color skew some sensors show at their
/// highest resolution.
///
/// Works on already reassembled, pixel-interleaved lines. The history lives
/// as long as the corrector, so it spans every read call of a session.
#[derive(Debug)]
pub struct SkewCorrector {
    format: LineFormat,
    aligner: ChannelAligner,
    planes: [Vec<u8>; CHANNELS],
}

impl SkewCorrector {
    pub fn new(format: LineFormat, shift: SkewShift, warmup: WarmupPolicy) -> Result<Self> {
        if !format.mode.is_color() {
            return Err(ScanError::UnsupportedMode(format!(
                "skew correction needs a color mode, got {}",
                format.mode
            )));
        }
        let aligner = ChannelAligner::new(shift.delays(), format.plane_len(), warmup)?;
        tracing::debug!(
            large = shift.large,
            partial = shift.partial,
            "high resolution skew correction enabled"
        );
        Ok(Self {
            format,
            aligner,
            planes: Default::default(),
        })
    }

    /// Corrects `line` in place.
    pub fn apply(&mut self, line: &mut [u8]) -> Result<()> {
        if line.len() != self.format.bytes_per_line() {
            return Err(ScanError::InvalidArgument(format!(
                "skew input is {} bytes, expected {}",
                line.len(),
                self.format.bytes_per_line()
            )));
        }
        split_planes(line, &self.format, &mut self.planes);
        let aligned = self
            .aligner
            .push([&self.planes[0], &self.planes[1], &self.planes[2]])?;
        merge_planes(aligned, &self.format, line);
        Ok(())
    }
}
