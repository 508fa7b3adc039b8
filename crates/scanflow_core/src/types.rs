use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{Result, ScanError};

/// Number of color channels a color sensor delivers (red, green, blue).
pub const CHANNELS: usize = 3;

pub const MM_PER_INCH: f64 = 25.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColorMode {
    /// 1 bit per pixel, packed MSB first, 1 = black.
    Lineart,
    Gray8,
    Gray16,
    Color24,
    Color48,
}

impl ColorMode {
    #[must_use]
    pub const fn channels(&self) -> usize {
        match self {
            Self::Color24 | Self::Color48 => CHANNELS,
            Self::Lineart | Self::Gray8 | Self::Gray16 => 1,
        }
    }

    /// Bytes per sample of one channel. Lineart reports 1 but packs 8 pixels.
    #[must_use]
    pub const fn sample_bytes(&self) -> usize {
        match self {
            Self::Gray16 | Self::Color48 => 2,
            Self::Lineart | Self::Gray8 | Self::Color24 => 1,
        }
    }

    #[must_use]
    pub const fn depth(&self) -> u32 {
        match self {
            Self::Lineart => 1,
            Self::Gray8 | Self::Color24 => 8,
            Self::Gray16 | Self::Color48 => 16,
        }
    }

    #[must_use]
    pub const fn is_color(&self) -> bool {
        matches!(self, Self::Color24 | Self::Color48)
    }

    #[must_use]
    pub const fn is_lineart(&self) -> bool {
        matches!(self, Self::Lineart)
    }

    #[must_use]
    pub const fn frame_format(&self) -> FrameFormat {
        if self.is_color() {
            FrameFormat::Rgb
        } else {
            FrameFormat::Gray
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Lineart => "lineart",
            Self::Gray8 => "gray8",
            Self::Gray16 => "gray16",
            Self::Color24 => "color24",
            Self::Color48 => "color48",
        }
    }
}

impl std::fmt::Display for ColorMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ColorMode {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "lineart" => Ok(Self::Lineart),
            "gray8" | "gray" => Ok(Self::Gray8),
            "gray16" => Ok(Self::Gray16),
            "color24" | "color" => Ok(Self::Color24),
            "color48" => Ok(Self::Color48),
            other => Err(ScanError::Config(format!("unknown color mode '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScanSource {
    #[default]
    Flatbed,
    Transparency,
    Negative,
    Adf,
    AdfDuplex,
}

impl ScanSource {
    /// Feeder sources stream consecutive pages through one continuous transfer.
    #[must_use]
    pub const fn is_feeder(&self) -> bool {
        matches!(self, Self::Adf | Self::AdfDuplex)
    }

    #[must_use]
    pub const fn is_negative(&self) -> bool {
        matches!(self, Self::Negative)
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Flatbed => "flatbed",
            Self::Transparency => "transparency",
            Self::Negative => "negative",
            Self::Adf => "adf",
            Self::AdfDuplex => "adf-duplex",
        }
    }
}

impl std::fmt::Display for ScanSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ScanSource {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "flatbed" => Ok(Self::Flatbed),
            "transparency" | "tma" => Ok(Self::Transparency),
            "negative" => Ok(Self::Negative),
            "adf" => Ok(Self::Adf),
            "adf-duplex" | "duplex" => Ok(Self::AdfDuplex),
            other => Err(ScanError::Config(format!("unknown scan source '{other}'"))),
        }
    }
}

/// How a sensor lays out the channels of one raw line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChannelLayout {
    /// RRR..GGG..BBB: one full plane per channel.
    #[default]
    Planar,
    /// RGBRGB..: channels interleaved per pixel.
    Interleaved,
}

/// Lines of offset per color channel at one resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ChannelDelays {
    pub red: usize,
    pub green: usize,
    pub blue: usize,
}

impl ChannelDelays {
    #[must_use]
    pub const fn new(red: usize, green: usize, blue: usize) -> Self {
        Self { red, green, blue }
    }

    #[must_use]
    pub const fn none() -> Self {
        Self::new(0, 0, 0)
    }

    #[must_use]
    pub const fn as_array(&self) -> [usize; CHANNELS] {
        [self.red, self.green, self.blue]
    }

    #[must_use]
    pub fn max(&self) -> usize {
        self.red.max(self.green).max(self.blue)
    }

    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.red == 0 && self.green == 0 && self.blue == 0
    }
}

/// Two-stage color skew that only shows up at very high resolutions.
///
/// The large shift moves red, the partial shift moves green; blue is the
/// reference channel and stays in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SkewShift {
    pub large: usize,
    pub partial: usize,
}

impl SkewShift {
    #[must_use]
    pub const fn new(large: usize, partial: usize) -> Self {
        Self { large, partial }
    }

    #[must_use]
    pub const fn delays(&self) -> ChannelDelays {
        ChannelDelays::new(self.large, self.partial, 0)
    }
}

/// What a channel emits while its delay ring has no history yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WarmupPolicy {
    /// Every channel repeats the first line captured in the session.
    #[default]
    RepeatEarliest,
    /// Warm-up lines are emitted as zeros.
    ZeroFill,
}

/// Filler for the lines after the end-of-page marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FillMode {
    /// Keep forwarding raw scanner bytes.
    Raw,
    #[default]
    RepeatLast,
    Raster,
    White,
    Black,
    /// 0xRRGGBB; gray modes use the low byte.
    Color(u32),
}

impl FromStr for FillMode {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.to_ascii_lowercase();
        if let Some(value) = lower.strip_prefix("color:") {
            let value = value.trim_start_matches("0x").trim_start_matches('#');
            let rgb = u32::from_str_radix(value, 16)
                .map_err(|e| ScanError::Config(format!("bad fill color '{value}': {e}")))?;
            return Ok(Self::Color(rgb & 0x00ff_ffff));
        }
        match lower.as_str() {
            "raw" => Ok(Self::Raw),
            "last" | "repeat-last" => Ok(Self::RepeatLast),
            "raster" => Ok(Self::Raster),
            "white" => Ok(Self::White),
            "black" => Ok(Self::Black),
            other => Err(ScanError::Config(format!("unknown fill mode '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameFormat {
    Gray,
    Rgb,
}

/// What a frontend needs to know to interpret the byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameters {
    pub format: FrameFormat,
    pub last_frame: bool,
    pub bytes_per_line: usize,
    pub pixels_per_line: usize,
    pub lines: usize,
    pub depth: u32,
}

impl Parameters {
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.bytes_per_line as u64 * self.lines as u64
    }
}

/// Byte geometry of one scan line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LineFormat {
    pub mode: ColorMode,
    pub pixels_per_line: usize,
}

impl LineFormat {
    #[must_use]
    pub const fn new(mode: ColorMode, pixels_per_line: usize) -> Self {
        Self {
            mode,
            pixels_per_line,
        }
    }

    #[inline]
    #[must_use]
    pub const fn channels(&self) -> usize {
        self.mode.channels()
    }

    #[inline]
    #[must_use]
    pub const fn sample_bytes(&self) -> usize {
        self.mode.sample_bytes()
    }

    #[inline]
    #[must_use]
    pub const fn bytes_per_pixel(&self) -> usize {
        self.channels() * self.sample_bytes()
    }

    /// Length of one channel's plane within a line.
    #[inline]
    #[must_use]
    pub const fn plane_len(&self) -> usize {
        self.pixels_per_line * self.sample_bytes()
    }

    #[must_use]
    pub const fn bytes_per_line(&self) -> usize {
        if self.mode.is_lineart() {
            self.pixels_per_line.div_ceil(8)
        } else {
            self.pixels_per_line * self.bytes_per_pixel()
        }
    }

    /// Byte that carries the end-of-page marker: the most significant byte
    /// of the final channel's sample in the last pixel. Samples are
    /// little-endian. Lineart has no marker.
    #[must_use]
    pub const fn marker_offset(&self) -> Option<usize> {
        if self.mode.is_lineart() || self.pixels_per_line == 0 {
            return None;
        }
        let last_pixel = (self.pixels_per_line - 1) * self.bytes_per_pixel();
        let last_channel = (self.channels() - 1) * self.sample_bytes();
        Some(last_pixel + last_channel + self.sample_bytes() - 1)
    }

    #[must_use]
    pub fn parameters(&self, lines: usize) -> Parameters {
        Parameters {
            format: self.mode.frame_format(),
            last_frame: true,
            bytes_per_line: self.bytes_per_line(),
            pixels_per_line: self.pixels_per_line,
            lines,
            depth: self.mode.depth(),
        }
    }
}

/// Physical bed size for one source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub width_mm: f64,
    pub height_mm: f64,
}

impl Extent {
    #[must_use]
    pub const fn new(width_mm: f64, height_mm: f64) -> Self {
        Self {
            width_mm,
            height_mm,
        }
    }
}

/// Requested scan window in millimetres from the bed origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanArea {
    pub tl_x: f64,
    pub tl_y: f64,
    pub br_x: f64,
    pub br_y: f64,
}

impl Default for ScanArea {
    fn default() -> Self {
        Self::letter()
    }
}

impl ScanArea {
    #[must_use]
    pub const fn new(tl_x: f64, tl_y: f64, br_x: f64, br_y: f64) -> Self {
        Self {
            tl_x,
            tl_y,
            br_x,
            br_y,
        }
    }

    #[must_use]
    pub const fn letter() -> Self {
        Self::new(0.0, 0.0, 215.9, 279.4)
    }

    /// Converts the area to `(pixels_per_line, lines)` at `dpi`, rounding up
    /// partial pixels, after checking it lies inside `extent`.
    pub fn to_pixels(&self, dpi: u32, extent: Extent) -> Result<(usize, usize)> {
        let coords = [self.tl_x, self.tl_y, self.br_x, self.br_y];
        if coords.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(ScanError::InvalidGeometry(format!(
                "scan area {self:?} has negative or non-finite coordinates"
            )));
        }
        if self.br_x <= self.tl_x || self.br_y <= self.tl_y {
            return Err(ScanError::InvalidGeometry(format!(
                "scan area {self:?} is empty or inverted"
            )));
        }
        if self.br_x > extent.width_mm || self.br_y > extent.height_mm {
            return Err(ScanError::InvalidGeometry(format!(
                "scan area {self:?} exceeds bed of {:.1} x {:.1} mm",
                extent.width_mm, extent.height_mm
            )));
        }
        if dpi == 0 {
            return Err(ScanError::UnsupportedResolution { dpi });
        }

        // tolerate float noise so whole-pixel sizes do not round up
        let to_px = |mm: f64| (mm / MM_PER_INCH * f64::from(dpi) - 1e-6).ceil() as usize;
        let pixels = to_px(self.br_x - self.tl_x);
        let lines = to_px(self.br_y - self.tl_y);
        if pixels == 0 || lines == 0 {
            return Err(ScanError::InvalidGeometry(format!(
                "scan area {self:?} is smaller than one pixel at {dpi} dpi"
            )));
        }
        Ok((pixels, lines))
    }
}
