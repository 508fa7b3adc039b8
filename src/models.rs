//! Per-model sensor tables.
//!
//! Each model lists the resolutions it supports together with the channel
//! delays (and, where needed, the high resolution skew shift) of its sensor
//! at that resolution. Everything resolution dependent is looked up here.

use scanflow_core::{
    ChannelDelays, ChannelLayout, Extent, Result, ScanError, ScanSource, SkewShift,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionEntry {
    pub dpi: u32,
    pub delays: ChannelDelays,
    pub skew: Option<SkewShift>,
}

impl ResolutionEntry {
    const fn new(dpi: u32, red: usize, green: usize) -> Self {
        Self {
            dpi,
            delays: ChannelDelays::new(red, green, 0),
            skew: None,
        }
    }

    const fn with_skew(mut self, large: usize, partial: usize) -> Self {
        self.skew = Some(SkewShift::new(large, partial));
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelProfile {
    pub name: &'static str,
    pub layout: ChannelLayout,
    pub flatbed: Extent,
    pub transparency: Option<Extent>,
    pub feeder: Option<Extent>,
    pub resolutions: &'static [ResolutionEntry],
}

const LETTER_BED: Extent = Extent::new(215.9, 297.18);

const CCD_PLANAR_RESOLUTIONS: &[ResolutionEntry] = &[
    ResolutionEntry::new(75, 0, 0),
    ResolutionEntry::new(150, 2, 1),
    ResolutionEntry::new(300, 4, 2),
    ResolutionEntry::new(600, 8, 4),
    ResolutionEntry::new(1200, 16, 8),
];

const CIS_RESOLUTIONS: &[ResolutionEntry] = &[
    ResolutionEntry::new(75, 0, 0),
    ResolutionEntry::new(150, 0, 0),
    ResolutionEntry::new(300, 0, 0),
    ResolutionEntry::new(600, 0, 0),
];

const CCD_FEEDER_RESOLUTIONS: &[ResolutionEntry] = &[
    ResolutionEntry::new(100, 2, 1),
    ResolutionEntry::new(200, 4, 2),
    ResolutionEntry::new(300, 6, 3),
    ResolutionEntry::new(600, 12, 6),
    ResolutionEntry::new(1200, 24, 12),
    ResolutionEntry::new(2400, 48, 24).with_skew(48, 24),
];

pub const PROFILES: &[ModelProfile] = &[
    ModelProfile {
        name: "ccd-planar",
        layout: ChannelLayout::Planar,
        flatbed: LETTER_BED,
        transparency: Some(Extent::new(35.0, 120.0)),
        feeder: None,
        resolutions: CCD_PLANAR_RESOLUTIONS,
    },
    ModelProfile {
        name: "cis-interleaved",
        layout: ChannelLayout::Interleaved,
        flatbed: LETTER_BED,
        transparency: None,
        feeder: None,
        resolutions: CIS_RESOLUTIONS,
    },
    ModelProfile {
        name: "ccd-feeder",
        layout: ChannelLayout::Planar,
        flatbed: LETTER_BED,
        transparency: Some(Extent::new(35.0, 120.0)),
        feeder: Some(Extent::new(215.9, 355.6)),
        resolutions: CCD_FEEDER_RESOLUTIONS,
    },
];

pub fn find_profile(name: &str) -> Result<&'static ModelProfile> {
    PROFILES
        .iter()
        .find(|profile| profile.name.eq_ignore_ascii_case(name))
        .ok_or_else(|| ScanError::Config(format!("unknown scanner model '{name}'")))
}

impl ModelProfile {
    pub fn lookup(&self, dpi: u32) -> Result<&ResolutionEntry> {
        self.resolutions
            .iter()
            .find(|entry| entry.dpi == dpi)
            .ok_or(ScanError::UnsupportedResolution { dpi })
    }

    /// Usable area of `source`.
    pub fn extent(&self, source: ScanSource) -> Result<Extent> {
        let extent = match source {
            ScanSource::Flatbed => Some(self.flatbed),
            ScanSource::Transparency | ScanSource::Negative => self.transparency,
            ScanSource::Adf | ScanSource::AdfDuplex => self.feeder,
        };
        extent.ok_or_else(|| {
            ScanError::UnsupportedMode(format!("{} has no {source} source", self.name))
        })
    }
}
