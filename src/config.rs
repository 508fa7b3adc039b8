//! Scanner and per-scan configuration.
//!
//! Both structs deserialize from JSON with every field optional; anything
//! missing falls back to the defaults documented on the field.

use scanflow_core::{ColorMode, FillMode, Result, ScanArea, ScanError, ScanSource, WarmupPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How the acquisition worker reaches the device.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum WorkerBackend {
    /// A thread in this process reads the scanner's transport.
    #[default]
    Thread,
    /// An external helper streams the raw scan to its stdout.
    Process {
        program: PathBuf,
        #[serde(default)]
        args: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IoMode {
    /// `read` waits for the worker.
    Blocking,
    /// `read` returns `Pending` when the worker has nothing yet.
    #[default]
    NonBlocking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PageEndDetection {
    /// Only for document feeder sources.
    #[default]
    Auto,
    On,
    Off,
}

impl PageEndDetection {
    #[must_use]
    pub fn enabled_for(&self, source: ScanSource) -> bool {
        match self {
            Self::Auto => source.is_feeder(),
            Self::On => true,
            Self::Off => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Model profile name. Default: `ccd-planar`.
    pub model: String,
    /// Default: in-process thread.
    pub backend: WorkerBackend,
    /// Default: non-blocking.
    pub io_mode: IoMode,
    /// How long a cancelled worker may take to stop before it is
    /// terminated. Default: 2000 ms.
    pub cancel_grace_ms: u64,
    /// Largest single transport read. Default: 64 KiB.
    pub chunk_size: usize,
    /// Chunks buffered between worker and reader. Default: 16.
    pub channel_capacity: usize,
    /// Default: repeat the earliest line.
    pub warmup: WarmupPolicy,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            model: "ccd-planar".to_string(),
            backend: WorkerBackend::Thread,
            io_mode: IoMode::NonBlocking,
            cancel_grace_ms: 2000,
            chunk_size: 64 * 1024,
            channel_capacity: 16,
            warmup: WarmupPolicy::RepeatEarliest,
        }
    }
}

impl ScannerConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&text)
            .map_err(|e| ScanError::Config(format!("{}: {e}", path.display())))?;
        tracing::debug!(path = %path.display(), model = %config.model, "loaded scanner config");
        Ok(config)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| ScanError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(ScanError::Config("chunk_size must be positive".into()));
        }
        if self.channel_capacity == 0 {
            return Err(ScanError::Config("channel_capacity must be positive".into()));
        }
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }
}

/// Options of a single scan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Dots per inch. Default: 300.
    pub resolution: u32,
    /// Default: 24-bit color.
    pub mode: ColorMode,
    /// Default: flatbed.
    pub source: ScanSource,
    /// Scan window in millimetres. Default: US letter from the origin.
    pub area: ScanArea,
    /// Filler after the end-of-page marker. Default: repeat the last line.
    pub fill: FillMode,
    /// Paint over the marker pixel. Default: on.
    pub hide_marker: bool,
    pub page_end: PageEndDetection,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            resolution: 300,
            mode: ColorMode::Color24,
            source: ScanSource::Flatbed,
            area: ScanArea::default(),
            fill: FillMode::RepeatLast,
            hide_marker: true,
            page_end: PageEndDetection::Auto,
        }
    }
}
