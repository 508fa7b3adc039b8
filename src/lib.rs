//! Streaming acquisition for line-scanning devices.
//!
//! A [`Scanner`] owns the device transport and hands out one page at a time
//! through a pull interface. Raw bytes are fetched by an acquisition worker,
//! realigned per color channel, trimmed at the hardware end-of-page marker,
//! and delivered in caller-sized pieces.

pub mod config;
pub mod models;
pub mod scanner;
pub mod session;
pub mod worker;

pub use config::{IoMode, PageEndDetection, ScanSettings, ScannerConfig, WorkerBackend};
pub use models::{ModelProfile, ResolutionEntry, find_profile};
pub use scanner::{Scanner, ScannerState};
pub use session::{ReadStatus, ScanPlan, SessionInfo, plan_scan};
pub use worker::{Worker, WorkerExit, WorkerState};

pub use scanflow_core::{
    ColorMode, FillMode, FrameFormat, Parameters, Result, ScanArea, ScanError, ScanSource, Status,
    Transport, WarmupPolicy,
};
