//! One page worth of acquisition: planning, the per-line pipeline and the
//! pull-side buffering.

use scanflow_core::{
    BoundaryOptions, ChannelDelays, ChannelLayout, LineAssembler, LineFormat, LineStaging,
    LookaheadBuffer, PageBoundary, Parameters, Result, ScanError, ScanSource, SkewCorrector,
    SkewShift, WarmupPolicy,
};
use std::time::Duration;

use crate::config::{IoMode, ScanSettings, ScannerConfig};
use crate::models::ModelProfile;
use crate::worker::{Worker, WorkerExit, WorkerLauncher, WorkerPlan, WorkerPoll};

/// Outcome of a single pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// `n` bytes were written to the front of the caller's buffer.
    Data(usize),
    /// No complete data yet; try again.
    Pending,
    /// The page has been delivered in full.
    EndOfData,
}

/// Everything a session needs to know, resolved from the model tables and
/// the user's settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanPlan {
    pub dpi: u32,
    pub source: ScanSource,
    pub format: LineFormat,
    pub lines: usize,
    pub layout: ChannelLayout,
    pub delays: ChannelDelays,
    pub skew: Option<SkewShift>,
    pub boundary: BoundaryOptions,
    pub warmup: WarmupPolicy,
}

impl ScanPlan {
    #[inline]
    #[must_use]
    pub fn bytes_per_line(&self) -> usize {
        self.format.bytes_per_line()
    }

    #[inline]
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.bytes_per_line() as u64 * self.lines as u64
    }

    #[must_use]
    pub fn parameters(&self) -> Parameters {
        self.format.parameters(self.lines)
    }
}

/// Validates `settings` against `profile` and resolves the scan geometry.
///
/// Runs before any worker exists, so bad geometry never reaches the device.
pub fn plan_scan(
    profile: &ModelProfile,
    settings: &ScanSettings,
    warmup: WarmupPolicy,
) -> Result<ScanPlan> {
    let entry = profile.lookup(settings.resolution)?;
    let extent = profile.extent(settings.source)?;
    let (pixels, lines) = settings.area.to_pixels(settings.resolution, extent)?;
    let format = LineFormat::new(settings.mode, pixels);

    let detect = settings.page_end.enabled_for(settings.source);
    let boundary = BoundaryOptions {
        detect,
        hide_marker: settings.hide_marker,
        fill: settings.fill,
        capture_next_page: detect && settings.source.is_feeder(),
        invert: settings.source.is_negative(),
    };
    let skew = entry.skew.filter(|_| settings.mode.is_color());

    tracing::debug!(
        model = profile.name,
        dpi = settings.resolution,
        mode = %settings.mode,
        source = %settings.source,
        pixels,
        lines,
        bytes_per_line = format.bytes_per_line(),
        "planned scan"
    );

    Ok(ScanPlan {
        dpi: settings.resolution,
        source: settings.source,
        format,
        lines,
        layout: profile.layout,
        delays: entry.delays,
        skew,
        boundary,
        warmup,
    })
}

/// Progress counters of the running page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionInfo {
    pub expected_bytes: u64,
    /// Raw bytes received from the worker.
    pub transferred_bytes: u64,
    /// Bytes handed to the caller.
    pub delivered_bytes: u64,
    pub lines_delivered: usize,
    /// Bytes served from the previous page's lookahead.
    pub replayed_bytes: u64,
    /// Line at which the end-of-page marker was seen.
    pub page_end_line: Option<usize>,
}

/// What is left over once a session ends.
#[derive(Debug)]
pub struct SessionOutcome {
    pub exit: Option<WorkerExit>,
    pub lookahead: Option<LookaheadBuffer>,
}

/// Produces finished lines: replayed lookahead first, then worker data
/// through reassembly, skew correction and boundary detection.
struct LinePipeline {
    plan: ScanPlan,
    launcher: WorkerLauncher,
    worker_plan: WorkerPlan,
    worker: Option<Box<dyn Worker>>,
    worker_started: bool,
    transferred: u64,
    assembler: LineAssembler,
    skew: Option<SkewCorrector>,
    boundary: PageBoundary,
    replay: Option<LookaheadBuffer>,
    replayed: u64,
    lines_out: usize,
}

impl LinePipeline {
    fn ensure_worker(&mut self) -> Result<()> {
        if self.worker_started {
            return Ok(());
        }
        self.worker_started = true;
        if self.worker_plan.expected_bytes > 0 {
            self.worker = Some(self.launcher.launch(self.worker_plan)?);
        }
        Ok(())
    }

    fn transferred(&self) -> u64 {
        self.worker
            .as_ref()
            .map_or(self.transferred, |worker| worker.delivered())
    }

    /// Writes the next line of the page into `out`.
    ///
    /// Returns `Ok(false)` when nothing is ready and `wait` is off.
    fn produce_line(&mut self, out: &mut [u8], wait: bool) -> Result<bool> {
        if self.lines_out >= self.plan.lines {
            return Ok(false);
        }

        if let Some(replay) = self.replay.as_mut() {
            if replay.take_line(out) {
                self.boundary.process(out)?;
                self.lines_out += 1;
                tracing::trace!(line = self.lines_out - 1, "replayed line");
                return Ok(true);
            }
            self.replay = None;
            tracing::debug!(bytes = self.replayed, "lookahead drained");
        }

        self.ensure_worker()?;
        loop {
            if self.assembler.next_line(out)? {
                if let Some(skew) = self.skew.as_mut() {
                    skew.apply(out)?;
                }
                self.boundary.process(out)?;
                self.lines_out += 1;
                return Ok(true);
            }

            let Some(worker) = self.worker.as_mut() else {
                return Err(ScanError::ShortTransfer {
                    expected: self.plan.total_bytes(),
                    delivered: self.replayed,
                });
            };
            match worker.receive(wait)? {
                WorkerPoll::Data(bytes) => self.assembler.feed(&bytes),
                WorkerPoll::Pending => return Ok(false),
                WorkerPoll::Finished => {
                    return Err(ScanError::ShortTransfer {
                        expected: self.plan.total_bytes(),
                        delivered: self.replayed + worker.delivered(),
                    });
                }
            }
        }
    }

    fn stop_worker(&mut self, grace: Duration, cancel: bool) -> Option<WorkerExit> {
        let mut worker = self.worker.take()?;
        self.transferred = worker.delivered();
        if cancel {
            worker.signal_cancel();
        }
        let exit = worker.join(grace);
        tracing::debug!(?exit, bytes = self.transferred, "worker joined");
        Some(exit)
    }
}

/// A running page scan.
pub struct ScanSession {
    pipeline: LinePipeline,
    staging: LineStaging,
    grace: Duration,
    delivered: u64,
    /// Error hit after lines were already written; reported on the next read.
    deferred: Option<ScanError>,
}

impl ScanSession {
    /// Sets up a session and, unless `lookahead` still holds lines of this
    /// page, starts its worker.
    ///
    /// `lookahead` is only consumed once the session exists; a failed start
    /// leaves it in place.
    pub fn start(
        plan: ScanPlan,
        launcher: WorkerLauncher,
        config: &ScannerConfig,
        lookahead: &mut Option<LookaheadBuffer>,
    ) -> Result<Self> {
        let bpl = plan.bytes_per_line();
        let usable = lookahead.as_ref().is_some_and(|buffer| {
            plan.source.is_feeder()
                && !buffer.is_empty()
                && buffer.bytes_per_line() == bpl
                && buffer.lines() <= plan.lines
        });
        let replayed = match lookahead.as_ref() {
            Some(buffer) if usable => buffer.len() as u64,
            _ => 0,
        };

        let skew = plan
            .skew
            .map(|shift| SkewCorrector::new(plan.format, shift, plan.warmup))
            .transpose()?;
        let boundary = PageBoundary::new(plan.format, plan.lines, plan.boundary)?;
        let staging = LineStaging::new(bpl)?;
        let assembler = LineAssembler::new(plan.format, plan.layout, plan.delays, plan.warmup);

        let worker_plan = WorkerPlan {
            expected_bytes: plan.total_bytes() - replayed,
            chunk_size: config.chunk_size,
            channel_capacity: config.channel_capacity,
        };

        let mut pipeline = LinePipeline {
            plan,
            launcher,
            worker_plan,
            worker: None,
            worker_started: false,
            transferred: 0,
            assembler,
            skew,
            boundary,
            replay: None,
            replayed,
            lines_out: 0,
        };
        if usable {
            pipeline.replay = lookahead.take();
            tracing::debug!(bytes = replayed, "replaying lookahead before acquisition");
        } else {
            pipeline.ensure_worker()?;
            if let Some(buffer) = lookahead.take() {
                tracing::debug!(bytes = buffer.len(), "discarding lookahead from previous page");
            }
        }

        tracing::info!(
            lines = plan.lines,
            bytes = plan.total_bytes(),
            "scan session started"
        );
        Ok(Self {
            pipeline,
            staging,
            grace: config.cancel_grace(),
            delivered: 0,
            deferred: None,
        })
    }

    #[must_use]
    pub fn plan(&self) -> &ScanPlan {
        &self.pipeline.plan
    }

    /// True once every line has been produced and handed out.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.pipeline.lines_out >= self.pipeline.plan.lines && !self.staging.has_data()
    }

    /// Fills `buffer` with as much of the page as is ready.
    ///
    /// Buffers of at least one line receive whole lines only. Smaller
    /// buffers are served from a one-line staging area, so any sequence of
    /// read sizes yields the same byte stream.
    pub fn read(&mut self, buffer: &mut [u8], io_mode: IoMode) -> Result<ReadStatus> {
        if buffer.is_empty() {
            return Err(ScanError::InvalidArgument("read buffer is empty".into()));
        }

        if let Some(e) = self.deferred.take() {
            return Err(e);
        }
        if self.staging.has_data() {
            let n = self.staging.drain_into(buffer);
            self.delivered += n as u64;
            return Ok(ReadStatus::Data(n));
        }
        if self.is_complete() {
            return Ok(ReadStatus::EndOfData);
        }

        let wait = io_mode == IoMode::Blocking;
        let bpl = self.pipeline.plan.bytes_per_line();

        if buffer.len() < bpl {
            if !self
                .pipeline
                .produce_line(self.staging.buffer_mut(), wait)?
            {
                return Ok(ReadStatus::Pending);
            }
            self.staging.mark_filled();
            let n = self.staging.drain_into(buffer);
            self.delivered += n as u64;
            return Ok(ReadStatus::Data(n));
        }

        let mut written = 0;
        while self.pipeline.lines_out < self.pipeline.plan.lines && written + bpl <= buffer.len() {
            let line = &mut buffer[written..written + bpl];
            match self.pipeline.produce_line(line, wait && written == 0) {
                Ok(true) => written += bpl,
                Ok(false) => break,
                Err(e) if written > 0 => {
                    self.deferred = Some(e);
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        if written == 0 {
            return Ok(ReadStatus::Pending);
        }
        self.delivered += written as u64;
        Ok(ReadStatus::Data(written))
    }

    #[must_use]
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            expected_bytes: self.pipeline.plan.total_bytes(),
            transferred_bytes: self.pipeline.transferred(),
            delivered_bytes: self.delivered,
            lines_delivered: self.pipeline.lines_out,
            replayed_bytes: self.pipeline.replayed,
            page_end_line: self.pipeline.boundary.marker_line(),
        }
    }

    /// Ends a fully read page: joins the worker and hands out the lines
    /// captured for the next sheet.
    pub fn complete(&mut self) -> SessionOutcome {
        let exit = self.pipeline.stop_worker(self.grace, false);
        let lookahead = self.pipeline.boundary.take_lookahead();
        if let Some(buffer) = lookahead.as_ref() {
            tracing::info!(bytes = buffer.len(), "next page data buffered");
        }
        SessionOutcome { exit, lookahead }
    }

    /// Stops the page early. Unread channel data is dropped; lookahead data
    /// is kept for the next page.
    pub fn abort(&mut self) -> SessionOutcome {
        let exit = self.pipeline.stop_worker(self.grace, true);
        self.staging.clear();
        let lookahead = self
            .pipeline
            .replay
            .take()
            .filter(|buffer| !buffer.is_empty())
            .or_else(|| self.pipeline.boundary.take_lookahead());
        tracing::info!(?exit, "scan session cancelled");
        SessionOutcome { exit, lookahead }
    }
}

impl Drop for ScanSession {
    fn drop(&mut self) {
        if self.pipeline.worker.is_some() {
            self.pipeline.stop_worker(self.grace, true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PageEndDetection;
    use crate::models::find_profile;
    use scanflow_core::{ColorMode, FillMode, ScanArea};

    #[test]
    fn test_plan_letter_at_300() {
        let profile = find_profile("ccd-planar").unwrap();
        let plan = plan_scan(profile, &ScanSettings::default(), WarmupPolicy::default()).unwrap();
        assert_eq!(plan.format.pixels_per_line, 2550);
        assert_eq!(plan.lines, 3300);
        assert_eq!(plan.bytes_per_line(), 7650);
        assert_eq!(plan.delays, ChannelDelays::new(4, 2, 0));
        assert!(!plan.boundary.detect);
        assert!(plan.skew.is_none());
    }

    #[test]
    fn test_plan_feeder_enables_detection_and_capture() {
        let profile = find_profile("ccd-feeder").unwrap();
        let settings = ScanSettings {
            resolution: 2400,
            source: ScanSource::Adf,
            area: ScanArea::new(0.0, 0.0, 10.0, 10.0),
            fill: FillMode::White,
            ..Default::default()
        };
        let plan = plan_scan(profile, &settings, WarmupPolicy::default()).unwrap();
        assert!(plan.boundary.detect);
        assert!(plan.boundary.capture_next_page);
        assert_eq!(plan.skew, Some(SkewShift::new(48, 24)));

        let gray = ScanSettings {
            mode: ColorMode::Gray8,
            ..settings
        };
        assert!(plan_scan(profile, &gray, WarmupPolicy::default())
            .unwrap()
            .skew
            .is_none());
    }

    #[test]
    fn test_plan_rejects_before_spawn() {
        let profile = find_profile("ccd-planar").unwrap();
        let too_wide = ScanSettings {
            area: ScanArea::new(0.0, 0.0, 400.0, 10.0),
            ..Default::default()
        };
        assert!(matches!(
            plan_scan(profile, &too_wide, WarmupPolicy::default()),
            Err(ScanError::InvalidGeometry(_))
        ));
        let no_feeder = ScanSettings {
            source: ScanSource::Adf,
            page_end: PageEndDetection::On,
            ..Default::default()
        };
        assert!(matches!(
            plan_scan(profile, &no_feeder, WarmupPolicy::default()),
            Err(ScanError::UnsupportedMode(_))
        ));
    }

    #[test]
    fn test_negative_plans_inversion() {
        let profile = find_profile("ccd-planar").unwrap();
        let settings = ScanSettings {
            source: ScanSource::Negative,
            area: ScanArea::new(0.0, 0.0, 30.0, 30.0),
            ..Default::default()
        };
        let plan = plan_scan(profile, &settings, WarmupPolicy::default()).unwrap();
        assert!(plan.boundary.invert);
        assert!(!plan.boundary.capture_next_page);
    }
}
