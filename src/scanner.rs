use parking_lot::Mutex;
use scanflow_core::{LookaheadBuffer, Parameters, Result, ScanError, Transport};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{IoMode, ScanSettings, ScannerConfig, WorkerBackend};
use crate::models::{ModelProfile, find_profile};
use crate::session::{ReadStatus, ScanSession, SessionInfo, SessionOutcome, plan_scan};
use crate::worker::{SharedTransport, WorkerExit, WorkerLauncher};

const PAGE_READ_CHUNK: usize = 64 * 1024;
const PENDING_BACKOFF: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScannerState {
    Idle,
    Scanning,
    /// The last page was read to the end.
    PageDone,
    Cancelled,
}

/// Pull interface to one scanner.
///
/// ```ignore
/// let mut scanner = Scanner::open(transport, ScannerConfig::default())?;
/// scanner.set_settings(settings)?;
/// scanner.start()?;
/// let mut page = Vec::new();
/// scanner.read_page(&mut page)?;
/// ```
pub struct Scanner {
    config: ScannerConfig,
    profile: &'static ModelProfile,
    launcher: WorkerLauncher,
    settings: ScanSettings,
    io_mode: IoMode,
    state: ScannerState,
    session: Option<ScanSession>,
    lookahead: Option<LookaheadBuffer>,
    last_exit: Option<WorkerExit>,
}

impl Scanner {
    /// Opens a scanner reading from `transport` on worker threads.
    pub fn open(transport: impl Transport + 'static, config: ScannerConfig) -> Result<Self> {
        let shared: SharedTransport = Arc::new(Mutex::new(Box::new(transport)));
        Self::with_launcher(Some(shared), config)
    }

    /// Opens a scanner whose data comes from the helper program named in
    /// `config.backend`.
    pub fn open_helper(config: ScannerConfig) -> Result<Self> {
        if !matches!(config.backend, WorkerBackend::Process { .. }) {
            return Err(ScanError::Config(
                "open_helper needs the process backend".into(),
            ));
        }
        Self::with_launcher(None, config)
    }

    fn with_launcher(transport: Option<SharedTransport>, config: ScannerConfig) -> Result<Self> {
        config.validate()?;
        let profile = find_profile(&config.model)?;
        let launcher = WorkerLauncher::new(config.backend.clone(), transport);
        tracing::info!(model = profile.name, backend = ?config.backend, "scanner opened");
        Ok(Self {
            io_mode: config.io_mode,
            profile,
            launcher,
            settings: ScanSettings::default(),
            state: ScannerState::Idle,
            session: None,
            lookahead: None,
            last_exit: None,
            config,
        })
    }

    #[must_use]
    pub fn profile(&self) -> &'static ModelProfile {
        self.profile
    }

    #[must_use]
    pub fn settings(&self) -> &ScanSettings {
        &self.settings
    }

    #[must_use]
    pub fn state(&self) -> ScannerState {
        self.state
    }

    /// Replaces the scan settings after checking them against the model.
    pub fn set_settings(&mut self, settings: ScanSettings) -> Result<()> {
        if self.session.is_some() {
            return Err(ScanError::DeviceBusy(
                "settings cannot change during a scan".into(),
            ));
        }
        plan_scan(self.profile, &settings, self.config.warmup)?;
        self.settings = settings;
        Ok(())
    }

    /// Image parameters of the running scan, or of the next one.
    pub fn parameters(&self) -> Result<Parameters> {
        match &self.session {
            Some(session) => Ok(session.plan().parameters()),
            None => Ok(plan_scan(self.profile, &self.settings, self.config.warmup)?.parameters()),
        }
    }

    pub fn set_io_mode(&mut self, mode: IoMode) {
        self.io_mode = mode;
    }

    #[must_use]
    pub fn io_mode(&self) -> IoMode {
        self.io_mode
    }

    /// Starts the next page.
    ///
    /// Fails with [`ScanError::DeviceBusy`] while a page is in progress or
    /// while a worker abandoned by an earlier cancel still holds the device.
    pub fn start(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Err(ScanError::DeviceBusy("a scan is already running".into()));
        }
        if self.launcher.device_busy() {
            return Err(ScanError::DeviceBusy(
                "previous acquisition still holds the device".into(),
            ));
        }

        let plan = plan_scan(self.profile, &self.settings, self.config.warmup)?;
        let session = ScanSession::start(
            plan,
            self.launcher.clone(),
            &self.config,
            &mut self.lookahead,
        )?;
        self.session = Some(session);
        self.state = ScannerState::Scanning;
        self.last_exit = None;
        Ok(())
    }

    /// Pulls the next bytes of the current page into `buffer`.
    pub fn read(&mut self, buffer: &mut [u8]) -> Result<ReadStatus> {
        let Some(session) = self.session.as_mut() else {
            return match self.state {
                ScannerState::Cancelled => Err(ScanError::Cancelled),
                ScannerState::PageDone => Ok(ReadStatus::EndOfData),
                ScannerState::Idle | ScannerState::Scanning => Err(ScanError::NoSession),
            };
        };

        match session.read(buffer, self.io_mode) {
            Ok(ReadStatus::EndOfData) => {
                let outcome = session.complete();
                self.finish_session(outcome, ScannerState::PageDone);
                match &self.last_exit {
                    Some(WorkerExit::Failed(reason)) => Err(ScanError::WorkerFailed(reason.clone())),
                    _ => Ok(ReadStatus::EndOfData),
                }
            }
            Ok(status) => Ok(status),
            Err(e) => {
                tracing::warn!(error = %e, "scan aborted");
                let outcome = session.abort();
                self.finish_session(outcome, ScannerState::Idle);
                Err(e)
            }
        }
    }

    /// Reads the rest of the current page into `page`, retrying while data
    /// is pending. Returns the number of bytes appended.
    pub fn read_page(&mut self, page: &mut Vec<u8>) -> Result<usize> {
        let chunk_len = self
            .session
            .as_ref()
            .map_or(PAGE_READ_CHUNK, |s| s.plan().bytes_per_line().max(PAGE_READ_CHUNK));
        let mut chunk = vec![0u8; chunk_len];
        let mut total = 0;
        loop {
            match self.read(&mut chunk)? {
                ReadStatus::Data(n) => {
                    page.extend_from_slice(&chunk[..n]);
                    total += n;
                }
                ReadStatus::Pending => std::thread::sleep(PENDING_BACKOFF),
                ReadStatus::EndOfData => return Ok(total),
            }
        }
    }

    /// Stops the current page. Always succeeds; unread data is dropped, but
    /// lines already captured for the next sheet are kept.
    pub fn cancel(&mut self) {
        if let Some(session) = self.session.as_mut() {
            let outcome = session.abort();
            self.finish_session(outcome, ScannerState::Cancelled);
        } else if self.state == ScannerState::Scanning {
            self.state = ScannerState::Cancelled;
        }
    }

    #[must_use]
    pub fn session_info(&self) -> Option<SessionInfo> {
        self.session.as_ref().map(ScanSession::info)
    }

    /// Exit status of the worker of the last finished or cancelled page.
    #[must_use]
    pub fn last_exit(&self) -> Option<&WorkerExit> {
        self.last_exit.as_ref()
    }

    /// Bytes waiting to be replayed as the start of the next page.
    #[must_use]
    pub fn pending_lookahead(&self) -> usize {
        self.lookahead.as_ref().map_or(0, LookaheadBuffer::len)
    }

    /// Ends a feeder batch: forgets any next-page data.
    pub fn discard_lookahead(&mut self) {
        if let Some(buffer) = self.lookahead.take() {
            tracing::debug!(bytes = buffer.len(), "lookahead discarded");
        }
    }

    fn finish_session(&mut self, outcome: SessionOutcome, state: ScannerState) {
        self.session = None;
        self.state = state;
        self.last_exit = outcome.exit;
        if outcome.lookahead.is_some() {
            self.lookahead = outcome.lookahead;
        }
    }
}

impl Drop for Scanner {
    fn drop(&mut self) {
        self.cancel();
    }
}
