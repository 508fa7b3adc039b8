//! Acquisition workers.
//!
//! A worker pulls the raw stream of one page out of the device and pushes it,
//! in order, into a bounded channel. The reading side never touches the
//! device; the channel is the only state the two sides share.

#[cfg(unix)]
mod process;
mod thread;

#[cfg(unix)]
pub use process::ProcessWorker;
pub use thread::{SharedTransport, ThreadWorker};

use bytes::{Bytes, BytesMut};
use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender, TryRecvError};
use scanflow_core::{Result, ScanError, Transport};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::config::WorkerBackend;

const SEND_RETRY: Duration = Duration::from_millis(50);

/// What travels from a worker to the session.
#[derive(Debug)]
pub enum WorkerMessage {
    Data(Bytes),
    Finished,
    Failed(ScanError),
}

/// Result of polling a worker for data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerPoll {
    Data(Bytes),
    /// Nothing buffered yet; ask again later.
    Pending,
    /// Every expected byte has been delivered.
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Running,
    Cancelling,
    Done,
    Failed,
}

/// How a worker ended, as reported by [`Worker::join`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    Completed,
    Failed(String),
    /// Stopped within the grace period after a cancel request.
    Cancelled,
    /// Did not stop in time and was forcibly abandoned or killed.
    Terminated,
}

/// Sizing of one acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPlan {
    pub expected_bytes: u64,
    pub chunk_size: usize,
    pub channel_capacity: usize,
}

/// One running acquisition, independent of where the bytes come from.
pub trait Worker: Send {
    /// Takes the next chunk off the channel.
    ///
    /// With `wait` set this blocks until the worker sends something;
    /// otherwise an empty channel yields [`WorkerPoll::Pending`]. A transport
    /// failure inside the worker comes back as the error it produced.
    fn receive(&mut self, wait: bool) -> Result<WorkerPoll>;

    /// Asks the worker to stop. Returns immediately.
    fn signal_cancel(&mut self);

    /// Waits up to `grace` for the worker to end.
    fn join(self: Box<Self>, grace: Duration) -> WorkerExit;

    fn state(&self) -> WorkerState;

    /// Raw bytes received from the worker so far.
    fn delivered(&self) -> u64;
}

/// Channel end shared by every backend.
#[derive(Debug)]
pub(crate) struct ChannelReceiver {
    rx: Receiver<WorkerMessage>,
    state: WorkerState,
    delivered: u64,
    failure: Option<String>,
}

impl ChannelReceiver {
    fn new(rx: Receiver<WorkerMessage>) -> Self {
        Self {
            rx,
            state: WorkerState::Running,
            delivered: 0,
            failure: None,
        }
    }

    fn receive(&mut self, wait: bool) -> Result<WorkerPoll> {
        match self.state {
            WorkerState::Done => return Ok(WorkerPoll::Finished),
            WorkerState::Failed => {
                return Err(ScanError::WorkerFailed(
                    self.failure.clone().unwrap_or_default(),
                ));
            }
            WorkerState::Cancelling => return Err(ScanError::Cancelled),
            WorkerState::Running => {}
        }

        let message = if wait {
            self.rx.recv().map_err(|_| TryRecvError::Disconnected)
        } else {
            self.rx.try_recv()
        };

        match message {
            Ok(WorkerMessage::Data(bytes)) => {
                self.delivered += bytes.len() as u64;
                Ok(WorkerPoll::Data(bytes))
            }
            Ok(WorkerMessage::Finished) => {
                self.state = WorkerState::Done;
                tracing::debug!(bytes = self.delivered, "worker finished");
                Ok(WorkerPoll::Finished)
            }
            Ok(WorkerMessage::Failed(e)) => {
                self.state = WorkerState::Failed;
                self.failure = Some(e.to_string());
                tracing::warn!(error = %e, "worker failed");
                Err(e)
            }
            Err(TryRecvError::Empty) => Ok(WorkerPoll::Pending),
            Err(TryRecvError::Disconnected) => {
                let reason = "worker exited without finishing".to_string();
                self.state = WorkerState::Failed;
                self.failure = Some(reason.clone());
                Err(ScanError::WorkerFailed(reason))
            }
        }
    }

    fn cancel(&mut self) {
        if self.state == WorkerState::Running {
            self.state = WorkerState::Cancelling;
        }
        // drop whatever the worker already queued
        while self.rx.try_recv().is_ok() {}
    }

    /// Picks up a final `Finished` or `Failed` the reader never asked for,
    /// once the worker has stopped sending.
    fn settle(&mut self) {
        while self.state == WorkerState::Running {
            match self.rx.try_recv() {
                Ok(WorkerMessage::Data(bytes)) => self.delivered += bytes.len() as u64,
                Ok(WorkerMessage::Finished) => self.state = WorkerState::Done,
                Ok(WorkerMessage::Failed(e)) => {
                    self.state = WorkerState::Failed;
                    self.failure = Some(e.to_string());
                }
                Err(_) => break,
            }
        }
    }

    /// Exit status implied by what the worker reported on the channel.
    fn exit(&self, cancelled: bool) -> WorkerExit {
        match self.state {
            WorkerState::Done => WorkerExit::Completed,
            WorkerState::Failed => WorkerExit::Failed(self.failure.clone().unwrap_or_default()),
            WorkerState::Running | WorkerState::Cancelling if cancelled => WorkerExit::Cancelled,
            WorkerState::Running | WorkerState::Cancelling => {
                WorkerExit::Failed("worker ended before its page was read".to_string())
            }
        }
    }
}

/// Sends `message`, retrying while the channel is full. Gives up when the
/// cancel flag is raised or the reader is gone.
pub(crate) fn publish(
    tx: &Sender<WorkerMessage>,
    message: WorkerMessage,
    cancel: &AtomicBool,
) -> bool {
    let mut message = message;
    loop {
        if cancel.load(Ordering::SeqCst) {
            return false;
        }
        match tx.send_timeout(message, SEND_RETRY) {
            Ok(()) => return true,
            Err(SendTimeoutError::Timeout(returned)) => message = returned,
            Err(SendTimeoutError::Disconnected(_)) => return false,
        }
    }
}

/// Reads exactly `plan.expected_bytes` from `transport` and publishes them.
///
/// Returns `Ok(false)` if the acquisition was cancelled midway.
pub(crate) fn pump(
    transport: &mut dyn Transport,
    plan: &WorkerPlan,
    tx: &Sender<WorkerMessage>,
    cancel: &AtomicBool,
) -> Result<bool> {
    transport.begin_page(plan.expected_bytes)?;

    let mut delivered = 0u64;
    while delivered < plan.expected_bytes {
        if cancel.load(Ordering::SeqCst) {
            tracing::debug!(bytes = delivered, "acquisition cancelled");
            return Ok(false);
        }

        let want = (plan.expected_bytes - delivered).min(plan.chunk_size as u64) as usize;
        let mut buffer = BytesMut::zeroed(want);
        let n = transport.read(&mut buffer)?;
        if n == 0 {
            return Err(ScanError::ShortTransfer {
                expected: plan.expected_bytes,
                delivered,
            });
        }
        buffer.truncate(n);
        delivered += n as u64;
        tracing::trace!(bytes = n, total = delivered, "transport read");

        if !publish(tx, WorkerMessage::Data(buffer.freeze()), cancel) {
            return Ok(false);
        }
    }

    transport.end_page()?;
    Ok(true)
}

/// Runs [`pump`] and reports its outcome on the channel.
pub(crate) fn run_to_completion(
    transport: &mut dyn Transport,
    plan: &WorkerPlan,
    tx: &Sender<WorkerMessage>,
    cancel: &AtomicBool,
) {
    match pump(transport, plan, tx, cancel) {
        Ok(true) => {
            publish(tx, WorkerMessage::Finished, cancel);
        }
        Ok(false) => {}
        Err(e) => {
            tracing::debug!(error = %e, transport = transport.name(), "acquisition failed");
            publish(tx, WorkerMessage::Failed(e), cancel);
        }
    }
}

/// Waits for a completion signal, up to `grace`.
pub(crate) fn wait_done(done: &Receiver<()>, grace: Duration) -> bool {
    !matches!(done.recv_timeout(grace), Err(RecvTimeoutError::Timeout))
}

/// Grace period in whole milliseconds for log fields, saturating.
pub(crate) fn grace_millis(grace: Duration) -> u64 {
    u64::try_from(grace.as_millis()).unwrap_or(u64::MAX)
}

/// Starts workers for one configured backend.
#[derive(Clone)]
pub struct WorkerLauncher {
    backend: WorkerBackend,
    transport: Option<SharedTransport>,
}

impl WorkerLauncher {
    #[must_use]
    pub fn new(backend: WorkerBackend, transport: Option<SharedTransport>) -> Self {
        Self { backend, transport }
    }

    /// Whether an earlier worker still holds the device.
    #[must_use]
    pub fn device_busy(&self) -> bool {
        match (&self.backend, &self.transport) {
            (WorkerBackend::Thread, Some(transport)) => transport.is_locked(),
            _ => false,
        }
    }

    pub fn launch(&self, plan: WorkerPlan) -> Result<Box<dyn Worker>> {
        tracing::debug!(
            bytes = plan.expected_bytes,
            chunk = plan.chunk_size,
            "spawning acquisition worker"
        );
        match &self.backend {
            WorkerBackend::Thread => {
                let transport = self.transport.as_ref().ok_or_else(|| {
                    ScanError::Config("thread backend needs a transport".into())
                })?;
                Ok(Box::new(ThreadWorker::spawn(Arc::clone(transport), plan)?))
            }
            #[cfg(unix)]
            WorkerBackend::Process { program, args } => {
                Ok(Box::new(ProcessWorker::spawn(program, args, plan)?))
            }
            #[cfg(not(unix))]
            WorkerBackend::Process { .. } => Err(ScanError::UnsupportedMode(
                "process workers need a unix host".into(),
            )),
        }
    }
}
