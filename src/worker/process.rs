use crossbeam_channel::{Receiver, bounded};
use rustix::process::{Pid, Signal, kill_process};
use scanflow_core::{Result, ScanError, Transport};
use std::io::Read;
use std::path::Path;
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::{
    ChannelReceiver, Worker, WorkerExit, WorkerPlan, WorkerPoll, WorkerState, grace_millis,
    run_to_completion, wait_done,
};

/// Environment variable telling the helper how many bytes to produce.
pub const EXPECTED_BYTES_ENV: &str = "SCANFLOW_EXPECTED_BYTES";

const EXIT_POLL: Duration = Duration::from_millis(10);

/// The helper's stdout seen as a transport.
struct PipeTransport(ChildStdout);

impl Transport for PipeTransport {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        Ok(self.0.read(buffer)?)
    }

    fn name(&self) -> &str {
        "helper-pipe"
    }
}

/// Worker backed by an external helper process.
///
/// The helper writes the raw page to stdout; a relay thread forwards the
/// pipe into the channel. Cancel sends `SIGTERM` and escalates to a kill
/// once the grace period runs out.
pub struct ProcessWorker {
    receiver: ChannelReceiver,
    cancel: Arc<AtomicBool>,
    child: Child,
    done: Receiver<()>,
    relay: Option<JoinHandle<()>>,
}

impl ProcessWorker {
    pub fn spawn(program: &Path, args: &[String], plan: WorkerPlan) -> Result<Self> {
        let mut child = Command::new(program)
            .args(args)
            .env(EXPECTED_BYTES_ENV, plan.expected_bytes.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| ScanError::WorkerFailed(format!("{}: {e}", program.display())))?;

        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ScanError::WorkerFailed("helper stdout not captured".into()));
        };
        tracing::debug!(program = %program.display(), pid = child.id(), "helper started");

        let (tx, rx) = bounded(plan.channel_capacity);
        let (done_tx, done_rx) = bounded(1);
        let cancel = Arc::new(AtomicBool::new(false));
        let cancel_relay = Arc::clone(&cancel);

        let spawned = thread::Builder::new()
            .name("scanflow-relay".to_string())
            .spawn(move || {
                let mut pipe = PipeTransport(stdout);
                run_to_completion(&mut pipe, &plan, &tx, &cancel_relay);
                drop(pipe);
                let _ = done_tx.send(());
            });
        let relay = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ScanError::Io(e));
            }
        };

        Ok(Self {
            receiver: ChannelReceiver::new(rx),
            cancel,
            child,
            done: done_rx,
            relay: Some(relay),
        })
    }

    fn terminate(&mut self) {
        let pid = Pid::from_child(&self.child);
        if let Err(e) = kill_process(pid, Signal::TERM) {
            tracing::debug!(error = %e, "SIGTERM to helper failed");
        }
    }

    /// Polls the child until it exits or `deadline` passes.
    fn wait_until(&mut self, deadline: Instant) -> Option<ExitStatus> {
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => return Some(status),
                Ok(None) if Instant::now() < deadline => thread::sleep(EXIT_POLL),
                Ok(None) => return None,
                Err(e) => {
                    tracing::warn!(error = %e, "cannot query helper status");
                    return None;
                }
            }
        }
    }

    fn kill(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Worker for ProcessWorker {
    fn receive(&mut self, wait: bool) -> Result<WorkerPoll> {
        self.receiver.receive(wait)
    }

    fn signal_cancel(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);
        self.receiver.cancel();
        self.terminate();
    }

    fn join(mut self: Box<Self>, grace: Duration) -> WorkerExit {
        let cancelled = self.cancel.load(Ordering::SeqCst);
        let deadline = Instant::now() + grace;

        let status = self.wait_until(deadline);
        if status.is_none() {
            tracing::warn!(
                grace_ms = grace_millis(grace),
                "helper did not exit in time, killing it"
            );
            self.kill();
        }

        // the pipe is closed now, so the relay finishes promptly
        if wait_done(&self.done, grace) {
            if let Some(relay) = self.relay.take() {
                let _ = relay.join();
            }
        } else {
            self.relay.take();
        }

        self.receiver.settle();
        let reported = matches!(
            self.receiver.state,
            WorkerState::Done | WorkerState::Failed
        );
        match status {
            None => WorkerExit::Terminated,
            Some(_) if reported => self.receiver.exit(cancelled),
            Some(_) if cancelled => WorkerExit::Cancelled,
            Some(status) if !status.success() => {
                WorkerExit::Failed(format!("helper exited with {status}"))
            }
            Some(_) => self.receiver.exit(cancelled),
        }
    }

    fn state(&self) -> WorkerState {
        self.receiver.state
    }

    fn delivered(&self) -> u64 {
        self.receiver.delivered
    }
}

impl Drop for ProcessWorker {
    fn drop(&mut self) {
        if matches!(self.child.try_wait(), Ok(None)) {
            self.kill();
        }
    }
}
