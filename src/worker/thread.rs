use crossbeam_channel::{Receiver, bounded};
use parking_lot::Mutex;
use scanflow_core::{Result, ScanError, Transport};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::{
    ChannelReceiver, Worker, WorkerExit, WorkerPlan, WorkerPoll, WorkerState, grace_millis,
    run_to_completion, wait_done,
};

/// The scanner's transport, locked by whichever worker is reading it.
pub type SharedTransport = Arc<Mutex<Box<dyn Transport>>>;

/// Worker backed by a thread in this process.
///
/// The thread holds the transport lock for the whole page. A cancelled
/// worker that stays blocked inside the transport past the grace period is
/// detached; it keeps the lock until the blocking call returns, which is how
/// a later start learns the device is still busy.
pub struct ThreadWorker {
    receiver: ChannelReceiver,
    cancel: Arc<AtomicBool>,
    done: Receiver<()>,
    handle: Option<JoinHandle<()>>,
}

impl ThreadWorker {
    pub fn spawn(transport: SharedTransport, plan: WorkerPlan) -> Result<Self> {
        let (tx, rx) = bounded(plan.channel_capacity);
        let (done_tx, done_rx) = bounded(1);
        let cancel = Arc::new(AtomicBool::new(false));
        let cancel_worker = Arc::clone(&cancel);

        let handle = thread::Builder::new()
            .name("scanflow-acquire".to_string())
            .spawn(move || {
                {
                    let mut transport = transport.lock();
                    run_to_completion(&mut **transport, &plan, &tx, &cancel_worker);
                }
                let _ = done_tx.send(());
            })
            .map_err(ScanError::Io)?;

        Ok(Self {
            receiver: ChannelReceiver::new(rx),
            cancel,
            done: done_rx,
            handle: Some(handle),
        })
    }
}

impl Worker for ThreadWorker {
    fn receive(&mut self, wait: bool) -> Result<WorkerPoll> {
        self.receiver.receive(wait)
    }

    fn signal_cancel(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);
        self.receiver.cancel();
    }

    fn join(mut self: Box<Self>, grace: Duration) -> WorkerExit {
        let cancelled = self.cancel.load(Ordering::SeqCst);
        if !wait_done(&self.done, grace) {
            tracing::warn!(
                grace_ms = grace_millis(grace),
                "acquisition thread did not stop in time, detaching it"
            );
            self.handle.take();
            return WorkerExit::Terminated;
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                return WorkerExit::Failed("acquisition thread panicked".to_string());
            }
        }
        self.receiver.settle();
        self.receiver.exit(cancelled)
    }

    fn state(&self) -> WorkerState {
        self.receiver.state
    }

    fn delivered(&self) -> u64 {
        self.receiver.delivered
    }
}
