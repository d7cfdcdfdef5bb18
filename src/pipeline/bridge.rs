//! Thread boundary between the tick loop and the outside world.
//!
//! - [`StopHandle`] lets any thread (a signal handler, a UI, a watchdog) ask
//!   the vehicle to stop. The request is observed at the next tick boundary
//!   and also wakes the loop out of its pacing wait.
//! - [`EventReceiver`] receives [`VehicleEvent`] telemetry. The tick thread
//!   never blocks on it: when the channel is full the event is dropped and
//!   counted.

use crate::pipeline::binding::BindingLabel;
use crate::types::{LoopStats, RunSummary};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Telemetry sent from the vehicle to subscribers.
#[derive(Debug, Clone)]
pub enum VehicleEvent {
    /// The loop entered `Running`.
    Started { target_hz: f64, parts: usize },

    /// A tick took longer than the target period.
    Overrun {
        tick: u64,
        elapsed: Duration,
        budget: Duration,
    },

    /// Periodic loop statistics.
    Stats(LoopStats),

    /// A threaded part's update failed; its cached output was kept.
    WorkerFailure {
        binding: BindingLabel,
        message: String,
    },

    /// A shutdown hook failed or ran past its budget.
    ShutdownHookFailure {
        binding: BindingLabel,
        message: String,
    },

    /// The vehicle reached `Stopped`.
    Stopped(RunSummary),
}

/// Cloneable handle that requests a stop. Idempotent.
#[derive(Debug, Clone)]
pub struct StopHandle {
    requested: Arc<AtomicBool>,
    wake_tx: Sender<()>,
}

impl StopHandle {
    /// Create a handle and the receiver the loop waits on while pacing.
    pub(crate) fn new() -> (Self, Receiver<()>) {
        let (wake_tx, wake_rx) = bounded(1);
        (
            Self {
                requested: Arc::new(AtomicBool::new(false)),
                wake_tx,
            },
            wake_rx,
        )
    }

    /// Request a stop. Safe to call any number of times from any thread.
    pub fn stop(&self) {
        if !self.requested.swap(true, Ordering::SeqCst) {
            tracing::debug!("Stop requested");
            let _ = self.wake_tx.try_send(());
        }
    }

    pub fn is_stop_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// Tick-side sender. Never blocks; counts what it had to drop.
#[derive(Debug, Clone, Default)]
pub(crate) struct EventSink {
    tx: Option<Sender<VehicleEvent>>,
    dropped: Arc<AtomicU64>,
}

impl EventSink {
    pub(crate) fn new(tx: Sender<VehicleEvent>) -> Self {
        Self {
            tx: Some(tx),
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    pub(crate) fn emit(&self, event: VehicleEvent) {
        if let Some(tx) = &self.tx {
            if tx.try_send(event).is_err() {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub(crate) fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Subscriber-side handle for vehicle telemetry.
pub struct EventReceiver {
    rx: Receiver<VehicleEvent>,
}

impl EventReceiver {
    /// Create a linked sink/receiver pair with the given capacity.
    pub(crate) fn channel(capacity: usize) -> (EventSink, Self) {
        let (tx, rx) = bounded(capacity.max(1));
        (EventSink::new(tx), Self { rx })
    }

    /// Drain all pending events.
    pub fn drain(&self) -> Vec<VehicleEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Try to receive a single event without blocking.
    pub fn try_recv(&self) -> Option<VehicleEvent> {
        self.rx.try_recv().ok()
    }

    /// Wait up to `timeout` for the next event.
    ///
    /// Returns `None` on timeout or once the vehicle has been dropped.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<VehicleEvent> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}
