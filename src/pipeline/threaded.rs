//! Threaded part adapter.
//!
//! Owns the background worker of one [`ThreadedPart`]. The worker runs the
//! part's `update` in a loop and swaps each complete output tuple into a
//! single-slot holder; the tick thread copies that slot without waiting on
//! the part itself.
//!
//! # Lifecycle
//!
//! - `start` spawns exactly one worker thread.
//! - `request_cancel` flips the cancel flag and drops the cancel sender,
//!   which also wakes a worker sleeping out its cadence.
//! - `join` waits up to a grace period for the worker to exit and abandons
//!   it otherwise. An abandoned worker is a leaked thread, not an error.
//!
//! # Failures
//!
//! An `Err` from `update` is logged and the loop carries on with the last
//! published output still cached. A panic ends the worker; the cached output
//! stays at its last value. Neither reaches the tick loop.

use crate::pipeline::binding::BindingLabel;
use crate::pipeline::bridge::{EventSink, VehicleEvent};
use crate::pipeline::part::{PartError, ThreadedPart};
use crate::pipeline::value::Value;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

pub(crate) type SharedPart = Arc<Mutex<Box<dyn ThreadedPart>>>;

pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The single-slot holder for the latest complete output tuple.
#[derive(Debug)]
struct Published {
    values: Vec<Value>,
    generation: u64,
}

/// How a worker ended up after `join`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    NotStarted,
    Joined,
    Abandoned,
}

struct WorkerHandle {
    join: JoinHandle<()>,
    /// Disconnects when the worker exits, including by unwinding.
    done_rx: Receiver<()>,
}

/// Wraps one threaded part and its worker.
pub struct ThreadedAdapter {
    label: BindingLabel,
    part: SharedPart,
    output_arity: usize,
    inputs: Arc<Mutex<Arc<[Value]>>>,
    output: Arc<Mutex<Published>>,
    cancelled: Arc<AtomicBool>,
    cancel_tx: Option<Sender<()>>,
    failures: Arc<AtomicU64>,
    worker: Option<WorkerHandle>,
}

impl ThreadedAdapter {
    pub fn new(
        label: BindingLabel,
        part: Box<dyn ThreadedPart>,
        input_arity: usize,
        output_arity: usize,
    ) -> Self {
        let inputs: Arc<[Value]> = vec![Value::Absent; input_arity].into();
        Self {
            label,
            part: Arc::new(Mutex::new(part)),
            output_arity,
            inputs: Arc::new(Mutex::new(inputs)),
            output: Arc::new(Mutex::new(Published {
                values: vec![Value::Absent; output_arity],
                generation: 0,
            })),
            cancelled: Arc::new(AtomicBool::new(false)),
            cancel_tx: None,
            failures: Arc::new(AtomicU64::new(0)),
            worker: None,
        }
    }

    /// Spawn the worker thread.
    pub(crate) fn start(&mut self, events: EventSink) -> std::io::Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }

        let (cancel_tx, cancel_rx) = bounded::<()>(1);
        let (done_tx, done_rx) = bounded::<()>(1);
        self.cancel_tx = Some(cancel_tx);

        let worker = Worker {
            label: self.label.clone(),
            part: Arc::clone(&self.part),
            output_arity: self.output_arity,
            inputs: Arc::clone(&self.inputs),
            output: Arc::clone(&self.output),
            cancelled: Arc::clone(&self.cancelled),
            cancel_rx,
            failures: Arc::clone(&self.failures),
            events,
            _done_tx: done_tx,
        };

        let join = std::thread::Builder::new()
            .name(format!("part-{}", self.label.name))
            .spawn(move || worker.run())?;

        self.worker = Some(WorkerHandle { join, done_rx });
        Ok(())
    }

    /// Hand the latest gathered inputs to the worker. Never waits on the part.
    pub fn set_inputs(&self, inputs: Vec<Value>) {
        *lock(&self.inputs) = inputs.into();
    }

    /// Latest complete output tuple (all `Absent` before the first publish).
    #[cfg(test)]
    fn latest(&self) -> Vec<Value> {
        lock(&self.output).values.clone()
    }

    /// The latest tuple and its generation, if newer than `seen`.
    pub fn latest_since(&self, seen: u64) -> Option<(Vec<Value>, u64)> {
        let published = lock(&self.output);
        (published.generation > seen).then(|| (published.values.clone(), published.generation))
    }

    /// Number of tuples published so far.
    #[cfg(test)]
    fn generation(&self) -> u64 {
        lock(&self.output).generation
    }

    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    fn is_started(&self) -> bool {
        self.worker.is_some()
    }

    pub(crate) fn part_handle(&self) -> SharedPart {
        Arc::clone(&self.part)
    }

    /// Signal cooperative cancellation. Idempotent.
    pub fn request_cancel(&mut self) {
        self.cancelled.store(true, Ordering::Release);
        self.cancel_tx.take();
    }

    /// Cancel and wait up to `grace` for the worker to exit.
    pub fn join(&mut self, grace: Duration) -> JoinOutcome {
        self.request_cancel();
        let Some(worker) = self.worker.take() else {
            return JoinOutcome::NotStarted;
        };

        match worker.done_rx.recv_timeout(grace) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if worker.join.join().is_err() {
                    tracing::error!("Worker for {} unwound outside its update", self.label);
                }
                tracing::debug!("Worker for {} joined", self.label);
                JoinOutcome::Joined
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    "Worker for {} did not exit within {:?}; abandoning it",
                    self.label,
                    grace
                );
                JoinOutcome::Abandoned
            }
        }
    }
}

impl Drop for ThreadedAdapter {
    fn drop(&mut self) {
        self.request_cancel();
    }
}

/// Everything the worker thread owns.
struct Worker {
    label: BindingLabel,
    part: SharedPart,
    output_arity: usize,
    inputs: Arc<Mutex<Arc<[Value]>>>,
    output: Arc<Mutex<Published>>,
    cancelled: Arc<AtomicBool>,
    cancel_rx: Receiver<()>,
    failures: Arc<AtomicU64>,
    events: EventSink,
    _done_tx: Sender<()>,
}

impl Worker {
    fn run(self) {
        let cadence = lock(&self.part).cadence();
        tracing::debug!("Worker for {} started (cadence {:?})", self.label, cadence);

        while !self.is_cancelled() {
            let inputs = Arc::clone(&*lock(&self.inputs));

            let result = {
                let mut part = lock(&self.part);
                // A shutdown hook may have held the lock while we waited for it.
                if self.is_cancelled() {
                    break;
                }
                catch_unwind(AssertUnwindSafe(|| part.update(&inputs)))
            };

            match result {
                Ok(Ok(values)) => self.publish(values),
                Ok(Err(e)) => self.fail(&e),
                Err(payload) => {
                    let e = PartError::from_panic(payload);
                    tracing::error!("Worker for {} panicked, stopping it: {}", self.label, e);
                    self.record_failure(&e);
                    break;
                }
            }

            if self.wait(cadence) {
                break;
            }
        }

        tracing::debug!("Worker for {} exiting", self.label);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Wait out the cadence. Returns true when cancelled.
    fn wait(&self, cadence: Duration) -> bool {
        if cadence.is_zero() {
            return match self.cancel_rx.try_recv() {
                Err(TryRecvError::Empty) => {
                    std::thread::yield_now();
                    false
                }
                Ok(()) | Err(TryRecvError::Disconnected) => true,
            };
        }
        match self.cancel_rx.recv_timeout(cadence) {
            Err(RecvTimeoutError::Timeout) => false,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
        }
    }

    fn publish(&self, values: Vec<Value>) {
        if values.len() != self.output_arity {
            self.fail(&PartError::Failed(format!(
                "published {} values for {} output keys",
                values.len(),
                self.output_arity
            )));
            return;
        }
        let mut slot = lock(&self.output);
        slot.values = values;
        slot.generation += 1;
    }

    fn fail(&self, e: &PartError) {
        tracing::warn!("Worker for {} failed, keeping last output: {}", self.label, e);
        self.record_failure(e);
    }

    fn record_failure(&self, e: &PartError) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.events.emit(VehicleEvent::WorkerFailure {
            binding: self.label.clone(),
            message: e.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::id::PartId;
    use std::time::Instant;

    struct Counter {
        n: u64,
    }

    impl ThreadedPart for Counter {
        fn update(&mut self, _inputs: &[Value]) -> Result<Vec<Value>, PartError> {
            self.n += 1;
            Ok(vec![Value::from(self.n)])
        }

        fn cadence(&self) -> Duration {
            Duration::from_millis(1)
        }
    }

    struct Flaky {
        calls: u64,
    }

    impl ThreadedPart for Flaky {
        fn update(&mut self, _inputs: &[Value]) -> Result<Vec<Value>, PartError> {
            self.calls += 1;
            match self.calls {
                1 => Ok(vec![Value::Number(1.0)]),
                2 => Err(PartError::Hardware("serial timeout".to_string())),
                _ => panic!("encoder gone"),
            }
        }

        fn cadence(&self) -> Duration {
            Duration::from_millis(1)
        }
    }

    struct Echo;

    impl ThreadedPart for Echo {
        fn update(&mut self, inputs: &[Value]) -> Result<Vec<Value>, PartError> {
            Ok(inputs.to_vec())
        }

        fn cadence(&self) -> Duration {
            Duration::from_millis(1)
        }
    }

    struct Stubborn;

    impl ThreadedPart for Stubborn {
        fn update(&mut self, _inputs: &[Value]) -> Result<Vec<Value>, PartError> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(vec![])
        }
    }

    fn adapter(part: impl ThreadedPart + 'static, inputs: usize, outputs: usize) -> ThreadedAdapter {
        ThreadedAdapter::new(
            BindingLabel::new(PartId(0), "test"),
            Box::new(part),
            inputs,
            outputs,
        )
    }

    fn wait_for(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_absent_before_first_publish() {
        let adapter = adapter(Counter { n: 0 }, 0, 1);
        assert_eq!(adapter.latest(), vec![Value::Absent]);
        assert_eq!(adapter.generation(), 0);
        assert!(!adapter.is_started());
    }

    #[test]
    fn test_worker_publishes_and_joins() {
        let mut adapter = adapter(Counter { n: 0 }, 0, 1);
        adapter.start(EventSink::default()).unwrap();
        wait_for(|| adapter.generation() >= 3);

        let value = adapter.latest()[0].as_f64().unwrap();
        assert!(value >= 3.0);
        assert_eq!(adapter.join(Duration::from_secs(1)), JoinOutcome::Joined);
        assert_eq!(adapter.join(Duration::from_secs(1)), JoinOutcome::NotStarted);
    }

    #[test]
    fn test_worker_receives_inputs() {
        let mut adapter = adapter(Echo, 1, 1);
        adapter.set_inputs(vec![Value::from("frame-7")]);
        adapter.start(EventSink::default()).unwrap();
        wait_for(|| adapter.latest()[0] == Value::from("frame-7"));
        adapter.join(Duration::from_secs(1));
    }

    #[test]
    fn test_failures_keep_last_output() {
        let (sink, events) = crate::pipeline::bridge::EventReceiver::channel(16);
        let mut adapter = adapter(Flaky { calls: 0 }, 0, 1);
        adapter.start(sink).unwrap();

        wait_for(|| adapter.failure_count() >= 2);
        assert_eq!(adapter.latest(), vec![Value::Number(1.0)]);
        assert_eq!(adapter.join(Duration::from_secs(1)), JoinOutcome::Joined);

        let failures = events
            .drain()
            .into_iter()
            .filter(|e| matches!(e, VehicleEvent::WorkerFailure { .. }))
            .count();
        assert_eq!(failures, 2);
    }

    #[test]
    fn test_wrong_tuple_length_is_rejected() {
        let mut adapter = adapter(Counter { n: 0 }, 0, 2);
        adapter.start(EventSink::default()).unwrap();
        wait_for(|| adapter.failure_count() >= 1);
        assert_eq!(adapter.latest(), vec![Value::Absent, Value::Absent]);
        adapter.join(Duration::from_secs(1));
    }

    #[test]
    fn test_slow_worker_is_abandoned() {
        let mut adapter = adapter(Stubborn, 0, 0);
        adapter.start(EventSink::default()).unwrap();
        std::thread::sleep(Duration::from_millis(20));

        let started = Instant::now();
        assert_eq!(adapter.join(Duration::from_millis(20)), JoinOutcome::Abandoned);
        assert!(started.elapsed() < Duration::from_millis(250));
    }
}
