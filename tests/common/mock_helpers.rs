//! Mock parts shared by the integration tests

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vehicle_rs::{PartError, SyncPart, ThreadedPart, Value};

/// Emits the index of the current tick: 0, 1, 2, ...
#[derive(Default)]
pub struct TickSource {
    next: u64,
}

impl SyncPart for TickSource {
    fn compute(&mut self, _inputs: &[Value]) -> Result<Vec<Value>, PartError> {
        let tick = self.next;
        self.next += 1;
        Ok(vec![Value::from(tick)])
    }
}

/// Multiplies its single numeric input.
pub struct Scale(pub f64);

impl SyncPart for Scale {
    fn compute(&mut self, inputs: &[Value]) -> Result<Vec<Value>, PartError> {
        let x = inputs[0].as_f64().unwrap_or(0.0);
        Ok(vec![Value::Number(x * self.0)])
    }
}

/// Records every input tuple it sees; publishes nothing.
#[derive(Clone, Default)]
pub struct Recorder {
    pub seen: Arc<Mutex<Vec<Vec<Value>>>>,
}

impl Recorder {
    pub fn values(&self) -> Vec<Vec<Value>> {
        self.seen.lock().unwrap().clone()
    }

    pub fn column(&self, index: usize) -> Vec<Value> {
        self.values().into_iter().map(|row| row[index].clone()).collect()
    }
}

impl SyncPart for Recorder {
    fn compute(&mut self, inputs: &[Value]) -> Result<Vec<Value>, PartError> {
        self.seen.lock().unwrap().push(inputs.to_vec());
        Ok(vec![])
    }
}

/// Counts `compute` and `shutdown` calls; fails on the configured call.
#[derive(Clone, Default)]
pub struct Counted {
    pub computes: Arc<AtomicU64>,
    pub shutdowns: Arc<AtomicU64>,
    pub fail_on_call: Option<u64>,
    pub outputs: usize,
}

impl Counted {
    pub fn failing_on(call: u64) -> Self {
        Self {
            fail_on_call: Some(call),
            ..Default::default()
        }
    }

    pub fn computes(&self) -> u64 {
        self.computes.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> u64 {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

impl SyncPart for Counted {
    fn compute(&mut self, _inputs: &[Value]) -> Result<Vec<Value>, PartError> {
        let call = self.computes.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_call == Some(call) {
            return Err(PartError::failed(format!("failed on call {}", call)));
        }
        Ok(vec![Value::Number(call as f64); self.outputs])
    }

    fn shutdown(&mut self) -> Result<(), PartError> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Threaded part incrementing a counter on every loop iteration.
#[derive(Clone, Default)]
pub struct CountingWorker {
    pub shutdowns: Arc<AtomicU64>,
    count: u64,
}

impl ThreadedPart for CountingWorker {
    fn update(&mut self, _inputs: &[Value]) -> Result<Vec<Value>, PartError> {
        self.count += 1;
        Ok(vec![Value::from(self.count)])
    }

    fn cadence(&self) -> Duration {
        Duration::from_millis(1)
    }

    fn shutdown(&mut self) -> Result<(), PartError> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Threaded part publishing matched pairs (a, b) with a == 2 * b.
#[derive(Default)]
pub struct PairWorker {
    b: u64,
}

impl ThreadedPart for PairWorker {
    fn update(&mut self, _inputs: &[Value]) -> Result<Vec<Value>, PartError> {
        self.b += 1;
        Ok(vec![Value::from(2 * self.b), Value::from(self.b)])
    }
}
