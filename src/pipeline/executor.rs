//! The vehicle: a tick-driven scheduler over an ordered list of parts.
//!
//! # Lifecycle
//!
//! `Idle → Running → Stopping → Stopped`. Parts are registered while `Idle`.
//! [`Vehicle::start`] compiles the bindings into a store and a plan, spawns
//! one worker per threaded part and runs ticks on the calling thread until
//! the tick bound is reached, a stop is requested, or a part fails. It
//! returns only once every shutdown hook has been attempted and every worker
//! has been joined or abandoned.
//!
//! # One tick
//!
//! Bindings run in registration order. A gated binding is skipped when its
//! run condition reads `false` or `absent`, leaving its outputs untouched.
//! Otherwise its inputs are read from the store and either passed to
//! `compute`, or handed to the threaded adapter whose freshest tuple is then
//! published. A failing `compute` aborts the tick and stops the vehicle.
//!
//! # Pacing
//!
//! After a tick the loop waits out the rest of the period: a blocking wait
//! on the stop channel for the bulk of it, then a short spin for accuracy.
//! Overruns are counted and reported but never compensated.

use super::binding::{short_type_name, Binding, BindingLabel, ExecutionMode, PartBinding};
use super::bridge::{EventReceiver, EventSink, StopHandle, VehicleEvent};
use super::compiled_plan::PlanStep;
use super::compiler::PipelineCompiler;
use super::error::{PipelineError, PipelineResult};
use super::id::PartId;
use super::part::{AnyPart, PartError, SyncPart, ThreadedPart};
use super::profiler::PartProfiler;
use super::store::SharedStore;
use super::threaded::{lock, JoinOutcome, ThreadedAdapter};
use super::value::Value;
use crate::config::VehicleConfig;
use crate::error::{Result, VehicleError};
use crate::types::{LoopStats, RunSummary, SchedulerState};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use std::collections::{BTreeMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Below this much remaining period the loop spins instead of blocking.
const SPIN_THRESHOLD: Duration = Duration::from_millis(1);

/// How a part is driven during the run.
enum Runner {
    /// `None` once the shutdown hook has taken the part.
    Sync(Option<Box<dyn SyncPart>>),
    Threaded(ThreadedAdapter),
}

/// A binding with its resolved slots and its runner.
struct Stage {
    binding: PartBinding,
    step: PlanStep,
    runner: Runner,
    /// Generation of the last threaded tuple published to the store.
    seen_generation: u64,
}

enum HookOutcome {
    Completed,
    Failed(PartError),
    TimedOut,
}

/// Tick-driven scheduler for a set of parts.
pub struct Vehicle {
    config: VehicleConfig,
    state: SchedulerState,
    bindings: Vec<PartBinding>,
    parts: Vec<AnyPart>,
    seeds: BTreeMap<String, Value>,
    store: Option<Arc<SharedStore>>,
    ticks: u64,
    stop: StopHandle,
    wake_rx: Receiver<()>,
    events: EventSink,
    last_summary: Option<RunSummary>,
    /// First rejected registration; the vehicle refuses to start while set.
    config_error: Option<PipelineError>,
}

impl Vehicle {
    pub fn new(config: VehicleConfig) -> Self {
        let (stop, wake_rx) = StopHandle::new();
        Self {
            config,
            state: SchedulerState::Idle,
            bindings: Vec::new(),
            parts: Vec::new(),
            seeds: BTreeMap::new(),
            store: None,
            ticks: 0,
            stop,
            wake_rx,
            events: EventSink::default(),
            last_summary: None,
            config_error: None,
        }
    }

    pub fn config(&self) -> &VehicleConfig {
        &self.config
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Completed ticks.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// The store of the current or last run. `None` before `start`.
    pub fn store(&self) -> Option<Arc<SharedStore>> {
        self.store.clone()
    }

    /// Summary of the last run, also available when `start` returned an error.
    pub fn last_summary(&self) -> Option<&RunSummary> {
        self.last_summary.as_ref()
    }

    pub fn bindings(&self) -> &[PartBinding] {
        &self.bindings
    }

    /// Handle for stopping the vehicle from another thread.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Request a stop. Idempotent; observed at the next tick boundary.
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Receive telemetry for the coming run. A later call replaces the
    /// earlier subscriber.
    pub fn subscribe(&mut self) -> EventReceiver {
        let (sink, receiver) = EventReceiver::channel(self.config.event_buffer_size);
        self.events = sink;
        receiver
    }

    /// Register a part. Order of registration is execution order.
    ///
    /// The part's variant decides its execution mode. Validation happens
    /// here: declared arity, duplicate outputs and malformed keys are
    /// rejected; inputs nothing has produced yet only warn.
    pub fn register(&mut self, part: AnyPart, binding: Binding) -> PipelineResult<PartId> {
        let default_name = match part.mode() {
            ExecutionMode::Synchronous => "SyncPart",
            ExecutionMode::Threaded => "ThreadedPart",
        };
        self.register_named(part, binding, default_name)
    }

    /// Register a synchronous part, named after its type unless the binding names it.
    pub fn add_sync<P: SyncPart + 'static>(
        &mut self,
        part: P,
        binding: Binding,
    ) -> PipelineResult<PartId> {
        self.register_named(AnyPart::sync(part), binding, short_type_name::<P>())
    }

    /// Register a threaded part, named after its type unless the binding names it.
    pub fn add_threaded<P: ThreadedPart + 'static>(
        &mut self,
        part: P,
        binding: Binding,
    ) -> PipelineResult<PartId> {
        self.register_named(AnyPart::threaded(part), binding, short_type_name::<P>())
    }

    fn register_named(
        &mut self,
        part: AnyPart,
        binding: Binding,
        default_name: &str,
    ) -> PipelineResult<PartId> {
        self.require_idle("register")?;

        let id = PartId(self.bindings.len() as u32);
        let binding = binding.into_part_binding(id, default_name, part.mode());
        let seeded: HashSet<String> = self.seeds.keys().cloned().collect();

        let forward_refs =
            match PipelineCompiler::validate(&self.bindings, &binding, part.arity(), &seeded) {
                Ok(refs) => refs,
                Err(e) => {
                    tracing::error!("Rejected {}: {}", binding.label, e);
                    self.config_error.get_or_insert_with(|| e.clone());
                    return Err(e);
                }
            };
        for key in &forward_refs {
            tracing::warn!(
                "{} reads '{}' before any part produces it; it will see the previous tick's value",
                binding.label,
                key
            );
        }

        tracing::debug!(
            "Registered {} ({:?}): {:?} -> {:?}{}",
            binding.label,
            binding.mode,
            binding.inputs,
            binding.outputs,
            binding
                .run_condition
                .as_ref()
                .map(|k| format!(" when '{}'", k))
                .unwrap_or_default()
        );

        self.bindings.push(binding);
        self.parts.push(part);
        Ok(id)
    }

    /// Give a key an initial value, visible from tick 0.
    pub fn seed(&mut self, key: impl Into<String>, value: impl Into<Value>) -> PipelineResult<()> {
        self.require_idle("seed")?;
        let key = key.into();
        if key.is_empty() {
            return Err(PipelineError::UnknownKey(key));
        }
        self.seeds.insert(key, value.into());
        Ok(())
    }

    fn require_idle(&self, action: &'static str) -> PipelineResult<()> {
        if self.state == SchedulerState::Idle {
            Ok(())
        } else {
            Err(PipelineError::InvalidState {
                action,
                state: self.state.as_str(),
            })
        }
    }

    /// Run with the rate and tick bound from the configuration.
    pub fn run(&mut self) -> Result<RunSummary> {
        self.start(self.config.drive_loop_hz, self.config.max_loops)
    }

    /// Run ticks at `target_hz` until stopped, blocking the calling thread.
    ///
    /// Stops after `max_ticks` ticks when given. Returns the run summary, or
    /// the failure that stopped the run after shutdown has completed. A vehicle
    /// with a rejected registration does not start; it stays `Idle` and the
    /// first registration error is returned.
    pub fn start(&mut self, target_hz: f64, max_ticks: Option<u64>) -> Result<RunSummary> {
        self.require_idle("start")?;
        if let Some(e) = &self.config_error {
            return Err(e.clone().into());
        }
        if !target_hz.is_finite() || target_hz <= 0.0 {
            return Err(PipelineError::InvalidRate(target_hz).into());
        }

        let (store, plan) =
            PipelineCompiler::compile(&self.bindings, self.seeds.keys().map(String::as_str));
        for (key, value) in &self.seeds {
            store.set(&[key], vec![value.clone()])?;
        }
        let store = Arc::new(store);
        self.store = Some(Arc::clone(&store));
        tracing::debug!("Compiled plan: {:?}", plan.stats);

        let mut stages: Vec<Stage> = std::mem::take(&mut self.parts)
            .into_iter()
            .zip(self.bindings.iter().cloned())
            .zip(plan.steps)
            .map(|((part, binding), step)| {
                let runner = match part {
                    AnyPart::Sync(part) => Runner::Sync(Some(part)),
                    AnyPart::Threaded(part) => Runner::Threaded(ThreadedAdapter::new(
                        binding.label.clone(),
                        part,
                        binding.inputs.len(),
                        binding.outputs.len(),
                    )),
                };
                Stage {
                    binding,
                    step,
                    runner,
                    seen_generation: 0,
                }
            })
            .collect();

        self.state = SchedulerState::Running;
        let run_started = Instant::now();
        tracing::info!(
            "Vehicle running {} parts at {} Hz{}",
            stages.len(),
            target_hz,
            max_ticks
                .map(|n| format!(" for {} ticks", n))
                .unwrap_or_default()
        );
        self.events.emit(VehicleEvent::Started {
            target_hz,
            parts: stages.len(),
        });

        let mut stats = LoopStats::new(target_hz);
        let mut profiler = self
            .config
            .profile
            .then(|| PartProfiler::new(self.bindings.iter().map(|b| &b.label)));

        let mut failure: Option<VehicleError> = None;
        for stage in &mut stages {
            if let Runner::Threaded(adapter) = &mut stage.runner {
                if let Err(e) = adapter.start(self.events.clone()) {
                    tracing::error!("Failed to start worker for {}: {}", stage.binding.label, e);
                    failure = Some(VehicleError::Io(e).with_context(format!(
                        "starting worker for {}",
                        stage.binding.label
                    )));
                    break;
                }
            }
        }

        if failure.is_none() {
            if let Err(e) = self.drive(
                &mut stages,
                &store,
                profiler.as_mut(),
                &mut stats,
                target_hz,
                max_ticks,
            ) {
                tracing::error!("Stopping after failure: {}", e);
                failure = Some(e.into());
            }
        }

        self.state = SchedulerState::Stopping;
        tracing::info!("Vehicle stopping after {} ticks", self.ticks);
        let (failed_hooks, abandoned_workers) = self.shut_down(&mut stages);

        stats.worker_failures = worker_failures(&stages);
        stats.dropped_events = self.events.dropped();

        let profile = profiler.map(|p| p.report());
        if let Some(report) = &profile {
            report.log();
            if let Some(path) = &self.config.profile_output {
                if let Err(e) = report.save(path) {
                    tracing::warn!("Failed to write profile to {}: {}", path.display(), e);
                }
            }
        }

        self.state = SchedulerState::Stopped;
        let summary = RunSummary {
            state: self.state,
            elapsed: run_started.elapsed(),
            stats,
            profile,
            failed_hooks,
            abandoned_workers,
        };
        tracing::info!(
            "Vehicle stopped: {} ticks in {:.2?} ({:.1} Hz observed, {} overruns)",
            summary.stats.ticks,
            summary.elapsed,
            summary.stats.observed_hz,
            summary.stats.overruns
        );
        self.events.emit(VehicleEvent::Stopped(summary.clone()));
        self.last_summary = Some(summary.clone());

        match failure {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }

    /// The tick loop. Returns on stop, tick bound, or the first fatal error.
    fn drive(
        &mut self,
        stages: &mut [Stage],
        store: &SharedStore,
        mut profiler: Option<&mut PartProfiler>,
        stats: &mut LoopStats,
        target_hz: f64,
        max_ticks: Option<u64>,
    ) -> PipelineResult<()> {
        let period = Duration::from_secs_f64(1.0 / target_hz);
        let smoothing = self.config.rate_smoothing;
        let stats_interval = self.config.stats_interval();
        let overrun_log_interval = self.config.overrun_log_interval();

        let mut last_tick_start: Option<Instant> = None;
        let mut last_stats = Instant::now();
        let mut last_overrun_warn: Option<Instant> = None;
        let mut suppressed_overruns = 0u64;

        loop {
            if self.stop.is_stop_requested() {
                tracing::debug!("Stop observed at tick {}", self.ticks);
                return Ok(());
            }
            if max_ticks.is_some_and(|max| self.ticks >= max) {
                return Ok(());
            }

            let tick_start = Instant::now();
            if let Some(previous) = last_tick_start {
                stats.observe_period(tick_start - previous, smoothing);
            }
            last_tick_start = Some(tick_start);

            let tick = self.ticks;
            run_tick(stages, store, profiler.as_deref_mut(), tick)?;

            let elapsed = tick_start.elapsed();
            self.ticks += 1;
            stats.ticks = self.ticks;
            stats.tick_time.push(elapsed);

            if elapsed > period {
                stats.overruns += 1;
                self.events.emit(VehicleEvent::Overrun {
                    tick,
                    elapsed,
                    budget: period,
                });
                let now = Instant::now();
                if last_overrun_warn.map_or(true, |t| now - t >= overrun_log_interval) {
                    tracing::warn!(
                        "Tick {} took {:.2?}, over its {:.2?} period ({} more overruns since last warning)",
                        tick,
                        elapsed,
                        period,
                        suppressed_overruns
                    );
                    last_overrun_warn = Some(now);
                    suppressed_overruns = 0;
                } else {
                    suppressed_overruns += 1;
                    tracing::debug!("Tick {} overran: {:.2?}", tick, elapsed);
                }
            }

            if last_stats.elapsed() >= stats_interval {
                stats.worker_failures = worker_failures(stages);
                stats.dropped_events = self.events.dropped();
                tracing::debug!(
                    "Loop: {} ticks, {:.1} Hz, avg tick {:.0}us, {} overruns",
                    stats.ticks,
                    stats.observed_hz,
                    stats.tick_time.avg_us(),
                    stats.overruns
                );
                self.events.emit(VehicleEvent::Stats(stats.clone()));
                last_stats = Instant::now();
            }

            let finished = max_ticks.is_some_and(|max| self.ticks >= max);
            if !finished && elapsed < period {
                self.pace(tick_start + period);
            }
        }
    }

    /// Wait until `deadline` or until a stop is requested.
    fn pace(&self, deadline: Instant) {
        let now = Instant::now();
        if deadline <= now {
            return;
        }
        let remaining = deadline - now;
        if remaining > SPIN_THRESHOLD {
            match self.wake_rx.recv_timeout(remaining - SPIN_THRESHOLD) {
                Ok(()) => return,
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {}
            }
        }
        while Instant::now() < deadline {
            if self.stop.is_stop_requested() {
                return;
            }
            std::hint::spin_loop();
        }
    }

    /// Run every shutdown hook in reverse registration order, then join the
    /// workers. Returns (failed hooks, abandoned workers).
    fn shut_down(&self, stages: &mut [Stage]) -> (u64, u64) {
        let budget = self.config.shutdown_budget();
        let mut failed_hooks = 0;

        for stage in stages.iter_mut().rev() {
            let label = stage.binding.label.clone();
            let outcome = match &mut stage.runner {
                Runner::Sync(part) => match part.take() {
                    Some(mut part) => run_hook(&label, budget, move || part.shutdown()),
                    None => continue,
                },
                Runner::Threaded(adapter) => {
                    adapter.request_cancel();
                    let part = adapter.part_handle();
                    run_hook(&label, budget, move || lock(&part).shutdown())
                }
            };

            let message = match outcome {
                HookOutcome::Completed => {
                    tracing::info!("Shut down {}", label);
                    continue;
                }
                HookOutcome::Failed(e) => {
                    tracing::warn!("Shutdown of {} failed: {}", label, e);
                    e.to_string()
                }
                HookOutcome::TimedOut => {
                    tracing::warn!(
                        "Shutdown of {} exceeded its {:?} budget; moving on",
                        label,
                        budget
                    );
                    format!("exceeded shutdown budget of {:?}", budget)
                }
            };
            failed_hooks += 1;
            self.events.emit(VehicleEvent::ShutdownHookFailure {
                binding: label,
                message,
            });
        }

        let grace = self.config.worker_grace();
        let mut abandoned = 0;
        for stage in stages.iter_mut() {
            if let Runner::Threaded(adapter) = &mut stage.runner {
                if adapter.join(grace) == JoinOutcome::Abandoned {
                    abandoned += 1;
                }
            }
        }

        (failed_hooks, abandoned)
    }
}

impl Default for Vehicle {
    fn default() -> Self {
        Self::new(VehicleConfig::default())
    }
}

/// Execute every binding once, in order.
fn run_tick(
    stages: &mut [Stage],
    store: &SharedStore,
    mut profiler: Option<&mut PartProfiler>,
    tick: u64,
) -> PipelineResult<()> {
    for (index, stage) in stages.iter_mut().enumerate() {
        if let Some(gate) = stage.step.gate {
            let condition = store.get_slots(&[Some(gate)]).pop().unwrap_or_default();
            match condition.gate() {
                Some(true) => {}
                Some(false) => {
                    if let Some(p) = profiler.as_deref_mut() {
                        p.record_skip(index);
                    }
                    continue;
                }
                None => {
                    return Err(PipelineError::RunConditionType {
                        binding: stage.binding.label.clone(),
                        key: stage.binding.run_condition.clone().unwrap_or_default(),
                        found: condition.kind(),
                    })
                }
            }
        }

        let started = Instant::now();
        let outputs = match &mut stage.runner {
            Runner::Sync(Some(part)) => {
                let inputs = store.get_slots(&stage.step.inputs);
                match catch_unwind(AssertUnwindSafe(|| part.compute(&inputs))) {
                    Ok(Ok(values)) => Some(values),
                    Ok(Err(e)) => return Err(compute_failure(&stage.binding.label, tick, e)),
                    Err(payload) => {
                        let e = PartError::from_panic(payload);
                        return Err(compute_failure(&stage.binding.label, tick, e));
                    }
                }
            }
            Runner::Sync(None) => None,
            Runner::Threaded(adapter) => {
                if !stage.step.inputs.is_empty() {
                    adapter.set_inputs(store.get_slots(&stage.step.inputs));
                }
                adapter
                    .latest_since(stage.seen_generation)
                    .map(|(values, generation)| {
                        stage.seen_generation = generation;
                        values
                    })
            }
        };

        if let Some(values) = outputs {
            if values.len() != stage.step.outputs.len() {
                return Err(PipelineError::ArityMismatch {
                    binding: stage.binding.label.clone(),
                    expected: stage.step.outputs.len(),
                    found: values.len(),
                });
            }
            store
                .set_slots(&stage.step.outputs, values)
                .map_err(|e| e.published_by(&stage.binding.label))?;
        }

        if let Some(p) = profiler.as_deref_mut() {
            p.record(index, started.elapsed());
        }
    }
    Ok(())
}

fn compute_failure(label: &BindingLabel, tick: u64, e: PartError) -> PipelineError {
    PipelineError::Compute {
        binding: label.clone(),
        tick,
        message: e.to_string(),
    }
}

fn worker_failures(stages: &[Stage]) -> u64 {
    stages
        .iter()
        .map(|stage| match &stage.runner {
            Runner::Threaded(adapter) => adapter.failure_count(),
            Runner::Sync(_) => 0,
        })
        .sum()
}

/// Run a shutdown hook on a helper thread, waiting at most `budget`.
///
/// A hook that overruns keeps its thread; the vehicle does not wait for it.
fn run_hook<F>(label: &BindingLabel, budget: Duration, hook: F) -> HookOutcome
where
    F: FnOnce() -> std::result::Result<(), PartError> + Send + 'static,
{
    let (tx, rx) = bounded(1);
    let spawned = std::thread::Builder::new()
        .name(format!("shutdown-{}", label.name))
        .spawn(move || {
            let result = catch_unwind(AssertUnwindSafe(hook))
                .unwrap_or_else(|payload| Err(PartError::from_panic(payload)));
            let _ = tx.send(result);
        });
    if let Err(e) = spawned {
        return HookOutcome::Failed(PartError::Failed(format!(
            "could not spawn shutdown thread: {}",
            e
        )));
    }

    match rx.recv_timeout(budget) {
        Ok(Ok(())) => HookOutcome::Completed,
        Ok(Err(e)) => HookOutcome::Failed(e),
        Err(RecvTimeoutError::Timeout) => HookOutcome::TimedOut,
        Err(RecvTimeoutError::Disconnected) => {
            HookOutcome::Failed(PartError::Failed("shutdown thread vanished".to_string()))
        }
    }
}
