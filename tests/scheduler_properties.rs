//! Property and timing tests for the drive loop

mod common;

use common::builders::{fast_config, VehicleBuilder};
use common::mock_helpers::{Counted, Recorder, Scale, TickSource};
use proptest::prelude::*;
use serial_test::serial;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use vehicle_rs::{AnyPart, Binding, FnPart, PartError, Value, Vehicle};

/// Run a chain source → scale₁ → … → scaleₙ → recorder and return what the
/// recorder saw on every tick.
fn run_chain(factors: &[f64], ticks: u64) -> Vec<Vec<Value>> {
    let recorder = Recorder::default();
    let mut builder = VehicleBuilder::new()
        .part(AnyPart::sync(TickSource::default()), Binding::new().outputs(["k0"]));
    for (i, factor) in factors.iter().enumerate() {
        builder = builder.part(
            AnyPart::sync(Scale(*factor)),
            Binding::new()
                .inputs([format!("k{}", i)])
                .outputs([format!("k{}", i + 1)]),
        );
    }
    let all_keys: Vec<String> = (0..=factors.len()).map(|i| format!("k{}", i)).collect();
    let mut vehicle = builder
        .part(AnyPart::sync(recorder.clone()), Binding::new().inputs(all_keys))
        .build();

    vehicle.start(5000.0, Some(ticks)).unwrap();
    recorder.values()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_sync_pipelines_are_deterministic(
        factors in prop::collection::vec(-4.0f64..4.0, 0..5),
        ticks in 1u64..20,
    ) {
        let first = run_chain(&factors, ticks);
        let second = run_chain(&factors, ticks);
        prop_assert_eq!(first.len() as u64, ticks);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_closed_gate_never_overwrites(pattern in prop::collection::vec(any::<bool>(), 1..16)) {
        let ticks = pattern.len() as u64;
        let gates = pattern.clone();
        let mut tick = 0usize;
        let gate_source = FnPart::new(move |_: &[Value]| {
            let open = gates[tick];
            tick += 1;
            Ok(vec![Value::Bool(open)])
        });

        let before = Recorder::default();
        let after = Recorder::default();
        let mut vehicle = VehicleBuilder::new()
            .part(AnyPart::sync(gate_source), Binding::new().outputs(["gate"]))
            .part(AnyPart::sync(before.clone()), Binding::new().inputs(["z"]))
            .part(
                AnyPart::sync(TickSource::default()),
                Binding::new().outputs(["z"]).run_condition("gate"),
            )
            .part(AnyPart::sync(after.clone()), Binding::new().inputs(["z"]))
            .build();

        vehicle.start(5000.0, Some(ticks)).unwrap();

        let before = before.column(0);
        let after = after.column(0);
        let mut produced = 0u64;
        for (t, open) in pattern.iter().enumerate() {
            if *open {
                prop_assert_eq!(&after[t], &Value::from(produced));
                produced += 1;
            } else {
                prop_assert_eq!(&after[t], &before[t]);
            }
        }
    }

    #[test]
    fn prop_shutdown_runs_once_per_part(parts in 1usize..6, fail_at in prop::option::of(1u64..6)) {
        let counters: Vec<Counted> = (0..parts)
            .map(|i| if i == 0 { Counted { fail_on_call: fail_at, ..Default::default() } } else { Counted::default() })
            .collect();

        let mut builder = VehicleBuilder::new();
        for counter in &counters {
            builder = builder.part(AnyPart::sync(counter.clone()), Binding::new());
        }
        let mut vehicle = builder.build();
        let result = vehicle.start(5000.0, Some(5));
        prop_assert_eq!(result.is_err(), fail_at.is_some_and(|n| n <= 5));

        for counter in &counters {
            prop_assert_eq!(counter.shutdowns(), 1);
        }
    }
}

#[test]
#[serial]
fn test_period_never_below_target() {
    let stamps = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&stamps);
    let clock = FnPart::new(move |_: &[Value]| {
        sink.lock()
            .map_err(|_| PartError::failed("poisoned"))?
            .push(Instant::now());
        Ok(vec![])
    });

    let mut vehicle = Vehicle::new(fast_config());
    vehicle.add_sync(clock, Binding::new()).unwrap();
    let summary = vehicle.start(100.0, Some(40)).unwrap();

    let stamps = stamps.lock().unwrap();
    assert_eq!(stamps.len(), 40);
    // Consecutive computes are one period apart, give or take the tiny
    // difference in how far into each tick the part ran.
    let slack = Duration::from_micros(300);
    for pair in stamps.windows(2) {
        let gap = pair[1] - pair[0];
        assert!(gap + slack >= Duration::from_millis(10), "gap {gap:?}");
    }

    let hz = summary.stats.observed_hz;
    assert!(hz <= 100.5, "observed {hz} Hz");
    assert!(hz > 85.0, "observed {hz} Hz");
    assert_eq!(summary.stats.overruns, 0);
}

#[test]
#[serial]
fn test_overruns_are_reported_not_compensated() {
    let slow = FnPart::new(|_: &[Value]| {
        std::thread::sleep(Duration::from_millis(15));
        Ok(vec![])
    });
    let mut vehicle = Vehicle::new(fast_config());
    vehicle.add_sync(slow, Binding::new()).unwrap();

    let started = Instant::now();
    let summary = vehicle.start(100.0, Some(5)).unwrap();

    assert_eq!(summary.stats.overruns, 5);
    assert!(summary.stats.tick_time.min_us >= 15_000);
    // No catch-up: five 15ms ticks take at least 75ms.
    assert!(started.elapsed() >= Duration::from_millis(75));
}
