//! vehicle-rs - Demo Drive Loop
//!
//! Wires a simulated vehicle: a threaded mock camera, a mode switch, a gated
//! pilot, a drive-mode mixer and a recorder counter. Pass a TOML config path
//! as the first argument; press Enter to stop.

use anyhow::Context;
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};
use vehicle_rs::{
    pipeline::parts::{ConditionPart, FnPart, PollingPart},
    Binding, LogConfig, Value, Vehicle, VehicleConfig, VehicleEvent,
};

const FRAME_SIZE: usize = 160 * 120;

fn init_logging(log: &LogConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.filter))
    };

    let console = tracing_subscriber::fmt::layer().with_filter(filter());

    match &log.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "vehicle.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(filter());
            tracing_subscriber::registry()
                .with(console)
                .with(file)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry().with(console).init();
            Ok(None)
        }
    }
}

/// Mode sequence a user might drive through: manual, then autopilot with
/// recording, then back to manual.
fn mode_for(tick: u64) -> (&'static str, bool) {
    match (tick / 100) % 3 {
        0 => ("user", true),
        1 => ("local", true),
        _ => ("user", false),
    }
}

fn build_vehicle(config: VehicleConfig) -> anyhow::Result<Vehicle> {
    let mut vehicle = Vehicle::new(config);
    vehicle.seed("recording", false)?;

    // Camera: synthetic frames whose brightness drifts left to right.
    let mut frame_id = 0u64;
    let camera = PollingPart::at_hz(30.0, move |_: &[Value]| {
        frame_id += 1;
        let shade = (frame_id % 256) as u8;
        Ok(vec![
            Value::from(vec![shade; FRAME_SIZE]),
            Value::from(frame_id),
        ])
    })
    .with_arity(0, 2)
    .on_shutdown(|| {
        tracing::info!("Camera released");
        Ok(())
    });
    vehicle.add_threaded(
        camera,
        Binding::new()
            .named("camera")
            .outputs(["cam/image_array", "cam/frame_id"]),
    )?;

    // Controller: stands in for a joystick or web UI.
    let mut tick = 0u64;
    let controller = FnPart::new(move |_: &[Value]| {
        let (mode, recording) = mode_for(tick);
        let angle = ((tick as f64) / 20.0).sin() * 0.5;
        tick += 1;
        Ok(vec![
            Value::from(mode),
            Value::from(angle),
            Value::from(0.3),
            Value::from(recording),
        ])
    })
    .with_arity(0, 4);
    vehicle.add_sync(
        controller,
        Binding::new().named("controller").outputs([
            "user/mode",
            "user/angle",
            "user/throttle",
            "recording",
        ]),
    )?;

    vehicle.add_sync(
        ConditionPart::not_equal("user"),
        Binding::new()
            .named("pilot_condition")
            .inputs(["user/mode"])
            .outputs(["run_pilot"]),
    )?;

    // Pilot: steer toward the frame's mean brightness.
    let pilot = FnPart::new(|inputs: &[Value]| {
        let Some(frame) = inputs[0].as_bytes() else {
            return Ok(vec![Value::from(0.0), Value::from(0.0)]);
        };
        let mean = frame.iter().map(|&b| b as f64).sum::<f64>() / frame.len().max(1) as f64;
        let angle = (mean / 127.5) - 1.0;
        Ok(vec![Value::from(angle), Value::from(0.25)])
    })
    .with_arity(1, 2);
    vehicle.add_sync(
        pilot,
        Binding::new()
            .named("pilot")
            .inputs(["cam/image_array"])
            .outputs(["pilot/angle", "pilot/throttle"])
            .run_condition("run_pilot"),
    )?;

    // Drive mode: user controls in "user", pilot angle in "local_angle",
    // pilot everything in "local".
    let mixer = FnPart::new(|inputs: &[Value]| {
        let user = (inputs[1].as_f64().unwrap_or(0.0), inputs[2].as_f64().unwrap_or(0.0));
        let pilot = (inputs[3].as_f64().unwrap_or(0.0), inputs[4].as_f64().unwrap_or(0.0));
        let (angle, throttle) = match inputs[0].as_str() {
            Some("local") => pilot,
            Some("local_angle") => (pilot.0, user.1),
            _ => user,
        };
        Ok(vec![Value::from(angle), Value::from(throttle)])
    })
    .with_arity(5, 2);
    vehicle.add_sync(
        mixer,
        Binding::new()
            .named("drive_mode")
            .inputs([
                "user/mode",
                "user/angle",
                "user/throttle",
                "pilot/angle",
                "pilot/throttle",
            ])
            .outputs(["angle", "throttle"]),
    )?;

    // Recorder: counts the frames it would write to a tub.
    let mut records = 0u64;
    let recorder = FnPart::new(move |_: &[Value]| {
        records += 1;
        Ok(vec![Value::from(records)])
    })
    .with_arity(3, 1)
    .on_shutdown(|| {
        tracing::info!("Recorder closed");
        Ok(())
    });
    vehicle.add_sync(
        recorder,
        Binding::new()
            .named("recorder")
            .inputs(["cam/image_array", "angle", "throttle"])
            .outputs(["tub/num_records"])
            .run_condition("recording"),
    )?;

    Ok(vehicle)
}

fn main() -> anyhow::Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => VehicleConfig::load(&path)
            .with_context(|| format!("Failed to load config from {}", path))?,
        None => VehicleConfig::default(),
    };
    let _log_guard = init_logging(&config.log)?;

    tracing::info!("Starting vehicle at {} Hz", config.drive_loop_hz);

    let mut vehicle = build_vehicle(config)?;
    let events = vehicle.subscribe();

    let stop = vehicle.stop_handle();
    std::thread::Builder::new()
        .name("stdin-stop".to_string())
        .spawn(move || {
            let mut line = String::new();
            let _ = std::io::stdin().lock().read_line(&mut line);
            stop.stop();
        })
        .context("Failed to spawn stdin watcher")?;

    let finished = Arc::new(AtomicBool::new(false));
    let telemetry_done = Arc::clone(&finished);
    let telemetry = std::thread::Builder::new()
        .name("telemetry".to_string())
        .spawn(move || loop {
            match events.recv_timeout(Duration::from_millis(200)) {
                Some(VehicleEvent::Stats(stats)) => tracing::info!(
                    "{} ticks, {:.1} Hz, {} overruns, jitter {}us",
                    stats.ticks,
                    stats.observed_hz,
                    stats.overruns,
                    stats.tick_time.jitter_us()
                ),
                Some(VehicleEvent::WorkerFailure { binding, message }) => {
                    tracing::warn!("{} failed: {}", binding, message)
                }
                Some(VehicleEvent::Stopped(_)) => break,
                None if telemetry_done.load(Ordering::Acquire) => break,
                Some(_) | None => {}
            }
        })
        .context("Failed to spawn telemetry thread")?;

    println!("Vehicle running. Press Enter to stop.");
    let result = vehicle.run();
    finished.store(true, Ordering::Release);
    let _ = telemetry.join();

    let summary = result?;
    let store = vehicle.store();
    let records = store
        .as_ref()
        .and_then(|s| s.get_one("tub/num_records").as_f64())
        .unwrap_or(0.0);
    println!(
        "Stopped after {} ticks in {:.1?} ({:.1} Hz observed, {} overruns, {} records)",
        summary.ticks(),
        summary.elapsed,
        summary.stats.observed_hz,
        summary.stats.overruns,
        records
    );
    Ok(())
}
