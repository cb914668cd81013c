//! Runtime behaviour against the deterministic loopback backend.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use soundflow_core::{FrameLayout, SampleFormat};
use soundflow_device::{
    BackendKind, Context, Device, DeviceConfig, DeviceError, DeviceState, Direction,
    LoopbackBackend,
};

const PERIOD: usize = 480;
const LATENCY_PERIODS: usize = 2;

fn loopback_context() -> Arc<Context> {
    Context::new(BackendKind::Loopback(LoopbackBackend {
        period_frames: PERIOD,
        latency_periods: LATENCY_PERIODS,
    }))
}

fn mono() -> FrameLayout {
    FrameLayout::new(SampleFormat::F32, 1, 48_000)
}

fn run_for_periods(device: &mut Device, periods: usize) {
    device.start().unwrap();
    // One period is 10 ms at 48 kHz; generous slack for scheduling jitter.
    thread::sleep(Duration::from_millis((periods * 10 + 30) as u64));
    device.stop().unwrap();
}

#[test]
fn lifecycle_transitions_and_rejections() {
    let ctx = loopback_context();
    let mut device = Device::init(
        Arc::clone(&ctx),
        DeviceConfig::playback(mono()),
        |_out: Option<&mut [f32]>, _in: Option<&[f32]>, frames: usize| frames,
    )
    .unwrap();

    assert_eq!(device.state(), DeviceState::Stopped);
    device.stop().unwrap();
    device.start().unwrap();
    assert_eq!(device.state(), DeviceState::Started);
    device.start().unwrap();

    assert!(matches!(
        device.uninit(),
        Err(DeviceError::InvalidState { state: DeviceState::Started })
    ));

    device.stop().unwrap();
    assert_eq!(device.state(), DeviceState::Stopped);
    device.stop().unwrap();

    device.uninit().unwrap();
    assert_eq!(device.state(), DeviceState::Uninitialized);
    device.uninit().unwrap();

    assert!(matches!(
        device.start(),
        Err(DeviceError::InvalidState { .. })
    ));
    assert!(matches!(
        device.stop(),
        Err(DeviceError::InvalidState { .. })
    ));
}

#[test]
fn enumeration_snapshot_is_owned_and_stable() {
    let ctx = loopback_context();
    let first = ctx.get_devices().unwrap();
    let second = ctx.get_devices().unwrap();

    assert_eq!(first.playback.len(), 1);
    assert_eq!(first.capture.len(), 1);

    let endpoint = &first.playback[0];
    assert!(endpoint.is_default);
    assert_eq!(endpoint.name, "Loopback");
    assert!(!endpoint.native_data_formats.is_empty());

    assert_eq!(first.playback[0].id, second.playback[0].id);
    assert_eq!(first.capture[0].id, second.capture[0].id);
}

#[test]
fn duplex_input_arrives_after_the_reported_latency() {
    let ctx = loopback_context();
    let recorded = Arc::new(Mutex::new(Vec::<f32>::new()));

    let rec = Arc::clone(&recorded);
    let mut next = 1u32;
    let callback = move |out: Option<&mut [f32]>, input: Option<&[f32]>, frames: usize| {
        if let Some(input) = input {
            rec.lock().unwrap().extend_from_slice(input);
        }
        if let Some(out) = out {
            for sample in out.iter_mut() {
                *sample = next as f32;
                next += 1;
            }
        }
        frames
    };

    let mut device = Device::init(
        Arc::clone(&ctx),
        DeviceConfig::duplex(mono(), mono()),
        callback,
    )
    .unwrap();
    assert_eq!(device.latency_frames(), (LATENCY_PERIODS * PERIOD) as u64);

    run_for_periods(&mut device, 8);

    let recorded = recorded.lock().unwrap();
    assert!(recorded.len() >= (LATENCY_PERIODS + 2) * PERIOD);

    let first_nonzero = recorded
        .iter()
        .position(|&s| s != 0.0)
        .expect("playback data never looped back");
    assert_eq!(first_nonzero, LATENCY_PERIODS * PERIOD);
    assert_eq!(recorded[first_nonzero], 1.0);
    // Looped-back data keeps its ordering frame for frame.
    assert_eq!(recorded[first_nonzero + 1], 2.0);
}

#[test]
fn capture_only_receives_signal() {
    let ctx = loopback_context();
    let recorded = Arc::new(Mutex::new(Vec::<f32>::new()));

    let rec = Arc::clone(&recorded);
    let mut device = Device::init(
        Arc::clone(&ctx),
        DeviceConfig::capture(mono()),
        move |_out: Option<&mut [f32]>, input: Option<&[f32]>, _frames: usize| {
            if let Some(input) = input {
                rec.lock().unwrap().extend_from_slice(input);
            }
            0
        },
    )
    .unwrap();
    assert_eq!(device.direction(), Direction::Capture);

    run_for_periods(&mut device, 4);

    let recorded = recorded.lock().unwrap();
    assert!(recorded.len() >= 2 * PERIOD);
    assert!(recorded[1] > recorded[0]);
}

#[test]
fn capture_ramp_follows_the_configured_rate() {
    let rate = 24_000u32;
    let ctx = loopback_context();
    let recorded = Arc::new(Mutex::new(Vec::<f32>::new()));

    let rec = Arc::clone(&recorded);
    let mut device = Device::init(
        Arc::clone(&ctx),
        DeviceConfig::capture(FrameLayout::new(SampleFormat::F32, 1, rate)),
        move |_out: Option<&mut [f32]>, input: Option<&[f32]>, _frames: usize| {
            if let Some(input) = input {
                rec.lock().unwrap().extend_from_slice(input);
            }
            0
        },
    )
    .unwrap();

    device.start().unwrap();
    // One period is 20 ms at 24 kHz.
    thread::sleep(Duration::from_millis(100));
    device.stop().unwrap();

    let recorded = recorded.lock().unwrap();
    assert!(recorded.len() >= PERIOD);
    let step = 1.0 / rate as f32;
    for i in 0..16 {
        assert!((recorded[i] - i as f32 * step).abs() < 1e-6);
    }
}

#[test]
fn short_callback_writes_count_as_underruns() {
    let ctx = loopback_context();
    let mut device = Device::init(
        Arc::clone(&ctx),
        DeviceConfig::playback(mono()),
        |out: Option<&mut [f32]>, _in: Option<&[f32]>, frames: usize| {
            if let Some(out) = out {
                for sample in out.iter_mut().take(frames / 2) {
                    *sample = 0.25;
                }
            }
            frames / 2
        },
    )
    .unwrap();
    let metrics = device.metrics();

    run_for_periods(&mut device, 4);

    assert!(metrics.playback_underruns() > 0);
    assert_eq!(metrics.capture_overruns(), 0);
}

#[test]
fn streams_restart_after_stop() {
    let ctx = loopback_context();
    let ticks = Arc::new(AtomicU32::new(0));

    let counter = Arc::clone(&ticks);
    let mut device = Device::init(
        Arc::clone(&ctx),
        DeviceConfig::playback(mono()),
        move |_out: Option<&mut [f32]>, _in: Option<&[f32]>, frames: usize| {
            counter.fetch_add(1, Ordering::Relaxed);
            frames
        },
    )
    .unwrap();

    run_for_periods(&mut device, 2);
    let after_first = ticks.load(Ordering::Relaxed);
    assert!(after_first > 0);

    run_for_periods(&mut device, 2);
    assert!(ticks.load(Ordering::Relaxed) > after_first);
}

#[test]
fn duplex_rejects_mismatched_rates() {
    let ctx = loopback_context();
    let playback = FrameLayout::new(SampleFormat::F32, 2, 48_000);
    let capture = FrameLayout::new(SampleFormat::F32, 1, 44_100);

    let err = Device::init(
        ctx,
        DeviceConfig::duplex(playback, capture),
        |_out: Option<&mut [f32]>, _in: Option<&[f32]>, frames: usize| frames,
    )
    .err()
    .expect("mismatched duplex rates must be rejected");
    assert!(matches!(err, DeviceError::InvalidConfig(_)));
}
