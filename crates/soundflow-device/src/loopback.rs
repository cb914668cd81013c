//! Software loopback backend.
//!
//! Drives the data path from a named worker thread with no host audio API
//! involved. Capture data is playback data delayed by a fixed number of
//! periods, so duplex behaviour (including reported latency) is exactly
//! reproducible. Capture-only streams receive a deterministic ramp signal.

use std::collections::VecDeque;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use tracing::debug;

use soundflow_core::{mix_channels, SampleFormat};

use crate::backend::{
    BackendStream, DeviceBackend, DeviceId, DeviceInfo, Direction, NativeDataFormat,
    OpenStreamArgs, NATIVE_FORMAT_FLAG_EXCLUSIVE,
};
use crate::error::DeviceError;

const DEFAULT_PERIOD_FRAMES: usize = 480;
const DEFAULT_LATENCY_PERIODS: usize = 2;

#[derive(Debug, Clone, Copy)]
pub struct LoopbackBackend {
    pub period_frames: usize,
    pub latency_periods: usize,
}

impl Default for LoopbackBackend {
    fn default() -> Self {
        Self {
            period_frames: DEFAULT_PERIOD_FRAMES,
            latency_periods: DEFAULT_LATENCY_PERIODS,
        }
    }
}

impl DeviceBackend for LoopbackBackend {
    fn name(&self) -> &'static str {
        "loopback"
    }

    fn list_endpoints(&self, direction: Direction) -> Result<Vec<DeviceInfo>, DeviceError> {
        let id = match direction {
            Direction::Playback | Direction::Duplex => "loopback-out",
            Direction::Capture => "loopback-in",
        };
        Ok(vec![DeviceInfo {
            id: DeviceId(id.to_string()),
            name: "Loopback".to_string(),
            is_default: true,
            native_data_formats: vec![
                NativeDataFormat {
                    format: SampleFormat::F32,
                    channels: 2,
                    sample_rate: 48_000,
                    flags: NATIVE_FORMAT_FLAG_EXCLUSIVE,
                },
                NativeDataFormat {
                    format: SampleFormat::F32,
                    channels: 1,
                    sample_rate: 48_000,
                    flags: 0,
                },
            ],
        }])
    }

    fn open_stream(&self, args: OpenStreamArgs) -> Result<Box<dyn BackendStream>, DeviceError> {
        let play_ch = args.playback.as_ref().map_or(0, |s| s.layout.channels as usize);
        let cap_ch = args.capture.as_ref().map_or(0, |s| s.layout.channels as usize);
        let rate = args
            .playback
            .as_ref()
            .or(args.capture.as_ref())
            .map(|s| s.layout.sample_rate)
            .ok_or_else(|| DeviceError::InvalidConfig("no stream side requested".into()))?;

        let latency_frames = self.latency_periods * self.period_frames;
        let mut delay = VecDeque::new();
        if args.direction == Direction::Duplex {
            delay.extend(std::iter::repeat(0.0f32).take(latency_frames * cap_ch));
        }

        Ok(Box::new(LoopbackStream {
            worker: Some(Worker {
                period: self.period_frames,
                play_ch,
                cap_ch,
                tick: Duration::from_micros(
                    self.period_frames as u64 * 1_000_000 / rate as u64,
                ),
                on_output: args.on_output,
                on_input: args.on_input,
                delay,
                ramp: 0.0,
                ramp_step: 1.0 / rate as f32,
            }),
            handle: None,
            stop_tx: None,
            latency_frames: latency_frames as u64,
        }))
    }
}

struct Worker {
    period: usize,
    play_ch: usize,
    cap_ch: usize,
    tick: Duration,
    on_output: Option<Box<dyn FnMut(&mut [f32]) + Send>>,
    on_input: Option<Box<dyn FnMut(&[f32]) + Send>>,
    delay: VecDeque<f32>,
    ramp: f32,
    ramp_step: f32,
}

impl Worker {
    fn run(mut self, stop: Receiver<()>) -> Self {
        let mut out = vec![0.0f32; self.period * self.play_ch];
        let mut cap = vec![0.0f32; self.period * self.cap_ch];
        let mut mapped = Vec::new();
        let duplex = self.on_output.is_some() && self.on_input.is_some();

        loop {
            match stop.recv_timeout(self.tick) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {}
            }

            // Capture delivers before the output callback runs so a duplex
            // callback sees this tick's delayed input.
            if let Some(on_input) = self.on_input.as_mut() {
                if duplex {
                    for sample in cap.iter_mut() {
                        *sample = self.delay.pop_front().unwrap_or(0.0);
                    }
                } else {
                    for frame in cap.chunks_mut(self.cap_ch) {
                        let value = self.ramp;
                        self.ramp = (self.ramp + self.ramp_step).fract();
                        frame.fill(value);
                    }
                }
                on_input(&cap);
            }

            if let Some(on_output) = self.on_output.as_mut() {
                out.fill(0.0);
                on_output(&mut out);
                if duplex {
                    if self.play_ch == self.cap_ch {
                        self.delay.extend(out.iter().copied());
                    } else {
                        mapped.clear();
                        mix_channels(&out, self.play_ch as u16, self.cap_ch as u16, &mut mapped);
                        self.delay.extend(mapped.iter().copied());
                    }
                }
            }
        }
        self
    }
}

struct LoopbackStream {
    worker: Option<Worker>,
    handle: Option<JoinHandle<Worker>>,
    stop_tx: Option<Sender<()>>,
    latency_frames: u64,
}

impl BackendStream for LoopbackStream {
    fn start(&mut self) -> Result<(), DeviceError> {
        let worker = match self.worker.take() {
            Some(worker) => worker,
            None => return Ok(()),
        };
        let (tx, rx) = bounded(1);
        let handle = thread::Builder::new()
            .name("sf-loopback".to_string())
            .spawn(move || worker.run(rx))
            .map_err(|e| DeviceError::Backend(format!("spawn loopback worker: {e}")))?;
        self.stop_tx = Some(tx);
        self.handle = Some(handle);
        debug!("loopback stream started");
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        let worker = handle
            .join()
            .map_err(|_| DeviceError::Backend("loopback worker panicked".into()))?;
        self.worker = Some(worker);
        debug!("loopback stream stopped");
        Ok(())
    }

    fn latency_frames(&self) -> u64 {
        self.latency_frames
    }
}

impl Drop for LoopbackStream {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
