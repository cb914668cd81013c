//! Device lifecycle and the real-time data path.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::debug;

use soundflow_core::FrameLayout;

use crate::backend::{BackendStream, DeviceId, Direction, OpenStreamArgs, StreamSide};
use crate::context::Context;
use crate::error::DeviceError;
use crate::ring_buffer::new_ring_buffer;

// Upper bound on frames per backend callback; sizes the preallocated
// capture scratch so the real-time path never allocates.
const MAX_PERIOD_FRAMES: usize = 8192;

// Ring depth between capture and the duplex callback, per profile. The
// conservative profile trades latency for resilience to scheduling jitter.
const RING_MS_LOW_LATENCY: usize = 100;
const RING_MS_CONSERVATIVE: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceState {
    Uninitialized,
    Stopped,
    Started,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PerformanceProfile {
    #[default]
    LowLatency,
    Conservative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ShareMode {
    #[default]
    Shared,
    Exclusive,
}

/// The real-time data callback.
///
/// Invoked by the backend on its audio thread with interleaved `f32` buffers
/// in the configured layouts. Implementations must not allocate, lock or
/// block. The return value is the number of output frames written; the
/// runtime silences the remainder and counts an underrun. Capture-only
/// callbacks may return zero.
pub trait DataCallback: Send + 'static {
    fn on_data(
        &mut self,
        output: Option<&mut [f32]>,
        input: Option<&[f32]>,
        frames: usize,
    ) -> usize;
}

impl<F> DataCallback for F
where
    F: FnMut(Option<&mut [f32]>, Option<&[f32]>, usize) -> usize + Send + 'static,
{
    fn on_data(
        &mut self,
        output: Option<&mut [f32]>,
        input: Option<&[f32]>,
        frames: usize,
    ) -> usize {
        self(output, input, frames)
    }
}

/// Glitch accounting, shared between the real-time closures and the control
/// thread. Under/overruns are not errors; streaming continues.
#[derive(Debug, Default)]
pub struct DeviceMetrics {
    pub playback_underruns: AtomicU64,
    pub capture_overruns: AtomicU64,
    pub capture_underruns: AtomicU64,
}

impl DeviceMetrics {
    pub fn playback_underruns(&self) -> u64 {
        self.playback_underruns.load(Ordering::Relaxed)
    }

    pub fn capture_overruns(&self) -> u64 {
        self.capture_overruns.load(Ordering::Relaxed)
    }

    pub fn capture_underruns(&self) -> u64 {
        self.capture_underruns.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub direction: Direction,
    pub playback: Option<FrameLayout>,
    pub capture: Option<FrameLayout>,
    pub playback_device: Option<DeviceId>,
    pub capture_device: Option<DeviceId>,
    pub profile: PerformanceProfile,
    pub share_mode: ShareMode,
}

impl DeviceConfig {
    pub fn playback(layout: FrameLayout) -> Self {
        Self {
            direction: Direction::Playback,
            playback: Some(layout),
            capture: None,
            playback_device: None,
            capture_device: None,
            profile: PerformanceProfile::default(),
            share_mode: ShareMode::default(),
        }
    }

    pub fn capture(layout: FrameLayout) -> Self {
        Self {
            direction: Direction::Capture,
            playback: None,
            capture: Some(layout),
            playback_device: None,
            capture_device: None,
            profile: PerformanceProfile::default(),
            share_mode: ShareMode::default(),
        }
    }

    pub fn duplex(playback: FrameLayout, capture: FrameLayout) -> Self {
        Self {
            direction: Direction::Duplex,
            playback: Some(playback),
            capture: Some(capture),
            playback_device: None,
            capture_device: None,
            profile: PerformanceProfile::default(),
            share_mode: ShareMode::default(),
        }
    }

    fn validate(&self) -> Result<(), DeviceError> {
        if self.direction.has_playback() {
            let layout = self
                .playback
                .ok_or_else(|| DeviceError::InvalidConfig("missing playback layout".into()))?;
            layout.validate()?;
        }
        if self.direction.has_capture() {
            let layout = self
                .capture
                .ok_or_else(|| DeviceError::InvalidConfig("missing capture layout".into()))?;
            layout.validate()?;
        }
        if self.direction == Direction::Duplex {
            if let (Some(p), Some(c)) = (self.playback, self.capture) {
                if p.sample_rate != c.sample_rate {
                    return Err(DeviceError::InvalidConfig(format!(
                        "duplex rates must match: playback {} vs capture {}",
                        p.sample_rate, c.sample_rate
                    )));
                }
            }
        }
        Ok(())
    }
}

/// A device bound to one backend stream.
///
/// Control operations (`start`, `stop`, `uninit`) run on caller threads and
/// may block; operations on the same device are serialized by the caller.
/// The only legal transitions are `Stopped -> Started`, `Started -> Stopped`
/// and `Stopped -> Uninitialized`; `start` when started and `stop` when
/// stopped are no-ops.
pub struct Device {
    state: DeviceState,
    stream: Option<Box<dyn BackendStream>>,
    metrics: Arc<DeviceMetrics>,
    direction: Direction,
    _context: Arc<Context>,
}

impl Device {
    /// Opens the backend stream and binds `callback`; the device starts out
    /// `Stopped`.
    pub fn init(
        context: Arc<Context>,
        config: DeviceConfig,
        callback: impl DataCallback,
    ) -> Result<Self, DeviceError> {
        config.validate()?;

        let metrics = Arc::new(DeviceMetrics::default());
        // Conversion between the requested and native layout is disabled for
        // the low-latency exclusive combination; negotiation then fails hard.
        let allow_conversion = !(config.profile == PerformanceProfile::LowLatency
            && config.share_mode == ShareMode::Exclusive);

        let mut args = OpenStreamArgs {
            direction: config.direction,
            playback: config.playback.map(|layout| StreamSide {
                layout,
                device: config.playback_device.clone(),
            }),
            capture: config.capture.map(|layout| StreamSide {
                layout,
                device: config.capture_device.clone(),
            }),
            share_mode: config.share_mode,
            profile: config.profile,
            allow_conversion,
            on_output: None,
            on_input: None,
            on_error: Box::new(|message| tracing::warn!(%message, "backend stream error")),
        };

        let missing =
            || DeviceError::InvalidConfig("missing layout for requested direction".into());
        let mut callback = callback;
        match config.direction {
            Direction::Playback => {
                let play_ch = config.playback.ok_or_else(missing)?.channels as usize;
                let metrics = Arc::clone(&metrics);
                args.on_output = Some(Box::new(move |out: &mut [f32]| {
                    let frames = out.len() / play_ch;
                    let produced = callback.on_data(Some(out), None, frames).min(frames);
                    if produced < frames {
                        out[produced * play_ch..].fill(0.0);
                        metrics.playback_underruns.fetch_add(1, Ordering::Relaxed);
                    }
                }));
            }
            Direction::Capture => {
                let cap_ch = config.capture.ok_or_else(missing)?.channels as usize;
                args.on_input = Some(Box::new(move |data: &[f32]| {
                    let frames = data.len() / cap_ch;
                    callback.on_data(None, Some(data), frames);
                }));
            }
            Direction::Duplex => {
                let play = config.playback.ok_or_else(missing)?;
                let cap = config.capture.ok_or_else(missing)?;
                let play_ch = play.channels as usize;
                let cap_ch = cap.channels as usize;

                let ring_ms = match config.profile {
                    PerformanceProfile::LowLatency => RING_MS_LOW_LATENCY,
                    PerformanceProfile::Conservative => RING_MS_CONSERVATIVE,
                };
                let capacity = (cap.sample_rate as usize * ring_ms / 1000).max(MAX_PERIOD_FRAMES)
                    * cap_ch;
                let (mut prod, mut cons) = new_ring_buffer::<f32>(capacity);

                let in_metrics = Arc::clone(&metrics);
                args.on_input = Some(Box::new(move |data: &[f32]| {
                    let pushed = prod.push_slice(data);
                    if pushed < data.len() {
                        in_metrics.capture_overruns.fetch_add(1, Ordering::Relaxed);
                    }
                }));

                let out_metrics = Arc::clone(&metrics);
                let mut input_scratch = vec![0.0f32; MAX_PERIOD_FRAMES * cap_ch];
                let mut primed = false;
                args.on_output = Some(Box::new(move |out: &mut [f32]| {
                    let total = out.len() / play_ch;
                    let frames = total.min(MAX_PERIOD_FRAMES);
                    if frames < total {
                        // Oversized backend periods are truncated; the part
                        // the callback never sees must not replay stale data.
                        out[frames * play_ch..].fill(0.0);
                    }
                    let need = frames * cap_ch;
                    let got = cons.pop_slice(&mut input_scratch[..need]);
                    if got < need {
                        // Startup shortfall is expected until the first
                        // capture period lands; only count once primed.
                        if primed {
                            out_metrics.capture_underruns.fetch_add(1, Ordering::Relaxed);
                        }
                        input_scratch[got..need].fill(0.0);
                    } else {
                        primed = true;
                    }
                    let produced = callback
                        .on_data(Some(out), Some(&input_scratch[..need]), frames)
                        .min(frames);
                    if produced < frames {
                        out[produced * play_ch..].fill(0.0);
                        out_metrics.playback_underruns.fetch_add(1, Ordering::Relaxed);
                    }
                }));
            }
        }

        let stream = context.backend().open_stream(args)?;
        debug!(direction = ?config.direction, "device initialized");

        Ok(Self {
            state: DeviceState::Stopped,
            stream: Some(stream),
            metrics,
            direction: config.direction,
            _context: context,
        })
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn metrics(&self) -> Arc<DeviceMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn latency_frames(&self) -> u64 {
        self.stream.as_ref().map_or(0, |s| s.latency_frames())
    }

    /// Starts the stream, blocking until the backend signals it is running.
    pub fn start(&mut self) -> Result<(), DeviceError> {
        match self.state {
            DeviceState::Started => Ok(()),
            DeviceState::Stopped => {
                let stream = self
                    .stream
                    .as_mut()
                    .ok_or(DeviceError::InvalidState { state: self.state })?;
                stream.start()?;
                self.state = DeviceState::Started;
                Ok(())
            }
            DeviceState::Uninitialized => Err(DeviceError::InvalidState { state: self.state }),
        }
    }

    /// Stops the stream, returning after the final data callback.
    pub fn stop(&mut self) -> Result<(), DeviceError> {
        match self.state {
            DeviceState::Stopped => Ok(()),
            DeviceState::Started => {
                let stream = self
                    .stream
                    .as_mut()
                    .ok_or(DeviceError::InvalidState { state: self.state })?;
                stream.stop()?;
                self.state = DeviceState::Stopped;
                Ok(())
            }
            DeviceState::Uninitialized => Err(DeviceError::InvalidState { state: self.state }),
        }
    }

    /// Releases the backend stream. Fails with `InvalidState` while started;
    /// stop first.
    pub fn uninit(&mut self) -> Result<(), DeviceError> {
        match self.state {
            DeviceState::Uninitialized => Ok(()),
            DeviceState::Stopped => {
                self.stream = None;
                self.state = DeviceState::Uninitialized;
                Ok(())
            }
            DeviceState::Started => Err(DeviceError::InvalidState { state: self.state }),
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        if self.state == DeviceState::Started {
            if let Some(stream) = self.stream.as_mut() {
                let _ = stream.stop();
            }
        }
    }
}
