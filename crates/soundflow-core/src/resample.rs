//! Sample-rate conversion.
//!
//! Two implementations sit behind [`crate::ResampleQuality`]:
//! - a streaming linear interpolator, allocation-free after construction and
//!   cheap enough for the real-time path;
//! - a rubato sinc resampler for the decode path.
//!
//! Both are deterministic given identical inputs.

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::error::FormatError;

pub(crate) const SINC_CHUNK_FRAMES: usize = 1024;
const SINC_LEN: usize = 256;
const SINC_CUTOFF: f32 = 0.95;
const SINC_OVERSAMPLING_FACTOR: usize = 128;
const SINC_WINDOW: WindowFunction = WindowFunction::BlackmanHarris2;
const SINC_INTERPOLATION: SincInterpolationType = SincInterpolationType::Linear;

/// Expected output frame count for a complete conversion, truncating.
///
/// The conversion contract allows the realized count to differ by at most one
/// frame from `src_frames * dst_rate / src_rate`.
pub fn expected_output_frames(src_frames: u64, src_rate: u32, dst_rate: u32) -> u64 {
    src_frames * dst_rate as u64 / src_rate as u64
}

/// One-shot linear resampling of a complete interleaved buffer.
pub fn resample_linear(input: &[f32], channels: u16, src_rate: u32, dst_rate: u32) -> Vec<f32> {
    let ch = channels.max(1) as usize;
    let src_frames = input.len() / ch;
    if src_frames == 0 || src_rate == dst_rate {
        return input.to_vec();
    }

    let out_frames = expected_output_frames(src_frames as u64, src_rate, dst_rate) as usize;
    let step = src_rate as f64 / dst_rate as f64;
    let last = src_frames - 1;

    let mut out = Vec::with_capacity(out_frames * ch);
    for i in 0..out_frames {
        let pos = i as f64 * step;
        let i0 = (pos as usize).min(last);
        let i1 = (i0 + 1).min(last);
        let frac = (pos - i0 as f64) as f32;
        for c in 0..ch {
            let a = input[i0 * ch + c];
            let b = input[i1 * ch + c];
            out.push(a + (b - a) * frac);
        }
    }
    out
}

/// Streaming linear interpolator.
///
/// Holds the final frame of the previous block so interpolation is continuous
/// across block boundaries. `process` never allocates beyond the caller's
/// output vector.
pub struct LinearResampler {
    channels: usize,
    step: f64,
    // Time of the next output frame in input-frame units; the held frame sits
    // at t = 0 once primed.
    t: f64,
    hold: Vec<f32>,
    primed: bool,
}

impl LinearResampler {
    pub fn new(channels: u16, src_rate: u32, dst_rate: u32) -> Self {
        let channels = channels.max(1) as usize;
        Self {
            channels,
            step: src_rate as f64 / dst_rate as f64,
            t: 0.0,
            hold: vec![0.0; channels],
            primed: false,
        }
    }

    pub fn reset(&mut self) {
        self.t = 0.0;
        self.primed = false;
    }

    /// Consumes `input` (interleaved, full frames) and appends resampled
    /// frames to `out`.
    pub fn process(&mut self, input: &[f32], out: &mut Vec<f32>) {
        let ch = self.channels;
        let frames = input.len() / ch;
        if frames == 0 {
            return;
        }

        // Once primed, index 0 addresses the held frame and input frames sit
        // at 1..=frames; before priming input frames sit at 0..frames.
        let primed = self.primed;
        fn sample_at(hold: &[f32], input: &[f32], primed: bool, ch: usize, k: usize, c: usize) -> f32 {
            if primed {
                if k == 0 {
                    hold[c]
                } else {
                    input[(k - 1) * ch + c]
                }
            } else {
                input[k * ch + c]
            }
        }

        let span = if primed { frames } else { frames - 1 };
        while self.t <= span as f64 {
            let i0 = self.t as usize;
            let i1 = (i0 + 1).min(span);
            let frac = (self.t - i0 as f64) as f32;
            for c in 0..ch {
                let a = sample_at(&self.hold, input, primed, ch, i0, c);
                let b = sample_at(&self.hold, input, primed, ch, i1, c);
                out.push(a + (b - a) * frac);
            }
            self.t += self.step;
        }

        self.hold.copy_from_slice(&input[(frames - 1) * ch..]);
        self.t -= span as f64;
        self.primed = true;
    }
}

/// Streaming sinc resampler over rubato's fixed-input-chunk API.
///
/// Interleaved input is accumulated into planar chunks; the resampler's group
/// delay is skipped from the head of the output stream so the first emitted
/// frame corresponds to the first input frame.
pub struct SincResampler {
    inner: SincFixedIn<f32>,
    channels: usize,
    src_rate: u32,
    dst_rate: u32,
    pending: Vec<Vec<f32>>,
    skip: usize,
    delay: usize,
    frames_in: u64,
    frames_out: u64,
}

impl SincResampler {
    pub fn new(channels: u16, src_rate: u32, dst_rate: u32) -> Result<Self, FormatError> {
        let channels = channels.max(1) as usize;
        let params = SincInterpolationParameters {
            sinc_len: SINC_LEN,
            f_cutoff: SINC_CUTOFF,
            oversampling_factor: SINC_OVERSAMPLING_FACTOR,
            interpolation: SINC_INTERPOLATION,
            window: SINC_WINDOW,
        };
        let ratio = dst_rate as f64 / src_rate as f64;
        let inner = SincFixedIn::<f32>::new(ratio, 2.0, params, SINC_CHUNK_FRAMES, channels)
            .map_err(|e| FormatError::Resample(format!("failed to create resampler: {e}")))?;
        let delay = inner.output_delay();
        Ok(Self {
            inner,
            channels,
            src_rate,
            dst_rate,
            pending: vec![Vec::new(); channels],
            skip: delay,
            delay,
            frames_in: 0,
            frames_out: 0,
        })
    }

    pub fn reset(&mut self) {
        self.inner.reset();
        for ch in &mut self.pending {
            ch.clear();
        }
        self.skip = self.delay;
        self.frames_in = 0;
        self.frames_out = 0;
    }

    pub fn process(&mut self, input: &[f32], out: &mut Vec<f32>) -> Result<(), FormatError> {
        let ch = self.channels;
        self.frames_in += (input.len() / ch) as u64;
        for (i, sample) in input.iter().enumerate() {
            self.pending[i % ch].push(*sample);
        }

        while self.pending[0].len() >= SINC_CHUNK_FRAMES {
            let chunk: Vec<Vec<f32>> = self
                .pending
                .iter_mut()
                .map(|p| p.drain(..SINC_CHUNK_FRAMES).collect())
                .collect();
            let produced = self
                .inner
                .process(&chunk, None)
                .map_err(|e| FormatError::Resample(format!("resample error: {e}")))?;
            self.emit(&produced, out);
        }
        Ok(())
    }

    /// Drains buffered input and the resampler's internal delay line.
    pub fn flush(&mut self, out: &mut Vec<f32>) -> Result<(), FormatError> {
        if !self.pending[0].is_empty() {
            let chunk: Vec<Vec<f32>> = self.pending.iter_mut().map(std::mem::take).collect();
            let produced = self
                .inner
                .process_partial(Some(&chunk), None)
                .map_err(|e| FormatError::Resample(format!("resample error: {e}")))?;
            self.emit(&produced, out);
        }
        // One empty partial pass pushes the tail of the delay line out.
        let produced = self
            .inner
            .process_partial::<Vec<f32>>(None, None)
            .map_err(|e| FormatError::Resample(format!("resample error: {e}")))?;
        self.emit(&produced, out);

        // The zero-pad pass over-produces; pin the realized total to the
        // rational frame count so length stays monotone with the input.
        let ch = self.channels;
        let expected = expected_output_frames(self.frames_in, self.src_rate, self.dst_rate);
        while self.frames_out > expected {
            out.truncate(out.len() - ch);
            self.frames_out -= 1;
        }
        while self.frames_out < expected {
            out.extend(std::iter::repeat(0.0).take(ch));
            self.frames_out += 1;
        }
        Ok(())
    }

    fn emit(&mut self, planar: &[Vec<f32>], out: &mut Vec<f32>) {
        let frames = planar.first().map(|p| p.len()).unwrap_or(0);
        let start = self.skip.min(frames);
        self.skip -= start;
        for frame in start..frames {
            for ch in planar {
                out.push(ch[frame]);
            }
        }
        self.frames_out += (frames - start) as u64;
    }
}
