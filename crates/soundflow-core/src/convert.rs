//! PCM conversion between frame layouts.
//!
//! All conversion runs through an interleaved `f32` intermediate in [-1, 1]:
//! byte decode, channel mix, rate conversion, byte encode. Down-mix averages
//! source channels, up-mix duplicates them.

use crate::error::FormatError;
use crate::format::{FrameLayout, ResampleQuality, SampleFormat};
use crate::resample::{LinearResampler, SincResampler, expected_output_frames, resample_linear};

/// Decodes little-endian PCM bytes into interleaved `f32` samples.
///
/// Trailing bytes that do not form a whole sample are ignored. Returns the
/// number of samples appended.
pub fn decode_to_f32(format: SampleFormat, bytes: &[u8], out: &mut Vec<f32>) -> usize {
    let stride = format.bytes_per_sample();
    let samples = bytes.len() / stride;
    out.reserve(samples);
    for i in 0..samples {
        let b = &bytes[i * stride..(i + 1) * stride];
        let v = match format {
            SampleFormat::U8 => (b[0] as f32 - 128.0) / 128.0,
            SampleFormat::S16 => i16::from_le_bytes([b[0], b[1]]) as f32 / 32_768.0,
            SampleFormat::S24 => {
                // Sign-extend the packed 24-bit value through the top byte.
                let raw = i32::from_le_bytes([0, b[0], b[1], b[2]]) >> 8;
                raw as f32 / 8_388_608.0
            }
            SampleFormat::S32 => {
                i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f32 / 2_147_483_648.0
            }
            SampleFormat::F32 => f32::from_le_bytes([b[0], b[1], b[2], b[3]]),
        };
        out.push(v);
    }
    samples
}

/// Encodes interleaved `f32` samples to little-endian PCM bytes.
pub fn encode_from_f32(format: SampleFormat, samples: &[f32], out: &mut Vec<u8>) {
    out.reserve(samples.len() * format.bytes_per_sample());
    for &s in samples {
        let v = s.clamp(-1.0, 1.0);
        match format {
            SampleFormat::U8 => out.push(((v + 1.0) * 0.5 * 255.0) as u8),
            SampleFormat::S16 => {
                out.extend_from_slice(&((v * 32_767.0) as i16).to_le_bytes());
            }
            SampleFormat::S24 => {
                let raw = (v * 8_388_607.0) as i32;
                let b = raw.to_le_bytes();
                out.extend_from_slice(&[b[0], b[1], b[2]]);
            }
            SampleFormat::S32 => {
                out.extend_from_slice(&((v as f64 * 2_147_483_647.0) as i32).to_le_bytes());
            }
            SampleFormat::F32 => out.extend_from_slice(&v.to_le_bytes()),
        }
    }
}

/// Channel-count conversion on interleaved samples.
///
/// Down-mix averages source channels grouped round-robin onto each output
/// channel (stereo content keeps its left/right split); up-mix duplicates
/// source channels cyclically.
pub fn mix_channels(input: &[f32], in_channels: u16, out_channels: u16, out: &mut Vec<f32>) {
    let in_ch = in_channels.max(1) as usize;
    let out_ch = out_channels.max(1) as usize;
    let frames = input.len() / in_ch;

    if in_ch == out_ch {
        out.extend_from_slice(&input[..frames * in_ch]);
        return;
    }

    out.reserve(frames * out_ch);
    for f in 0..frames {
        let frame = &input[f * in_ch..(f + 1) * in_ch];
        if out_ch < in_ch {
            for c in 0..out_ch {
                let mut acc = 0.0f32;
                let mut n = 0u32;
                let mut src = c;
                while src < in_ch {
                    acc += frame[src];
                    n += 1;
                    src += out_ch;
                }
                out.push((acc / n as f32).clamp(-1.0, 1.0));
            }
        } else {
            for c in 0..out_ch {
                out.push(frame[c % in_ch]);
            }
        }
    }
}

/// One-shot conversion between two frame layouts.
pub struct Converter {
    src: FrameLayout,
    dst: FrameLayout,
    quality: ResampleQuality,
}

impl Converter {
    pub fn new(
        src: FrameLayout,
        dst: FrameLayout,
        quality: ResampleQuality,
    ) -> Result<Self, FormatError> {
        src.validate()?;
        dst.validate()?;
        Ok(Self { src, dst, quality })
    }

    /// Converts a complete source buffer, returning the destination bytes and
    /// the number of frames produced.
    pub fn convert(&self, src_bytes: &[u8]) -> Result<(Vec<u8>, u64), FormatError> {
        let mut samples = Vec::new();
        decode_to_f32(self.src.format, src_bytes, &mut samples);
        let src_frames = (samples.len() / self.src.channels as usize) as u64;

        let mut mixed = Vec::new();
        mix_channels(&samples, self.src.channels, self.dst.channels, &mut mixed);

        let resampled = if self.src.sample_rate == self.dst.sample_rate {
            mixed
        } else {
            match self.quality {
                ResampleQuality::Linear => resample_linear(
                    &mixed,
                    self.dst.channels,
                    self.src.sample_rate,
                    self.dst.sample_rate,
                ),
                ResampleQuality::Sinc => {
                    let mut rs = SincResampler::new(
                        self.dst.channels,
                        self.src.sample_rate,
                        self.dst.sample_rate,
                    )?;
                    let mut out = Vec::new();
                    rs.process(&mixed, &mut out)?;
                    rs.flush(&mut out)?;
                    // Pin the realized count to the monotone contract.
                    let expected = expected_output_frames(
                        src_frames,
                        self.src.sample_rate,
                        self.dst.sample_rate,
                    ) as usize
                        * self.dst.channels as usize;
                    out.resize(expected, 0.0);
                    out
                }
            }
        };

        let frames = (resampled.len() / self.dst.channels as usize) as u64;
        let mut bytes = Vec::new();
        encode_from_f32(self.dst.format, &resampled, &mut bytes);
        Ok((bytes, frames))
    }
}

enum RateStage {
    None,
    Linear(LinearResampler),
    Sinc(SincResampler),
}

/// Streaming converter in the `f32` domain: channel mix followed by rate
/// conversion. Used by the decoder output stage and the device runtime.
pub struct StreamConverter {
    in_channels: u16,
    out_channels: u16,
    rate: RateStage,
    mix_scratch: Vec<f32>,
}

impl StreamConverter {
    pub fn new(
        in_channels: u16,
        in_rate: u32,
        out_channels: u16,
        out_rate: u32,
        quality: ResampleQuality,
    ) -> Result<Self, FormatError> {
        if in_channels == 0 || out_channels == 0 || in_rate == 0 || out_rate == 0 {
            return Err(FormatError::InvalidLayout {
                channels: in_channels.min(out_channels),
                sample_rate: in_rate.min(out_rate),
            });
        }
        let rate = if in_rate == out_rate {
            RateStage::None
        } else {
            match quality {
                ResampleQuality::Linear => {
                    RateStage::Linear(LinearResampler::new(out_channels, in_rate, out_rate))
                }
                ResampleQuality::Sinc => {
                    RateStage::Sinc(SincResampler::new(out_channels, in_rate, out_rate)?)
                }
            }
        };
        Ok(Self {
            in_channels,
            out_channels,
            rate,
            mix_scratch: Vec::new(),
        })
    }

    pub fn is_identity(&self) -> bool {
        self.in_channels == self.out_channels && matches!(self.rate, RateStage::None)
    }

    pub fn out_channels(&self) -> u16 {
        self.out_channels
    }

    /// Appends converted frames to `out`; `input` is interleaved at the input
    /// channel count.
    pub fn process(&mut self, input: &[f32], out: &mut Vec<f32>) -> Result<(), FormatError> {
        self.mix_scratch.clear();
        mix_channels(
            input,
            self.in_channels,
            self.out_channels,
            &mut self.mix_scratch,
        );
        match &mut self.rate {
            RateStage::None => out.extend_from_slice(&self.mix_scratch),
            RateStage::Linear(rs) => rs.process(&self.mix_scratch, out),
            RateStage::Sinc(rs) => rs.process(&self.mix_scratch, out)?,
        }
        Ok(())
    }

    /// Drains any samples held back by the rate stage.
    pub fn finish(&mut self, out: &mut Vec<f32>) -> Result<(), FormatError> {
        match &mut self.rate {
            RateStage::None | RateStage::Linear(_) => Ok(()),
            RateStage::Sinc(rs) => rs.flush(out),
        }
    }

    /// Discards all carried state, e.g. after a seek.
    pub fn reset(&mut self) {
        match &mut self.rate {
            RateStage::None => {}
            RateStage::Linear(rs) => rs.reset(),
            RateStage::Sinc(rs) => rs.reset(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s16_round_trips_through_f32() {
        let values: Vec<i16> = vec![0, 1, -1, 1000, -1000, i16::MAX, i16::MIN + 1];
        let mut bytes = Vec::new();
        for v in &values {
            bytes.extend_from_slice(&v.to_le_bytes());
        }

        let mut samples = Vec::new();
        decode_to_f32(SampleFormat::S16, &bytes, &mut samples);
        assert_eq!(samples.len(), values.len());

        let mut back = Vec::new();
        encode_from_f32(SampleFormat::S16, &samples, &mut back);
        for (i, v) in values.iter().enumerate() {
            let got = i16::from_le_bytes([back[i * 2], back[i * 2 + 1]]);
            assert!((got - v).abs() <= 1, "value {v} came back as {got}");
        }
    }

    #[test]
    fn s24_decode_handles_sign() {
        // -1 in packed 24-bit two's complement.
        let bytes = [0xFF, 0xFF, 0xFF];
        let mut samples = Vec::new();
        decode_to_f32(SampleFormat::S24, &bytes, &mut samples);
        assert!(samples[0] < 0.0 && samples[0] > -0.001);

        // Largest positive value.
        let bytes = [0xFF, 0xFF, 0x7F];
        let mut samples = Vec::new();
        decode_to_f32(SampleFormat::S24, &bytes, &mut samples);
        assert!((samples[0] - 1.0).abs() < 0.001);
    }

    #[test]
    fn u8_is_offset_binary() {
        let mut samples = Vec::new();
        decode_to_f32(SampleFormat::U8, &[128, 0, 255], &mut samples);
        assert!(samples[0].abs() < 0.01);
        assert!((samples[1] + 1.0).abs() < 0.01);
        assert!((samples[2] - 0.99).abs() < 0.02);
    }

    #[test]
    fn stereo_to_mono_averages() {
        let input = vec![0.5, -0.5, 1.0, 0.0];
        let mut out = Vec::new();
        mix_channels(&input, 2, 1, &mut out);
        assert_eq!(out, vec![0.0, 0.5]);
    }

    #[test]
    fn mono_to_stereo_duplicates() {
        let input = vec![0.25, -0.75];
        let mut out = Vec::new();
        mix_channels(&input, 1, 2, &mut out);
        assert_eq!(out, vec![0.25, 0.25, -0.75, -0.75]);
    }

    #[test]
    fn six_to_two_keeps_left_right_split() {
        // FL=1.0 with silence elsewhere must land only in the left output.
        let input = vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let mut out = Vec::new();
        mix_channels(&input, 6, 2, &mut out);
        assert!(out[0] > 0.0);
        assert_eq!(out[1], 0.0);
    }

    #[test]
    fn converter_rejects_invalid_layouts() {
        let ok = FrameLayout::new(SampleFormat::S16, 2, 48_000);
        let bad = FrameLayout::new(SampleFormat::S16, 0, 48_000);
        assert!(Converter::new(ok, bad, ResampleQuality::Linear).is_err());
        assert!(Converter::new(bad, ok, ResampleQuality::Linear).is_err());
    }

    #[test]
    fn converter_format_only_preserves_frame_count() {
        let src = FrameLayout::new(SampleFormat::S16, 2, 44_100);
        let dst = FrameLayout::new(SampleFormat::F32, 2, 44_100);
        let conv = Converter::new(src, dst, ResampleQuality::Linear).unwrap();

        let mut bytes = Vec::new();
        for i in 0..200i16 {
            bytes.extend_from_slice(&i.to_le_bytes());
        }
        let (out, frames) = conv.convert(&bytes).unwrap();
        assert_eq!(frames, 100);
        assert_eq!(out.len(), 100 * dst.bytes_per_frame());
    }

    #[test]
    fn converter_rate_change_is_monotone() {
        let src = FrameLayout::new(SampleFormat::F32, 1, 48_000);
        let dst = FrameLayout::new(SampleFormat::F32, 1, 44_100);
        let conv = Converter::new(src, dst, ResampleQuality::Linear).unwrap();

        let mut bytes = Vec::new();
        for i in 0..4800 {
            bytes.extend_from_slice(&((i as f32 * 0.001).sin()).to_le_bytes());
        }
        let (_, frames) = conv.convert(&bytes).unwrap();
        let expected = 4800u64 * 44_100 / 48_000;
        assert!(frames.abs_diff(expected) <= 1);
    }

    #[test]
    fn stream_converter_identity_passthrough() {
        let mut conv = StreamConverter::new(2, 48_000, 2, 48_000, ResampleQuality::Linear).unwrap();
        assert!(conv.is_identity());
        let input = vec![0.1, 0.2, 0.3, 0.4];
        let mut out = Vec::new();
        conv.process(&input, &mut out).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn stream_converter_mixes_then_resamples() {
        let mut conv = StreamConverter::new(2, 48_000, 1, 24_000, ResampleQuality::Linear).unwrap();
        let input: Vec<f32> = (0..960).map(|i| (i / 2) as f32).collect();
        let mut out = Vec::new();
        conv.process(&input, &mut out).unwrap();
        // 480 stereo frames -> 480 mono -> ~240 at half rate.
        assert!(out.len().abs_diff(240) <= 1, "got {}", out.len());
    }
}
