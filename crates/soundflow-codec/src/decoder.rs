//! Pull-style decoder with sample-accurate seeking.

use tracing::debug;

use soundflow_core::{FrameLayout, ResampleQuality, SampleFormat, StreamConverter};

use crate::error::CodecError;

// Native frames pulled from the source per refill pass.
const READ_CHUNK_FRAMES: usize = 1024;

/// Capability set every codec source implements: layout, read, seek, total.
///
/// Sources produce interleaved `f32` frames at their native channel count and
/// rate. `seek` lands at or before the requested frame (a preceding sync
/// point for VBR codecs) and reports where it landed; the [`Decoder`]
/// discards the difference so the next read starts at the requested frame
/// regardless of codec mechanics.
pub(crate) trait DecodeSource: Send {
    fn channels(&self) -> u16;
    fn sample_rate(&self) -> u32;
    fn total_frames(&self) -> Option<u64>;
    fn seekable(&self) -> bool;
    /// Appends up to `max_frames` frames to `out`; returns the frame count.
    /// Zero frames means end of stream.
    fn read(&mut self, out: &mut Vec<f32>, max_frames: usize) -> Result<usize, CodecError>;
    /// Seeks to at most `frame`, returning the frame actually landed on.
    fn seek(&mut self, frame: u64) -> Result<u64, CodecError>;
}

/// Output layout requested by the caller; absent fields follow the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderConfig {
    pub format: SampleFormat,
    pub channels: u16,
    pub sample_rate: u32,
    pub quality: ResampleQuality,
}

impl DecoderConfig {
    pub fn new(format: SampleFormat, channels: u16, sample_rate: u32) -> Self {
        Self {
            format,
            channels,
            sample_rate,
            quality: ResampleQuality::default(),
        }
    }
}

/// A decoder bound to one source, producing interleaved `f32` frames in its
/// output layout. The cursor is in output-rate frames.
pub struct Decoder {
    source: Box<dyn DecodeSource>,
    convert: Option<StreamConverter>,
    output: FrameLayout,
    // Converted samples waiting to be handed out.
    pending: Vec<f32>,
    native_scratch: Vec<f32>,
    cursor: u64,
    source_eof: bool,
    drained: bool,
}

impl Decoder {
    pub(crate) fn from_source(
        source: Box<dyn DecodeSource>,
        config: Option<&DecoderConfig>,
    ) -> Result<Self, CodecError> {
        let native = FrameLayout::new(SampleFormat::F32, source.channels(), source.sample_rate());
        let output = match config {
            Some(cfg) => {
                let layout = FrameLayout::new(cfg.format, cfg.channels, cfg.sample_rate);
                layout.validate()?;
                layout
            }
            None => native,
        };

        let convert = if output.channels == native.channels
            && output.sample_rate == native.sample_rate
        {
            None
        } else {
            let quality = config.map(|c| c.quality).unwrap_or_default();
            Some(StreamConverter::new(
                native.channels,
                native.sample_rate,
                output.channels,
                output.sample_rate,
                quality,
            )?)
        };

        Ok(Self {
            source,
            convert,
            output,
            pending: Vec::new(),
            native_scratch: Vec::new(),
            cursor: 0,
            source_eof: false,
            drained: false,
        })
    }

    /// The layout frames are produced in.
    pub fn output_layout(&self) -> FrameLayout {
        self.output
    }

    /// Current position in output-rate frames.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Total length in output-rate frames, when the container reports one.
    pub fn total_frames(&self) -> Option<u64> {
        let native = self.source.total_frames()?;
        let src_rate = self.source.sample_rate() as u64;
        let dst_rate = self.output.sample_rate as u64;
        Some(native * dst_rate / src_rate)
    }

    /// Fills `out` with up to `max_frames` interleaved frames.
    ///
    /// Returns fewer than requested only at end of stream; advances the
    /// cursor by the count returned.
    pub fn read(&mut self, out: &mut [f32], max_frames: usize) -> Result<usize, CodecError> {
        let ch = self.output.channels as usize;
        let want = max_frames.min(out.len() / ch) * ch;

        while self.pending.len() < want && !self.drained {
            self.refill()?;
        }

        let take = want.min(self.pending.len() / ch * ch);
        out[..take].copy_from_slice(&self.pending[..take]);
        self.pending.drain(..take);
        let frames = take / ch;
        self.cursor += frames as u64;
        Ok(frames)
    }

    fn refill(&mut self) -> Result<(), CodecError> {
        if self.source_eof {
            if let Some(conv) = &mut self.convert {
                conv.finish(&mut self.pending)?;
            }
            self.drained = true;
            return Ok(());
        }

        self.native_scratch.clear();
        let frames = self
            .source
            .read(&mut self.native_scratch, READ_CHUNK_FRAMES)?;
        if frames == 0 {
            self.source_eof = true;
            return Ok(());
        }

        match &mut self.convert {
            Some(conv) => conv.process(&self.native_scratch, &mut self.pending)?,
            None => self.pending.extend_from_slice(&self.native_scratch),
        }
        Ok(())
    }

    /// Moves the cursor to `index` (output-rate frames).
    ///
    /// Fails with `OutOfRange` beyond a known end; the cursor is unchanged on
    /// any failure. The source may land on a preceding sync point, in which
    /// case the gap is decoded and discarded so the next read starts exactly
    /// at `index`.
    pub fn seek_to_frame(&mut self, index: u64) -> Result<(), CodecError> {
        if !self.source.seekable() {
            return Err(CodecError::NotSeekable);
        }
        if let Some(total) = self.total_frames() {
            if index > total {
                return Err(CodecError::OutOfRange {
                    frame: index,
                    total,
                });
            }
        }

        let src_rate = self.source.sample_rate() as u64;
        let dst_rate = self.output.sample_rate as u64;
        let native_target = if src_rate == dst_rate {
            index
        } else {
            (index as f64 * src_rate as f64 / dst_rate as f64).round() as u64
        };

        let landed = self.source.seek(native_target)?;

        // Only mutate decoder state once the source seek has succeeded.
        self.pending.clear();
        if let Some(conv) = &mut self.convert {
            conv.reset();
        }
        self.source_eof = false;
        self.drained = false;

        let mut to_discard = native_target.saturating_sub(landed);
        if to_discard > 0 {
            debug!(index, landed, to_discard, "discarding frames after sync-point seek");
        }
        while to_discard > 0 {
            self.native_scratch.clear();
            let step = to_discard.min(READ_CHUNK_FRAMES as u64) as usize;
            let got = self.source.read(&mut self.native_scratch, step)?;
            if got == 0 {
                break;
            }
            to_discard -= got as u64;
        }

        self.cursor = index;
        Ok(())
    }

    /// Seeks to `round(seconds * output_rate)` frames.
    pub fn seek_to_time(&mut self, seconds: f64) -> Result<(), CodecError> {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(CodecError::InvalidArgs(format!(
                "seek time must be non-negative, got {seconds}"
            )));
        }
        let frame = (seconds * self.output.sample_rate as f64).round() as u64;
        self.seek_to_frame(frame)
    }
}
