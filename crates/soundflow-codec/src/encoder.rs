//! Push-style encoders. WAV goes through hound; `Raw` writes bare PCM.
//!
//! Closing finalizes the container; for WAV this patches the RIFF sizes, so
//! a missed close is a corruption hazard.

use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;

use tracing::debug;

use soundflow_core::{FrameLayout, SampleFormat, encode_from_f32};

use crate::error::CodecError;
use crate::registry::EncodingKind;

pub trait WriteSink: Write + Seek + Send {}

impl<T: Write + Seek + Send> WriteSink for T {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderConfig {
    pub kind: EncodingKind,
    pub layout: FrameLayout,
}

impl EncoderConfig {
    pub fn new(kind: EncodingKind, layout: FrameLayout) -> Self {
        Self { kind, layout }
    }
}

enum EncodeBackend {
    Wav(hound::WavWriter<Box<dyn WriteSink>>),
    Raw {
        sink: Box<dyn WriteSink>,
        byte_scratch: Vec<u8>,
    },
}

/// Append-only encoder; frames appear in the sink in write order.
pub struct Encoder {
    backend: EncodeBackend,
    layout: FrameLayout,
    frames_written: u64,
}

impl std::fmt::Debug for Encoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Encoder")
            .field(
                "backend",
                &match self.backend {
                    EncodeBackend::Wav(_) => "Wav",
                    EncodeBackend::Raw { .. } => "Raw",
                },
            )
            .field("layout", &self.layout)
            .field("frames_written", &self.frames_written)
            .finish()
    }
}


impl Encoder {
    /// Opens an encoder over an arbitrary sink. Container headers are written
    /// eagerly where the format requires them.
    pub fn open(sink: Box<dyn WriteSink>, config: &EncoderConfig) -> Result<Self, CodecError> {
        config.layout.validate()?;
        let backend = match config.kind {
            EncodingKind::Wav => {
                let spec = hound::WavSpec {
                    channels: config.layout.channels,
                    sample_rate: config.layout.sample_rate,
                    bits_per_sample: config.layout.format.bits_per_sample(),
                    sample_format: match config.layout.format {
                        SampleFormat::F32 => hound::SampleFormat::Float,
                        _ => hound::SampleFormat::Int,
                    },
                };
                EncodeBackend::Wav(hound::WavWriter::new(sink, spec)?)
            }
            EncodingKind::Raw => EncodeBackend::Raw {
                sink,
                byte_scratch: Vec::new(),
            },
            other => {
                return Err(CodecError::Unsupported(format!(
                    "no encoder for {other:?}"
                )));
            }
        };
        Ok(Self {
            backend,
            layout: config.layout,
            frames_written: 0,
        })
    }

    pub fn open_path(path: impl AsRef<Path>, config: &EncoderConfig) -> Result<Self, CodecError> {
        let file = BufWriter::new(File::create(path)?);
        Self::open(Box::new(file), config)
    }

    pub fn layout(&self) -> FrameLayout {
        self.layout
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Appends `frames` interleaved `f32` frames. Returns the count written;
    /// partial writes happen only on I/O backpressure.
    pub fn write(&mut self, samples: &[f32], frames: u64) -> Result<u64, CodecError> {
        let ch = self.layout.channels as usize;
        let n = (frames as usize).min(samples.len() / ch);
        let samples = &samples[..n * ch];

        match &mut self.backend {
            EncodeBackend::Wav(writer) => {
                for &s in samples {
                    let v = s.clamp(-1.0, 1.0);
                    match self.layout.format {
                        SampleFormat::U8 => writer.write_sample((v * 127.0) as i8)?,
                        SampleFormat::S16 => writer.write_sample((v * 32_767.0) as i16)?,
                        SampleFormat::S24 => writer.write_sample((v * 8_388_607.0) as i32)?,
                        SampleFormat::S32 => {
                            writer.write_sample((v as f64 * 2_147_483_647.0) as i32)?
                        }
                        SampleFormat::F32 => writer.write_sample(v)?,
                    }
                }
            }
            EncodeBackend::Raw { sink, byte_scratch } => {
                byte_scratch.clear();
                encode_from_f32(self.layout.format, samples, byte_scratch);
                match sink.write_all(byte_scratch) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        // Backpressure: report zero progress, the caller
                        // retries.
                        return Ok(0);
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }

        self.frames_written += n as u64;
        Ok(n as u64)
    }

    /// Finalizes the container and flushes the sink.
    pub fn close(self) -> Result<(), CodecError> {
        let frames = self.frames_written;
        match self.backend {
            EncodeBackend::Wav(writer) => writer.finalize()?,
            EncodeBackend::Raw { mut sink, .. } => sink.flush()?,
        }
        debug!(frames, "encoder closed");
        Ok(())
    }
}
