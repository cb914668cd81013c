//! Codec registry, pull decoders and push encoders.
//!
//! Decoders produce interleaved `f32` frames with sample-accurate seeking;
//! encoders accept interleaved `f32` frames and finalize their container on
//! close. Compressed formats go through symphonia, WAV encoding through
//! hound, and `Raw` moves bare PCM in a caller-supplied layout.

mod decoder;
mod encoder;
mod error;
mod io;
mod raw;
mod registry;
mod symphonia_source;

pub use decoder::{Decoder, DecoderConfig};
pub use encoder::{Encoder, EncoderConfig, WriteSink};
pub use error::CodecError;
pub use io::{ByteStream, MediaInput};
pub use registry::{CodecRegistry, EncodingKind};
