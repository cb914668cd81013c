//! Shared audio primitives: sample formats, frame layouts, PCM conversion and
//! the result-code surface exposed across the ABI.

mod convert;
mod error;
mod format;
mod resample;

pub use convert::{Converter, StreamConverter, decode_to_f32, encode_from_f32, mix_channels};
pub use error::{FormatError, ResultCode};
pub use format::{FrameLayout, ResampleQuality, SampleFormat};
pub use resample::{LinearResampler, SincResampler, resample_linear};
