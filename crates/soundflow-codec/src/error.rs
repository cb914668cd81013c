use std::io;

use symphonia::core::errors::Error as SymphoniaError;
use thiserror::Error;

use soundflow_core::{FormatError, ResultCode};

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid argument: {0}")]
    InvalidArgs(String),

    #[error("seek target out of range: frame {frame}, total {total}")]
    OutOfRange { frame: u64, total: u64 },

    #[error("source is not seekable")]
    NotSeekable,

    #[error("unsupported encoding: {0}")]
    Unsupported(String),

    #[error("missing audio track")]
    MissingTrack,

    #[error("missing sample rate in codec parameters")]
    MissingSampleRate,

    #[error("missing channel description in codec parameters")]
    MissingChannels,

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("decoder error: {0}")]
    Symphonia(#[from] SymphoniaError),

    #[error("encoder error: {0}")]
    Hound(#[from] hound::Error),
}

impl CodecError {
    pub fn code(&self) -> ResultCode {
        match self {
            Self::Io(_) | Self::Hound(_) => ResultCode::IoError,
            Self::InvalidArgs(_) => ResultCode::InvalidArgs,
            Self::OutOfRange { .. } => ResultCode::OutOfRange,
            Self::NotSeekable => ResultCode::InvalidState,
            Self::Unsupported(_) => ResultCode::FormatUnsupported,
            Self::MissingTrack | Self::MissingSampleRate | Self::MissingChannels => {
                ResultCode::FormatUnsupported
            }
            Self::Format(e) => e.code(),
            Self::Symphonia(SymphoniaError::IoError(_)) => ResultCode::IoError,
            Self::Symphonia(SymphoniaError::Unsupported(_)) => ResultCode::FormatUnsupported,
            Self::Symphonia(_) => ResultCode::Unknown,
        }
    }
}
