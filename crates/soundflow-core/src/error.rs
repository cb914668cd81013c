use thiserror::Error;

/// Fixed integer result codes crossing the ABI.
///
/// `Success` is zero, everything else is negative so foreign callers can test
/// with a plain sign check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[repr(i32)]
pub enum ResultCode {
    Success = 0,
    Unknown = -1,
    InvalidArgs = -2,
    InvalidState = -3,
    OutOfMemory = -4,
    OutOfRange = -5,
    NotFound = -7,
    DeviceUnavailable = -10,
    FormatUnsupported = -11,
    IoError = -13,
}

impl ResultCode {
    pub fn is_success(self) -> bool {
        self == Self::Success
    }

    pub fn from_i32(value: i32) -> Self {
        match value {
            0 => Self::Success,
            -2 => Self::InvalidArgs,
            -3 => Self::InvalidState,
            -4 => Self::OutOfMemory,
            -5 => Self::OutOfRange,
            -7 => Self::NotFound,
            -10 => Self::DeviceUnavailable,
            -11 => Self::FormatUnsupported,
            -13 => Self::IoError,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum FormatError {
    #[error("invalid frame layout: channels={channels} sample_rate={sample_rate}")]
    InvalidLayout { channels: u16, sample_rate: u32 },

    #[error("unknown sample format tag: {0}")]
    UnknownFormat(u32),

    #[error("resampler failure: {0}")]
    Resample(String),
}

impl FormatError {
    pub fn code(&self) -> ResultCode {
        match self {
            Self::InvalidLayout { .. } | Self::UnknownFormat(_) => ResultCode::InvalidArgs,
            Self::Resample(_) => ResultCode::Unknown,
        }
    }
}
