use thiserror::Error;

use soundflow_core::{FormatError, ResultCode};

use crate::device::DeviceState;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("no matching device")]
    NoDevice,

    #[error("invalid device configuration: {0}")]
    InvalidConfig(String),

    #[error("operation not allowed in state {state:?}")]
    InvalidState { state: DeviceState },

    #[error("requested format is not supported by the endpoint")]
    FormatUnsupported,

    #[error("backend failure: {0}")]
    Backend(String),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("failed to query default stream config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to query stream configs: {0}")]
    StreamConfig(#[from] cpal::SupportedStreamConfigsError),

    #[error("failed to build stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("failed to stop stream: {0}")]
    PauseStream(#[from] cpal::PauseStreamError),

    #[error("failed to query devices: {0}")]
    Devices(#[from] cpal::DevicesError),
}

impl DeviceError {
    pub fn code(&self) -> ResultCode {
        match self {
            Self::NoDevice => ResultCode::NotFound,
            Self::InvalidConfig(_) => ResultCode::InvalidArgs,
            Self::InvalidState { .. } => ResultCode::InvalidState,
            Self::FormatUnsupported => ResultCode::FormatUnsupported,
            Self::Backend(_) => ResultCode::DeviceUnavailable,
            Self::Format(e) => e.code(),
            Self::DefaultConfig(_)
            | Self::StreamConfig(_)
            | Self::BuildStream(_)
            | Self::PlayStream(_)
            | Self::PauseStream(_)
            | Self::Devices(_) => ResultCode::DeviceUnavailable,
        }
    }
}
