//! Backend abstraction over host audio APIs.
//!
//! The trait is object-safe and uses boxed closures for the data path so
//! backends can be selected at runtime behind a `Box<dyn DeviceBackend>`.

use serde::{Deserialize, Serialize};

use soundflow_core::{FrameLayout, SampleFormat};

use crate::device::{PerformanceProfile, ShareMode};
use crate::error::DeviceError;

/// Endpoint flag: the device can be opened in exclusive share mode.
pub const NATIVE_FORMAT_FLAG_EXCLUSIVE: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Playback,
    Capture,
    Duplex,
}

impl Direction {
    pub fn has_playback(self) -> bool {
        matches!(self, Self::Playback | Self::Duplex)
    }

    pub fn has_capture(self) -> bool {
        matches!(self, Self::Capture | Self::Duplex)
    }
}

/// Opaque endpoint identifier; only meaningful within the process lifetime
/// of the context that enumerated it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(pub(crate) String);

impl DeviceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// One PCM layout an endpoint supports natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeDataFormat {
    pub format: SampleFormat,
    pub channels: u16,
    pub sample_rate: u32,
    pub flags: u32,
}

/// Enumeration snapshot entry. Names are copied out of the backend; nothing
/// here points into backend-owned storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: DeviceId,
    pub name: String,
    pub is_default: bool,
    pub native_data_formats: Vec<NativeDataFormat>,
}

/// Per-direction stream request.
pub struct StreamSide {
    pub layout: FrameLayout,
    pub device: Option<DeviceId>,
}

/// Everything a backend needs to open a stream.
///
/// The data closures run on the backend's real-time thread and must stay
/// wait-free; the error closure may be called from any backend thread.
pub struct OpenStreamArgs {
    pub direction: Direction,
    pub playback: Option<StreamSide>,
    pub capture: Option<StreamSide>,
    pub share_mode: ShareMode,
    pub profile: PerformanceProfile,
    /// When false the backend must fail with `FormatUnsupported` instead of
    /// inserting a conversion stage.
    pub allow_conversion: bool,
    pub on_output: Option<Box<dyn FnMut(&mut [f32]) + Send>>,
    pub on_input: Option<Box<dyn FnMut(&[f32]) + Send>>,
    pub on_error: Box<dyn Fn(String) + Send + Sync>,
}

/// An open backend stream. Dropping the stream closes it.
pub trait BackendStream {
    fn start(&mut self) -> Result<(), DeviceError>;

    /// Stops the stream, returning only after the final data callback has
    /// completed (drain semantics).
    fn stop(&mut self) -> Result<(), DeviceError>;

    /// Reported end-to-end latency in frames at the stream's rate.
    fn latency_frames(&self) -> u64;
}

pub trait DeviceBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn list_endpoints(&self, direction: Direction) -> Result<Vec<DeviceInfo>, DeviceError>;

    fn open_stream(&self, args: OpenStreamArgs) -> Result<Box<dyn BackendStream>, DeviceError>;
}
