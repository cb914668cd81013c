//! Audio endpoint enumeration and the duplex device runtime.
//!
//! A [`Context`] owns one [`backend::DeviceBackend`] (cpal against the host
//! OS, or the deterministic loopback backend) and is shared, reference
//! counted, across open devices. A [`Device`] drives a real-time data
//! callback through the backend's stream, moving capture data to the
//! callback over an SPSC ring buffer and accounting glitches in atomic
//! counters.

pub mod backend;
mod context;
mod cpal_backend;
mod device;
mod error;
mod loopback;
mod ring_buffer;

pub use backend::{
    BackendStream, DeviceBackend, DeviceId, DeviceInfo, Direction, NativeDataFormat,
    OpenStreamArgs, StreamSide, NATIVE_FORMAT_FLAG_EXCLUSIVE,
};
pub use context::{BackendKind, Context, DeviceSnapshot};
pub use cpal_backend::CpalBackend;
pub use device::{
    DataCallback, Device, DeviceConfig, DeviceMetrics, DeviceState, PerformanceProfile, ShareMode,
};
pub use error::DeviceError;
pub use loopback::LoopbackBackend;
