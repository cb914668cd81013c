use std::sync::Arc;

use tracing::debug;

use crate::backend::{DeviceBackend, DeviceInfo, Direction};
use crate::cpal_backend::CpalBackend;
use crate::error::DeviceError;
use crate::loopback::LoopbackBackend;

/// Backend selection at context creation.
#[derive(Debug, Clone, Copy, Default)]
pub enum BackendKind {
    #[default]
    Cpal,
    Loopback(LoopbackBackend),
}

/// Playback and capture endpoints captured in a single enumeration pass.
#[derive(Debug, Clone, Default)]
pub struct DeviceSnapshot {
    pub playback: Vec<DeviceInfo>,
    pub capture: Vec<DeviceInfo>,
}

/// Owns the backend. Shared via `Arc` across every device opened against
/// it, so the backend outlives all of its streams.
pub struct Context {
    backend: Box<dyn DeviceBackend>,
}

impl Context {
    pub fn new(kind: BackendKind) -> Arc<Self> {
        let backend: Box<dyn DeviceBackend> = match kind {
            BackendKind::Cpal => Box::new(CpalBackend::new()),
            BackendKind::Loopback(loopback) => Box::new(loopback),
        };
        debug!(backend = backend.name(), "context created");
        Arc::new(Self { backend })
    }

    #[cfg(test)]
    pub(crate) fn with_backend(backend: Box<dyn DeviceBackend>) -> Arc<Self> {
        Arc::new(Self { backend })
    }

    pub fn backend(&self) -> &dyn DeviceBackend {
        self.backend.as_ref()
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Enumerates both directions into one owned snapshot. The result stays
    /// valid after devices appear or disappear; identifiers in it may simply
    /// stop resolving.
    pub fn get_devices(&self) -> Result<DeviceSnapshot, DeviceError> {
        Ok(DeviceSnapshot {
            playback: self.backend.list_endpoints(Direction::Playback)?,
            capture: self.backend.list_endpoints(Direction::Capture)?,
        })
    }
}
