//! C ABI facade over the soundflow runtime.
//!
//! Every `sf_allocate_*` call produces one opaque handle released by exactly
//! one [`sf_free`]; composite outputs (`sf_get_devices`) have their own
//! release call. No panic crosses the boundary; failures map onto the
//! `ResultCode` integers from `soundflow_core`.

mod decoder;
mod device;
mod encoder;
mod log;

pub use decoder::*;
pub use device::*;
pub use encoder::*;
pub use log::*;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use soundflow_codec::{Decoder, DecoderConfig, Encoder, EncoderConfig};
use soundflow_core::ResultCode;
use soundflow_device::{Context, Device};

use crate::device::DeviceConfigBlock;

static LIVE_HANDLES: AtomicU64 = AtomicU64::new(0);

pub(crate) enum Object {
    Context(Option<Arc<Context>>),
    Device(Option<Device>),
    Decoder(Option<Decoder>),
    Encoder(Option<Encoder>),
    DecoderConfig(DecoderConfig),
    EncoderConfig(EncoderConfig),
    DeviceConfig(DeviceConfigBlock),
}

/// Opaque handle. Hosts treat it as `void*`; the tag inside routes each
/// `sf_*` call to the right object and rejects mismatched handles.
pub struct SfHandle(pub(crate) Object);

pub(crate) fn alloc(object: Object) -> *mut SfHandle {
    LIVE_HANDLES.fetch_add(1, Ordering::SeqCst);
    Box::into_raw(Box::new(SfHandle(object)))
}

pub(crate) unsafe fn object_mut<'a>(ptr: *mut SfHandle) -> Option<&'a mut Object> {
    ptr.as_mut().map(|h| &mut h.0)
}

/// Runs an ABI entry point, translating panics into `Unknown`.
pub(crate) fn guard(f: impl FnOnce() -> ResultCode) -> i32 {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(code) => code as i32,
        Err(_) => ResultCode::Unknown as i32,
    }
}

/// Handles still alive in this process. Lets embedding hosts assert
/// allocate/release pairing in their teardown paths.
#[no_mangle]
pub extern "C" fn sf_live_handle_count() -> u64 {
    LIVE_HANDLES.load(Ordering::SeqCst)
}

/// Releases a handle produced by any `sf_allocate_*` call. A started device
/// is stopped first; a null pointer is ignored.
///
/// # Safety
/// `ptr` must be a handle returned by this library, not yet freed.
#[no_mangle]
pub unsafe extern "C" fn sf_free(ptr: *mut SfHandle) {
    if ptr.is_null() {
        return;
    }
    drop(Box::from_raw(ptr));
    LIVE_HANDLES.fetch_sub(1, Ordering::SeqCst);
}
