//! Context, device and enumeration surface: `sf_context_*`, `sf_device_*`,
//! `sf_get_devices`.

use std::ffi::CStr;
use std::os::raw::{c_char, c_void};
use std::ptr;

use tracing::{debug, warn};

use soundflow_core::{FrameLayout, ResultCode, SampleFormat};
use soundflow_device::{
    BackendKind, Context, DataCallback, Device, DeviceConfig, DeviceId, DeviceInfo,
    LoopbackBackend, PerformanceProfile, ShareMode,
};

use crate::{alloc, guard, object_mut, Object, SfHandle};

/// Real-time data callback. `output`/`input` are null for directions the
/// device does not serve; the return value is the number of output frames
/// written (shortfall is silenced and counted as an underrun).
pub type SfDataCallback = unsafe extern "C" fn(
    user_data: *mut c_void,
    output: *mut f32,
    input: *const f32,
    frame_count: u32,
) -> u32;

struct CallbackShim {
    callback: SfDataCallback,
    user_data: *mut c_void,
}

// The host promises its callback and user data are usable from the audio
// thread; that is the same contract the C API documents.
unsafe impl Send for CallbackShim {}

impl DataCallback for CallbackShim {
    fn on_data(
        &mut self,
        output: Option<&mut [f32]>,
        input: Option<&[f32]>,
        frames: usize,
    ) -> usize {
        let out_ptr = output.map_or(ptr::null_mut(), |o| o.as_mut_ptr());
        let in_ptr = input.map_or(ptr::null(), |i| i.as_ptr());
        unsafe { (self.callback)(self.user_data, out_ptr, in_ptr, frames as u32) as usize }
    }
}

pub(crate) struct DeviceConfigBlock {
    config: DeviceConfig,
    callback: SfDataCallback,
    user_data: *mut c_void,
}

#[no_mangle]
pub extern "C" fn sf_allocate_context() -> *mut SfHandle {
    alloc(Object::Context(None))
}

/// Binds a backend to the context: 0 selects the host audio API (cpal),
/// 1 the software loopback backend.
#[no_mangle]
pub unsafe extern "C" fn sf_context_init(context: *mut SfHandle, backend_kind: u32) -> i32 {
    guard(|| {
        let kind = match backend_kind {
            0 => BackendKind::Cpal,
            1 => BackendKind::Loopback(LoopbackBackend::default()),
            _ => return ResultCode::InvalidArgs,
        };
        let Some(Object::Context(slot)) = object_mut(context) else {
            return ResultCode::InvalidArgs;
        };
        if slot.is_some() {
            return ResultCode::InvalidState;
        }
        let ctx = Context::new(kind);
        debug!(backend = ctx.backend_name(), "context initialized");
        *slot = Some(ctx);
        ResultCode::Success
    })
}

#[no_mangle]
pub extern "C" fn sf_allocate_device() -> *mut SfHandle {
    alloc(Object::Device(None))
}

unsafe fn id_from_ptr(ptr: *const c_char) -> Result<Option<DeviceId>, ResultCode> {
    if ptr.is_null() {
        return Ok(None);
    }
    match CStr::from_ptr(ptr).to_str() {
        Ok(s) => Ok(Some(DeviceId::from(s))),
        Err(_) => Err(ResultCode::InvalidArgs),
    }
}

/// Allocates a device config. `device_type`: 0 playback, 1 capture,
/// 2 duplex; the layout applies to both directions. Endpoint ids are
/// optional; null selects the default endpoint.
///
/// # Safety
/// `playback_id`/`capture_id` are null or NUL-terminated UTF-8 strings;
/// `data_callback` must stay callable for the life of devices built from
/// this config.
#[no_mangle]
pub unsafe extern "C" fn sf_allocate_device_config(
    device_type: u32,
    format: u32,
    channels: u32,
    sample_rate: u32,
    data_callback: Option<SfDataCallback>,
    user_data: *mut c_void,
    playback_id: *const c_char,
    capture_id: *const c_char,
) -> *mut SfHandle {
    let Some(callback) = data_callback else {
        return ptr::null_mut();
    };
    let Ok(format) = SampleFormat::from_tag(format) else {
        return ptr::null_mut();
    };
    if channels == 0 || channels > u16::MAX as u32 || sample_rate == 0 {
        return ptr::null_mut();
    }
    let layout = FrameLayout::new(format, channels as u16, sample_rate);
    let mut config = match device_type {
        0 => DeviceConfig::playback(layout),
        1 => DeviceConfig::capture(layout),
        2 => DeviceConfig::duplex(layout, layout),
        _ => return ptr::null_mut(),
    };
    let (Ok(playback_dev), Ok(capture_dev)) = (id_from_ptr(playback_id), id_from_ptr(capture_id))
    else {
        return ptr::null_mut();
    };
    config.playback_device = playback_dev;
    config.capture_device = capture_dev;

    alloc(Object::DeviceConfig(DeviceConfigBlock {
        config,
        callback,
        user_data,
    }))
}

/// Performance profile: 0 low latency, 1 conservative.
#[no_mangle]
pub unsafe extern "C" fn sf_device_config_set_profile(config: *mut SfHandle, profile: u32) -> i32 {
    guard(|| {
        let Some(Object::DeviceConfig(block)) = object_mut(config) else {
            return ResultCode::InvalidArgs;
        };
        block.config.profile = match profile {
            0 => PerformanceProfile::LowLatency,
            1 => PerformanceProfile::Conservative,
            _ => return ResultCode::InvalidArgs,
        };
        ResultCode::Success
    })
}

/// Share mode: 0 shared, 1 exclusive.
#[no_mangle]
pub unsafe extern "C" fn sf_device_config_set_share_mode(config: *mut SfHandle, mode: u32) -> i32 {
    guard(|| {
        let Some(Object::DeviceConfig(block)) = object_mut(config) else {
            return ResultCode::InvalidArgs;
        };
        block.config.share_mode = match mode {
            0 => ShareMode::Shared,
            1 => ShareMode::Exclusive,
            _ => return ResultCode::InvalidArgs,
        };
        ResultCode::Success
    })
}

/// Opens the backend stream described by `config` on `context`; the device
/// comes up stopped.
#[no_mangle]
pub unsafe extern "C" fn sf_device_init(
    device: *mut SfHandle,
    context: *mut SfHandle,
    config: *const SfHandle,
) -> i32 {
    guard(|| {
        let ctx = match object_mut(context) {
            Some(Object::Context(Some(ctx))) => ctx.clone(),
            _ => return ResultCode::InvalidArgs,
        };
        let (cfg, shim) = match (config as *mut SfHandle).as_ref() {
            Some(handle) => match &handle.0 {
                Object::DeviceConfig(block) => (
                    block.config.clone(),
                    CallbackShim {
                        callback: block.callback,
                        user_data: block.user_data,
                    },
                ),
                _ => return ResultCode::InvalidArgs,
            },
            None => return ResultCode::InvalidArgs,
        };
        let Some(Object::Device(slot)) = object_mut(device) else {
            return ResultCode::InvalidArgs;
        };
        if slot.is_some() {
            return ResultCode::InvalidState;
        }
        match Device::init(ctx, cfg, shim) {
            Ok(opened) => {
                debug!(direction = ?opened.direction(), "device initialized");
                *slot = Some(opened);
                ResultCode::Success
            }
            Err(e) => {
                warn!(error = %e, "device init failed");
                e.code()
            }
        }
    })
}

#[no_mangle]
pub unsafe extern "C" fn sf_device_start(device: *mut SfHandle) -> i32 {
    guard(|| {
        let Some(Object::Device(Some(dev))) = object_mut(device) else {
            return ResultCode::InvalidArgs;
        };
        match dev.start() {
            Ok(()) => ResultCode::Success,
            Err(e) => e.code(),
        }
    })
}

#[no_mangle]
pub unsafe extern "C" fn sf_device_stop(device: *mut SfHandle) -> i32 {
    guard(|| {
        let Some(Object::Device(Some(dev))) = object_mut(device) else {
            return ResultCode::InvalidArgs;
        };
        match dev.stop() {
            Ok(()) => ResultCode::Success,
            Err(e) => e.code(),
        }
    })
}

/// Releases the stream. Fails with `InvalidState` while started.
#[no_mangle]
pub unsafe extern "C" fn sf_device_uninit(device: *mut SfHandle) -> i32 {
    guard(|| {
        let Some(Object::Device(slot)) = object_mut(device) else {
            return ResultCode::InvalidArgs;
        };
        match slot.as_mut() {
            Some(dev) => match dev.uninit() {
                Ok(()) => {
                    *slot = None;
                    ResultCode::Success
                }
                Err(e) => e.code(),
            },
            None => ResultCode::Success,
        }
    })
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct SfNativeDataFormat {
    pub format: u32,
    pub channels: u32,
    pub sample_rate: u32,
    pub flags: u32,
}

#[repr(C)]
pub struct SfDeviceInfo {
    pub id: [c_char; 256],
    pub name: [c_char; 256],
    pub is_default: u32,
    pub native_data_format_count: u32,
    pub native_data_formats: *mut SfNativeDataFormat,
}

fn copy_str(dst: &mut [c_char; 256], s: &str) {
    let mut end = s.len().min(255);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    for (dst, src) in dst.iter_mut().zip(s.as_bytes()[..end].iter()) {
        *dst = *src as c_char;
    }
    dst[end] = 0;
}

fn marshal_infos(infos: Vec<DeviceInfo>) -> (*mut SfDeviceInfo, u32) {
    let mut out = Vec::with_capacity(infos.len());
    for info in infos {
        let formats: Box<[SfNativeDataFormat]> = info
            .native_data_formats
            .iter()
            .map(|f| SfNativeDataFormat {
                format: f.format.tag(),
                channels: f.channels as u32,
                sample_rate: f.sample_rate,
                flags: f.flags,
            })
            .collect();
        let native_data_format_count = formats.len() as u32;
        let native_data_formats = Box::into_raw(formats) as *mut SfNativeDataFormat;

        let mut entry = SfDeviceInfo {
            id: [0; 256],
            name: [0; 256],
            is_default: info.is_default as u32,
            native_data_format_count,
            native_data_formats,
        };
        copy_str(&mut entry.id, info.id.as_str());
        copy_str(&mut entry.name, &info.name);
        out.push(entry);
    }
    let count = out.len() as u32;
    let boxed = out.into_boxed_slice();
    (Box::into_raw(boxed) as *mut SfDeviceInfo, count)
}

unsafe fn release_infos(ptr: *mut SfDeviceInfo, count: u32) {
    if ptr.is_null() {
        return;
    }
    let slice = std::slice::from_raw_parts_mut(ptr, count as usize);
    for entry in slice.iter_mut() {
        if !entry.native_data_formats.is_null() {
            drop(Box::from_raw(std::slice::from_raw_parts_mut(
                entry.native_data_formats,
                entry.native_data_format_count as usize,
            ) as *mut [SfNativeDataFormat]));
            entry.native_data_formats = ptr::null_mut();
        }
    }
    drop(Box::from_raw(slice as *mut [SfDeviceInfo]));
}

/// Captures both enumeration directions in one logical snapshot. Arrays are
/// owned copies; release them with [`sf_free_device_infos`].
///
/// # Safety
/// All four output pointers must be valid.
#[no_mangle]
pub unsafe extern "C" fn sf_get_devices(
    context: *mut SfHandle,
    playback: *mut *mut SfDeviceInfo,
    playback_count: *mut u32,
    capture: *mut *mut SfDeviceInfo,
    capture_count: *mut u32,
) -> i32 {
    guard(|| {
        if playback.is_null() || playback_count.is_null() || capture.is_null()
            || capture_count.is_null()
        {
            return ResultCode::InvalidArgs;
        }
        *playback = ptr::null_mut();
        *playback_count = 0;
        *capture = ptr::null_mut();
        *capture_count = 0;

        let ctx = match object_mut(context) {
            Some(Object::Context(Some(ctx))) => ctx,
            _ => return ResultCode::InvalidArgs,
        };
        let snapshot = match ctx.get_devices() {
            Ok(snapshot) => snapshot,
            Err(e) => return e.code(),
        };
        debug!(
            playback = snapshot.playback.len(),
            capture = snapshot.capture.len(),
            "enumerated devices"
        );
        let (play_ptr, play_count) = marshal_infos(snapshot.playback);
        let (cap_ptr, cap_count) = marshal_infos(snapshot.capture);
        *playback = play_ptr;
        *playback_count = play_count;
        *capture = cap_ptr;
        *capture_count = cap_count;
        ResultCode::Success
    })
}

/// Releases both arrays from one `sf_get_devices` call, nested format
/// tables included.
///
/// # Safety
/// The pointers and counts must come unmodified from `sf_get_devices`.
#[no_mangle]
pub unsafe extern "C" fn sf_free_device_infos(
    playback: *mut SfDeviceInfo,
    playback_count: u32,
    capture: *mut SfDeviceInfo,
    capture_count: u32,
) {
    release_infos(playback, playback_count);
    release_infos(capture, capture_count);
}
