//! Encoder surface: `sf_encoder_*`.

use std::ffi::CStr;
use std::os::raw::c_char;
use std::ptr;

use soundflow_codec::{CodecRegistry, EncoderConfig, EncodingKind};
use soundflow_core::{FrameLayout, ResultCode, SampleFormat};

use crate::{alloc, guard, object_mut, Object, SfHandle};

#[no_mangle]
pub extern "C" fn sf_allocate_encoder() -> *mut SfHandle {
    alloc(Object::Encoder(None))
}

/// Allocates an encoder config. `encoding_kind` uses the registry tags
/// (1 wav, 2 flac, 3 mp3, 4 vorbis, 5 raw); the layout describes the frames
/// the caller will supply. Returns null on invalid tags.
#[no_mangle]
pub extern "C" fn sf_allocate_encoder_config(
    encoding_kind: u32,
    format: u32,
    channels: u32,
    sample_rate: u32,
) -> *mut SfHandle {
    let Some(kind) = EncodingKind::from_tag(encoding_kind) else {
        return ptr::null_mut();
    };
    let Ok(format) = SampleFormat::from_tag(format) else {
        return ptr::null_mut();
    };
    if channels == 0 || channels > u16::MAX as u32 || sample_rate == 0 {
        return ptr::null_mut();
    }
    let layout = FrameLayout::new(format, channels as u16, sample_rate);
    alloc(Object::EncoderConfig(EncoderConfig::new(kind, layout)))
}

/// # Safety
/// `encoder` is an unused encoder handle, `path` a NUL-terminated UTF-8
/// string, `config` an encoder config handle.
#[no_mangle]
pub unsafe extern "C" fn sf_encoder_init_file(
    encoder: *mut SfHandle,
    path: *const c_char,
    config: *const SfHandle,
) -> i32 {
    guard(|| {
        if path.is_null() {
            return ResultCode::InvalidArgs;
        }
        let Ok(path) = CStr::from_ptr(path).to_str() else {
            return ResultCode::InvalidArgs;
        };
        let cfg = match (config as *mut SfHandle).as_ref() {
            Some(handle) => match &handle.0 {
                Object::EncoderConfig(cfg) => cfg,
                _ => return ResultCode::InvalidArgs,
            },
            None => return ResultCode::InvalidArgs,
        };
        let Some(Object::Encoder(slot)) = object_mut(encoder) else {
            return ResultCode::InvalidArgs;
        };
        if slot.is_some() {
            return ResultCode::InvalidState;
        }
        match CodecRegistry::new().open_encoder_path(path, cfg) {
            Ok(opened) => {
                *slot = Some(opened);
                ResultCode::Success
            }
            Err(e) => e.code(),
        }
    })
}

/// Consumes `frame_count` frames of interleaved `f32` from `frames`.
///
/// # Safety
/// `frames` must hold `frame_count * channels` floats.
#[no_mangle]
pub unsafe extern "C" fn sf_encoder_write_pcm_frames(
    encoder: *mut SfHandle,
    frames: *const f32,
    frame_count: u64,
    frames_written: *mut u64,
) -> i32 {
    guard(|| {
        if let Some(out) = frames_written.as_mut() {
            *out = 0;
        }
        let Some(Object::Encoder(Some(enc))) = object_mut(encoder) else {
            return ResultCode::InvalidArgs;
        };
        if frame_count == 0 {
            return ResultCode::Success;
        }
        if frames.is_null() {
            return ResultCode::InvalidArgs;
        }
        let channels = enc.layout().channels as usize;
        let samples = std::slice::from_raw_parts(frames, frame_count as usize * channels);
        match enc.write(samples, frame_count) {
            Ok(written) => {
                if let Some(out) = frames_written.as_mut() {
                    *out = written;
                }
                ResultCode::Success
            }
            Err(e) => e.code(),
        }
    })
}

/// Finalizes the container (for WAV, patches the RIFF sizes) and closes the
/// sink. The handle stays allocated until `sf_free`.
#[no_mangle]
pub unsafe extern "C" fn sf_encoder_uninit(encoder: *mut SfHandle) -> i32 {
    guard(|| {
        let Some(Object::Encoder(slot)) = object_mut(encoder) else {
            return ResultCode::InvalidArgs;
        };
        match slot.take() {
            Some(enc) => match enc.close() {
                Ok(()) => ResultCode::Success,
                Err(e) => e.code(),
            },
            None => ResultCode::Success,
        }
    })
}
