//! Decoder surface: `sf_decoder_*`.

use std::ffi::CStr;
use std::os::raw::c_char;
use std::ptr;

use soundflow_codec::{CodecRegistry, DecoderConfig, MediaInput};
use soundflow_core::{ResampleQuality, ResultCode, SampleFormat};

use crate::{alloc, guard, object_mut, Object, SfHandle};

#[no_mangle]
pub extern "C" fn sf_allocate_decoder() -> *mut SfHandle {
    alloc(Object::Decoder(None))
}

/// Allocates a decoder output config. Returns null on an invalid format tag,
/// zero channels or zero sample rate.
#[no_mangle]
pub extern "C" fn sf_allocate_decoder_config(
    format: u32,
    channels: u32,
    sample_rate: u32,
) -> *mut SfHandle {
    let Ok(format) = SampleFormat::from_tag(format) else {
        return ptr::null_mut();
    };
    if channels == 0 || channels > u16::MAX as u32 || sample_rate == 0 {
        return ptr::null_mut();
    }
    alloc(Object::DecoderConfig(DecoderConfig::new(
        format,
        channels as u16,
        sample_rate,
    )))
}

/// Resample quality for the config: 0 linear, 1 sinc.
#[no_mangle]
pub unsafe extern "C" fn sf_decoder_config_set_quality(
    config: *mut SfHandle,
    quality: u32,
) -> i32 {
    guard(|| {
        let Some(Object::DecoderConfig(cfg)) = object_mut(config) else {
            return ResultCode::InvalidArgs;
        };
        cfg.quality = match quality {
            0 => ResampleQuality::Linear,
            1 => ResampleQuality::Sinc,
            _ => return ResultCode::InvalidArgs,
        };
        ResultCode::Success
    })
}

/// # Safety
/// `decoder` is an unused decoder handle, `path` a NUL-terminated UTF-8
/// string, `config` null or a decoder config handle.
#[no_mangle]
pub unsafe extern "C" fn sf_decoder_init_file(
    decoder: *mut SfHandle,
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
            None => None,
            Some(handle) => match &handle.0 {
                Object::DecoderConfig(cfg) => Some(cfg),
                _ => return ResultCode::InvalidArgs,
            },
        };
        let Some(Object::Decoder(slot)) = object_mut(decoder) else {
            return ResultCode::InvalidArgs;
        };
        if slot.is_some() {
            return ResultCode::InvalidState;
        }
        match CodecRegistry::new().open_decoder(MediaInput::path(path), cfg) {
            Ok(opened) => {
                *slot = Some(opened);
                ResultCode::Success
            }
            Err(e) => e.code(),
        }
    })
}

/// Reads up to `frame_count` frames of interleaved `f32` into `frames_out`.
/// Short counts only at end of stream.
///
/// # Safety
/// `frames_out` must hold `frame_count * channels` floats.
#[no_mangle]
pub unsafe extern "C" fn sf_decoder_read_pcm_frames(
    decoder: *mut SfHandle,
    frames_out: *mut f32,
    frame_count: u64,
    frames_read: *mut u64,
) -> i32 {
    guard(|| {
        if let Some(out) = frames_read.as_mut() {
            *out = 0;
        }
        let Some(Object::Decoder(Some(dec))) = object_mut(decoder) else {
            return ResultCode::InvalidArgs;
        };
        if frames_out.is_null() && frame_count > 0 {
            return ResultCode::InvalidArgs;
        }
        let want = frame_count as usize;
        if want == 0 {
            return ResultCode::Success;
        }
        let channels = dec.output_layout().channels as usize;
        let out = std::slice::from_raw_parts_mut(frames_out, want * channels);
        match dec.read(out, want) {
            Ok(read) => {
                if let Some(out) = frames_read.as_mut() {
                    *out = read as u64;
                }
                ResultCode::Success
            }
            Err(e) => e.code(),
        }
    })
}

#[no_mangle]
pub unsafe extern "C" fn sf_decoder_seek_to_frame(decoder: *mut SfHandle, frame: u64) -> i32 {
    guard(|| {
        let Some(Object::Decoder(Some(dec))) = object_mut(decoder) else {
            return ResultCode::InvalidArgs;
        };
        match dec.seek_to_frame(frame) {
            Ok(()) => ResultCode::Success,
            Err(e) => e.code(),
        }
    })
}

/// Negative or non-finite seconds fail with `InvalidArgs` and leave the
/// cursor untouched.
#[no_mangle]
pub unsafe extern "C" fn sf_decoder_seek_to_time(decoder: *mut SfHandle, seconds: f64) -> i32 {
    guard(|| {
        let Some(Object::Decoder(Some(dec))) = object_mut(decoder) else {
            return ResultCode::InvalidArgs;
        };
        match dec.seek_to_time(seconds) {
            Ok(()) => ResultCode::Success,
            Err(e) => e.code(),
        }
    })
}

/// Writes the total length in output-rate frames, or 0 when the source is
/// unbounded or not seekable.
#[no_mangle]
pub unsafe extern "C" fn sf_decoder_get_length_in_pcm_frames(
    decoder: *mut SfHandle,
    length: *mut u64,
) -> i32 {
    guard(|| {
        let Some(out) = length.as_mut() else {
            return ResultCode::InvalidArgs;
        };
        let Some(Object::Decoder(Some(dec))) = object_mut(decoder) else {
            return ResultCode::InvalidArgs;
        };
        *out = dec.total_frames().unwrap_or(0);
        ResultCode::Success
    })
}

#[no_mangle]
pub unsafe extern "C" fn sf_decoder_get_cursor_in_pcm_frames(
    decoder: *mut SfHandle,
    cursor: *mut u64,
) -> i32 {
    guard(|| {
        let Some(out) = cursor.as_mut() else {
            return ResultCode::InvalidArgs;
        };
        let Some(Object::Decoder(Some(dec))) = object_mut(decoder) else {
            return ResultCode::InvalidArgs;
        };
        *out = dec.cursor();
        ResultCode::Success
    })
}

/// Closes the stream; the handle itself stays allocated until `sf_free`.
#[no_mangle]
pub unsafe extern "C" fn sf_decoder_uninit(decoder: *mut SfHandle) -> i32 {
    guard(|| {
        let Some(Object::Decoder(slot)) = object_mut(decoder) else {
            return ResultCode::InvalidArgs;
        };
        *slot = None;
        ResultCode::Success
    })
}
