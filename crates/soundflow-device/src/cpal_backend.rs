//! Host audio backend built on cpal.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use tracing::{debug, warn};

use soundflow_core::{mix_channels, LinearResampler, SampleFormat};

use crate::backend::{
    BackendStream, DeviceBackend, DeviceId, DeviceInfo, Direction, NativeDataFormat,
    OpenStreamArgs, StreamSide,
};
use crate::error::DeviceError;

// Rates probed against each supported config range when building the
// enumeration snapshot.
const PROBE_RATES: &[u32] = &[
    8_000, 11_025, 16_000, 22_050, 32_000, 44_100, 48_000, 88_200, 96_000, 176_400, 192_000,
];

// Frames pulled from the data path per refill when a rate-conversion stage
// sits between the callback and the OS buffers.
const RESAMPLE_PULL_FRAMES: usize = 1024;

// What an endpoint can actually run, reduced from the cpal config ranges.
#[derive(Debug, Clone, Copy)]
struct EndpointCaps {
    channels: u16,
    min_rate: u32,
    max_rate: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Negotiated {
    channels: u16,
    mix: bool,
    rate: u32,
    resample: bool,
}

/// Resolves the requested layout against the endpoint capabilities. A
/// refused channel count or sample rate falls back to the endpoint's native
/// value with a conversion stage, unless conversion is disabled, in which
/// case the open fails with `FormatUnsupported`.
fn negotiate(
    caps: &[EndpointCaps],
    native_channels: u16,
    native_rate: u32,
    want_channels: u16,
    want_rate: u32,
    allow_conversion: bool,
) -> Result<Negotiated, DeviceError> {
    let (channels, mix) = if caps.iter().any(|c| c.channels == want_channels) {
        (want_channels, false)
    } else if allow_conversion {
        (native_channels, true)
    } else {
        warn!(channels = want_channels, "endpoint refuses channel count");
        return Err(DeviceError::FormatUnsupported);
    };

    let rate_ok = caps
        .iter()
        .any(|c| c.channels == channels && (c.min_rate..=c.max_rate).contains(&want_rate));
    let (rate, resample) = if rate_ok {
        (want_rate, false)
    } else if allow_conversion {
        (native_rate, true)
    } else {
        warn!(rate = want_rate, "endpoint refuses sample rate");
        return Err(DeviceError::FormatUnsupported);
    };

    Ok(Negotiated {
        channels,
        mix,
        rate,
        resample,
    })
}

fn endpoint_caps<I>(ranges: I) -> Vec<EndpointCaps>
where
    I: Iterator<Item = cpal::SupportedStreamConfigRange>,
{
    ranges
        .map(|r| EndpointCaps {
            channels: r.channels(),
            min_rate: r.min_sample_rate().0,
            max_rate: r.max_sample_rate().0,
        })
        .collect()
}

pub struct CpalBackend {
    host: cpal::Host,
}

impl CpalBackend {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }

    fn find_device(
        &self,
        direction: Direction,
        wanted: Option<&DeviceId>,
    ) -> Result<cpal::Device, DeviceError> {
        let default = match direction {
            Direction::Capture => self.host.default_input_device(),
            _ => self.host.default_output_device(),
        };
        let Some(wanted) = wanted else {
            return default.ok_or(DeviceError::NoDevice);
        };
        let mut devices = match direction {
            Direction::Capture => self.host.input_devices()?,
            _ => self.host.output_devices()?,
        };
        devices
            .find(|d| d.name().map(|n| n == wanted.as_str()).unwrap_or(false))
            .ok_or(DeviceError::NoDevice)
    }

    fn open_output(
        &self,
        side: &StreamSide,
        allow_conversion: bool,
        on_output: Box<dyn FnMut(&mut [f32]) + Send>,
        on_error: Arc<dyn Fn(String) + Send + Sync>,
    ) -> Result<cpal::Stream, DeviceError> {
        let device = self.find_device(Direction::Playback, side.device.as_ref())?;
        let default = device.default_output_config()?;
        let caps = endpoint_caps(device.supported_output_configs()?);
        let want_ch = side.layout.channels;
        let want_rate = side.layout.sample_rate;

        let negotiated = negotiate(
            &caps,
            default.channels(),
            default.sample_rate().0,
            want_ch,
            want_rate,
            allow_conversion,
        )?;
        let channels = negotiated.channels;
        let config = StreamConfig {
            channels,
            sample_rate: SampleRate(negotiated.rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let err_fn = {
            let on_error = Arc::clone(&on_error);
            move |e: cpal::StreamError| on_error(e.to_string())
        };

        // The data path always produces the requested layout; a rate stage
        // and a channel-mix stage bridge it to the endpoint as negotiated.
        let mut produce: Box<dyn FnMut(&mut [f32]) + Send> = on_output;
        if negotiated.resample {
            let mut inner = produce;
            let mut rs = LinearResampler::new(want_ch, want_rate, negotiated.rate);
            let mut raw = vec![0.0f32; RESAMPLE_PULL_FRAMES * want_ch as usize];
            let mut pending: Vec<f32> = Vec::new();
            produce = Box::new(move |data: &mut [f32]| {
                while pending.len() < data.len() {
                    raw.fill(0.0);
                    inner(&mut raw);
                    rs.process(&raw, &mut pending);
                }
                data.copy_from_slice(&pending[..data.len()]);
                pending.drain(..data.len());
            });
        }

        let mut callback: Box<dyn FnMut(&mut [f32]) + Send> = if negotiated.mix {
            let mut inner = produce;
            let mut scratch = Vec::new();
            let mut mixed = Vec::new();
            Box::new(move |data: &mut [f32]| {
                let frames = data.len() / channels as usize;
                scratch.clear();
                scratch.resize(frames * want_ch as usize, 0.0);
                inner(&mut scratch);
                mixed.clear();
                mix_channels(&scratch, want_ch, channels, &mut mixed);
                data.copy_from_slice(&mixed[..data.len()]);
            })
        } else {
            produce
        };

        let stream = match default.sample_format() {
            cpal::SampleFormat::F32 => device.build_output_stream(
                &config,
                move |data: &mut [f32], _| callback(data),
                err_fn,
                None,
            )?,
            cpal::SampleFormat::I16 if allow_conversion => {
                let mut scratch = Vec::new();
                device.build_output_stream(
                    &config,
                    move |data: &mut [i16], _| {
                        scratch.clear();
                        scratch.resize(data.len(), 0.0f32);
                        callback(&mut scratch);
                        for (dst, src) in data.iter_mut().zip(&scratch) {
                            *dst = (src.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                        }
                    },
                    err_fn,
                    None,
                )?
            }
            cpal::SampleFormat::U16 if allow_conversion => {
                let mut scratch = Vec::new();
                device.build_output_stream(
                    &config,
                    move |data: &mut [u16], _| {
                        scratch.clear();
                        scratch.resize(data.len(), 0.0f32);
                        callback(&mut scratch);
                        for (dst, src) in data.iter_mut().zip(&scratch) {
                            let s = src.clamp(-1.0, 1.0);
                            *dst = ((s * 0.5 + 0.5) * u16::MAX as f32) as u16;
                        }
                    },
                    err_fn,
                    None,
                )?
            }
            other => {
                warn!(format = ?other, "endpoint sample format not supported");
                return Err(DeviceError::FormatUnsupported);
            }
        };
        Ok(stream)
    }

    fn open_input(
        &self,
        side: &StreamSide,
        allow_conversion: bool,
        on_input: Box<dyn FnMut(&[f32]) + Send>,
        on_error: Arc<dyn Fn(String) + Send + Sync>,
    ) -> Result<cpal::Stream, DeviceError> {
        let device = self.find_device(Direction::Capture, side.device.as_ref())?;
        let default = device.default_input_config()?;
        let caps = endpoint_caps(device.supported_input_configs()?);
        let want_ch = side.layout.channels;
        let want_rate = side.layout.sample_rate;

        let negotiated = negotiate(
            &caps,
            default.channels(),
            default.sample_rate().0,
            want_ch,
            want_rate,
            allow_conversion,
        )?;
        let channels = negotiated.channels;
        let config = StreamConfig {
            channels,
            sample_rate: SampleRate(negotiated.rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let err_fn = {
            let on_error = Arc::clone(&on_error);
            move |e: cpal::StreamError| on_error(e.to_string())
        };

        // Mix down to the requested channel count first, then rate-convert,
        // so the sink always receives the requested layout.
        let mut consume: Box<dyn FnMut(&[f32]) + Send> = on_input;
        if negotiated.resample {
            let mut inner = consume;
            let mut rs = LinearResampler::new(want_ch, negotiated.rate, want_rate);
            let mut converted: Vec<f32> = Vec::new();
            consume = Box::new(move |data: &[f32]| {
                converted.clear();
                rs.process(data, &mut converted);
                inner(&converted);
            });
        }

        let mut callback: Box<dyn FnMut(&[f32]) + Send> = if negotiated.mix {
            let mut inner = consume;
            let mut mixed = Vec::new();
            Box::new(move |data: &[f32]| {
                mixed.clear();
                mix_channels(data, channels, want_ch, &mut mixed);
                inner(&mixed);
            })
        } else {
            consume
        };

        let stream = match default.sample_format() {
            cpal::SampleFormat::F32 => device.build_input_stream(
                &config,
                move |data: &[f32], _| callback(data),
                err_fn,
                None,
            )?,
            cpal::SampleFormat::I16 if allow_conversion => {
                let mut scratch = Vec::new();
                device.build_input_stream(
                    &config,
                    move |data: &[i16], _| {
                        scratch.clear();
                        scratch.extend(data.iter().map(|&s| s as f32 / i16::MAX as f32));
                        callback(&scratch);
                    },
                    err_fn,
                    None,
                )?
            }
            cpal::SampleFormat::U16 if allow_conversion => {
                let mut scratch = Vec::new();
                device.build_input_stream(
                    &config,
                    move |data: &[u16], _| {
                        scratch.clear();
                        scratch.extend(
                            data.iter()
                                .map(|&s| s as f32 / u16::MAX as f32 * 2.0 - 1.0),
                        );
                        callback(&scratch);
                    },
                    err_fn,
                    None,
                )?
            }
            other => {
                warn!(format = ?other, "endpoint sample format not supported");
                return Err(DeviceError::FormatUnsupported);
            }
        };
        Ok(stream)
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn map_sample_format(format: cpal::SampleFormat) -> Option<SampleFormat> {
    match format {
        cpal::SampleFormat::U8 => Some(SampleFormat::U8),
        cpal::SampleFormat::I16 => Some(SampleFormat::S16),
        cpal::SampleFormat::I32 => Some(SampleFormat::S32),
        cpal::SampleFormat::F32 => Some(SampleFormat::F32),
        _ => None,
    }
}

impl DeviceBackend for CpalBackend {
    fn name(&self) -> &'static str {
        "cpal"
    }

    fn list_endpoints(&self, direction: Direction) -> Result<Vec<DeviceInfo>, DeviceError> {
        let default_name = match direction {
            Direction::Capture => self.host.default_input_device(),
            _ => self.host.default_output_device(),
        }
        .and_then(|d| d.name().ok());

        let devices = match direction {
            Direction::Capture => self.host.input_devices()?,
            _ => self.host.output_devices()?,
        };

        let mut infos = Vec::new();
        for device in devices {
            let Ok(name) = device.name() else { continue };
            let ranges = match direction {
                Direction::Capture => device
                    .supported_input_configs()
                    .map(|r| r.collect::<Vec<_>>()),
                _ => device
                    .supported_output_configs()
                    .map(|r| r.collect::<Vec<_>>()),
            };
            let Ok(ranges) = ranges else { continue };

            let mut formats = Vec::new();
            for range in ranges {
                let Some(format) = map_sample_format(range.sample_format()) else {
                    continue;
                };
                let (min, max) = (range.min_sample_rate().0, range.max_sample_rate().0);
                for &rate in PROBE_RATES {
                    if rate >= min && rate <= max {
                        formats.push(NativeDataFormat {
                            format,
                            channels: range.channels(),
                            sample_rate: rate,
                            flags: 0,
                        });
                    }
                }
            }
            formats.dedup();

            let is_default = default_name.as_deref() == Some(name.as_str());
            infos.push(DeviceInfo {
                id: DeviceId(name.clone()),
                name,
                is_default,
                native_data_formats: formats,
            });
        }
        debug!(?direction, count = infos.len(), "enumerated endpoints");
        Ok(infos)
    }

    fn open_stream(&self, args: OpenStreamArgs) -> Result<Box<dyn BackendStream>, DeviceError> {
        let on_error: Arc<dyn Fn(String) + Send + Sync> = Arc::from(args.on_error);
        let mut streams = Vec::new();

        if let (Some(side), Some(on_input)) = (args.capture.as_ref(), args.on_input) {
            streams.push(self.open_input(
                side,
                args.allow_conversion,
                on_input,
                Arc::clone(&on_error),
            )?);
        }
        if let (Some(side), Some(on_output)) = (args.playback.as_ref(), args.on_output) {
            streams.push(self.open_output(
                side,
                args.allow_conversion,
                on_output,
                Arc::clone(&on_error),
            )?);
        }
        if streams.is_empty() {
            return Err(DeviceError::InvalidConfig("no stream side requested".into()));
        }
        Ok(Box::new(CpalStream { streams }))
    }
}

struct CpalStream {
    streams: Vec<cpal::Stream>,
}

impl BackendStream for CpalStream {
    fn start(&mut self) -> Result<(), DeviceError> {
        for stream in &self.streams {
            stream.play()?;
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        for stream in &self.streams {
            stream.pause()?;
        }
        Ok(())
    }

    fn latency_frames(&self) -> u64 {
        // cpal does not expose a latency query; callers fall back to the
        // period-derived estimate from the device layer.
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAPS: &[EndpointCaps] = &[EndpointCaps {
        channels: 2,
        min_rate: 44_100,
        max_rate: 48_000,
    }];

    #[test]
    fn matching_layout_passes_through() {
        let n = negotiate(CAPS, 2, 48_000, 2, 44_100, true).unwrap();
        assert_eq!(
            n,
            Negotiated {
                channels: 2,
                mix: false,
                rate: 44_100,
                resample: false,
            }
        );
    }

    #[test]
    fn refused_rate_gets_a_conversion_stage() {
        let n = negotiate(CAPS, 2, 48_000, 2, 22_050, true).unwrap();
        assert_eq!(n.rate, 48_000);
        assert!(n.resample);
        assert!(!n.mix);
    }

    #[test]
    fn refused_rate_without_conversion_is_format_unsupported() {
        let err = negotiate(CAPS, 2, 48_000, 2, 22_050, false).unwrap_err();
        assert!(matches!(err, DeviceError::FormatUnsupported));
    }

    #[test]
    fn refused_channels_without_conversion_is_format_unsupported() {
        let err = negotiate(CAPS, 2, 48_000, 6, 48_000, false).unwrap_err();
        assert!(matches!(err, DeviceError::FormatUnsupported));
    }

    #[test]
    fn refused_channels_mix_to_the_native_count() {
        let n = negotiate(CAPS, 2, 48_000, 6, 44_100, true).unwrap();
        assert_eq!(n.channels, 2);
        assert!(n.mix);
        assert!(!n.resample);
    }
}
