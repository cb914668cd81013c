//! Pull source over symphonia for WAV, FLAC, MP3 and Vorbis containers.

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder as SymphoniaDecoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::{MediaSource, MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::{Time, TimeBase};
use tracing::debug;

use crate::decoder::DecodeSource;
use crate::error::CodecError;
use crate::io::{MediaInput, StreamMediaSource};

pub(crate) struct SymphoniaSource {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn SymphoniaDecoder>,
    track_id: u32,
    time_base: Option<TimeBase>,
    channels: u16,
    sample_rate: u32,
    total_frames: Option<u64>,
    seekable: bool,
    sample_buf: Option<SampleBuffer<f32>>,
    // Interleaved samples decoded past the last read boundary.
    pending: Vec<f32>,
}

impl SymphoniaSource {
    pub(crate) fn open(input: MediaInput) -> Result<Self, CodecError> {
        let ext_hint = input.ext_hint();
        let stream = input.into_stream()?;

        let mut hint = Hint::new();
        if let Some(ext) = ext_hint.as_deref() {
            hint.with_extension(ext);
        }

        let src = StreamMediaSource::new(stream);
        let seekable = src.is_seekable();
        let mss = MediaSourceStream::new(Box::new(src), MediaSourceStreamOptions::default());

        let probed = symphonia::default::get_probe().format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )?;

        let format = probed.format;
        let track = format.default_track().ok_or(CodecError::MissingTrack)?;
        let track_id = track.id;
        let params = track.codec_params.clone();

        let sample_rate = params.sample_rate.ok_or(CodecError::MissingSampleRate)?;
        let channels = params
            .channels
            .as_ref()
            .map(|v| v.count() as u16)
            .filter(|&c| c > 0)
            .ok_or(CodecError::MissingChannels)?;
        let total_frames = params.n_frames;

        let decoder = symphonia::default::get_codecs().make(&params, &DecoderOptions::default())?;

        debug!(
            sample_rate,
            channels,
            ?total_frames,
            seekable,
            "opened symphonia source"
        );

        Ok(Self {
            format,
            decoder,
            track_id,
            time_base: params.time_base,
            channels,
            sample_rate,
            total_frames,
            seekable,
            sample_buf: None,
            pending: Vec::new(),
        })
    }

    fn decode_next_packet(&mut self) -> Result<bool, CodecError> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(false);
                }
                Err(e) => return Err(e.into()),
            };
            if packet.track_id() != self.track_id {
                continue;
            }
            match self.decoder.decode(&packet) {
                Ok(audio_buf) => {
                    let spec = *audio_buf.spec();
                    let needs_realloc = self
                        .sample_buf
                        .as_ref()
                        .map_or(true, |buf| buf.capacity() < audio_buf.capacity());
                    if needs_realloc {
                        self.sample_buf =
                            Some(SampleBuffer::<f32>::new(audio_buf.capacity() as u64, spec));
                    }
                    let sample_buf = self
                        .sample_buf
                        .as_mut()
                        .expect("sample buffer was just allocated");
                    sample_buf.copy_interleaved_ref(audio_buf);
                    self.pending.extend_from_slice(sample_buf.samples());
                    return Ok(true);
                }
                // Corrupt packets are skipped; the stream resumes at the next
                // sync point.
                Err(SymphoniaError::DecodeError(_)) => continue,
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl DecodeSource for SymphoniaSource {
    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_frames(&self) -> Option<u64> {
        self.total_frames
    }

    fn seekable(&self) -> bool {
        self.seekable
    }

    fn read(&mut self, out: &mut Vec<f32>, max_frames: usize) -> Result<usize, CodecError> {
        let ch = self.channels as usize;
        let want = max_frames * ch;
        while self.pending.len() < want {
            if !self.decode_next_packet()? {
                break;
            }
        }
        let take = want.min(self.pending.len() / ch * ch);
        out.extend_from_slice(&self.pending[..take]);
        self.pending.drain(..take);
        Ok(take / ch)
    }

    fn seek(&mut self, frame: u64) -> Result<u64, CodecError> {
        if !self.seekable {
            return Err(CodecError::NotSeekable);
        }

        let rate = self.sample_rate as u64;
        let time = Time::new(frame / rate, (frame % rate) as f64 / rate as f64);
        let seeked = self.format.seek(
            SeekMode::Accurate,
            SeekTo::Time {
                time,
                track_id: Some(self.track_id),
            },
        )?;

        self.decoder.reset();
        self.pending.clear();

        // actual_ts is in track time-base units; convert back to frames at
        // the native rate. For PCM-style tracks the time base is 1/rate and
        // the conversion is the identity.
        let landed = match self.time_base {
            Some(tb) => {
                let t = tb.calc_time(seeked.actual_ts);
                (t.seconds as f64 * self.sample_rate as f64 + t.frac * self.sample_rate as f64)
                    .round() as u64
            }
            None => seeked.actual_ts,
        };
        Ok(landed.min(frame))
    }
}
