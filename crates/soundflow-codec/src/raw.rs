//! Raw PCM pull source: headerless interleaved samples in a caller-supplied
//! layout.

use std::io::{Read, Seek, SeekFrom};

use soundflow_core::{FrameLayout, decode_to_f32};

use crate::decoder::DecodeSource;
use crate::error::CodecError;
use crate::io::{ByteStream, MediaInput};

pub(crate) struct RawPcmSource {
    stream: Box<dyn ByteStream>,
    layout: FrameLayout,
    total_frames: Option<u64>,
    seekable: bool,
    byte_scratch: Vec<u8>,
}

impl RawPcmSource {
    pub(crate) fn open(input: MediaInput, layout: FrameLayout) -> Result<Self, CodecError> {
        layout.validate()?;
        let mut stream = input.into_stream()?;

        let seekable = stream.seek(SeekFrom::Current(0)).is_ok();
        let total_frames = if seekable {
            let len = stream.seek(SeekFrom::End(0))?;
            stream.seek(SeekFrom::Start(0))?;
            Some(len / layout.bytes_per_frame() as u64)
        } else {
            None
        };

        Ok(Self {
            stream,
            layout,
            total_frames,
            seekable,
            byte_scratch: Vec::new(),
        })
    }
}

impl DecodeSource for RawPcmSource {
    fn channels(&self) -> u16 {
        self.layout.channels
    }

    fn sample_rate(&self) -> u32 {
        self.layout.sample_rate
    }

    fn total_frames(&self) -> Option<u64> {
        self.total_frames
    }

    fn seekable(&self) -> bool {
        self.seekable
    }

    fn read(&mut self, out: &mut Vec<f32>, max_frames: usize) -> Result<usize, CodecError> {
        let bpf = self.layout.bytes_per_frame();
        self.byte_scratch.resize(max_frames * bpf, 0);

        let mut filled = 0usize;
        while filled < self.byte_scratch.len() {
            let n = self.stream.read(&mut self.byte_scratch[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        let frames = filled / bpf;
        decode_to_f32(
            self.layout.format,
            &self.byte_scratch[..frames * bpf],
            out,
        );
        Ok(frames)
    }

    fn seek(&mut self, frame: u64) -> Result<u64, CodecError> {
        if !self.seekable {
            return Err(CodecError::NotSeekable);
        }
        self.stream
            .seek(SeekFrom::Start(frame * self.layout.bytes_per_frame() as u64))?;
        Ok(frame)
    }
}
