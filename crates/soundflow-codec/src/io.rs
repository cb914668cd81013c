//! Byte-stream inputs for decoders and the symphonia media-source adapter.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use symphonia::core::io::MediaSource;

use crate::error::CodecError;

/// A readable, optionally seekable byte stream.
pub trait ByteStream: Read + Seek + Send + Sync {}

impl<T: Read + Seek + Send + Sync> ByteStream for T {}

/// The source a decoder is opened from: a file path or an arbitrary byte
/// stream supplied by the caller.
pub enum MediaInput {
    Path(PathBuf),
    Stream(Box<dyn ByteStream>),
}

impl MediaInput {
    pub fn path(path: impl AsRef<Path>) -> Self {
        Self::Path(path.as_ref().to_path_buf())
    }

    pub fn stream(stream: impl ByteStream + 'static) -> Self {
        Self::Stream(Box::new(stream))
    }

    /// Extension hint for container probing, lowercased.
    pub fn ext_hint(&self) -> Option<String> {
        match self {
            Self::Path(path) => path
                .extension()
                .and_then(|s| s.to_str())
                .map(|s| s.trim().to_ascii_lowercase())
                .filter(|s| !s.is_empty()),
            Self::Stream(_) => None,
        }
    }

    pub(crate) fn into_stream(self) -> Result<Box<dyn ByteStream>, CodecError> {
        match self {
            Self::Path(path) => Ok(Box::new(File::open(path)?)),
            Self::Stream(stream) => Ok(stream),
        }
    }
}

/// Adapter exposing a [`ByteStream`] as a symphonia [`MediaSource`].
pub(crate) struct StreamMediaSource {
    inner: Box<dyn ByteStream>,
    byte_len: Option<u64>,
    seekable: bool,
}

impl StreamMediaSource {
    pub(crate) fn new(mut inner: Box<dyn ByteStream>) -> Self {
        let seekable = inner.seek(SeekFrom::Current(0)).is_ok();
        let byte_len = if seekable {
            let len = inner.seek(SeekFrom::End(0)).ok();
            let _ = inner.seek(SeekFrom::Start(0));
            len
        } else {
            None
        };
        Self {
            inner,
            byte_len,
            seekable,
        }
    }
}

impl Read for StreamMediaSource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Seek for StreamMediaSource {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        if !self.seekable {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "input stream is not seekable",
            ));
        }
        self.inner.seek(pos)
    }
}

impl MediaSource for StreamMediaSource {
    fn is_seekable(&self) -> bool {
        self.seekable
    }

    fn byte_len(&self) -> Option<u64> {
        self.byte_len
    }
}
