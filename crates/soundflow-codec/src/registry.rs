//! Mapping from encoding kinds to decoder/encoder factories.

use std::path::Path;

use soundflow_core::FrameLayout;

use crate::decoder::{Decoder, DecoderConfig};
use crate::encoder::{Encoder, EncoderConfig, WriteSink};
use crate::error::CodecError;
use crate::io::MediaInput;
use crate::raw::RawPcmSource;
use crate::symphonia_source::SymphoniaSource;

/// Encoding kinds understood by the registry.
///
/// Discriminants are the wire tags used across the ABI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[repr(u32)]
pub enum EncodingKind {
    Wav = 1,
    Flac = 2,
    Mp3 = 3,
    Vorbis = 4,
    Raw = 5,
}

impl EncodingKind {
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            1 => Some(Self::Wav),
            2 => Some(Self::Flac),
            3 => Some(Self::Mp3),
            4 => Some(Self::Vorbis),
            5 => Some(Self::Raw),
            _ => None,
        }
    }

    pub const fn tag(self) -> u32 {
        self as u32
    }

    /// Kind resolution from a file extension, lowercased by the caller.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "wav" | "wave" => Some(Self::Wav),
            "flac" => Some(Self::Flac),
            "mp3" => Some(Self::Mp3),
            "ogg" | "oga" => Some(Self::Vorbis),
            _ => None,
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let ext = path
            .as_ref()
            .extension()
            .and_then(|s| s.to_str())?
            .trim()
            .to_ascii_lowercase();
        Self::from_extension(&ext)
    }
}

/// Resolves encoding kinds to codec implementations.
///
/// All container kinds decode through symphonia (the probe sniffs the actual
/// container, the kind only contributes an extension hint). `Raw` needs a
/// caller-supplied source layout. Encoding is available for `Wav` and `Raw`
/// only, matching the write side of the runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct CodecRegistry;

impl CodecRegistry {
    pub fn new() -> Self {
        Self
    }

    /// Opens a decoder for a container kind resolved from the input itself
    /// (extension hint plus probe sniffing).
    pub fn open_decoder(
        &self,
        input: MediaInput,
        config: Option<&DecoderConfig>,
    ) -> Result<Decoder, CodecError> {
        let source = SymphoniaSource::open(input)?;
        Decoder::from_source(Box::new(source), config)
    }

    /// Opens a raw PCM decoder; `source_layout` describes the bytes in the
    /// input.
    pub fn open_raw_decoder(
        &self,
        input: MediaInput,
        source_layout: FrameLayout,
        config: Option<&DecoderConfig>,
    ) -> Result<Decoder, CodecError> {
        let source = RawPcmSource::open(input, source_layout)?;
        Decoder::from_source(Box::new(source), config)
    }

    pub fn open_encoder(
        &self,
        sink: Box<dyn WriteSink>,
        config: &EncoderConfig,
    ) -> Result<Encoder, CodecError> {
        Encoder::open(sink, config)
    }

    pub fn open_encoder_path(
        &self,
        path: impl AsRef<Path>,
        config: &EncoderConfig,
    ) -> Result<Encoder, CodecError> {
        Encoder::open_path(path, config)
    }

    /// Whether an encoder factory exists for `kind`.
    pub fn can_encode(&self, kind: EncodingKind) -> bool {
        matches!(kind, EncodingKind::Wav | EncodingKind::Raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_resolution() {
        assert_eq!(EncodingKind::from_extension("wav"), Some(EncodingKind::Wav));
        assert_eq!(EncodingKind::from_extension("flac"), Some(EncodingKind::Flac));
        assert_eq!(EncodingKind::from_extension("mp3"), Some(EncodingKind::Mp3));
        assert_eq!(EncodingKind::from_extension("ogg"), Some(EncodingKind::Vorbis));
        assert_eq!(EncodingKind::from_extension("opus"), None);

        assert_eq!(
            EncodingKind::from_path("C:/music/a.FLAC"),
            Some(EncodingKind::Flac)
        );
        assert_eq!(EncodingKind::from_path("noext"), None);
    }

    #[test]
    fn wire_tags_round_trip() {
        for kind in [
            EncodingKind::Wav,
            EncodingKind::Flac,
            EncodingKind::Mp3,
            EncodingKind::Vorbis,
            EncodingKind::Raw,
        ] {
            assert_eq!(EncodingKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(EncodingKind::from_tag(0), None);
    }

    #[test]
    fn encoder_availability_covers_wav_and_raw_only() {
        let registry = CodecRegistry::new();
        assert!(registry.can_encode(EncodingKind::Wav));
        assert!(registry.can_encode(EncodingKind::Raw));
        assert!(!registry.can_encode(EncodingKind::Flac));
        assert!(!registry.can_encode(EncodingKind::Mp3));
        assert!(!registry.can_encode(EncodingKind::Vorbis));
    }
}
