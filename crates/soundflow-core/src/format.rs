use serde::{Deserialize, Serialize};

use crate::error::FormatError;

/// Interleaved PCM sample formats, little-endian in memory.
///
/// Discriminants are the wire tags used across the ABI, so they must stay
/// stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum SampleFormat {
    U8 = 1,
    S16 = 2,
    S24 = 3,
    S32 = 4,
    F32 = 5,
}

impl SampleFormat {
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::S16 => 2,
            Self::S24 => 3,
            Self::S32 => 4,
            Self::F32 => 4,
        }
    }

    pub const fn bits_per_sample(self) -> u16 {
        (self.bytes_per_sample() * 8) as u16
    }

    pub fn from_tag(tag: u32) -> Result<Self, FormatError> {
        match tag {
            1 => Ok(Self::U8),
            2 => Ok(Self::S16),
            3 => Ok(Self::S24),
            4 => Ok(Self::S32),
            5 => Ok(Self::F32),
            other => Err(FormatError::UnknownFormat(other)),
        }
    }

    pub const fn tag(self) -> u32 {
        self as u32
    }
}

/// A frame holds one sample per channel at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameLayout {
    pub format: SampleFormat,
    pub channels: u16,
    pub sample_rate: u32,
}

impl FrameLayout {
    pub const fn new(format: SampleFormat, channels: u16, sample_rate: u32) -> Self {
        Self {
            format,
            channels,
            sample_rate,
        }
    }

    pub fn validate(&self) -> Result<(), FormatError> {
        if self.channels == 0 || self.sample_rate == 0 {
            return Err(FormatError::InvalidLayout {
                channels: self.channels,
                sample_rate: self.sample_rate,
            });
        }
        Ok(())
    }

    pub const fn bytes_per_frame(&self) -> usize {
        self.format.bytes_per_sample() * self.channels as usize
    }

    pub const fn samples_for_frames(&self, frames: usize) -> usize {
        frames * self.channels as usize
    }
}

/// Sample-rate conversion quality selector.
///
/// `Linear` is cheap and allocation-free, suitable for the real-time path.
/// `Sinc` is the rubato preset used on the decode path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ResampleQuality {
    Linear,
    #[default]
    Sinc,
}
