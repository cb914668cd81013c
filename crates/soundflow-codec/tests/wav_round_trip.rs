//! End-to-end decode/encode scenarios over synthesized WAV fixtures.

use std::io::Cursor;

use soundflow_codec::{
    CodecRegistry, DecoderConfig, EncoderConfig, EncodingKind, MediaInput,
};
use soundflow_core::{FrameLayout, ResampleQuality, SampleFormat};

/// 1-second 440 Hz sine, mono s16, at `rate`.
fn sine_wav_s16(rate: u32, seconds: u32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for i in 0..rate * seconds {
            let t = i as f64 / rate as f64;
            let v = (t * 440.0 * 2.0 * std::f64::consts::PI).sin();
            writer.write_sample((v * 0.8 * 32_767.0) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

fn open_sine(rate: u32) -> soundflow_codec::Decoder {
    let bytes = sine_wav_s16(rate, 1);
    CodecRegistry::new()
        .open_decoder(MediaInput::stream(Cursor::new(bytes)), None)
        .unwrap()
}

#[test]
fn decode_one_second_wav_returns_exact_frame_count() {
    // 48_000 frames in, 48_000 frames out, then a clean zero-length read.
    let mut dec = open_sine(48_000);
    assert_eq!(dec.total_frames(), Some(48_000));

    let mut buf = vec![0.0f32; 48_000];
    assert_eq!(dec.read(&mut buf, 48_000).unwrap(), 48_000);
    let mut one = vec![0.0f32; 1];
    assert_eq!(dec.read(&mut one, 1).unwrap(), 0);
}

#[test]
fn seek_round_trip_matches_scratch_decode() {
    let bytes = sine_wav_s16(44_100, 1);
    let registry = CodecRegistry::new();

    let mut scratch = registry
        .open_decoder(MediaInput::stream(Cursor::new(bytes.clone())), None)
        .unwrap();
    let mut all = vec![0.0f32; 44_100];
    scratch.read(&mut all, 44_100).unwrap();

    let mut dec = registry
        .open_decoder(MediaInput::stream(Cursor::new(bytes)), None)
        .unwrap();
    let mut head = vec![0.0f32; 5000];
    dec.read(&mut head, 5000).unwrap();

    dec.seek_to_frame(22_050).unwrap();
    assert_eq!(dec.cursor(), 22_050);
    let mut tail = vec![0.0f32; 2000];
    assert_eq!(dec.read(&mut tail, 2000).unwrap(), 2000);

    assert_eq!(&tail[..], &all[22_050..24_050]);
}

#[test]
fn seek_to_time_translates_to_rounded_frames() {
    let mut dec = open_sine(44_100);
    dec.seek_to_time(0.5).unwrap();
    assert_eq!(dec.cursor(), 22_050);

    dec.seek_to_time(0.0).unwrap();
    assert_eq!(dec.cursor(), 0);
}

#[test]
fn negative_seek_time_fails_and_cursor_is_unchanged() {
    let mut dec = open_sine(48_000);
    let mut buf = vec![0.0f32; 100];
    dec.read(&mut buf, 100).unwrap();

    assert!(dec.seek_to_time(-1.0).is_err());
    assert_eq!(dec.cursor(), 100);
}

#[test]
fn seek_past_known_end_is_rejected() {
    let mut dec = open_sine(48_000);
    assert!(dec.seek_to_frame(48_001).is_err());
    assert_eq!(dec.cursor(), 0);
    // One frame short of the end is still a valid target.
    dec.seek_to_frame(47_999).unwrap();
    let mut buf = vec![0.0f32; 2];
    assert_eq!(dec.read(&mut buf, 2).unwrap(), 1);
}

#[test]
fn decoder_config_inserts_channel_conversion() {
    let bytes = sine_wav_s16(48_000, 1);
    let cfg = DecoderConfig::new(SampleFormat::F32, 2, 48_000);
    let mut dec = CodecRegistry::new()
        .open_decoder(MediaInput::stream(Cursor::new(bytes)), Some(&cfg))
        .unwrap();
    assert_eq!(dec.output_layout().channels, 2);

    let mut buf = vec![0.0f32; 200];
    assert_eq!(dec.read(&mut buf, 100).unwrap(), 100);
    for f in 0..100 {
        assert_eq!(buf[f * 2], buf[f * 2 + 1], "frame {f} not duplicated");
    }
}

#[test]
fn decoder_config_resamples_with_linear_quality() {
    let bytes = sine_wav_s16(48_000, 1);
    let cfg = DecoderConfig {
        format: SampleFormat::F32,
        channels: 1,
        sample_rate: 24_000,
        quality: ResampleQuality::Linear,
    };
    let mut dec = CodecRegistry::new()
        .open_decoder(MediaInput::stream(Cursor::new(bytes)), Some(&cfg))
        .unwrap();
    assert_eq!(dec.total_frames(), Some(24_000));

    let mut buf = vec![0.0f32; 30_000];
    let got = dec.read(&mut buf, 30_000).unwrap();
    assert!(got.abs_diff(24_000) <= 1, "got {got}");
}

#[test]
fn encode_wav_silence_finalizes_riff_sizes() {
    // 44_100 stereo s16 frames of silence: data chunk is 44_100 * 4 bytes.
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("silence.wav");

    let config = EncoderConfig::new(
        EncodingKind::Wav,
        FrameLayout::new(SampleFormat::S16, 2, 44_100),
    );
    let mut enc = CodecRegistry::new().open_encoder_path(&path, &config).unwrap();
    let silence = vec![0.0f32; 44_100 * 2];
    assert_eq!(enc.write(&silence, 44_100).unwrap(), 44_100);
    enc.close().unwrap();

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(&bytes[0..4], b"RIFF");
    assert_eq!(&bytes[8..12], b"WAVE");
    let riff_size = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
    assert_eq!(riff_size as usize, bytes.len() - 8);

    // Re-decode: identical sample count, all zeros.
    let mut dec = CodecRegistry::new()
        .open_decoder(MediaInput::path(&path), None)
        .unwrap();
    assert_eq!(dec.total_frames(), Some(44_100));
    let mut buf = vec![1.0f32; 44_100 * 2];
    assert_eq!(dec.read(&mut buf, 44_100).unwrap(), 44_100);
    assert!(buf.iter().all(|&s| s == 0.0));
}

#[test]
fn encoded_wav_data_chunk_holds_every_frame() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tone.wav");

    let config = EncoderConfig::new(
        EncodingKind::Wav,
        FrameLayout::new(SampleFormat::S16, 1, 8000),
    );
    let mut enc = CodecRegistry::new().open_encoder_path(&path, &config).unwrap();
    let tone: Vec<f32> = (0..8000).map(|i| (i as f32 * 0.01).sin() * 0.5).collect();
    enc.write(&tone, 8000).unwrap();
    enc.close().unwrap();

    let reader = hound::WavReader::open(&path).unwrap();
    assert_eq!(reader.len(), 8000);
    assert_eq!(reader.spec().sample_rate, 8000);
}

#[test]
fn unsupported_encoder_kinds_fail_at_open() {
    let dir = tempfile::tempdir().unwrap();
    let layout = FrameLayout::new(SampleFormat::S16, 2, 44_100);
    let registry = CodecRegistry::new();
    for kind in [EncodingKind::Flac, EncodingKind::Mp3, EncodingKind::Vorbis] {
        let path = dir.path().join("out.bin");
        let err = registry
            .open_encoder_path(&path, &EncoderConfig::new(kind, layout))
            .unwrap_err();
        assert!(matches!(err, soundflow_codec::CodecError::Unsupported(_)));
    }
}

#[test]
fn raw_pcm_round_trip() {
    let layout = FrameLayout::new(SampleFormat::S16, 2, 48_000);
    let registry = CodecRegistry::new();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frames.pcm");

    let mut enc = registry
        .open_encoder_path(&path, &EncoderConfig::new(EncodingKind::Raw, layout))
        .unwrap();
    let frames: Vec<f32> = (0..2000).map(|i| (i as f32 / 1000.0) - 1.0).collect();
    assert_eq!(enc.write(&frames, 1000).unwrap(), 1000);
    enc.close().unwrap();

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(bytes.len(), 1000 * layout.bytes_per_frame());

    let mut dec = registry
        .open_raw_decoder(MediaInput::stream(Cursor::new(bytes)), layout, None)
        .unwrap();
    assert_eq!(dec.total_frames(), Some(1000));
    let mut buf = vec![0.0f32; 2000];
    assert_eq!(dec.read(&mut buf, 1000).unwrap(), 1000);

    // Seek in the raw stream is byte-exact.
    dec.seek_to_frame(500).unwrap();
    let mut tail = vec![0.0f32; 1000];
    assert_eq!(dec.read(&mut tail, 500).unwrap(), 500);
    assert_eq!(&tail[..1000], &buf[1000..2000]);
}
