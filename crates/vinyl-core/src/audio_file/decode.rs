//! Container and codec decoding (symphonia)

use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::{DecodeError, PcmBuffer};
use crate::types::StereoSample;

/// Decode an in-memory audio file to stereo `f32` frames
///
/// `hint` is an optional file extension ("wav", "mp3", ...) that speeds up
/// format detection. The result keeps the source sample rate.
pub fn decode(bytes: Vec<u8>, hint: Option<&str>) -> Result<PcmBuffer, DecodeError> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut probe_hint = Hint::new();
    if let Some(ext) = hint {
        probe_hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&probe_hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| DecodeError::Unsupported(e.to_string()))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodeError::NoAudioTrack)?;

    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| DecodeError::Malformed("unknown sample rate".to_string()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| DecodeError::Unsupported(e.to_string()))?;

    let mut frames: Vec<StereoSample> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;
    let mut channels = 0usize;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                // Nothing decoded yet means the stream itself is broken
                if frames.is_empty() {
                    return Err(DecodeError::Malformed(e.to_string()));
                }
                log::warn!("decode: Error reading packet, keeping {} frames: {}", frames.len(), e);
                break;
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                log::debug!("decode: Skipping corrupt packet: {}", e);
                continue;
            }
            Err(e) => return Err(DecodeError::Malformed(e.to_string())),
        };

        if sample_buf.is_none() {
            let spec = *decoded.spec();
            channels = spec.channels.count();
            sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
        }

        if let Some(ref mut buf) = sample_buf {
            buf.copy_interleaved_ref(decoded);
            append_stereo(&mut frames, buf.samples(), channels);
        }
    }

    if frames.is_empty() {
        return Err(DecodeError::Empty);
    }

    log::debug!(
        "decode: {} frames, {} channel(s) @ {}Hz",
        frames.len(),
        channels,
        sample_rate
    );

    Ok(PcmBuffer::new(frames, sample_rate))
}

/// Fold interleaved samples of any channel count into stereo frames
fn append_stereo(frames: &mut Vec<StereoSample>, interleaved: &[f32], channels: usize) {
    match channels {
        0 => {}
        1 => frames.extend(interleaved.iter().map(|&s| StereoSample::mono(s))),
        n => frames.extend(
            interleaved
                .chunks_exact(n)
                .map(|frame| StereoSample::new(frame[0], frame[1])),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_file::test_support::{mono_dc_wav, sine_wav};

    #[test]
    fn test_decode_stereo_wav() {
        let bytes = sine_wav(44100, 1000, 440.0);
        let pcm = decode(bytes, Some("wav")).unwrap();

        assert_eq!(pcm.sample_rate(), 44100);
        assert_eq!(pcm.len(), 1000);
        // 0.5 amplitude sine
        let peak = pcm.frames().iter().map(|s| s.peak()).fold(0.0, f32::max);
        assert!(peak > 0.45 && peak < 0.55, "peak was {}", peak);
    }

    #[test]
    fn test_decode_mono_is_duplicated() {
        let bytes = mono_dc_wav(22050, 64, i16::MAX / 2);
        let pcm = decode(bytes, None).unwrap();

        assert_eq!(pcm.len(), 64);
        for frame in pcm.frames() {
            assert_eq!(frame.left, frame.right);
            assert!((frame.left - 0.5).abs() < 0.01);
        }
    }

    #[test]
    fn test_decode_garbage_fails() {
        let result = decode(b"definitely not an audio file".to_vec(), None);
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_empty_input_fails() {
        assert!(decode(Vec::new(), Some("wav")).is_err());
    }

    #[test]
    fn test_append_stereo_multichannel_keeps_first_pair() {
        let mut frames = Vec::new();
        append_stereo(&mut frames, &[0.1, 0.2, 0.9, 0.9, 0.3, 0.4, 0.9, 0.9], 4);
        assert_eq!(frames, vec![StereoSample::new(0.1, 0.2), StereoSample::new(0.3, 0.4)]);
    }
}
