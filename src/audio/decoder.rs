//! Audio decoding using symphonia
//!
//! Decodes audio files to interleaved f32 PCM at the file's native rate.
//! Resampling to the analysis rate happens in the feature extractor, so
//! in-memory waveforms and decoded files take the same path.

use crate::error::{AllInOneError, Result};
use crate::types::Waveform;
use std::fs::File;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, trace};

/// Files above this size (2 GB) are refused
const MAX_FILE_SIZE: u64 = 2 << 30;

/// An opened container positioned on its first audio track
struct OpenTrack {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
}

/// Decode an audio file to a mono or stereo `Waveform`
///
/// Files with more than two channels are averaged down to mono.
pub fn decode(path: &Path) -> Result<Waveform> {
    let size = std::fs::metadata(path)
        .map_err(|e| AllInOneError::decode_error(path, format!("Failed to read file metadata: {}", e)))?
        .len();
    if size > MAX_FILE_SIZE {
        return Err(AllInOneError::decode_error(
            path,
            format!("File too large ({:.1} GB), the limit is 2 GB", size as f64 / (1u64 << 30) as f64),
        ));
    }

    let mut track = open(path)?;
    debug!(
        "Decoding: {} @ {}Hz, {} channels",
        path.display(),
        track.sample_rate,
        track.channels
    );

    let samples = read_interleaved(&mut track, path)?;
    let mut waveform = Waveform::new(samples, track.sample_rate, track.channels);
    if waveform.channels > 2 {
        waveform = Waveform::mono(waveform.to_mono(), track.sample_rate);
    }

    debug!(
        "Decoded {} frames ({:.2}s)",
        waveform.num_frames(),
        waveform.duration()
    );
    Ok(waveform)
}

fn open(path: &Path) -> Result<OpenTrack> {
    let file = File::open(path)
        .map_err(|e| AllInOneError::decode_error(path, format!("Failed to open file: {}", e)))?;
    let stream = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let reader = symphonia::default::get_probe()
        .format(&hint, stream, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| AllInOneError::decode_error(path, format!("Failed to detect format: {}", e)))?
        .format;

    let params = reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .map(|t| (t.id, t.codec_params.clone()))
        .ok_or_else(|| AllInOneError::decode_error(path, "No audio tracks found"))?;
    let (track_id, codec_params) = params;

    let decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| AllInOneError::decode_error(path, format!("Failed to create decoder: {}", e)))?;

    Ok(OpenTrack {
        reader,
        decoder,
        track_id,
        sample_rate: codec_params.sample_rate.unwrap_or(44100),
        channels: codec_params.channels.map(|c| c.count()).unwrap_or(2),
    })
}

/// Read every packet of the track into one interleaved buffer
///
/// Corrupt frames are skipped; end of stream ends the read.
fn read_interleaved(track: &mut OpenTrack, path: &Path) -> Result<Vec<f32>> {
    let mut samples: Vec<f32> = Vec::new();

    loop {
        let packet = match track.reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => {
                return Err(AllInOneError::decode_error(path, format!("Failed to read packet: {}", e)));
            }
        };
        if packet.track_id() != track.track_id {
            continue;
        }

        let decoded = match track.decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                trace!("Skipping corrupted frame: {}", e);
                continue;
            }
            Err(e) => return Err(AllInOneError::decode_error(path, format!("Decode error: {}", e))),
        };

        let mut buf = SampleBuffer::<f32>::new(decoded.frames() as u64, *decoded.spec());
        buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buf.samples());
    }

    Ok(samples)
}

/// Keep the front left/right pair of a multi-channel stream
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_missing_file() {
        let err = decode(Path::new("/nonexistent/track.wav")).unwrap_err();
        assert!(matches!(err, AllInOneError::DecodeError { .. }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_decode_wav_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tone.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 22050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..22050 {
            writer.write_sample(8000i16).unwrap();
            writer.write_sample(-8000i16).unwrap();
        }
        writer.finalize().unwrap();

        let waveform = decode(&path).unwrap();
        assert_eq!(waveform.sample_rate, 22050);
        assert_eq!(waveform.channels, 2);
        assert_eq!(waveform.num_frames(), 22050);
        assert!((waveform.duration() - 1.0).abs() < 1e-6);
        assert!(waveform.samples[0] > 0.2 && waveform.samples[1] < -0.2);
    }

    #[test]
    fn test_decode_four_channels_averages_to_mono() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("quad.wav");
        let spec = hound::WavSpec {
            channels: 4,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        // Silent front pair, signal only in the other two channels
        for _ in 0..4410 {
            for sample in [0i16, 0, 16000, 16000] {
                writer.write_sample(sample).unwrap();
            }
        }
        writer.finalize().unwrap();

        let waveform = decode(&path).unwrap();
        assert_eq!(waveform.channels, 1);
        assert_eq!(waveform.num_frames(), 4410);
        let expected = 16000.0 / 32768.0 / 2.0;
        assert!(waveform.samples.iter().all(|&s| (s - expected).abs() < 1e-3));
    }
}
