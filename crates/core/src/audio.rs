//! Audio stream decoding: WAV containers and raw headerless PCM
//!
//! Samples are carried as `f32` in the 16-bit integer range, which is what
//! the engine's feature pipeline expects. Only channel zero is used when a
//! stream is not mono.

use std::io::Cursor;

use crate::error::AudioError;

/// Decoded WAV audio: channel-zero samples plus the header's sample rate.
#[derive(Debug, Clone)]
pub struct WavAudio {
    pub sample_rate: f32,
    pub samples: Vec<f32>,
}

impl WavAudio {
    /// Parse a complete WAV stream (header included).
    ///
    /// Streaming WAV chunks each carry their own header, so this is the
    /// entry point for both unary audio and per-chunk streaming audio.
    pub fn parse(bytes: &[u8]) -> Result<Self, AudioError> {
        let mut reader = hound::WavReader::new(Cursor::new(bytes))
            .map_err(|e| AudioError::Malformed(e.to_string()))?;
        let spec = reader.spec();

        if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
            return Err(AudioError::Malformed(format!(
                "unsupported sample format: {} bits {:?}",
                spec.bits_per_sample, spec.sample_format
            )));
        }

        let channels = spec.channels.max(1) as usize;
        let mut samples = Vec::with_capacity(reader.len() as usize / channels);
        for (i, sample) in reader.samples::<i16>().enumerate() {
            let sample = sample.map_err(|e| AudioError::Malformed(e.to_string()))?;
            // interleaved frames: keep channel zero only
            if i % channels == 0 {
                samples.push(f32::from(sample));
            }
        }

        Ok(Self {
            sample_rate: spec.sample_rate as f32,
            samples,
        })
    }
}

/// Decode raw headerless mono 16-bit little-endian PCM.
///
/// Reads up to `data_bytes` bytes from the stream. A short read is logged
/// as a truncation warning rather than failing; an empty stream is an
/// error. A trailing odd byte is ignored so a sample is never split.
pub fn read_raw_pcm(bytes: &[u8], data_bytes: usize) -> Result<Vec<f32>, AudioError> {
    if bytes.is_empty() {
        return Err(AudioError::Empty);
    }

    if bytes.len() < data_bytes {
        tracing::warn!(
            expected = data_bytes,
            read = bytes.len(),
            "expected more bytes of wave data than read; truncated stream?"
        );
    }

    let take = bytes.len().min(data_bytes);
    let samples = bytes[..take]
        .chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])))
        .collect();

    Ok(samples)
}

/// Samples per chunk when slicing full audio for decoding.
///
/// `chunk_seconds <= 0` means the whole audio is fed as a single chunk.
/// Otherwise the chunk is `floor(sample_rate * chunk_seconds)` samples,
/// clamped to at least one sample.
pub fn chunk_length(sample_rate: f32, chunk_seconds: f32, total_samples: usize) -> usize {
    if chunk_seconds > 0.0 {
        ((sample_rate * chunk_seconds) as usize).max(1)
    } else {
        total_samples.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(sample_rate: u32, channels: u16, samples: &[i16]) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn parses_mono_wav() {
        let bytes = wav_bytes(16000, 1, &[100, -100, 0, 32000]);
        let wav = WavAudio::parse(&bytes).unwrap();
        assert_eq!(wav.sample_rate, 16000.0);
        assert_eq!(wav.samples, vec![100.0, -100.0, 0.0, 32000.0]);
    }

    #[test]
    fn keeps_channel_zero_of_stereo() {
        let bytes = wav_bytes(8000, 2, &[1, -1, 2, -2, 3, -3]);
        let wav = WavAudio::parse(&bytes).unwrap();
        assert_eq!(wav.samples, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn rejects_malformed_header() {
        assert!(matches!(
            WavAudio::parse(b"definitely not a wav"),
            Err(AudioError::Malformed(_))
        ));
    }

    #[test]
    fn raw_pcm_decodes_little_endian() {
        let bytes = [0x01, 0x00, 0xFF, 0xFF];
        let samples = read_raw_pcm(&bytes, 4).unwrap();
        assert_eq!(samples, vec![1.0, -1.0]);
    }

    #[test]
    fn raw_pcm_never_splits_a_sample() {
        let bytes = [0x01, 0x00, 0x02];
        let samples = read_raw_pcm(&bytes, 3).unwrap();
        assert_eq!(samples, vec![1.0]);
    }

    #[test]
    fn raw_pcm_empty_is_an_error() {
        assert!(matches!(read_raw_pcm(&[], 0), Err(AudioError::Empty)));
    }

    #[test]
    fn raw_pcm_short_read_is_not_an_error() {
        let bytes = [0x01, 0x00];
        let samples = read_raw_pcm(&bytes, 100).unwrap();
        assert_eq!(samples.len(), 1);
    }

    #[test]
    fn chunk_length_edges() {
        assert_eq!(chunk_length(16000.0, 1.0, 64000), 16000);
        assert_eq!(chunk_length(16000.0, 0.0, 64000), 64000);
        assert_eq!(chunk_length(16000.0, -1.0, 64000), 64000);
        // tiny chunk sizes clamp to a single sample
        assert_eq!(chunk_length(16000.0, 0.00001, 64000), 1);
        // zero-length audio still yields a positive chunk length
        assert_eq!(chunk_length(16000.0, 0.0, 0), 1);
    }
}
