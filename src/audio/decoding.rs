use std::fs::File;
use symphonia::core::{
    audio::SampleBuffer,
    codecs::{CODEC_TYPE_NULL, DecoderOptions},
    errors::Error as SymphoniaError,
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};

use super::errors::AudioDecodingError;

/// A fully decoded source, interleaved f32 frames.
#[derive(Debug, Clone)]
pub struct DecodedTrack {
    pub samples: Vec<f32>,
    pub channels: usize,
    pub sample_rate: u32,
}

impl DecodedTrack {
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels
        }
    }

    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.frames() as u64 * 1000) / self.sample_rate as u64
    }
}

/// Decodes a local audio file into memory.
pub fn decode_file(path: &str) -> Result<DecodedTrack, AudioDecodingError> {
    let file = File::open(path).map_err(|e| AudioDecodingError::FileOpenError {
        path: path.to_string(),
        source: e,
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    let mut hint = Hint::new();
    if let Some(extension) = std::path::Path::new(path).extension().and_then(|e| e.to_str()) {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| AudioDecodingError::FormatError {
            path: path.to_string(),
            source: e,
        })?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL && t.codec_params.sample_rate.is_some())
        .ok_or_else(|| AudioDecodingError::NoSuitableTrack {
            path: path.to_string(),
        })?;

    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| AudioDecodingError::MissingSampleRate {
            path: path.to_string(),
        })?;
    let channels = track
        .codec_params
        .channels
        .ok_or_else(|| AudioDecodingError::MissingChannelInfo {
            path: path.to_string(),
        })?
        .count();
    let codec_params = track.codec_params.clone();

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| AudioDecodingError::DecoderCreationError {
            path: path.to_string(),
            source: e,
        })?;

    let mut samples: Vec<f32> = Vec::with_capacity(1024 * 512);
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        match format.next_packet() {
            Ok(packet) => {
                if packet.track_id() != track_id {
                    continue;
                }
                match decoder.decode(&packet) {
                    Ok(audio_buf) => {
                        if sample_buf.is_none() {
                            sample_buf = Some(SampleBuffer::<f32>::new(
                                audio_buf.capacity() as u64,
                                *audio_buf.spec(),
                            ));
                        }
                        if let Some(buf) = sample_buf.as_mut() {
                            buf.copy_interleaved_ref(audio_buf);
                            samples.extend_from_slice(buf.samples());
                        }
                    }
                    Err(SymphoniaError::DecodeError(err_desc)) => {
                        log::warn!("Decode: Ignoring decode error in '{}': {}", path, err_desc);
                    }
                    Err(e) => {
                        return Err(AudioDecodingError::FatalDecodeError {
                            path: path.to_string(),
                            source: e,
                        });
                    }
                }
            }
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                log::debug!("Decode: Reached EOF for '{}'", path);
                break;
            }
            Err(SymphoniaError::ResetRequired) => {
                log::warn!("Decode: Decoder reset required unexpectedly for '{}'", path);
                break;
            }
            Err(e) => {
                return Err(AudioDecodingError::PacketReadIoError {
                    path: path.to_string(),
                    source: e,
                });
            }
        }
    }

    decoder.finalize();
    if samples.is_empty() {
        return Err(AudioDecodingError::NoSamplesDecoded {
            path: path.to_string(),
        });
    }
    let track = DecodedTrack {
        samples,
        channels,
        sample_rate,
    };
    log::debug!(
        "Decode: {} frames x {} channels at {} Hz ({} ms) from '{}'",
        track.frames(),
        track.channels,
        track.sample_rate,
        track.duration_ms(),
        path
    );
    Ok(track)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn duration_follows_frames_and_rate() {
        let track = DecodedTrack {
            samples: vec![0.0; 2 * 44_100],
            channels: 2,
            sample_rate: 44_100,
        };
        assert_eq!(track.frames(), 44_100);
        assert_eq!(track.duration_ms(), 1000);
    }

    #[test]
    fn missing_file_is_an_open_error() {
        let err = decode_file("/no/such/track.mp3").unwrap_err();
        assert!(matches!(err, AudioDecodingError::FileOpenError { .. }));
    }

    #[test]
    fn garbage_is_a_format_error() {
        let mut file = tempfile::Builder::new().suffix(".mp3").tempfile().unwrap();
        file.write_all(b"definitely not audio").unwrap();
        let err = decode_file(file.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, AudioDecodingError::FormatError { .. }));
    }

    #[test]
    fn decodes_pcm_wav() {
        let sample_rate: u32 = 8_000;
        let frames: u32 = 800;
        let channels: u16 = 2;
        let data_len = frames * channels as u32 * 2;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVEfmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&channels.to_le_bytes());
        bytes.extend_from_slice(&sample_rate.to_le_bytes());
        bytes.extend_from_slice(&(sample_rate * channels as u32 * 2).to_le_bytes());
        bytes.extend_from_slice(&(channels * 2).to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        for i in 0..frames * channels as u32 {
            bytes.extend_from_slice(&((i % 64) as i16 * 100).to_le_bytes());
        }

        let mut file = tempfile::Builder::new().suffix(".wav").tempfile().unwrap();
        file.write_all(&bytes).unwrap();
        let track = decode_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(track.channels, 2);
        assert_eq!(track.sample_rate, sample_rate);
        assert_eq!(track.frames(), frames as usize);
        assert_eq!(track.duration_ms(), 100);
    }
}
