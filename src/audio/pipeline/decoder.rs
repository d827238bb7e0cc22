use std::io::Cursor;

use bytes::Bytes;
use symphonia::core::{
    audio::SampleBuffer,
    codecs::{CODEC_TYPE_NULL, DecoderOptions},
    errors::Error,
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};
use tracing::{debug, trace};

use super::resampler::Resampler;
use crate::{
    audio::{
        buffer::PcmBuffer,
        constants::{MIXER_CHANNELS, TARGET_SAMPLE_RATE},
    },
    common::{AssetError, AssetId},
};

/// Turns fetched bytes into mix-ready PCM. Called on a blocking thread.
pub trait PcmDecoder: Send + Sync + 'static {
    fn decode(&self, asset: &AssetId, url: &str, bytes: Bytes) -> Result<PcmBuffer, AssetError>;
}

/// Decodes any container Symphonia knows into interleaved stereo i16 at the
/// mix rate.
pub struct SymphoniaDecoder {
    target_rate: u32,
}

impl Default for SymphoniaDecoder {
    fn default() -> Self {
        Self::new(TARGET_SAMPLE_RATE)
    }
}

impl SymphoniaDecoder {
    pub fn new(target_rate: u32) -> Self {
        Self { target_rate }
    }
}

impl PcmDecoder for SymphoniaDecoder {
    fn decode(&self, asset: &AssetId, url: &str, bytes: Bytes) -> Result<PcmBuffer, AssetError> {
        let fail = |reason: String| AssetError::Decode {
            asset: asset.clone(),
            reason,
        };

        let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());
        let hint = hint_for(url);
        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| fail(e.to_string()))?;

        let mut format = probed.format;
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| AssetError::NoAudioTrack {
                asset: asset.clone(),
            })?;

        let track_id = track.id;
        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| fail(e.to_string()))?;

        let mut sample_buf: Option<SampleBuffer<i16>> = None;
        let mut resampler: Option<Resampler> = None;
        let mut stereo = Vec::new();
        let mut out = Vec::new();

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(Error::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(Error::ResetRequired) => break,
                Err(e) => return Err(fail(e.to_string())),
            };

            if packet.track_id() != track_id {
                continue;
            }

            let audio_buf = match decoder.decode(&packet) {
                Ok(audio_buf) => audio_buf,
                Err(Error::DecodeError(e)) => {
                    trace!("{}: skipping corrupt packet: {}", asset, e);
                    continue;
                }
                Err(Error::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(fail(e.to_string())),
            };

            let spec = *audio_buf.spec();
            let channels = spec.channels.count();
            let needed = audio_buf.capacity() * channels;

            if sample_buf.as_ref().is_none_or(|b| b.capacity() < needed) {
                sample_buf = Some(SampleBuffer::<i16>::new(audio_buf.capacity() as u64, spec));
            }
            let Some(buf) = sample_buf.as_mut() else {
                continue;
            };
            buf.copy_interleaved_ref(audio_buf);

            stereo.clear();
            to_stereo(buf.samples(), channels, &mut stereo);

            resampler
                .get_or_insert_with(|| {
                    debug!(
                        "{}: {} Hz, {} channels -> {} Hz stereo",
                        asset, spec.rate, channels, self.target_rate
                    );
                    Resampler::new(spec.rate, self.target_rate, MIXER_CHANNELS)
                })
                .process(&stereo, &mut out);
        }

        if out.is_empty() {
            return Err(fail("no audio decoded".into()));
        }

        Ok(PcmBuffer::new(out, self.target_rate, MIXER_CHANNELS))
    }
}

/// Mono is duplicated, surround is folded down to its front pair.
fn to_stereo(samples: &[i16], channels: usize, out: &mut Vec<i16>) {
    match channels {
        0 => {}
        1 => {
            for &s in samples {
                out.push(s);
                out.push(s);
            }
        }
        2 => out.extend_from_slice(samples),
        n => {
            for frame in samples.chunks_exact(n) {
                out.push(frame[0]);
                out.push(frame[1]);
            }
        }
    }
}

fn hint_for(url: &str) -> Hint {
    let mut hint = Hint::new();
    let path = url.split(['?', '#']).next().unwrap_or(url);
    if let Some(ext) = std::path::Path::new(path)
        .extension()
        .and_then(|s| s.to_str())
    {
        match ext.to_lowercase().as_str() {
            "mp3" => {
                hint.with_extension("mp3");
            }
            "m4a" | "mp4" | "aac" => {
                hint.with_extension("m4a");
            }
            "ogg" | "oga" => {
                hint.with_extension("ogg");
            }
            "flac" => {
                hint.with_extension("flac");
            }
            "wav" => {
                hint.with_extension("wav");
            }
            "mkv" | "webm" => {
                hint.with_extension("mkv");
            }
            _ => {}
        }
    }
    hint
}
