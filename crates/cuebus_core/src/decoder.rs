//! Audio File Decoding
//!
//! Cues decode their file fully into memory on the control thread; the
//! audio thread only ever reads the resulting planar buffers.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};

/// Fully decoded planar audio
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl DecodedAudio {
    /// Build from planar channel data. Channels are truncated to the
    /// shortest one so every channel has the same frame count.
    pub fn new(sample_rate: u32, mut channels: Vec<Vec<f32>>) -> Self {
        let frames = channels.iter().map(Vec::len).min().unwrap_or(0);
        for ch in &mut channels {
            ch.truncate(frames);
        }
        Self {
            sample_rate,
            channels,
        }
    }

    /// Silence of the given shape
    pub fn silence(sample_rate: u32, channels: usize, frames: usize) -> Self {
        Self::new(sample_rate, vec![vec![0.0; frames]; channels])
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        self.channels.get(index).map_or(&[], Vec::as_slice)
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Bytes held by the sample data
    pub fn memory_bytes(&self) -> u64 {
        (self.frames() * self.channel_count() * std::mem::size_of::<f32>()) as u64
    }
}

/// Turns a file into [`DecodedAudio`]
pub trait AudioDecoder: Send + Sync {
    fn decode(&self, path: &Path) -> EngineResult<DecodedAudio>;
}

/// Decoder for WAV, FLAC, MP3 and OGG/Vorbis via symphonia
#[derive(Debug, Default, Clone, Copy)]
pub struct SymphoniaDecoder;

impl SymphoniaDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl AudioDecoder for SymphoniaDecoder {
    fn decode(&self, path: &Path) -> EngineResult<DecodedAudio> {
        let shown = path.display().to_string();
        let io_err = |message: String| EngineError::Io {
            path: shown.clone(),
            message,
        };
        let decode_err = |message: String| EngineError::Decode {
            path: shown.clone(),
            message,
        };

        let file = File::open(path).map_err(|e| io_err(e.to_string()))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| match e {
                SymphoniaError::Unsupported(what) => EngineError::UnsupportedFormat(format!(
                    "{shown}: {what}"
                )),
                other => decode_err(other.to_string()),
            })?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| EngineError::UnsupportedFormat(format!("{shown}: no audio track")))?;
        let track_id = track.id;

        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| decode_err("unknown sample rate".into()))?;
        let mut channel_count = track.codec_params.channels.map_or(0, |c| c.count());

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| EngineError::UnsupportedFormat(format!("{shown}: {e}")))?;

        let mut channels: Vec<Vec<f32>> = vec![Vec::new(); channel_count];
        let mut sample_buf: Option<SampleBuffer<f32>> = None;

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(decode_err(e.to_string())),
            };
            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    // Corrupt frame; keep going
                    debug!("Skipping undecodable packet in {}: {}", shown, e);
                    continue;
                }
                Err(e) => return Err(decode_err(e.to_string())),
            };

            let spec = *decoded.spec();
            if channel_count == 0 {
                channel_count = spec.channels.count();
                channels = vec![Vec::new(); channel_count];
            }

            let buf = sample_buf
                .get_or_insert_with(|| SampleBuffer::<f32>::new(decoded.capacity() as u64, spec));
            if (buf.capacity() as u64) < decoded.capacity() as u64 * spec.channels.count() as u64 {
                *buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            }
            buf.copy_interleaved_ref(decoded);

            for frame in buf.samples().chunks(channel_count.max(1)) {
                for (ch, &sample) in frame.iter().enumerate().take(channel_count) {
                    channels[ch].push(sample);
                }
            }
        }

        if channel_count == 0 {
            return Err(decode_err("no channels".into()));
        }

        let audio = DecodedAudio::new(sample_rate, channels);
        if audio.frames() == 0 {
            warn!("{} decoded to zero frames", shown);
        }
        debug!(
            "Decoded {}: {} ch, {} Hz, {} frames",
            shown,
            audio.channel_count(),
            audio.sample_rate(),
            audio.frames()
        );
        Ok(audio)
    }
}

/// Decoder serving pre-registered buffers by path
///
/// Lets hosts and tests run the engine without touching the filesystem.
#[derive(Debug, Default)]
pub struct MemoryDecoder {
    clips: RwLock<HashMap<PathBuf, DecodedAudio>>,
}

impl MemoryDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<PathBuf>, audio: DecodedAudio) {
        self.clips.write().insert(path.into(), audio);
    }

    pub fn with_clip(self, path: impl Into<PathBuf>, audio: DecodedAudio) -> Self {
        self.insert(path, audio);
        self
    }
}

impl AudioDecoder for MemoryDecoder {
    fn decode(&self, path: &Path) -> EngineResult<DecodedAudio> {
        self.clips
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| EngineError::Io {
                path: path.display().to_string(),
                message: "No such file".into(),
            })
    }
}
