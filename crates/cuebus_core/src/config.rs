//! Engine and Stream Configuration

use serde::{Deserialize, Serialize};

use cuebus_dsp::{BUS_CHANNELS, DEVICE_CHANNELS};

/// Audio stream configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Sample rate in Hz (e.g., 44100, 48000, 96000)
    pub sample_rate: u32,

    /// Number of device output channels
    pub channels: u16,

    /// Buffer size in frames (lower = less latency, higher = more stability)
    pub buffer_size: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            buffer_size: 512,
        }
    }
}

impl StreamConfig {
    /// Calculate latency in milliseconds for this configuration
    pub fn latency_ms(&self) -> f32 {
        (self.buffer_size as f32 / self.sample_rate as f32) * 1000.0
    }

    /// Expected wall-clock duration of one block in seconds
    pub fn block_seconds(&self) -> f64 {
        self.buffer_size as f64 / self.sample_rate as f64
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate < 8000 || self.sample_rate > 192000 {
            return Err(format!("Invalid sample rate: {}", self.sample_rate));
        }
        if self.channels == 0 || self.channels as usize > DEVICE_CHANNELS {
            return Err(format!("Invalid channel count: {}", self.channels));
        }
        if self.buffer_size < 16 || self.buffer_size > 8192 {
            return Err(format!("Invalid buffer size: {}", self.buffer_size));
        }
        Ok(())
    }
}

/// Overall engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Stream configuration requested from the backend
    pub stream: StreamConfig,

    /// Active bus width between cue matrices and the output patch
    pub bus_channels: usize,

    /// Largest block the renderer processes in one pass; longer device
    /// callbacks are split into chunks of this size
    pub max_block_frames: usize,

    /// Capacity of the audio-thread notice ring
    pub notice_capacity: usize,

    /// Fraction by which a callback interval may exceed the block
    /// duration before it counts as a dropout
    pub dropout_margin: f64,

    /// Weight of the newest observation in the smoothed CPU estimate
    pub cpu_smoothing: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stream: StreamConfig::default(),
            bus_channels: BUS_CHANNELS,
            max_block_frames: 1024,
            notice_capacity: 256,
            dropout_margin: 0.10,
            cpu_smoothing: 0.1,
        }
    }
}

impl EngineConfig {
    /// Create config optimized for low latency
    pub fn low_latency() -> Self {
        Self {
            stream: StreamConfig {
                sample_rate: 48000,
                channels: 2,
                buffer_size: 128, // ~2.6ms latency
            },
            max_block_frames: 512,
            ..Self::default()
        }
    }

    /// Create config optimized for stability
    pub fn stable() -> Self {
        Self {
            stream: StreamConfig {
                sample_rate: 48000,
                channels: 2,
                buffer_size: 1024, // ~21ms latency
            },
            max_block_frames: 2048,
            ..Self::default()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        self.stream.validate()?;
        if self.bus_channels == 0 || self.bus_channels > BUS_CHANNELS {
            return Err(format!("Invalid bus width: {}", self.bus_channels));
        }
        if self.max_block_frames == 0 {
            return Err("Max block size must be positive".into());
        }
        if self.notice_capacity == 0 {
            return Err("Notice capacity must be positive".into());
        }
        if !(self.dropout_margin >= 0.0) {
            return Err(format!("Invalid dropout margin: {}", self.dropout_margin));
        }
        if !(self.cpu_smoothing > 0.0 && self.cpu_smoothing <= 1.0) {
            return Err(format!("Invalid CPU smoothing: {}", self.cpu_smoothing));
        }
        Ok(())
    }
}
