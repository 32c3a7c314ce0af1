//! Audio Backend Abstraction
//!
//! The engine never talks to an audio API directly. A backend owns the
//! device and calls the installed [`RenderCallback`] once per block with a
//! planar output buffer (`channels × frames`, channel-major).
//!
//! Two backends ship with the crate:
//! - [`CpalBackend`](crate::CpalBackend): real hardware through cpal
//! - [`OfflineBackend`]: no device; blocks are pumped by the caller

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::StreamConfig;
use crate::device::AudioDevice;
use crate::error::{EngineError, EngineResult};

/// Per-block audio callback: `(planar_output, channels, frames)`
pub type RenderCallback = Box<dyn FnMut(&mut [f32], usize, usize) + Send>;

/// What a backend actually opened
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfig {
    pub device_name: String,
    pub sample_rate: u32,
    pub buffer_size: u32,
    pub channels: u16,
}

/// A swappable audio output backend
pub trait AudioBackend: Send {
    fn name(&self) -> &str;

    /// Output devices this backend can open
    fn enumerate(&self) -> EngineResult<Vec<AudioDevice>>;

    /// Open `device` (or the default when `None`) and start calling
    /// `callback`. Any previously open stream is closed first.
    fn open(
        &mut self,
        device: Option<&str>,
        config: &StreamConfig,
        callback: RenderCallback,
    ) -> EngineResult<DeviceConfig>;

    /// Stop calling the callback and release the device
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

/// Name of the single virtual device the offline backend exposes
pub const OFFLINE_DEVICE_NAME: &str = "Offline Output";

struct OfflineStream {
    callback: RenderCallback,
    config: DeviceConfig,
    buffer: Vec<f32>,
    blocks: u64,
}

/// Backend with no hardware behind it
///
/// Rendering happens only when the host calls [`OfflineHandle::pump`],
/// synchronously on the calling thread.
#[derive(Default)]
pub struct OfflineBackend {
    stream: Arc<Mutex<Option<OfflineStream>>>,
}

impl OfflineBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for pumping blocks and reading the last output
    pub fn handle(&self) -> OfflineHandle {
        OfflineHandle {
            stream: Arc::clone(&self.stream),
        }
    }
}

impl AudioBackend for OfflineBackend {
    fn name(&self) -> &str {
        "offline"
    }

    fn enumerate(&self) -> EngineResult<Vec<AudioDevice>> {
        Ok(vec![AudioDevice {
            id: OFFLINE_DEVICE_NAME.to_string(),
            name: OFFLINE_DEVICE_NAME.to_string(),
            is_default: true,
            sample_rates: vec![44100, 48000, 88200, 96000],
            max_channels: cuebus_dsp::DEVICE_CHANNELS as u16,
        }])
    }

    fn open(
        &mut self,
        device: Option<&str>,
        config: &StreamConfig,
        callback: RenderCallback,
    ) -> EngineResult<DeviceConfig> {
        config.validate().map_err(EngineError::Config)?;
        if let Some(name) = device {
            if name != OFFLINE_DEVICE_NAME {
                return Err(EngineError::Device(format!("Device not found: {name}")));
            }
        }

        let device_config = DeviceConfig {
            device_name: OFFLINE_DEVICE_NAME.to_string(),
            sample_rate: config.sample_rate,
            buffer_size: config.buffer_size,
            channels: config.channels,
        };
        let len = config.channels as usize * config.buffer_size as usize;

        *self.stream.lock() = Some(OfflineStream {
            callback,
            config: device_config.clone(),
            buffer: vec![0.0; len],
            blocks: 0,
        });
        info!(
            "Offline stream opened: {} Hz, {} frames, {} ch",
            config.sample_rate, config.buffer_size, config.channels
        );
        Ok(device_config)
    }

    fn close(&mut self) {
        if self.stream.lock().take().is_some() {
            debug!("Offline stream closed");
        }
    }

    fn is_open(&self) -> bool {
        self.stream.lock().is_some()
    }
}

/// Drives an [`OfflineBackend`] from the host or a test
#[derive(Clone)]
pub struct OfflineHandle {
    stream: Arc<Mutex<Option<OfflineStream>>>,
}

impl OfflineHandle {
    /// Run the callback `blocks` times
    pub fn pump(&self, blocks: usize) -> EngineResult<()> {
        let mut guard = self.stream.lock();
        let stream = guard.as_mut().ok_or(EngineError::NotRunning)?;

        let channels = stream.config.channels as usize;
        let frames = stream.config.buffer_size as usize;
        for _ in 0..blocks {
            (stream.callback)(&mut stream.buffer, channels, frames);
            stream.blocks += 1;
        }
        Ok(())
    }

    /// Run enough blocks to cover at least `frames` frames
    pub fn pump_frames(&self, frames: usize) -> EngineResult<usize> {
        let block = self.config().ok_or(EngineError::NotRunning)?.buffer_size as usize;
        let blocks = frames.div_ceil(block.max(1));
        self.pump(blocks)?;
        Ok(blocks)
    }

    pub fn config(&self) -> Option<DeviceConfig> {
        self.stream.lock().as_ref().map(|s| s.config.clone())
    }

    /// Blocks rendered since the stream was opened
    pub fn blocks_rendered(&self) -> u64 {
        self.stream.lock().as_ref().map_or(0, |s| s.blocks)
    }

    /// Copy of one channel of the most recent block
    pub fn channel(&self, channel: usize) -> Vec<f32> {
        let guard = self.stream.lock();
        match guard.as_ref() {
            Some(stream) if channel < stream.config.channels as usize => {
                let frames = stream.config.buffer_size as usize;
                stream.buffer[channel * frames..(channel + 1) * frames].to_vec()
            }
            _ => Vec::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.stream.lock().is_some()
    }
}
