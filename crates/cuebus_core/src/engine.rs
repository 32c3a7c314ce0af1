//! Cue Engine
//!
//! The control-plane owner of everything: the cue registry, the output
//! patch, the backend and the notice ring.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────┐                 ┌──────────────────────────┐
//! │     Control thread       │                 │       Audio thread       │
//! │                          │  ArcSwap<CueSet>│                          │
//! │  Engine                  │ ──────────────► │  BlockRenderer           │
//! │  - registry (Mutex)      │                 │  - cue.render()          │
//! │  - backend  (Mutex)      │  atomics        │  - patch.mix()           │
//! │  - play/stop/crosspoints │ ──────────────► │  - PerformanceMonitor    │
//! │                          │                 │                          │
//! │  drain_notices()         │ ◄────────────── │  rtrb::Producer<Notice>  │
//! └──────────────────────────┘   SPSC ring     └──────────────────────────┘
//! ```
//!
//! The registry is only mutated under its lock on the control thread;
//! every mutation publishes a fresh immutable `CueSet`. Replaced sets are
//! parked in `retired` until the audio thread has let go of them, so a
//! cue is never freed inside the callback.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use rtrb::{Consumer, RingBuffer};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use cuebus_dsp::{CrosspointMatrix, DspError};

use crate::backend::{AudioBackend, DeviceConfig, OfflineBackend, OfflineHandle, RenderCallback};
use crate::config::EngineConfig;
use crate::cue::{Cue, CueState, CueStatus};
use crate::decoder::{AudioDecoder, SymphoniaDecoder};
use crate::device::AudioDevice;
use crate::error::{EngineError, EngineResult};
use crate::message::{Event, Notice, Severity};
use crate::patch::PatchSnapshot;
use crate::renderer::{BlockRenderer, CueSet, SharedState};
use crate::stream::CpalBackend;

/// Reserved target name for the global output patch
pub const PATCH_TARGET: &str = "patch";

/// Which routing matrix an operation addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixTarget<'a> {
    /// The global bus -> device patch
    Patch,
    /// A cue's own file -> bus matrix
    Cue(&'a str),
}

impl<'a> MatrixTarget<'a> {
    pub fn parse(target: &'a str) -> Self {
        if target == PATCH_TARGET {
            MatrixTarget::Patch
        } else {
            MatrixTarget::Cue(target)
        }
    }
}

/// Engine health and configuration snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub running: bool,
    pub backend: String,
    pub device_name: Option<String>,
    pub sample_rate: u32,
    pub buffer_size: u32,
    pub channels: u16,
    pub latency_ms: f32,
    pub cpu_usage: f32,
    pub dropouts: u64,
    pub cue_count: usize,
    pub playing_cues: usize,
    pub memory_usage: u64,
}

#[derive(Default)]
struct Registry {
    cues: BTreeMap<String, Arc<Cue>>,
    retired: Vec<Arc<CueSet>>,
    next_handle: u64,
}

impl Registry {
    fn get(&self, id: &str) -> EngineResult<&Arc<Cue>> {
        self.cues
            .get(id)
            .ok_or_else(|| EngineError::CueNotFound(id.to_string()))
    }
}

/// Real-time cue playback engine
pub struct Engine {
    config: EngineConfig,
    shared: Arc<SharedState>,
    registry: Mutex<Registry>,
    decoder: Arc<dyn AudioDecoder>,
    backend: Mutex<Box<dyn AudioBackend>>,
    device: Mutex<Option<DeviceConfig>>,
    notices: Mutex<Consumer<Notice>>,
    /// Notices rescued from a ring that was replaced
    backlog: Mutex<Vec<Notice>>,
    /// Renderer for `process_block` while no backend stream owns it
    idle_renderer: Mutex<Option<BlockRenderer>>,
}

impl Engine {
    /// Create an engine around an injected backend and decoder
    pub fn new(
        config: EngineConfig,
        backend: Box<dyn AudioBackend>,
        decoder: Arc<dyn AudioDecoder>,
    ) -> EngineResult<Self> {
        config.validate().map_err(EngineError::Config)?;

        let shared = Arc::new(SharedState::new(&config));
        let (producer, consumer) = RingBuffer::new(config.notice_capacity);
        let renderer = BlockRenderer::new(Arc::clone(&shared), &config, producer);

        info!(
            "Engine created: backend '{}', {} bus channels, {} device channels",
            backend.name(),
            shared.bus_channels,
            config.stream.channels
        );

        Ok(Self {
            config,
            shared,
            registry: Mutex::new(Registry::default()),
            decoder,
            backend: Mutex::new(backend),
            device: Mutex::new(None),
            notices: Mutex::new(consumer),
            backlog: Mutex::new(Vec::new()),
            idle_renderer: Mutex::new(Some(renderer)),
        })
    }

    /// Engine on real hardware with symphonia decoding.
    /// Stream errors are reported on `events` when given.
    pub fn with_cpal(config: EngineConfig, events: Option<Sender<Event>>) -> EngineResult<Self> {
        let backend = match events {
            Some(sender) => CpalBackend::with_events(sender),
            None => CpalBackend::new(),
        };
        Self::new(config, Box::new(backend), Arc::new(SymphoniaDecoder::new()))
    }

    /// Engine on the offline backend, plus the handle that pumps it
    pub fn offline(
        config: EngineConfig,
        decoder: Arc<dyn AudioDecoder>,
    ) -> EngineResult<(Self, OfflineHandle)> {
        let backend = OfflineBackend::new();
        let handle = backend.handle();
        Ok((Self::new(config, Box::new(backend), decoder)?, handle))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------------

    fn validate_id(id: &str) -> EngineResult<()> {
        if id.trim().is_empty() {
            return Err(EngineError::Validation("cueId must not be empty".into()));
        }
        if id == PATCH_TARGET {
            return Err(EngineError::Validation(format!(
                "'{PATCH_TARGET}' is reserved for the output patch"
            )));
        }
        Ok(())
    }

    /// Publish the registry to the audio thread
    fn publish(&self, registry: &mut Registry) {
        let set: CueSet = registry.cues.values().cloned().collect();
        let previous = self.shared.cues.swap(Arc::new(set));
        registry.retired.push(previous);
        // Anything only we still hold is safe to free here
        registry.retired.retain(|set| Arc::strong_count(set) > 1);
    }

    fn next_handle(&self) -> u64 {
        let mut registry = self.registry.lock();
        registry.next_handle += 1;
        registry.next_handle
    }

    fn with_cue<R>(&self, id: &str, f: impl FnOnce(&Cue) -> EngineResult<R>) -> EngineResult<R> {
        let registry = self.registry.lock();
        f(registry.get(id)?)
    }

    /// Decode `path` into a new cue registered as `id`. Blocking.
    pub fn create_cue(&self, id: &str, path: impl AsRef<Path>) -> EngineResult<()> {
        Self::validate_id(id)?;
        if self.registry.lock().cues.contains_key(id) {
            return Err(EngineError::CueExists(id.to_string()));
        }

        // Decode without holding the registry lock
        let mut cue = Cue::new(id, self.next_handle());
        cue.load(self.decoder.as_ref(), path.as_ref(), self.shared.bus_channels)?;

        let mut registry = self.registry.lock();
        if registry.cues.contains_key(id) {
            return Err(EngineError::CueExists(id.to_string()));
        }
        registry.cues.insert(id.to_string(), Arc::new(cue));
        self.publish(&mut registry);
        info!("Cue '{}' created ({} total)", id, registry.cues.len());
        Ok(())
    }

    /// Replace an existing cue's audio with `path`. The cue restarts
    /// `Stopped` with fresh routing; its loop flag is kept.
    pub fn load_file(&self, id: &str, path: impl AsRef<Path>) -> EngineResult<()> {
        let looping = self.with_cue(id, |cue| Ok(cue.is_looping()))?;

        let mut cue = Cue::new(id, self.next_handle());
        cue.load(self.decoder.as_ref(), path.as_ref(), self.shared.bus_channels)?;
        cue.set_loop(looping);

        let mut registry = self.registry.lock();
        let previous = registry
            .cues
            .insert(id.to_string(), Arc::new(cue))
            .ok_or_else(|| EngineError::CueNotFound(id.to_string()))?;
        previous.stop(0.0)?;
        self.publish(&mut registry);
        info!("Cue '{}' reloaded from {:?}", id, path.as_ref());
        Ok(())
    }

    pub fn remove_cue(&self, id: &str) -> EngineResult<()> {
        let mut registry = self.registry.lock();
        let cue = registry
            .cues
            .remove(id)
            .ok_or_else(|| EngineError::CueNotFound(id.to_string()))?;
        cue.stop(0.0)?;
        self.publish(&mut registry);
        info!("Cue '{}' removed", id);
        Ok(())
    }

    pub fn cue_ids(&self) -> Vec<String> {
        self.registry.lock().cues.keys().cloned().collect()
    }

    pub fn cue_status(&self, id: &str) -> EngineResult<CueStatus> {
        self.with_cue(id, |cue| Ok(cue.status()))
    }

    pub fn all_cue_status(&self) -> Vec<CueStatus> {
        self.registry
            .lock()
            .cues
            .values()
            .map(|cue| cue.status())
            .collect()
    }

    pub fn cue_state(&self, id: &str) -> EngineResult<CueState> {
        self.with_cue(id, |cue| Ok(cue.state()))
    }

    // ------------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------------

    pub fn play_cue(&self, id: &str, start_time: f64, fade_in: f64) -> EngineResult<()> {
        self.with_cue(id, |cue| cue.play(start_time, fade_in))
    }

    pub fn stop_cue(&self, id: &str, fade_out: f64) -> EngineResult<()> {
        self.with_cue(id, |cue| cue.stop(fade_out))
    }

    /// Returns whether the cue was playing (and is now paused)
    pub fn pause_cue(&self, id: &str) -> EngineResult<bool> {
        self.with_cue(id, |cue| Ok(cue.pause()))
    }

    /// Returns whether the cue was paused (and is now playing)
    pub fn resume_cue(&self, id: &str) -> EngineResult<bool> {
        self.with_cue(id, |cue| Ok(cue.resume()))
    }

    /// Immediately stop every cue
    pub fn stop_all_cues(&self) {
        let registry = self.registry.lock();
        for cue in registry.cues.values() {
            // Zero fade cannot fail validation
            let _ = cue.stop(0.0);
        }
        debug!("Stopped all {} cues", registry.cues.len());
    }

    pub fn set_cue_loop(&self, id: &str, looping: bool) -> EngineResult<()> {
        self.with_cue(id, |cue| {
            cue.set_loop(looping);
            Ok(())
        })
    }

    pub fn set_input_channel(&self, id: &str, file_channel: usize, input: usize) -> EngineResult<()> {
        self.with_cue(id, |cue| cue.set_input_channel(file_channel, input))
    }

    // ------------------------------------------------------------------
    // Routing
    // ------------------------------------------------------------------

    fn with_matrix<R>(
        &self,
        target: MatrixTarget<'_>,
        f: impl FnOnce(&CrosspointMatrix) -> Result<R, DspError>,
    ) -> EngineResult<R> {
        match target {
            MatrixTarget::Patch => Ok(f(self.shared.patch.matrix())?),
            MatrixTarget::Cue(id) => self.with_cue(id, |cue| Ok(f(cue.matrix())?)),
        }
    }

    pub fn set_crosspoint(
        &self,
        target: MatrixTarget<'_>,
        input: usize,
        output: usize,
        level_db: f32,
    ) -> EngineResult<()> {
        self.with_matrix(target, |m| m.try_set_crosspoint(input, output, level_db))
    }

    /// Crosspoint level in dB (-100 for out-of-range indices)
    pub fn get_crosspoint(&self, target: MatrixTarget<'_>, input: usize, output: usize) -> EngineResult<f32> {
        self.with_matrix(target, |m| Ok(m.crosspoint(input, output)))
    }

    pub fn set_input_level(&self, target: MatrixTarget<'_>, input: usize, level_db: f32) -> EngineResult<()> {
        self.with_matrix(target, |m| m.try_set_input_trim(input, level_db))
    }

    pub fn set_output_level(&self, target: MatrixTarget<'_>, output: usize, level_db: f32) -> EngineResult<()> {
        self.with_matrix(target, |m| m.try_set_output_trim(output, level_db))
    }

    pub fn set_input_mute(&self, target: MatrixTarget<'_>, input: usize, muted: bool) -> EngineResult<()> {
        self.with_matrix(target, |m| m.try_mute_input(input, muted))
    }

    pub fn mute_output(&self, target: MatrixTarget<'_>, output: usize, muted: bool) -> EngineResult<()> {
        self.with_matrix(target, |m| m.try_mute_output(output, muted))
    }

    pub fn solo_output(&self, target: MatrixTarget<'_>, output: usize, soloed: bool) -> EngineResult<()> {
        self.with_matrix(target, |m| m.try_solo_output(output, soloed))
    }

    /// Set a bus -> device route as linear gain
    pub fn set_patch_routing(&self, bus: usize, device: usize, level: f32) -> EngineResult<()> {
        self.shared.patch.set_routing(bus, device, level)
    }

    pub fn get_patch_routing(&self, bus: usize, device: usize) -> f32 {
        self.shared.patch.routing(bus, device)
    }

    pub fn set_stereo_routing(&self, start_bus: usize, start_device: usize) -> EngineResult<()> {
        self.shared.patch.set_stereo_routing(start_bus, start_device)
    }

    pub fn reset_patch(&self) {
        self.shared.patch.reset_to_default();
    }

    pub fn patch_snapshot(&self) -> PatchSnapshot {
        self.shared.patch.snapshot()
    }

    pub fn restore_patch(&self, snapshot: &PatchSnapshot) -> EngineResult<()> {
        self.shared.patch.restore(snapshot)
    }

    // ------------------------------------------------------------------
    // Device
    // ------------------------------------------------------------------

    pub fn list_devices(&self) -> EngineResult<Vec<AudioDevice>> {
        self.backend.lock().enumerate()
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    pub fn device_config(&self) -> Option<DeviceConfig> {
        self.device.lock().clone()
    }

    /// Open `device` (default when `None`) and start rendering into it.
    /// An already open device is closed first.
    pub fn start(&self, device: Option<&str>) -> EngineResult<DeviceConfig> {
        let mut backend = self.backend.lock();
        if backend.is_open() {
            backend.close();
            self.shared.set_running(false);
        }

        let mut renderer = match self.idle_renderer.lock().take() {
            Some(renderer) => renderer,
            None => self.fresh_renderer(),
        };
        renderer.reset_clock();

        self.shared.set_sample_rate(self.config.stream.sample_rate);
        let callback: RenderCallback = Box::new(move |out, channels, frames| {
            renderer.process_block(out, channels, frames);
        });

        match backend.open(device, &self.config.stream, callback) {
            Ok(opened) => {
                self.shared.set_sample_rate(opened.sample_rate);
                self.shared.reset_counters();
                self.shared.set_running(true);
                *self.device.lock() = Some(opened.clone());
                info!(
                    "Engine running on '{}' via {} ({:.1} ms)",
                    opened.device_name,
                    backend.name(),
                    opened.buffer_size as f32 / opened.sample_rate.max(1) as f32 * 1000.0
                );
                Ok(opened)
            }
            Err(e) => {
                warn!("Failed to start audio device: {}", e);
                self.shared.set_running(false);
                *self.device.lock() = None;
                // The backend dropped our renderer with the callback
                let renderer = self.fresh_renderer();
                *self.idle_renderer.lock() = Some(renderer);
                Err(e)
            }
        }
    }

    /// Switch to the named output device
    pub fn set_audio_device(&self, name: &str) -> EngineResult<DeviceConfig> {
        self.start(Some(name))
    }

    /// Close the device. Cues keep their state.
    pub fn stop_device(&self) {
        let mut backend = self.backend.lock();
        if !backend.is_open() {
            return;
        }
        backend.close();
        drop(backend);

        self.shared.set_running(false);
        *self.device.lock() = None;

        let renderer = self.fresh_renderer();
        *self.idle_renderer.lock() = Some(renderer);
        info!("Audio device stopped");
    }

    /// New renderer on a new notice ring; the old ring is drained into the backlog
    fn fresh_renderer(&self) -> BlockRenderer {
        let (producer, consumer) = RingBuffer::new(self.config.notice_capacity);
        let mut old = std::mem::replace(&mut *self.notices.lock(), consumer);
        let mut backlog = self.backlog.lock();
        while let Ok(notice) = old.pop() {
            backlog.push(notice);
        }
        BlockRenderer::new(Arc::clone(&self.shared), &self.config, producer)
    }

    /// Render one block synchronously (offline use and tests).
    ///
    /// `out` is planar: `out[ch * frames + n]`. While a backend stream is
    /// running it owns the renderer and this writes silence.
    pub fn process_block(&mut self, out: &mut [f32], channels: usize, frames: usize) {
        match self.idle_renderer.get_mut() {
            Some(renderer) => renderer.process_block(out, channels, frames),
            None => out.fill(0.0),
        }
    }

    /// Stop all cues, close the device and clear the registry
    pub fn shutdown(&self) {
        self.stop_all_cues();
        self.stop_device();

        let mut registry = self.registry.lock();
        registry.cues.clear();
        self.publish(&mut registry);
        info!("Engine shut down");
    }

    // ------------------------------------------------------------------
    // Status and notices
    // ------------------------------------------------------------------

    pub fn cpu_usage(&self) -> f32 {
        self.shared.cpu_usage()
    }

    pub fn dropout_count(&self) -> u64 {
        self.shared.dropouts()
    }

    /// Bytes of decoded audio held by all cues
    pub fn memory_usage(&self) -> u64 {
        self.registry
            .lock()
            .cues
            .values()
            .map(|cue| cue.memory_bytes())
            .sum()
    }

    pub fn status(&self) -> EngineStatus {
        let (cue_count, playing_cues, memory_usage) = {
            let registry = self.registry.lock();
            (
                registry.cues.len(),
                registry
                    .cues
                    .values()
                    .filter(|cue| cue.state() == CueState::Playing)
                    .count(),
                registry.cues.values().map(|cue| cue.memory_bytes()).sum(),
            )
        };
        let device = self.device.lock().clone();
        let stream = &self.config.stream;
        let sample_rate = device.as_ref().map_or(stream.sample_rate, |d| d.sample_rate);
        let buffer_size = device.as_ref().map_or(stream.buffer_size, |d| d.buffer_size);

        EngineStatus {
            running: self.is_running(),
            backend: self.backend.lock().name().to_string(),
            device_name: device.as_ref().map(|d| d.device_name.clone()),
            sample_rate,
            buffer_size,
            channels: device.as_ref().map_or(stream.channels, |d| d.channels),
            latency_ms: buffer_size as f32 / sample_rate.max(1) as f32 * 1000.0,
            cpu_usage: self.cpu_usage(),
            dropouts: self.dropout_count(),
            cue_count,
            playing_cues,
            memory_usage,
        }
    }

    /// Collect everything the audio thread reported since the last call
    pub fn drain_notices(&self) -> Vec<Notice> {
        let mut notices = std::mem::take(&mut *self.backlog.lock());
        {
            let mut consumer = self.notices.lock();
            while let Ok(notice) = consumer.pop() {
                notices.push(notice);
            }
        }

        for notice in &notices {
            match notice {
                Notice::Dropout { late_micros } => {
                    warn!("Audio dropout: callback {} us late", late_micros)
                }
                Notice::CueEnded { handle } => debug!("Cue #{} reached its end", handle),
                Notice::CueFadedOut { handle } => debug!("Cue #{} faded out", handle),
            }
        }
        notices
    }

    /// Translate a notice into the event a host would see
    pub fn notice_event(&self, notice: &Notice) -> Option<Event> {
        match *notice {
            Notice::CueEnded { handle } | Notice::CueFadedOut { handle } => {
                let registry = self.registry.lock();
                let cue = registry.cues.values().find(|cue| cue.handle() == handle)?;
                Some(Event::PlaybackStatus {
                    cue_id: cue.id().to_string(),
                    status: cue.state(),
                    current_time: cue.current_time(),
                    duration: cue.duration(),
                })
            }
            Notice::Dropout { late_micros } => Some(Event::audio_error(
                "dropout",
                Severity::Warning,
                format!("Audio callback {late_micros} us late"),
            )),
        }
    }

    /// Drain notices and translate them to events
    pub fn drain_events(&self) -> Vec<Event> {
        self.drain_notices()
            .iter()
            .filter_map(|notice| self.notice_event(notice))
            .collect()
    }

    pub fn performance_event(&self) -> Event {
        Event::PerformanceStats {
            cpu_usage: self.cpu_usage(),
            dropouts: self.dropout_count(),
            memory_usage: self.memory_usage(),
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.backend.get_mut().close();
    }
}
