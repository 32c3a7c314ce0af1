//! Block Rendering Pipeline
//!
//! Everything that runs inside the device callback lives here.
//!
//! # Pipeline
//!
//! ```text
//! ┌──────────┐  render   ┌───────────┐  patch mix  ┌──────────────┐
//! │ Cue 1..N │ ────────► │ Bus (64)  │ ──────────► │ Device (≤32) │ ──► planar out
//! └──────────┘ per-cue   └───────────┘             └──────────────┘
//!              matrix
//! ```
//!
//! # Real-time Safety
//!
//! - The cue set is read through an `ArcSwap` snapshot; no lock is taken.
//! - All buffers are allocated when the renderer is built.
//! - Audio-thread facts leave through an `rtrb` ring; a full ring drops them.
//! - Nothing here logs.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use rtrb::Producer;

use cuebus_dsp::{AtomicF32, ChannelBuffer, BUS_CHANNELS, CUE_MATRIX_INPUTS, DEVICE_CHANNELS};

use crate::config::EngineConfig;
use crate::cue::{Cue, RenderOutcome};
use crate::message::Notice;
use crate::patch::OutputPatch;

/// Immutable set of cues visible to the audio thread
pub type CueSet = Vec<Arc<Cue>>;

/// State shared between the engine (control thread) and the renderer
#[derive(Debug)]
pub struct SharedState {
    pub(crate) cues: ArcSwap<CueSet>,
    pub(crate) patch: OutputPatch,
    pub(crate) bus_channels: usize,

    cpu_usage: AtomicF32,
    dropouts: AtomicU64,
    sample_rate: AtomicU32,
    running: AtomicBool,
}

impl SharedState {
    pub fn new(config: &EngineConfig) -> Self {
        let bus_channels = config.bus_channels.min(BUS_CHANNELS);
        Self {
            cues: ArcSwap::from_pointee(Vec::new()),
            patch: OutputPatch::with_size(bus_channels, config.stream.channels as usize),
            bus_channels,
            cpu_usage: AtomicF32::new(0.0),
            dropouts: AtomicU64::new(0),
            sample_rate: AtomicU32::new(config.stream.sample_rate),
            running: AtomicBool::new(false),
        }
    }

    pub fn patch(&self) -> &OutputPatch {
        &self.patch
    }

    /// Smoothed load estimate in percent
    pub fn cpu_usage(&self) -> f32 {
        self.cpu_usage.load(Ordering::Relaxed)
    }

    pub fn dropouts(&self) -> u64 {
        self.dropouts.load(Ordering::Relaxed)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Relaxed)
    }

    pub(crate) fn set_sample_rate(&self, sample_rate: u32) {
        self.sample_rate.store(sample_rate, Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    pub(crate) fn reset_counters(&self) {
        self.cpu_usage.store(0.0, Ordering::Relaxed);
        self.dropouts.store(0, Ordering::Relaxed);
    }
}

/// Dropout detector and CPU estimate
///
/// Compares the wall-clock interval between callbacks with the duration
/// of audio the previous callback produced. An interval more than
/// `margin` over budget counts as a dropout and pushes the estimate
/// toward 100%; on-time callbacks let it decay toward zero.
#[derive(Debug, Clone)]
pub struct PerformanceMonitor {
    margin: f64,
    smoothing: f32,
    cpu: f32,
    dropouts: u64,
    last_callback: Option<Instant>,
    last_expected: Duration,
}

impl PerformanceMonitor {
    pub fn new(margin: f64, smoothing: f32) -> Self {
        Self {
            margin,
            smoothing: smoothing.clamp(f32::EPSILON, 1.0),
            cpu: 0.0,
            dropouts: 0,
            last_callback: None,
            last_expected: Duration::ZERO,
        }
    }

    pub fn cpu_usage(&self) -> f32 {
        self.cpu
    }

    pub fn dropouts(&self) -> u64 {
        self.dropouts
    }

    /// Feed one callback interval. Returns how late it was on a dropout.
    pub fn observe(&mut self, elapsed: Duration, expected: Duration) -> Option<Duration> {
        let budget = expected.as_secs_f64() * (1.0 + self.margin);
        if expected > Duration::ZERO && elapsed.as_secs_f64() > budget {
            self.dropouts += 1;
            self.cpu = ((1.0 - self.smoothing) * self.cpu + self.smoothing * 100.0).min(100.0);
            Some(elapsed.saturating_sub(expected))
        } else {
            self.cpu *= 1.0 - self.smoothing * 0.5;
            None
        }
    }

    /// Record a callback arriving now that will produce `frames` frames
    #[inline]
    pub fn callback(&mut self, now: Instant, frames: usize, sample_rate: u32) -> Option<Duration> {
        let late = match self.last_callback {
            Some(previous) => self.observe(now.saturating_duration_since(previous), self.last_expected),
            None => None,
        };
        self.last_callback = Some(now);
        self.last_expected = if sample_rate > 0 {
            Duration::from_secs_f64(frames as f64 / sample_rate as f64)
        } else {
            Duration::ZERO
        };
        late
    }

    /// Forget the previous callback (e.g. after the device restarts)
    pub fn reset_clock(&mut self) {
        self.last_callback = None;
    }
}

/// The audio-thread half of the engine
pub struct BlockRenderer {
    shared: Arc<SharedState>,
    bus: ChannelBuffer,
    device: ChannelBuffer,
    scratch: ChannelBuffer,
    max_block: usize,
    monitor: PerformanceMonitor,
    notices: Producer<Notice>,
}

impl BlockRenderer {
    /// Allocate all buffers. Control thread only.
    pub fn new(shared: Arc<SharedState>, config: &EngineConfig, notices: Producer<Notice>) -> Self {
        let max_block = config.max_block_frames.max(1);
        Self {
            bus: ChannelBuffer::new(shared.bus_channels, max_block),
            device: ChannelBuffer::new(DEVICE_CHANNELS, max_block),
            scratch: ChannelBuffer::new(CUE_MATRIX_INPUTS, max_block),
            max_block,
            monitor: PerformanceMonitor::new(config.dropout_margin, config.cpu_smoothing),
            notices,
            shared,
        }
    }

    pub fn monitor(&self) -> &PerformanceMonitor {
        &self.monitor
    }

    /// Produce `frames` frames of `channels` device outputs into `out`
    /// (planar, `out[ch * frames + n]`).
    ///
    /// Blocks longer than the configured maximum are rendered in chunks.
    /// Channels beyond the patch width are written as silence.
    pub fn process_block(&mut self, out: &mut [f32], channels: usize, frames: usize) {
        let frames = if channels == 0 { 0 } else { frames.min(out.len() / channels) };
        out[..channels * frames].fill(0.0);
        if frames == 0 {
            return;
        }

        self.track_timing(frames);

        let cues = self.shared.cues.load();
        let mut offset = 0;
        while offset < frames {
            let n = (frames - offset).min(self.max_block);

            self.bus.clear_frames(n);
            self.device.clear_frames(n);

            for cue in cues.iter() {
                match cue.render(&mut self.scratch, &mut self.bus, n) {
                    RenderOutcome::Ended => {
                        let _ = self.notices.push(Notice::CueEnded {
                            handle: cue.handle(),
                        });
                    }
                    RenderOutcome::FadedOut => {
                        let _ = self.notices.push(Notice::CueFadedOut {
                            handle: cue.handle(),
                        });
                    }
                    RenderOutcome::Idle | RenderOutcome::Playing => {}
                }
            }

            self.shared.patch.mix(&self.bus, &mut self.device, n);

            for ch in 0..channels.min(self.device.channels()) {
                let start = ch * frames + offset;
                out[start..start + n].copy_from_slice(&self.device.channel(ch)[..n]);
            }
            offset += n;
        }
    }

    fn track_timing(&mut self, frames: usize) {
        let late = self
            .monitor
            .callback(Instant::now(), frames, self.shared.sample_rate());
        self.shared
            .cpu_usage
            .store(self.monitor.cpu_usage(), Ordering::Relaxed);
        if let Some(late) = late {
            self.shared.dropouts.fetch_add(1, Ordering::Relaxed);
            let _ = self.notices.push(Notice::Dropout {
                late_micros: late.as_micros() as u64,
            });
        }
    }

    pub(crate) fn reset_clock(&mut self) {
        self.monitor.reset_clock();
    }
}
