//! Cue Playback
//!
//! A cue owns one decoded file, a playback cursor, a fade ramp and its own
//! [`CrosspointMatrix`] (file channels -> bus).
//!
//! # Threading
//!
//! ```text
//! Control thread                         Audio thread
//! ──────────────                         ────────────
//! play()            ──► seek + request ──► applied at block start
//! stop(fade)        ──► request slot   ──► applied at block start
//! pause()/resume()  ──► state CAS          render() only when Playing
//! stop(0)           ──► state store        cursor/fade written back per block
//! ```
//!
//! Fade requests travel through a small seqlock: the control thread marks
//! the slot odd while writing, the audio thread skips a slot it catches
//! mid-write and picks it up on the next block. The seek target has its own
//! word so a stop fade posted before the block starts never drops it.
//!
//! The state word carries a generation in its upper bits, bumped by every
//! play and immediate stop. The audio thread finishes a cue with a CAS
//! against the word it read at block start, so a replay that lands while
//! the last block renders is never cancelled. Nothing here blocks the
//! audio thread.

use std::path::{Path, PathBuf};
use std::sync::atomic::{fence, AtomicBool, AtomicU64, AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use cuebus_dsp::{
    fade_samples, AtomicF32, ChannelBuffer, CrosspointMatrix, FadeCursor, FadeRamp,
    CUE_MATRIX_INPUTS,
};

use crate::decoder::{AudioDecoder, DecodedAudio};
use crate::error::{EngineError, EngineResult};

const NO_SEEK: u64 = u64::MAX;
const UNROUTED: usize = usize::MAX;

/// Playback state of a cue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum CueState {
    Stopped = 0,
    Loading = 1,
    Playing = 2,
    Paused = 3,
}

impl CueState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => CueState::Loading,
            2 => CueState::Playing,
            3 => CueState::Paused,
            _ => CueState::Stopped,
        }
    }
}

const STATE_MASK: u64 = 0xff;

fn state_of(word: u64) -> CueState {
    CueState::from_u8((word & STATE_MASK) as u8)
}

fn with_state(word: u64, state: CueState) -> u64 {
    (word & !STATE_MASK) | state as u64
}

/// Point-in-time view of a cue for status queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CueStatus {
    pub cue_id: String,
    pub status: CueState,
    pub current_time: f64,
    pub duration: f64,
    pub looping: bool,
    pub fading: bool,
    pub channels: usize,
    pub sample_rate: u32,
    pub file_path: Option<String>,
}

/// What happened to a cue during one render call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    /// Not playing; nothing rendered
    Idle,
    /// Rendered and still playing
    Playing,
    /// Reached the end of a non-looping file
    Ended,
    /// A fade-to-zero stop completed
    FadedOut,
}

/// Transport request handed from control to audio thread
#[derive(Debug, Clone, Copy, PartialEq)]
struct TransportRequest {
    /// NaN means "from whatever gain is current"
    from: f32,
    to: f32,
    samples: u64,
    stop_when_silent: bool,
}

#[derive(Debug, Default)]
struct RequestSlot {
    seq: AtomicU64,
    seen: AtomicU64,
    from: AtomicF32,
    to: AtomicF32,
    samples: AtomicU64,
    stop_when_silent: AtomicBool,
}

impl RequestSlot {
    /// Single writer: callers are serialized by the engine's registry lock
    fn post(&self, req: TransportRequest) {
        let seq = self.seq.load(Ordering::Relaxed);
        self.seq.store(seq.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);

        self.from.store(req.from, Ordering::Relaxed);
        self.to.store(req.to, Ordering::Relaxed);
        self.samples.store(req.samples, Ordering::Relaxed);
        self.stop_when_silent
            .store(req.stop_when_silent, Ordering::Relaxed);

        self.seq.store(seq.wrapping_add(2), Ordering::Release);
    }

    /// Take the newest complete request, if one arrived since the last take
    #[inline]
    fn take(&self) -> Option<TransportRequest> {
        let s1 = self.seq.load(Ordering::Acquire);
        if s1 & 1 == 1 || s1 == self.seen.load(Ordering::Relaxed) {
            return None;
        }

        let req = TransportRequest {
            from: self.from.load(Ordering::Relaxed),
            to: self.to.load(Ordering::Relaxed),
            samples: self.samples.load(Ordering::Relaxed),
            stop_when_silent: self.stop_when_silent.load(Ordering::Relaxed),
        };

        fence(Ordering::Acquire);
        if self.seq.load(Ordering::Relaxed) != s1 {
            // Torn read; retry next block
            return None;
        }
        self.seen.store(s1, Ordering::Release);
        Some(req)
    }

    /// The last posted request if the audio thread has not taken it yet.
    /// Control thread only; it is the sole writer of the fields.
    fn pending(&self) -> Option<TransportRequest> {
        let seq = self.seq.load(Ordering::Relaxed);
        if seq == self.seen.load(Ordering::Acquire) {
            return None;
        }
        Some(TransportRequest {
            from: self.from.load(Ordering::Relaxed),
            to: self.to.load(Ordering::Relaxed),
            samples: self.samples.load(Ordering::Relaxed),
            stop_when_silent: self.stop_when_silent.load(Ordering::Relaxed),
        })
    }
}

/// A playable audio cue
#[derive(Debug)]
pub struct Cue {
    id: String,
    handle: u64,
    path: Option<PathBuf>,
    audio: Option<DecodedAudio>,
    matrix: CrosspointMatrix,

    /// file channel -> matrix input
    routing: Box<[AtomicUsize]>,

    /// `generation << 8 | CueState`
    state: AtomicU64,
    cursor: AtomicU64,
    /// Frame to jump to at the next block, or `NO_SEEK`
    seek: AtomicU64,
    fade: FadeRamp,
    stopping: AtomicBool,
    looping: AtomicBool,
    request: RequestSlot,
}

impl Cue {
    /// Create an empty, unloaded cue
    pub fn new(id: impl Into<String>, handle: u64) -> Self {
        let matrix = CrosspointMatrix::for_cue();
        // Zero-size until a file tells us the channel count
        let _ = matrix.set_size(0, 0);

        Self {
            id: id.into(),
            handle,
            path: None,
            audio: None,
            matrix,
            routing: (0..CUE_MATRIX_INPUTS)
                .map(|_| AtomicUsize::new(UNROUTED))
                .collect(),
            state: AtomicU64::new(CueState::Stopped as u64),
            cursor: AtomicU64::new(0),
            seek: AtomicU64::new(NO_SEEK),
            fade: FadeRamp::new(1.0),
            stopping: AtomicBool::new(false),
            looping: AtomicBool::new(false),
            request: RequestSlot::default(),
        }
    }

    /// Decode `path` and install it. Blocking; control thread only.
    ///
    /// On failure the cue is left `Stopped` and unloaded.
    pub fn load(
        &mut self,
        decoder: &dyn AudioDecoder,
        path: &Path,
        bus_channels: usize,
    ) -> EngineResult<()> {
        self.set_state(CueState::Loading);
        self.audio = None;
        self.path = None;

        match decoder.decode(path) {
            Ok(audio) => {
                let result = self.load_audio(audio, bus_channels);
                if result.is_ok() {
                    self.path = Some(path.to_path_buf());
                    info!(
                        "Cue '{}' loaded {:?} ({:.2}s)",
                        self.id,
                        path,
                        self.duration()
                    );
                }
                result
            }
            Err(e) => {
                warn!("Cue '{}' failed to load {:?}: {}", self.id, path, e);
                self.set_state(CueState::Stopped);
                Err(e)
            }
        }
    }

    /// Install already-decoded audio
    ///
    /// Sizes the matrix to `channels × bus_channels`, routes file channel
    /// `i` to matrix input `i`, and sets unity on the `i -> i` diagonal
    /// for as many channels as the bus holds.
    pub fn load_audio(&mut self, audio: DecodedAudio, bus_channels: usize) -> EngineResult<()> {
        self.set_state(CueState::Loading);

        let channels = audio.channel_count();
        if channels == 0 || channels > CUE_MATRIX_INPUTS {
            self.audio = None;
            self.set_state(CueState::Stopped);
            return Err(EngineError::UnsupportedFormat(format!(
                "{channels} channels (1..={CUE_MATRIX_INPUTS} supported)"
            )));
        }
        if audio.sample_rate() == 0 {
            self.audio = None;
            self.set_state(CueState::Stopped);
            return Err(EngineError::UnsupportedFormat("zero sample rate".into()));
        }

        if let Err(e) = self.matrix.set_size(channels, bus_channels) {
            self.audio = None;
            self.set_state(CueState::Stopped);
            return Err(e.into());
        }
        self.matrix.set_direct_routing();

        for (ch, slot) in self.routing.iter().enumerate() {
            let route = if ch < channels { ch } else { UNROUTED };
            slot.store(route, Ordering::Relaxed);
        }

        self.audio = Some(audio);
        self.cursor.store(0, Ordering::Relaxed);
        self.fade.set_gain(1.0);
        self.stopping.store(false, Ordering::Relaxed);
        self.set_state(CueState::Stopped);
        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Numeric identity used in audio-thread notices
    pub fn handle(&self) -> u64 {
        self.handle
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_loaded(&self) -> bool {
        self.audio.is_some()
    }

    pub fn state(&self) -> CueState {
        state_of(self.state.load(Ordering::Acquire))
    }

    /// Store `state` under a new generation
    fn set_state(&self, state: CueState) {
        let _ = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| {
                let generation = (word >> 8).wrapping_add(1);
                Some(generation << 8 | state as u64)
            });
    }

    /// `from -> to` within the current generation
    fn transition(&self, from: CueState, to: CueState) -> bool {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| {
                (state_of(word) == from).then(|| with_state(word, to))
            })
            .is_ok()
    }

    pub fn matrix(&self) -> &CrosspointMatrix {
        &self.matrix
    }

    pub fn channel_count(&self) -> usize {
        self.audio.as_ref().map_or(0, DecodedAudio::channel_count)
    }

    pub fn sample_rate(&self) -> u32 {
        self.audio.as_ref().map_or(0, DecodedAudio::sample_rate)
    }

    pub fn duration(&self) -> f64 {
        self.audio.as_ref().map_or(0.0, DecodedAudio::duration_secs)
    }

    /// Playback position in seconds; zero while stopped
    pub fn current_time(&self) -> f64 {
        let sr = self.sample_rate();
        if sr == 0 || self.state() == CueState::Stopped {
            return 0.0;
        }
        self.cursor.load(Ordering::Relaxed) as f64 / sr as f64
    }

    pub fn memory_bytes(&self) -> u64 {
        self.audio.as_ref().map_or(0, DecodedAudio::memory_bytes)
    }

    pub fn is_looping(&self) -> bool {
        self.looping.load(Ordering::Relaxed)
    }

    pub fn set_loop(&self, looping: bool) {
        self.looping.store(looping, Ordering::Relaxed);
    }

    /// A fade is running (or a stop fade is pending)
    pub fn is_fading(&self) -> bool {
        self.fade.is_active() || self.stopping.load(Ordering::Relaxed)
    }

    /// Start playback at `start_time` seconds, fading in over `fade_in` seconds.
    ///
    /// Calling `play` on a playing or paused cue restarts it.
    pub fn play(&self, start_time: f64, fade_in: f64) -> EngineResult<()> {
        let audio = self
            .audio
            .as_ref()
            .ok_or_else(|| EngineError::NotLoaded(self.id.clone()))?;

        if !start_time.is_finite() || start_time < 0.0 {
            return Err(EngineError::Validation(format!(
                "startTime must be a non-negative number, got {start_time}"
            )));
        }
        if !fade_in.is_finite() || fade_in < 0.0 {
            return Err(EngineError::Validation(format!(
                "fadeInTime must be a non-negative number, got {fade_in}"
            )));
        }
        if start_time > audio.duration_secs() {
            return Err(EngineError::Validation(format!(
                "startTime {start_time}s is past the end of cue '{}' ({:.3}s)",
                self.id,
                audio.duration_secs()
            )));
        }

        let sr = audio.sample_rate();
        let seek = (start_time * sr as f64) as u64;
        let samples = fade_samples(fade_in, sr);
        let from = if samples > 0 { 0.0 } else { 1.0 };

        self.seek.store(seek, Ordering::Relaxed);
        self.request.post(TransportRequest {
            from,
            to: 1.0,
            samples,
            stop_when_silent: false,
        });
        self.set_state(CueState::Playing);

        debug!(
            "Cue '{}' play from frame {} (fade in {} samples)",
            self.id, seek, samples
        );
        Ok(())
    }

    /// Stop playback, immediately or with a fade to silence.
    ///
    /// A faded stop leaves the cue `Playing` until the ramp reaches zero
    /// inside `render`. A paused cue always stops immediately.
    pub fn stop(&self, fade_out: f64) -> EngineResult<()> {
        if !fade_out.is_finite() || fade_out < 0.0 {
            return Err(EngineError::Validation(format!(
                "fadeOutTime must be a non-negative number, got {fade_out}"
            )));
        }

        let samples = fade_samples(fade_out, self.sample_rate());
        if samples > 0 && self.state() == CueState::Playing {
            // A play not yet picked up has no running gain; fade from its start
            let from = self.request.pending().map_or(f32::NAN, |pending| pending.from);
            self.request.post(TransportRequest {
                from,
                to: 0.0,
                samples,
                stop_when_silent: true,
            });
            debug!("Cue '{}' fading out over {} samples", self.id, samples);
            return Ok(());
        }

        self.set_state(CueState::Stopped);
        self.seek.store(NO_SEEK, Ordering::Relaxed);
        self.cursor.store(0, Ordering::Relaxed);
        self.stopping.store(false, Ordering::Relaxed);
        debug!("Cue '{}' stopped", self.id);
        Ok(())
    }

    /// `Playing -> Paused`; returns false (no-op) from any other state
    pub fn pause(&self) -> bool {
        self.transition(CueState::Playing, CueState::Paused)
    }

    /// `Paused -> Playing`; returns false (no-op) from any other state
    pub fn resume(&self) -> bool {
        self.transition(CueState::Paused, CueState::Playing)
    }

    /// Route file channel `file_channel` into matrix input `input`
    pub fn set_input_channel(&self, file_channel: usize, input: usize) -> EngineResult<()> {
        let channels = self.channel_count();
        if file_channel >= channels {
            return Err(EngineError::Validation(format!(
                "File channel {file_channel} out of range (cue has {channels})"
            )));
        }
        if input >= self.matrix.num_inputs() {
            return Err(EngineError::Validation(format!(
                "Matrix input {input} out of range (matrix has {})",
                self.matrix.num_inputs()
            )));
        }
        self.routing[file_channel].store(input, Ordering::Relaxed);
        Ok(())
    }

    pub fn input_channel(&self, file_channel: usize) -> Option<usize> {
        self.routing
            .get(file_channel)
            .map(|slot| slot.load(Ordering::Relaxed))
            .filter(|&input| input != UNROUTED)
    }

    pub fn status(&self) -> CueStatus {
        CueStatus {
            cue_id: self.id.clone(),
            status: self.state(),
            current_time: self.current_time(),
            duration: self.duration(),
            looping: self.is_looping(),
            fading: self.is_fading(),
            channels: self.channel_count(),
            sample_rate: self.sample_rate(),
            file_path: self.path.as_ref().map(|p| p.display().to_string()),
        }
    }

    /// Render up to `num_samples` frames into `bus` (audio thread only).
    ///
    /// `scratch` must hold at least as many channels as the matrix has
    /// inputs; its contents are overwritten. Output accumulates into `bus`.
    pub fn render(
        &self,
        scratch: &mut ChannelBuffer,
        bus: &mut ChannelBuffer,
        num_samples: usize,
    ) -> RenderOutcome {
        let observed = self.state.load(Ordering::Acquire);
        if state_of(observed) != CueState::Playing {
            return RenderOutcome::Idle;
        }
        let audio = match &self.audio {
            Some(audio) => audio,
            None => return RenderOutcome::Idle,
        };

        let total_frames = audio.frames();
        let mut cursor = self.cursor.load(Ordering::Relaxed);
        let mut fade = self.fade.load();
        let mut stopping = self.stopping.load(Ordering::Relaxed);

        if let Some(req) = self.request.take() {
            let from = if req.from.is_nan() { fade.current } else { req.from };
            fade = FadeCursor::ramp(from, req.to, req.samples);
            stopping = req.stop_when_silent;
        }
        let seek = self.seek.swap(NO_SEEK, Ordering::Acquire);
        if seek != NO_SEEK {
            cursor = seek.min(total_frames as u64);
        }

        let n = num_samples.min(scratch.frames()).min(bus.frames());
        let inputs = self.matrix.num_inputs().min(scratch.channels());
        for input in 0..inputs {
            scratch.channel_mut(input)[..n].fill(0.0);
        }

        let channels = audio.channel_count().min(CUE_MATRIX_INPUTS);
        let mut routes = [UNROUTED; CUE_MATRIX_INPUTS];
        for (ch, route) in routes.iter_mut().enumerate().take(channels) {
            *route = self.routing[ch].load(Ordering::Relaxed);
        }

        let looping = self.looping.load(Ordering::Relaxed);
        let mut pos = cursor as usize;
        let mut outcome = RenderOutcome::Playing;

        for frame in 0..n {
            if pos >= total_frames {
                if looping && total_frames > 0 {
                    pos = 0;
                } else {
                    outcome = RenderOutcome::Ended;
                    break;
                }
            }

            let gain = fade.next_gain();
            for (ch, &input) in routes.iter().enumerate().take(channels) {
                if input < inputs {
                    scratch.channel_mut(input)[frame] += audio.channel(ch)[pos] * gain;
                }
            }
            pos += 1;

            if pos >= total_frames && !looping {
                outcome = RenderOutcome::Ended;
                break;
            }
            if stopping && fade.is_silent() {
                outcome = RenderOutcome::FadedOut;
                break;
            }
        }

        self.matrix.mix(scratch, bus, n);
        self.finish_block(observed, outcome, pos, fade, stopping)
    }

    /// Write back cursor and fade after a block.
    ///
    /// An end or fade-out only stops the cue if the state word still equals
    /// `observed`. A play, stop or pause issued during the block wins, and
    /// the cue reports `Playing` for this block.
    fn finish_block(
        &self,
        observed: u64,
        outcome: RenderOutcome,
        pos: usize,
        fade: FadeCursor,
        stopping: bool,
    ) -> RenderOutcome {
        if matches!(outcome, RenderOutcome::Ended | RenderOutcome::FadedOut) {
            let stopped = with_state(observed, CueState::Stopped);
            if self
                .state
                .compare_exchange(observed, stopped, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.cursor.store(0, Ordering::Relaxed);
                self.fade.store(FadeCursor::constant(1.0));
                self.stopping.store(false, Ordering::Relaxed);
                return outcome;
            }
        }

        self.cursor.store(pos as u64, Ordering::Relaxed);
        self.fade.store(fade);
        self.stopping.store(stopping, Ordering::Relaxed);
        match outcome {
            RenderOutcome::Idle => RenderOutcome::Idle,
            _ => RenderOutcome::Playing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cuebus_dsp::BUS_CHANNELS;

    const SR: u32 = 1000;

    fn constant_cue(channels: usize, frames: usize, value: f32) -> Cue {
        let mut cue = Cue::new("c1", 1);
        let audio = DecodedAudio::new(SR, vec![vec![value; frames]; channels]);
        cue.load_audio(audio, BUS_CHANNELS).unwrap();
        cue
    }

    fn buffers(frames: usize) -> (ChannelBuffer, ChannelBuffer) {
        (
            ChannelBuffer::new(CUE_MATRIX_INPUTS, frames),
            ChannelBuffer::new(BUS_CHANNELS, frames),
        )
    }

    #[test]
    fn test_load_installs_identity() {
        let cue = constant_cue(2, 100, 0.5);
        assert!(cue.is_loaded());
        assert_eq!(cue.state(), CueState::Stopped);
        assert_eq!(cue.matrix().num_inputs(), 2);
        assert_eq!(cue.matrix().num_outputs(), BUS_CHANNELS);
        assert!((cue.matrix().gain_linear(0, 0) - 1.0).abs() < 1e-6);
        assert!((cue.matrix().gain_linear(1, 1) - 1.0).abs() < 1e-6);
        assert_eq!(cue.matrix().gain_linear(0, 1), 0.0);
        assert_eq!(cue.input_channel(1), Some(1));
        assert_eq!(cue.input_channel(2), None);
        assert!((cue.duration() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_load_rejects_bad_audio() {
        let mut cue = Cue::new("c1", 1);
        let err = cue
            .load_audio(DecodedAudio::new(SR, vec![]), BUS_CHANNELS)
            .unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedFormat(_)));
        assert!(!cue.is_loaded());
        assert_eq!(cue.state(), CueState::Stopped);
    }

    #[test]
    fn test_play_requires_loaded() {
        let cue = Cue::new("c1", 1);
        assert!(matches!(cue.play(0.0, 0.0), Err(EngineError::NotLoaded(_))));
        assert_eq!(cue.state(), CueState::Stopped);
    }

    #[test]
    fn test_play_validates_times() {
        let cue = constant_cue(1, 100, 0.5);
        assert!(cue.play(-1.0, 0.0).is_err());
        assert!(cue.play(0.0, f64::NAN).is_err());
        assert!(cue.play(5.0, 0.0).is_err());
        assert_eq!(cue.state(), CueState::Stopped);
    }

    #[test]
    fn test_render_idle_when_stopped() {
        let cue = constant_cue(1, 100, 0.5);
        let (mut scratch, mut bus) = buffers(16);
        assert_eq!(cue.render(&mut scratch, &mut bus, 16), RenderOutcome::Idle);
        assert_eq!(bus.peak(0, 16), 0.0);
    }

    #[test]
    fn test_render_routes_channels() {
        let mut cue = Cue::new("c1", 1);
        let audio = DecodedAudio::new(SR, vec![vec![0.25; 100], vec![0.5; 100]]);
        cue.load_audio(audio, BUS_CHANNELS).unwrap();
        cue.play(0.0, 0.0).unwrap();

        let (mut scratch, mut bus) = buffers(16);
        assert_eq!(cue.render(&mut scratch, &mut bus, 16), RenderOutcome::Playing);
        assert!((bus.channel(0)[0] - 0.25).abs() < 1e-6);
        assert!((bus.channel(1)[15] - 0.5).abs() < 1e-6);
        assert_eq!(bus.peak(2, 16), 0.0);
        assert!((cue.current_time() - 0.016).abs() < 1e-9);
    }

    #[test]
    fn test_render_accumulates_into_bus() {
        let cue = constant_cue(1, 100, 0.25);
        cue.play(0.0, 0.0).unwrap();
        let (mut scratch, mut bus) = buffers(8);
        bus.channel_mut(0).fill(0.5);
        cue.render(&mut scratch, &mut bus, 8);
        assert!((bus.channel(0)[3] - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_input_channel_remap() {
        let mut cue = Cue::new("c1", 1);
        let audio = DecodedAudio::new(SR, vec![vec![0.25; 100], vec![0.5; 100]]);
        cue.load_audio(audio, BUS_CHANNELS).unwrap();

        // Both file channels into input 0 -> bus 0
        cue.set_input_channel(1, 0).unwrap();
        assert!(cue.set_input_channel(2, 0).is_err());
        assert!(cue.set_input_channel(0, 5).is_err());

        cue.play(0.0, 0.0).unwrap();
        let (mut scratch, mut bus) = buffers(4);
        cue.render(&mut scratch, &mut bus, 4);
        assert!((bus.channel(0)[0] - 0.75).abs() < 1e-6);
        assert_eq!(bus.peak(1, 4), 0.0);
    }

    #[test]
    fn test_natural_end_stops_exactly() {
        let cue = constant_cue(2, 100, 0.5);
        cue.play(0.0, 0.0).unwrap();
        let (mut scratch, mut bus) = buffers(64);

        assert_eq!(cue.render(&mut scratch, &mut bus, 64), RenderOutcome::Playing);
        bus.clear();
        assert_eq!(cue.render(&mut scratch, &mut bus, 64), RenderOutcome::Ended);
        assert_eq!(cue.state(), CueState::Stopped);

        // Frames 0..36 carry audio, the tail is silent
        assert!((bus.channel(0)[35] - 0.5).abs() < 1e-6);
        assert_eq!(bus.channel(0)[36], 0.0);
        assert_eq!(bus.peak(0, 64), 0.5);

        bus.clear();
        assert_eq!(cue.render(&mut scratch, &mut bus, 64), RenderOutcome::Idle);
        assert_eq!(bus.peak(0, 64), 0.0);
    }

    #[test]
    fn test_end_on_block_boundary() {
        let cue = constant_cue(1, 64, 0.5);
        cue.play(0.0, 0.0).unwrap();
        let (mut scratch, mut bus) = buffers(64);
        assert_eq!(cue.render(&mut scratch, &mut bus, 64), RenderOutcome::Ended);
        assert_eq!(cue.state(), CueState::Stopped);
        assert!((bus.channel(0)[63] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_loop_wraps() {
        let cue = constant_cue(1, 10, 0.5);
        cue.set_loop(true);
        cue.play(0.0, 0.0).unwrap();
        let (mut scratch, mut bus) = buffers(25);
        assert_eq!(cue.render(&mut scratch, &mut bus, 25), RenderOutcome::Playing);
        assert_eq!(cue.state(), CueState::Playing);
        assert!((bus.channel(0)[24] - 0.5).abs() < 1e-6);
        assert!((cue.current_time() - 0.005).abs() < 1e-9);
    }

    #[test]
    fn test_start_time_seeks() {
        let mut cue = Cue::new("c1", 1);
        let ramp: Vec<f32> = (0..100).map(|n| n as f32 / 100.0).collect();
        cue.load_audio(DecodedAudio::new(SR, vec![ramp]), BUS_CHANNELS)
            .unwrap();
        cue.play(0.05, 0.0).unwrap();

        let (mut scratch, mut bus) = buffers(4);
        cue.render(&mut scratch, &mut bus, 4);
        assert!((bus.channel(0)[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_pause_resume_legality() {
        let cue = constant_cue(1, 100, 0.5);
        assert!(!cue.pause());
        assert!(!cue.resume());

        cue.play(0.0, 0.0).unwrap();
        assert!(!cue.resume());
        assert!(cue.pause());
        assert_eq!(cue.state(), CueState::Paused);
        assert!(!cue.pause());
        assert!(cue.resume());
        assert_eq!(cue.state(), CueState::Playing);
    }

    #[test]
    fn test_pause_preserves_cursor() {
        let cue = constant_cue(1, 100, 0.5);
        cue.play(0.0, 0.0).unwrap();
        let (mut scratch, mut bus) = buffers(10);
        cue.render(&mut scratch, &mut bus, 10);

        assert!(cue.pause());
        assert_eq!(cue.render(&mut scratch, &mut bus, 10), RenderOutcome::Idle);
        assert!((cue.current_time() - 0.01).abs() < 1e-9);

        assert!(cue.resume());
        cue.render(&mut scratch, &mut bus, 10);
        assert!((cue.current_time() - 0.02).abs() < 1e-9);
    }

    #[test]
    fn test_immediate_stop() {
        let cue = constant_cue(1, 100, 0.5);
        cue.play(0.0, 0.0).unwrap();
        let (mut scratch, mut bus) = buffers(10);
        cue.render(&mut scratch, &mut bus, 10);

        cue.stop(0.0).unwrap();
        assert_eq!(cue.state(), CueState::Stopped);
        assert_eq!(cue.current_time(), 0.0);

        // Replay starts from the top
        cue.play(0.0, 0.0).unwrap();
        cue.render(&mut scratch, &mut bus, 10);
        assert!((cue.current_time() - 0.01).abs() < 1e-9);
    }

    #[test]
    fn test_fade_in_ramp() {
        let cue = constant_cue(1, 1000, 1.0);
        cue.play(0.0, 0.1).unwrap(); // 100 samples

        let (mut scratch, mut bus) = buffers(128);
        cue.render(&mut scratch, &mut bus, 128);
        let out = bus.channel(0);
        for n in 1..128 {
            assert!(out[n] >= out[n - 1]);
        }
        assert!((out[0] - 0.01).abs() < 1e-6);
        assert!((out[99] - 1.0).abs() < 1e-6);
        assert_eq!(out[127], 1.0);
        assert!(!cue.is_fading());
    }

    #[test]
    fn test_fade_out_stops_after_ramp() {
        let cue = constant_cue(1, 10_000, 1.0);
        cue.play(0.0, 0.0).unwrap();
        let (mut scratch, mut bus) = buffers(64);
        cue.render(&mut scratch, &mut bus, 64);

        cue.stop(0.1).unwrap(); // 100 samples
        assert_eq!(cue.state(), CueState::Playing);

        bus.clear();
        assert_eq!(cue.render(&mut scratch, &mut bus, 64), RenderOutcome::Playing);
        assert!(cue.is_fading());
        let first: Vec<f32> = bus.channel(0)[..64].to_vec();

        bus.clear();
        assert_eq!(cue.render(&mut scratch, &mut bus, 64), RenderOutcome::FadedOut);
        assert_eq!(cue.state(), CueState::Stopped);

        let mut tail = first;
        tail.extend_from_slice(&bus.channel(0)[..64]);
        for n in 1..tail.len() {
            assert!(tail[n] <= tail[n - 1]);
        }
        assert_eq!(tail[99], 0.0);
        assert!(tail[98] > 0.0);
        assert!(tail[100..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_stop_fade_while_paused_is_immediate() {
        let cue = constant_cue(1, 100, 0.5);
        cue.play(0.0, 0.0).unwrap();
        assert!(cue.pause());
        cue.stop(2.0).unwrap();
        assert_eq!(cue.state(), CueState::Stopped);
    }

    #[test]
    fn test_play_cancels_pending_fade_out() {
        let cue = constant_cue(1, 10_000, 1.0);
        cue.play(0.0, 0.0).unwrap();
        cue.stop(0.05).unwrap();
        cue.play(0.0, 0.0).unwrap();

        let (mut scratch, mut bus) = buffers(200);
        assert_eq!(cue.render(&mut scratch, &mut bus, 200), RenderOutcome::Playing);
        assert_eq!(bus.channel(0)[199], 1.0);
        assert!(!cue.is_fading());
    }

    #[test]
    fn test_status_snapshot() {
        let cue = constant_cue(2, 500, 0.5);
        cue.set_loop(true);
        let status = cue.status();
        assert_eq!(status.cue_id, "c1");
        assert_eq!(status.status, CueState::Stopped);
        assert_eq!(status.channels, 2);
        assert!(status.looping);
        assert!((status.duration - 0.5).abs() < 1e-9);

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "stopped");
        assert_eq!(json["cueId"], "c1");
    }

    #[test]
    fn test_request_slot_latest_wins() {
        let slot = RequestSlot::default();
        assert!(slot.take().is_none());
        assert!(slot.pending().is_none());

        let req = |samples| TransportRequest {
            from: 1.0,
            to: 0.0,
            samples,
            stop_when_silent: false,
        };
        slot.post(req(10));
        slot.post(req(20));
        assert_eq!(slot.pending().map(|r| r.samples), Some(20));
        assert_eq!(slot.take().map(|r| r.samples), Some(20));
        assert!(slot.take().is_none());
        assert!(slot.pending().is_none());
    }

    fn ramp_cue(frames: usize) -> Cue {
        let mut cue = Cue::new("c1", 1);
        let ramp: Vec<f32> = (0..frames).map(|n| (n + 1) as f32 / frames as f32).collect();
        cue.load_audio(DecodedAudio::new(SR, vec![ramp]), BUS_CHANNELS)
            .unwrap();
        cue
    }

    #[test]
    fn test_immediate_stop_rewinds_cursor() {
        let cue = ramp_cue(1000);
        cue.play(0.0, 0.0).unwrap();
        let (mut scratch, mut bus) = buffers(100);
        cue.render(&mut scratch, &mut bus, 100);

        cue.stop(0.0).unwrap();
        assert_eq!(cue.cursor.load(Ordering::Relaxed), 0);

        // Replay then fade out before the next block: starts at frame 0
        cue.play(0.0, 0.0).unwrap();
        cue.stop(0.5).unwrap();
        bus.clear();
        cue.render(&mut scratch, &mut bus, 100);
        let first = bus.channel(0)[0];
        assert!(first > 0.0 && first < 0.002, "first sample {first}");
    }

    #[test]
    fn test_stop_fade_keeps_pending_seek() {
        let cue = ramp_cue(1000);
        cue.play(0.5, 0.0).unwrap();
        cue.stop(0.2).unwrap();

        let (mut scratch, mut bus) = buffers(10);
        assert_eq!(cue.render(&mut scratch, &mut bus, 10), RenderOutcome::Playing);
        let first = bus.channel(0)[0];
        assert!((first - 0.501).abs() < 0.01, "first sample {first}");
        assert!(cue.is_fading());
    }

    #[test]
    fn test_replay_survives_end_in_same_block() {
        let cue = constant_cue(1, 100, 0.5);
        cue.play(0.0, 0.0).unwrap();
        let observed = cue.state.load(Ordering::Acquire);

        // Operator re-fires while the last block is still rendering
        cue.play(0.0, 0.0).unwrap();
        let outcome =
            cue.finish_block(observed, RenderOutcome::Ended, 100, FadeCursor::constant(1.0), false);
        assert_eq!(outcome, RenderOutcome::Playing);
        assert_eq!(cue.state(), CueState::Playing);

        let (mut scratch, mut bus) = buffers(10);
        assert_eq!(cue.render(&mut scratch, &mut bus, 10), RenderOutcome::Playing);
        assert!((bus.channel(0)[0] - 0.5).abs() < 1e-6);
        assert!((cue.current_time() - 0.01).abs() < 1e-9);
    }

    #[test]
    fn test_end_without_replay_stops() {
        let cue = constant_cue(1, 100, 0.5);
        cue.play(0.0, 0.0).unwrap();
        let observed = cue.state.load(Ordering::Acquire);
        let outcome =
            cue.finish_block(observed, RenderOutcome::Ended, 100, FadeCursor::constant(1.0), false);
        assert_eq!(outcome, RenderOutcome::Ended);
        assert_eq!(cue.state(), CueState::Stopped);
        assert_eq!(cue.cursor.load(Ordering::Relaxed), 0);
    }
}
