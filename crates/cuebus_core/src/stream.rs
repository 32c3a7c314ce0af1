//! CPAL Output Stream
//!
//! [`CpalBackend`] drives the render callback from a real output device.
//!
//! # Threading
//!
//! `cpal::Stream` is not `Send` on every platform, so the stream is built,
//! held and dropped on a dedicated `cuebus-device` thread. The backend
//! itself only keeps the thread handle and a stop channel.
//!
//! ```text
//! open() ──spawn──► cuebus-device: build stream ──reply──► open() returns
//!                                   play()
//!                                   wait for stop
//! close() ──stop──►                 drop stream
//! ```
//!
//! cpal hands out interleaved buffers; the engine renders planar. The
//! callback converts through a scratch buffer allocated at open time.

use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig as CpalStreamConfig, StreamError};
use crossbeam_channel::{bounded, Sender};
use tracing::{error, info, warn};

use crate::backend::{AudioBackend, DeviceConfig, RenderCallback};
use crate::config::StreamConfig;
use crate::device::AudioDevice;
use crate::error::{EngineError, EngineResult};
use crate::message::{Event, Severity};

struct StreamWorker {
    stop: Sender<()>,
    thread: JoinHandle<()>,
}

/// Output backend on the default cpal host
pub struct CpalBackend {
    worker: Option<StreamWorker>,
    events: Option<Sender<Event>>,
}

impl CpalBackend {
    pub fn new() -> Self {
        Self {
            worker: None,
            events: None,
        }
    }

    /// Report stream errors as [`Event::AudioError`] on `events`
    pub fn with_events(events: Sender<Event>) -> Self {
        Self {
            worker: None,
            events: Some(events),
        }
    }

    fn build_output_stream(
        device: &Device,
        config: &CpalStreamConfig,
        mut callback: RenderCallback,
        max_frames: usize,
        event_sender: Option<Sender<Event>>,
    ) -> EngineResult<Stream> {
        let channels = config.channels as usize;
        let max_frames = max_frames.max(1);
        // Preallocated so the callback never grows it
        let mut planar = vec![0.0f32; channels * max_frames];

        let stream = device
            .build_output_stream(
                config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    // Real-time audio callback - NO allocations allowed here
                    let total_frames = data.len() / channels.max(1);
                    let mut done = 0;

                    while done < total_frames {
                        let n = (total_frames - done).min(max_frames);
                        let block = &mut planar[..channels * n];
                        callback(block, channels, n);

                        let out = &mut data[done * channels..(done + n) * channels];
                        for (frame, samples) in out.chunks_exact_mut(channels).enumerate() {
                            for (ch, sample) in samples.iter_mut().enumerate() {
                                *sample = block[ch * n + frame];
                            }
                        }
                        done += n;
                    }
                },
                move |err| {
                    if let Some(sender) = &event_sender {
                        let _ = sender.try_send(Event::audio_error("device", stream_severity(&err), err));
                    }
                },
                None,
            )
            .map_err(|e| EngineError::StreamBuild(e.to_string()))?;

        Ok(stream)
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for CpalBackend {
    fn name(&self) -> &str {
        "cpal"
    }

    fn enumerate(&self) -> EngineResult<Vec<AudioDevice>> {
        AudioDevice::enumerate_outputs()
    }

    fn open(
        &mut self,
        device: Option<&str>,
        config: &StreamConfig,
        callback: RenderCallback,
    ) -> EngineResult<DeviceConfig> {
        self.close();
        config.validate().map_err(EngineError::Config)?;

        let (reply_tx, reply_rx) = bounded::<EngineResult<DeviceConfig>>(1);
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let device_name = device.map(str::to_string);
        let config = config.clone();
        let events = self.events.clone();

        let thread = thread::Builder::new()
            .name("cuebus-device".into())
            .spawn(move || {
                let opened = (|| -> EngineResult<(Stream, DeviceConfig)> {
                    let device = AudioDevice::find_cpal_output(device_name.as_deref())?;
                    let name = device
                        .name()
                        .map_err(|e| EngineError::Device(e.to_string()))?;

                    let cpal_config = CpalStreamConfig {
                        channels: config.channels,
                        sample_rate: cpal::SampleRate(config.sample_rate),
                        buffer_size: cpal::BufferSize::Fixed(config.buffer_size),
                    };
                    // Some hosts deliver more frames than requested; the
                    // callback splits anything larger than this.
                    let max_frames = config.buffer_size as usize * 4;
                    let stream = Self::build_output_stream(
                        &device,
                        &cpal_config,
                        callback,
                        max_frames,
                        events,
                    )?;
                    stream
                        .play()
                        .map_err(|e| EngineError::StreamPlay(e.to_string()))?;

                    Ok((
                        stream,
                        DeviceConfig {
                            device_name: name,
                            sample_rate: config.sample_rate,
                            buffer_size: config.buffer_size,
                            channels: config.channels,
                        },
                    ))
                })();

                match opened {
                    Ok((stream, device_config)) => {
                        let _ = reply_tx.send(Ok(device_config));
                        // Returns on close() or when the backend is dropped
                        let _ = stop_rx.recv();
                        drop(stream);
                    }
                    Err(e) => {
                        let _ = reply_tx.send(Err(e));
                    }
                }
            })
            .map_err(|e| EngineError::StreamBuild(e.to_string()))?;

        match reply_rx.recv() {
            Ok(Ok(device_config)) => {
                info!(
                    "Output stream started on '{}': {} Hz, {} frames, {} ch",
                    device_config.device_name,
                    device_config.sample_rate,
                    device_config.buffer_size,
                    device_config.channels
                );
                self.worker = Some(StreamWorker {
                    stop: stop_tx,
                    thread,
                });
                Ok(device_config)
            }
            Ok(Err(e)) => {
                error!("Failed to open output stream: {}", e);
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(EngineError::Internal("device thread exited early".into()))
            }
        }
    }

    fn close(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop.send(());
            if worker.thread.join().is_err() {
                warn!("Device thread panicked during shutdown");
            }
            info!("Output stream stopped");
        }
    }

    fn is_open(&self) -> bool {
        self.worker.is_some()
    }
}

/// A vanished device ends playback for good; anything else may recover
fn stream_severity(err: &StreamError) -> Severity {
    match err {
        StreamError::DeviceNotAvailable => Severity::Critical,
        _ => Severity::Error,
    }
}

impl Drop for CpalBackend {
    fn drop(&mut self) {
        self.close();
    }
}
