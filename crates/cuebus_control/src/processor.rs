//! Command Processor
//!
//! Routes typed [`Request`]s to an [`Engine`] and wraps every outcome in a
//! [`Response`]. The processor keeps no state of its own besides the engine
//! handle and an optional event sink.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crossbeam_channel::Sender;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use cuebus_core::{Engine, Event, MatrixTarget};

use crate::error::{CommandError, CommandResult};
use crate::request::Request;
use crate::response::Response;

pub struct CommandProcessor {
    engine: Arc<Engine>,
    events: Option<Sender<Event>>,
}

impl CommandProcessor {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            events: None,
        }
    }

    /// Processor that also pushes events to `sink`
    pub fn with_event_sink(engine: Arc<Engine>, sink: Sender<Event>) -> Self {
        Self {
            engine,
            events: Some(sink),
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Handle one JSON request line and return the JSON response line
    pub fn handle_json(&self, line: &str) -> String {
        let response = match Request::from_json(line) {
            Ok(request) => self.handle(request),
            Err(e) => {
                warn!("Rejected request: {}", e);
                Response::from_error(&e)
            }
        };
        response.to_json()
    }

    /// Handle a decoded request object
    pub fn handle_value(&self, value: Value) -> Response {
        match Request::from_value(value) {
            Ok(request) => self.handle(request),
            Err(e) => {
                warn!("Rejected request: {}", e);
                Response::from_error(&e)
            }
        }
    }

    pub fn handle(&self, request: Request) -> Response {
        let name = request.name();
        debug!("Command: {}", name);

        match guarded(|| self.dispatch(request)) {
            Ok(Some(data)) => Response::ok_with(&data),
            Ok(None) => Response::ok(),
            Err(e) => {
                warn!("Command '{}' failed: {}", name, e);
                Response::from_error(&e)
            }
        }
    }

    /// Fire-and-forget; a full or missing sink drops the event
    fn emit(&self, event: Event) {
        if let Some(sink) = &self.events {
            let _ = sink.try_send(event);
        }
    }

    fn emit_cue_status(&self, cue_id: &str) {
        if let Ok(status) = self.engine.cue_status(cue_id) {
            self.emit(Event::PlaybackStatus {
                cue_id: status.cue_id,
                status: status.status,
                current_time: status.current_time,
                duration: status.duration,
            });
        }
    }

    /// Turn pending audio-thread notices into events, followed by a
    /// performance report. Returns how many events were emitted.
    pub fn pump_events(&self) -> usize {
        let mut events = self.engine.drain_events();
        events.push(self.engine.performance_event());
        let count = events.len();
        for event in events {
            self.emit(event);
        }
        count
    }

    fn dispatch(&self, request: Request) -> CommandResult<Option<Value>> {
        let engine = &self.engine;

        let data = match request {
            Request::Initialize { device_name } => {
                let opened = engine.start(device_name.as_deref())?;
                self.emit(Event::DeviceStarted {
                    device_name: opened.device_name.clone(),
                    sample_rate: opened.sample_rate,
                    buffer_size: opened.buffer_size,
                });
                Some(to_value(&opened)?)
            }
            Request::Shutdown {} => {
                let was_running = engine.is_running();
                engine.shutdown();
                if was_running {
                    self.emit(Event::DeviceStopped);
                }
                info!("Engine shut down by request");
                None
            }
            Request::GetDevices {} => Some(to_value(&engine.list_devices()?)?),
            Request::SetAudioDevice { device_name } => {
                let opened = engine.set_audio_device(&device_name)?;
                self.emit(Event::DeviceStarted {
                    device_name: opened.device_name.clone(),
                    sample_rate: opened.sample_rate,
                    buffer_size: opened.buffer_size,
                });
                Some(to_value(&opened)?)
            }
            Request::GetStatus {} => Some(to_value(&engine.status())?),
            Request::PumpEvents {} => Some(json!({ "events": self.pump_events() })),

            Request::CreateCue { cue_id, file_path } => {
                engine.create_cue(&cue_id, &file_path)?;
                Some(to_value(&engine.cue_status(&cue_id)?)?)
            }
            Request::LoadFile { cue_id, file_path } => {
                engine.load_file(&cue_id, &file_path)?;
                Some(to_value(&engine.cue_status(&cue_id)?)?)
            }
            Request::RemoveCue { cue_id } => {
                engine.remove_cue(&cue_id)?;
                None
            }
            Request::PlayCue {
                cue_id,
                start_time,
                fade_in_time,
            } => {
                engine.play_cue(&cue_id, start_time, fade_in_time)?;
                self.emit_cue_status(&cue_id);
                None
            }
            Request::StopCue {
                cue_id,
                fade_out_time,
            } => {
                engine.stop_cue(&cue_id, fade_out_time)?;
                self.emit_cue_status(&cue_id);
                None
            }
            Request::PauseCue { cue_id } => {
                let paused = engine.pause_cue(&cue_id)?;
                if paused {
                    self.emit_cue_status(&cue_id);
                }
                Some(json!({ "paused": paused }))
            }
            Request::ResumeCue { cue_id } => {
                let resumed = engine.resume_cue(&cue_id)?;
                if resumed {
                    self.emit_cue_status(&cue_id);
                }
                Some(json!({ "resumed": resumed }))
            }
            Request::StopAllCues {} => {
                engine.stop_all_cues();
                None
            }
            Request::SetCueLoop { cue_id, looping } => {
                engine.set_cue_loop(&cue_id, looping)?;
                None
            }
            Request::SetInputChannel {
                cue_id,
                file_channel,
                matrix_input,
            } => {
                engine.set_input_channel(&cue_id, file_channel, matrix_input)?;
                None
            }
            Request::GetCueStatus { cue_id } => Some(to_value(&engine.cue_status(&cue_id)?)?),

            Request::SetCrosspoint {
                target,
                input,
                output,
                level,
            } => {
                engine.set_crosspoint(MatrixTarget::parse(&target), input, output, level)?;
                None
            }
            Request::GetCrosspoint {
                target,
                input,
                output,
            } => {
                let level = engine.get_crosspoint(MatrixTarget::parse(&target), input, output)?;
                Some(json!({ "level": level }))
            }
            Request::SetInputLevel {
                target,
                input,
                level,
            } => {
                engine.set_input_level(MatrixTarget::parse(&target), input, level)?;
                None
            }
            Request::SetOutputLevel {
                target,
                output,
                level,
            } => {
                engine.set_output_level(MatrixTarget::parse(&target), output, level)?;
                None
            }
            Request::MuteInput {
                target,
                input,
                mute,
            } => {
                engine.set_input_mute(MatrixTarget::parse(&target), input, mute)?;
                None
            }
            Request::MuteOutput {
                target,
                output,
                mute,
            } => {
                engine.mute_output(MatrixTarget::parse(&target), output, mute)?;
                None
            }
            Request::SoloOutput {
                target,
                output,
                solo,
            } => {
                engine.solo_output(MatrixTarget::parse(&target), output, solo)?;
                None
            }

            Request::SetPatchRouting {
                cue_output,
                device_output,
                level,
            } => {
                engine.set_patch_routing(cue_output, device_output, level)?;
                None
            }
            Request::GetPatchRouting {
                cue_output,
                device_output,
            } => Some(json!({ "level": engine.get_patch_routing(cue_output, device_output) })),
            Request::SetStereoRouting {
                start_bus,
                start_device,
            } => {
                engine.set_stereo_routing(start_bus, start_device)?;
                None
            }
            Request::ResetPatch {} => {
                engine.reset_patch();
                None
            }
        };
        Ok(data)
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> CommandResult<Value> {
    serde_json::to_value(value).map_err(|e| CommandError::Internal(e.to_string()))
}

/// Run a handler, converting a panic into `INTERNAL_ERROR`
fn guarded<T>(f: impl FnOnce() -> CommandResult<T>) -> CommandResult<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "handler panicked".to_string());
            error!("Command handler panicked: {}", message);
            Err(CommandError::Internal(message))
        }
    }
}
