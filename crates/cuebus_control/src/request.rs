//! Typed Requests
//!
//! Wire form: `{"command": <name>, "params": {...}}`. Parsing runs in two
//! steps so each failure gets its own code: an unknown `command` is
//! rejected before any parameter is looked at, then serde checks the
//! parameters of that one command kind.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use cuebus_core::PATCH_TARGET;

use crate::error::{CommandError, CommandResult};

fn patch_target() -> String {
    PATCH_TARGET.to_string()
}

/// Every command the processor understands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "command",
    content = "params",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum Request {
    // Engine lifecycle
    Initialize {
        #[serde(default)]
        device_name: Option<String>,
    },
    Shutdown {},
    GetDevices {},
    SetAudioDevice {
        device_name: String,
    },
    GetStatus {},
    PumpEvents {},

    // Cues
    CreateCue {
        cue_id: String,
        file_path: String,
    },
    LoadFile {
        cue_id: String,
        file_path: String,
    },
    RemoveCue {
        cue_id: String,
    },
    PlayCue {
        cue_id: String,
        #[serde(default)]
        start_time: f64,
        #[serde(default)]
        fade_in_time: f64,
    },
    StopCue {
        cue_id: String,
        #[serde(default)]
        fade_out_time: f64,
    },
    PauseCue {
        cue_id: String,
    },
    ResumeCue {
        cue_id: String,
    },
    StopAllCues {},
    SetCueLoop {
        cue_id: String,
        #[serde(rename = "loop")]
        looping: bool,
    },
    SetInputChannel {
        cue_id: String,
        file_channel: usize,
        matrix_input: usize,
    },
    GetCueStatus {
        cue_id: String,
    },

    // Matrices; `target` is a cue id or "patch"
    SetCrosspoint {
        target: String,
        input: usize,
        output: usize,
        level: f32,
    },
    GetCrosspoint {
        target: String,
        input: usize,
        output: usize,
    },
    SetInputLevel {
        target: String,
        input: usize,
        level: f32,
    },
    SetOutputLevel {
        #[serde(default = "patch_target")]
        target: String,
        output: usize,
        level: f32,
    },
    MuteInput {
        target: String,
        input: usize,
        mute: bool,
    },
    MuteOutput {
        #[serde(default = "patch_target")]
        target: String,
        output: usize,
        mute: bool,
    },
    SoloOutput {
        #[serde(default = "patch_target")]
        target: String,
        output: usize,
        solo: bool,
    },

    // Output patch
    SetPatchRouting {
        cue_output: usize,
        device_output: usize,
        level: f32,
    },
    GetPatchRouting {
        cue_output: usize,
        device_output: usize,
    },
    SetStereoRouting {
        start_bus: usize,
        start_device: usize,
    },
    ResetPatch {},
}

impl Request {
    /// Wire names of all commands
    pub const COMMANDS: &'static [&'static str] = &[
        "initialize",
        "shutdown",
        "getDevices",
        "setAudioDevice",
        "getStatus",
        "pumpEvents",
        "createCue",
        "loadFile",
        "removeCue",
        "playCue",
        "stopCue",
        "pauseCue",
        "resumeCue",
        "stopAllCues",
        "setCueLoop",
        "setInputChannel",
        "getCueStatus",
        "setCrosspoint",
        "getCrosspoint",
        "setInputLevel",
        "setOutputLevel",
        "muteInput",
        "muteOutput",
        "soloOutput",
        "setPatchRouting",
        "getPatchRouting",
        "setStereoRouting",
        "resetPatch",
    ];

    /// Parse one JSON request line
    pub fn from_json(line: &str) -> CommandResult<Self> {
        let value: Value = serde_json::from_str(line)
            .map_err(|e| CommandError::InvalidRequest(format!("malformed JSON: {e}")))?;
        Self::from_value(value)
    }

    /// Parse an already-decoded request object
    pub fn from_value(value: Value) -> CommandResult<Self> {
        let mut object = match value {
            Value::Object(object) => object,
            _ => {
                return Err(CommandError::InvalidRequest(
                    "request must be a JSON object".into(),
                ))
            }
        };

        let command = match object.remove("command") {
            Some(Value::String(command)) => command,
            Some(_) => return Err(CommandError::InvalidRequest("'command' must be a string".into())),
            None => return Err(CommandError::InvalidRequest("missing 'command'".into())),
        };
        if !Self::COMMANDS.contains(&command.as_str()) {
            return Err(CommandError::UnknownCommand(command));
        }

        let params = match object.remove("params") {
            None | Some(Value::Null) => Value::Object(Map::new()),
            Some(params @ Value::Object(_)) => params,
            Some(_) => return Err(CommandError::InvalidRequest("'params' must be an object".into())),
        };

        let mut tagged = Map::new();
        tagged.insert("command".into(), Value::String(command));
        tagged.insert("params".into(), params);
        serde_json::from_value(Value::Object(tagged)).map_err(|e| classify(&e))
    }

    /// Wire name of this request
    pub fn name(&self) -> &'static str {
        match self {
            Request::Initialize { .. } => "initialize",
            Request::Shutdown {} => "shutdown",
            Request::GetDevices {} => "getDevices",
            Request::SetAudioDevice { .. } => "setAudioDevice",
            Request::GetStatus {} => "getStatus",
            Request::PumpEvents {} => "pumpEvents",
            Request::CreateCue { .. } => "createCue",
            Request::LoadFile { .. } => "loadFile",
            Request::RemoveCue { .. } => "removeCue",
            Request::PlayCue { .. } => "playCue",
            Request::StopCue { .. } => "stopCue",
            Request::PauseCue { .. } => "pauseCue",
            Request::ResumeCue { .. } => "resumeCue",
            Request::StopAllCues {} => "stopAllCues",
            Request::SetCueLoop { .. } => "setCueLoop",
            Request::SetInputChannel { .. } => "setInputChannel",
            Request::GetCueStatus { .. } => "getCueStatus",
            Request::SetCrosspoint { .. } => "setCrosspoint",
            Request::GetCrosspoint { .. } => "getCrosspoint",
            Request::SetInputLevel { .. } => "setInputLevel",
            Request::SetOutputLevel { .. } => "setOutputLevel",
            Request::MuteInput { .. } => "muteInput",
            Request::MuteOutput { .. } => "muteOutput",
            Request::SoloOutput { .. } => "soloOutput",
            Request::SetPatchRouting { .. } => "setPatchRouting",
            Request::GetPatchRouting { .. } => "getPatchRouting",
            Request::SetStereoRouting { .. } => "setStereoRouting",
            Request::ResetPatch {} => "resetPatch",
        }
    }
}

/// Split serde's parameter errors into missing vs. malformed
fn classify(err: &serde_json::Error) -> CommandError {
    let message = err.to_string();
    match message
        .strip_prefix("missing field `")
        .and_then(|rest| rest.split('`').next())
    {
        Some(field) => CommandError::MissingParameter(field.to_string()),
        None => CommandError::InvalidParameter(message),
    }
}
