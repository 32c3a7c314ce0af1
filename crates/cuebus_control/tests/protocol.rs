//! JSON protocol round trips against an engine on the offline backend

use std::sync::Arc;

use crossbeam_channel::Receiver;
use cuebus_control::CommandProcessor;
use cuebus_core::{DecodedAudio, Engine, EngineConfig, Event, MemoryDecoder, OfflineHandle};
use serde_json::{json, Value};

struct Harness {
    processor: CommandProcessor,
    handle: OfflineHandle,
    events: Receiver<Event>,
}

impl Harness {
    fn new() -> Self {
        let decoder = MemoryDecoder::new()
            .with_clip("/show/c1.wav", DecodedAudio::new(48000, vec![vec![0.5; 48000]; 2]))
            .with_clip("/show/blip.wav", DecodedAudio::new(48000, vec![vec![1.0; 64]]));
        let (engine, handle) = Engine::offline(EngineConfig::default(), Arc::new(decoder)).unwrap();
        let (sender, events) = crossbeam_channel::unbounded();
        Self {
            processor: CommandProcessor::with_event_sink(Arc::new(engine), sender),
            handle,
            events,
        }
    }

    fn call(&self, request: Value) -> Value {
        let line = self.processor.handle_json(&request.to_string());
        serde_json::from_str(&line).unwrap()
    }

    fn ok(&self, request: Value) -> Value {
        let response = self.call(request.clone());
        assert_eq!(response["success"], true, "{request} -> {response}");
        response
    }
}

#[test]
fn test_unknown_command() {
    let harness = Harness::new();
    let response = harness.call(json!({"command": "doesNotExist"}));
    assert_eq!(response["success"], false);
    assert_eq!(response["error"]["code"], "UNKNOWN_COMMAND");
    assert!(response["error"]["message"].is_string());
}

#[test]
fn test_malformed_and_missing() {
    let harness = Harness::new();
    let line = harness.processor.handle_json("{not json");
    let response: Value = serde_json::from_str(&line).unwrap();
    assert_eq!(response["error"]["code"], "INVALID_REQUEST");

    let response = harness.call(json!({"command": "playCue", "params": {}}));
    assert_eq!(response["error"]["code"], "MISSING_PARAMETER");
    assert!(response["error"]["message"].as_str().unwrap().contains("cueId"));

    let response = harness.call(json!({"command": "playCue", "params": {"cueId": 5}}));
    assert_eq!(response["error"]["code"], "INVALID_PARAMETER");
}

#[test]
fn test_patch_output_level_overrides_crosspoint() {
    let harness = Harness::new();
    harness.ok(json!({"command": "initialize"}));
    harness.ok(json!({"command": "createCue", "params": {"cueId": "c1", "filePath": "/show/c1.wav"}}));

    harness.ok(json!({"command": "setCrosspoint", "params": {"target": "patch", "input": 0, "output": 0, "level": 0.0}}));
    harness.ok(json!({"command": "setOutputLevel", "params": {"output": 0, "level": -100.0}}));
    harness.ok(json!({"command": "playCue", "params": {"cueId": "c1", "startTime": 0}}));

    harness.handle.pump(2).unwrap();
    assert!(harness.handle.channel(0).iter().all(|&s| s == 0.0));
    assert!(harness.handle.channel(1).iter().all(|&s| (s - 0.5).abs() < 1e-6));
}

#[test]
fn test_cue_lifecycle_over_json() {
    let harness = Harness::new();
    let started = harness.ok(json!({"command": "initialize", "params": {"deviceName": "Offline Output"}}));
    assert_eq!(started["data"]["deviceName"], "Offline Output");

    let created = harness.ok(json!({"command": "createCue", "params": {"cueId": "c1", "filePath": "/show/c1.wav"}}));
    assert_eq!(created["data"]["duration"], 1.0);

    let duplicate = harness.call(json!({"command": "createCue", "params": {"cueId": "c1", "filePath": "/show/c1.wav"}}));
    assert_eq!(duplicate["error"]["code"], "ALREADY_EXISTS");

    harness.ok(json!({"command": "playCue", "params": {"cueId": "c1", "fadeInTime": 0.5}}));
    harness.handle.pump(4).unwrap();

    let paused = harness.ok(json!({"command": "pauseCue", "params": {"cueId": "c1"}}));
    assert_eq!(paused["data"]["paused"], true);
    let status = harness.ok(json!({"command": "getCueStatus", "params": {"cueId": "c1"}}));
    assert_eq!(status["data"]["status"], "paused");
    assert!(status["data"]["fading"].as_bool().unwrap());

    let resumed = harness.ok(json!({"command": "resumeCue", "params": {"cueId": "c1"}}));
    assert_eq!(resumed["data"]["resumed"], true);
    harness.ok(json!({"command": "stopCue", "params": {"cueId": "c1", "fadeOutTime": 0.01}}));
    harness.handle.pump(2).unwrap();

    let status = harness.ok(json!({"command": "getCueStatus", "params": {"cueId": "c1"}}));
    assert_eq!(status["data"]["status"], "stopped");

    harness.ok(json!({"command": "removeCue", "params": {"cueId": "c1"}}));
    let missing = harness.call(json!({"command": "getCueStatus", "params": {"cueId": "c1"}}));
    assert_eq!(missing["error"]["code"], "NOT_FOUND");
}

#[test]
fn test_crosspoint_round_trip() {
    let harness = Harness::new();
    harness.ok(json!({"command": "createCue", "params": {"cueId": "c1", "filePath": "/show/c1.wav"}}));
    for db in [-100.0, -48.0, -6.0, 0.0, 6.0, 12.0] {
        harness.ok(json!({"command": "setCrosspoint", "params": {"target": "c1", "input": 1, "output": 7, "level": db}}));
        let read = harness.ok(json!({"command": "getCrosspoint", "params": {"target": "c1", "input": 1, "output": 7}}));
        let level = read["data"]["level"].as_f64().unwrap();
        assert!((level - db).abs() < 1e-3, "{db} -> {level}");
    }

    harness.ok(json!({"command": "setPatchRouting", "params": {"cueOutput": 3, "deviceOutput": 1, "level": 0.5}}));
    let read = harness.ok(json!({"command": "getPatchRouting", "params": {"cueOutput": 3, "deviceOutput": 1}}));
    assert_eq!(read["data"]["level"], 0.5);

    let bad = harness.call(json!({"command": "setInputLevel", "params": {"target": "c1", "input": 9, "level": 0.0}}));
    assert_eq!(bad["error"]["code"], "VALIDATION_ERROR");
}

#[test]
fn test_status_and_devices() {
    let harness = Harness::new();
    let status = harness.ok(json!({"command": "getStatus"}));
    assert_eq!(status["data"]["running"], false);
    assert_eq!(status["data"]["cueCount"], 0);

    let devices = harness.ok(json!({"command": "getDevices", "params": {}}));
    assert_eq!(devices["data"][0]["name"], "Offline Output");

    let bad = harness.call(json!({"command": "setAudioDevice", "params": {"deviceName": "Nope"}}));
    assert_eq!(bad["error"]["code"], "DEVICE_ERROR");

    harness.ok(json!({"command": "setAudioDevice", "params": {"deviceName": "Offline Output"}}));
    let status = harness.ok(json!({"command": "getStatus"}));
    assert_eq!(status["data"]["running"], true);
    assert_eq!(status["data"]["deviceName"], "Offline Output");

    harness.ok(json!({"command": "shutdown"}));
    let status = harness.ok(json!({"command": "getStatus"}));
    assert_eq!(status["data"]["running"], false);
}

#[test]
fn test_events_flow_to_sink() {
    let harness = Harness::new();
    harness.ok(json!({"command": "initialize"}));
    harness.ok(json!({"command": "createCue", "params": {"cueId": "blip", "filePath": "/show/blip.wav"}}));
    harness.ok(json!({"command": "playCue", "params": {"cueId": "blip"}}));
    harness.handle.pump(1).unwrap();

    let pumped = harness.ok(json!({"command": "pumpEvents"}));
    assert!(pumped["data"]["events"].as_u64().unwrap() >= 2);

    let events: Vec<Value> = harness
        .events
        .try_iter()
        .map(|e| serde_json::to_value(&e).unwrap())
        .collect();
    let names: Vec<&str> = events.iter().filter_map(|e| e["event"].as_str()).collect();
    assert_eq!(names.first(), Some(&"deviceStarted"));
    assert!(names.contains(&"performanceStats"));

    // The cue's end arrives as a stopped playbackStatus
    assert!(events.iter().any(|e| {
        e["event"] == "playbackStatus" && e["data"]["cueId"] == "blip" && e["data"]["status"] == "stopped"
    }));
}

#[test]
fn test_loop_and_channel_commands() {
    let harness = Harness::new();
    harness.ok(json!({"command": "createCue", "params": {"cueId": "c1", "filePath": "/show/c1.wav"}}));
    harness.ok(json!({"command": "setCueLoop", "params": {"cueId": "c1", "loop": true}}));
    harness.ok(json!({"command": "setInputChannel", "params": {"cueId": "c1", "fileChannel": 1, "matrixInput": 0}}));
    harness.ok(json!({"command": "muteInput", "params": {"target": "c1", "input": 0, "mute": true}}));
    harness.ok(json!({"command": "soloOutput", "params": {"output": 1, "solo": true}}));
    harness.ok(json!({"command": "muteOutput", "params": {"target": "patch", "output": 0, "mute": true}}));
    harness.ok(json!({"command": "setStereoRouting", "params": {"startBus": 0, "startDevice": 0}}));
    harness.ok(json!({"command": "resetPatch"}));
    harness.ok(json!({"command": "stopAllCues"}));

    let status = harness.ok(json!({"command": "getCueStatus", "params": {"cueId": "c1"}}));
    assert_eq!(status["data"]["looping"], true);

    let bad = harness.call(json!({"command": "setInputChannel", "params": {"cueId": "c1", "fileChannel": 5, "matrixInput": 0}}));
    assert_eq!(bad["error"]["code"], "VALIDATION_ERROR");
}
