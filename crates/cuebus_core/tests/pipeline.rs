//! Block pipeline through the offline backend

use std::sync::Arc;
use std::thread;

use cuebus_core::{
    CueState, DecodedAudio, Engine, EngineConfig, EngineError, Event, MatrixTarget, MemoryDecoder,
    OFFLINE_DEVICE_NAME,
};

fn offline_engine() -> (Engine, cuebus_core::OfflineHandle) {
    let decoder = MemoryDecoder::new()
        .with_clip("/show/tone.wav", DecodedAudio::new(48000, vec![vec![0.5; 48000], vec![0.5; 48000]]))
        .with_clip("/show/short.wav", DecodedAudio::new(48000, vec![vec![1.0; 100]]));
    Engine::offline(EngineConfig::default(), Arc::new(decoder)).unwrap()
}

#[test]
fn test_backend_drives_renderer() {
    let (engine, handle) = offline_engine();
    engine.create_cue("tone", "/show/tone.wav").unwrap();
    engine.play_cue("tone", 0.0, 0.0).unwrap();

    let opened = engine.start(None).unwrap();
    assert_eq!(opened.device_name, OFFLINE_DEVICE_NAME);
    let status = engine.status();
    assert!(status.running);
    assert_eq!(status.device_name.as_deref(), Some(OFFLINE_DEVICE_NAME));

    handle.pump(4).unwrap();
    assert_eq!(handle.blocks_rendered(), 4);
    assert!((handle.channel(0)[0] - 0.5).abs() < 1e-6);
    assert!((engine.cue_status("tone").unwrap().current_time - 4.0 * 512.0 / 48000.0).abs() < 1e-9);

    engine.shutdown();
    assert!(!handle.is_open());
}

#[test]
fn test_stereo_patch_offset() {
    let (engine, handle) = offline_engine();
    engine.create_cue("tone", "/show/tone.wav").unwrap();
    // Route the cue onto bus 4/5 and patch that pair to the device
    engine.set_crosspoint(MatrixTarget::Cue("tone"), 0, 0, -100.0).unwrap();
    engine.set_crosspoint(MatrixTarget::Cue("tone"), 1, 1, -100.0).unwrap();
    engine.set_crosspoint(MatrixTarget::Cue("tone"), 0, 4, 0.0).unwrap();
    engine.set_crosspoint(MatrixTarget::Cue("tone"), 1, 5, 0.0).unwrap();
    engine.set_stereo_routing(4, 0).unwrap();

    engine.start(None).unwrap();
    engine.play_cue("tone", 0.0, 0.0).unwrap();
    handle.pump(1).unwrap();
    assert!((handle.channel(0)[10] - 0.5).abs() < 1e-6);
    assert!((handle.channel(1)[10] - 0.5).abs() < 1e-6);
}

#[test]
fn test_events_from_pumped_blocks() {
    let (engine, handle) = offline_engine();
    engine.create_cue("short", "/show/short.wav").unwrap();
    engine.start(None).unwrap();
    engine.play_cue("short", 0.0, 0.0).unwrap();
    handle.pump(1).unwrap();

    let events = engine.drain_events();
    assert_eq!(events.len(), 1);
    match &events[0] {
        Event::PlaybackStatus { cue_id, status, .. } => {
            assert_eq!(cue_id, "short");
            assert_eq!(*status, CueState::Stopped);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[test]
fn test_control_thread_runs_beside_audio_thread() {
    let (engine, handle) = offline_engine();
    let engine = Arc::new(engine);
    engine.start(None).unwrap();

    let pump = {
        let handle = handle.clone();
        thread::spawn(move || {
            for _ in 0..200 {
                handle.pump(1).unwrap();
            }
        })
    };

    for n in 0..50 {
        let id = format!("cue{n}");
        engine.create_cue(&id, "/show/tone.wav").unwrap();
        engine.play_cue(&id, 0.0, 0.01).unwrap();
        engine.set_crosspoint(MatrixTarget::Cue(&id), 0, 1, -6.0).unwrap();
        if n % 3 == 0 {
            engine.remove_cue(&id).unwrap();
        }
    }
    pump.join().unwrap();

    assert_eq!(engine.cue_ids().len(), 33);
    engine.shutdown();
    assert!(engine.cue_ids().is_empty());
}

#[test]
fn test_device_errors_map_to_device_code() {
    let (engine, _handle) = offline_engine();
    let err = engine.set_audio_device("Missing Interface").unwrap_err();
    assert!(matches!(err, EngineError::Device(_)));
    assert_eq!(err.code(), "DEVICE_ERROR");
    assert!(!engine.is_running());
    assert_eq!(engine.list_devices().unwrap().len(), 1);
}
