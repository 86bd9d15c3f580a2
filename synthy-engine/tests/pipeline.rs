//! Engine + exchange driven end to end, the way an audio callback would.

use std::thread;
use std::time::Duration;

use synthy_engine::{exchange, render_block, BlockConsumer, Engine, EngineConfig, FrameSource, NotePatch, VoiceTable};

const BLOCK: usize = 64;

fn config() -> EngineConfig {
    EngineConfig::default()
        .with_block_size(BLOCK)
        .with_channel_count(2)
        .with_poll_timeout(Duration::from_secs(2))
}

fn pull(rx: &mut BlockConsumer) -> (Vec<f32>, Vec<f32>) {
    let mut left = vec![0.0f32; BLOCK];
    let mut right = vec![0.0f32; BLOCK];
    assert!(rx.fill(&mut [&mut left[..], &mut right[..]]), "underrun with a 2s timeout");
    (left, right)
}

#[test]
fn note_on_output_matches_offline_render() {
    let cfg = config();
    let (ex, mut rx) = exchange(&cfg);
    let engine = Engine::new(&cfg, ex).expect("engine");
    engine.note_on(69, 127);

    // Blocks rendered before the note landed are silent; the note starts on
    // a block boundary because rendering holds the voice lock.
    let mut live = Vec::new();
    for _ in 0..32 {
        let (left, right) = pull(&mut rx);
        assert_eq!(left, right);
        if !live.is_empty() || left.iter().any(|s| *s != 0.0) {
            live.extend_from_slice(&left);
        } else {
            assert!(left.iter().all(|s| *s == 0.0));
        }
        if live.len() >= 4 * BLOCK {
            break;
        }
    }
    assert_eq!(live.len(), 4 * BLOCK, "note never sounded");

    let mut table = VoiceTable::new();
    if let Some(v) = table.get_mut(69) {
        v.push(NotePatch::from_config(&cfg).build(69, 127));
    }
    let mut offline = Vec::new();
    for _ in 0..4 {
        let mut buffers = vec![vec![0.0f32; BLOCK]; 2];
        render_block(&mut table, &mut buffers, cfg.sample_rate);
        offline.extend_from_slice(&buffers[0]);
    }
    assert_eq!(live, offline);
}

#[test]
fn note_off_silences_following_blocks() {
    let cfg = config();
    let (ex, mut rx) = exchange(&cfg);
    let engine = Engine::new(&cfg, ex).expect("engine");
    engine.note_on(60, 100);
    for _ in 0..4 {
        pull(&mut rx);
    }

    engine.note_off(60);
    // At most one block rendered before the note-off can still be pending.
    pull(&mut rx);
    for _ in 0..4 {
        let (left, right) = pull(&mut rx);
        assert!(left.iter().chain(&right).all(|s| *s == 0.0));
    }
    assert!(engine.active_notes().is_empty());
}

#[test]
fn raw_midi_handle_works_from_another_thread() {
    let cfg = config();
    let (ex, mut rx) = exchange(&cfg);
    let engine = Engine::new(&cfg, ex).expect("engine");
    let midi = engine.midi();

    thread::spawn(move || {
        midi.handle_raw(0x90, &[64, 90]);
        midi.handle_raw(0x90, &[67, 90]);
        midi.handle_raw(0x80, &[64, 0]);
    })
    .join()
    .expect("midi thread");

    assert_eq!(engine.active_notes(), vec![67]);
    pull(&mut rx);
}

#[test]
fn blocks_arrive_in_creation_order() {
    let cfg = config().with_channel_count(1);
    let (ex, mut rx) = exchange(&cfg);

    let producer = thread::spawn(move || {
        while let Some(mut frame) = ex.next_frame() {
            let seq = frame.seq();
            let mut buffers = frame.take_buffers();
            buffers[0].fill(seq as f32);
            frame.complete(buffers);
            if seq == 9 {
                break;
            }
        }
    });

    let mut out = [0.0f32; BLOCK];
    for expected in 0..10u8 {
        assert!(rx.fill(&mut [&mut out[..]]));
        assert!(out.iter().all(|s| *s == f32::from(expected)));
    }
    producer.join().expect("producer");
    assert_eq!(rx.delivered(), 10);
    assert_eq!(rx.underruns(), 0);
}

#[test]
fn resize_from_callback_reaches_engine() {
    let cfg = config();
    let (ex, mut rx) = exchange(&cfg);
    let probe = ex.clone();
    let engine = Engine::new(&cfg, ex).expect("engine");

    rx.set_sample_count(32);
    // The block already in flight keeps the old size.
    pull(&mut rx);
    let mut left = [0.0f32; 32];
    let mut right = [0.0f32; 32];
    assert!(rx.fill(&mut [&mut left[..], &mut right[..]]));
    assert_eq!(probe.sample_count(), 32);
    assert!(engine.is_running());
}

#[test]
fn dropping_engine_closes_source() {
    let cfg = config();
    let (ex, mut rx) = exchange(&cfg);
    let probe = ex.clone();
    let engine = Engine::new(&cfg, ex).expect("engine");
    pull(&mut rx);
    drop(engine);
    assert!(probe.is_closed());
    assert!(probe.next_frame().is_none());
}
