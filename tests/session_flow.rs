mod common;

use std::sync::atomic::AtomicBool;

use common::{feed, feed_beats, note, score, stroke, Call, RecordingPort};
use gesture_conductor::beat::BeatState;
use gesture_conductor::error::{MotionError, Window};
use gesture_conductor::gesture::ScriptedInput;
use gesture_conductor::scheduler::Phase;
use gesture_conductor::session::{ConductorSession, FrameOutcome};
use gesture_conductor::types::Point;
use gesture_conductor::ConductorConfig;

fn session(events: Vec<gesture_conductor::score::ScoreEvent>) -> ConductorSession<RecordingPort> {
    ConductorSession::new(&ConductorConfig::default(), score(events), RecordingPort::default()).unwrap()
}

#[test]
fn programs_are_applied_at_start() {
    let s = session(vec![note(0, 0, 60, true)]);
    assert_eq!(s.port().calls, vec![Call::Program(0, 0)]);
    // Resting at pre_roll - 1 so the first detected beat is numbered -5.
    assert_eq!(s.current_beat(), -6);
    assert_eq!(s.phase(), Phase::CountIn);
}

#[test]
fn count_in_is_silent_then_first_beat_plays_at_now() {
    let mut s = session(vec![note(0, 0, 60, true)]);
    let frames = stroke(120.0, 33, 400);

    let (count_in, rest) = feed_beats(&mut s, &frames, 5);
    assert_eq!(count_in.len(), 5);
    assert!(s.port().scheduled().is_empty());
    assert_eq!(s.current_beat(), -1);
    assert_eq!(count_in.last().unwrap().beat, -1);

    let (first, _) = feed_beats(&mut s, rest, 1);
    assert_eq!(first[0].beat, 0);
    let scheduled = s.port().scheduled();
    assert_eq!(scheduled.len(), 1);
    let cmd = scheduled[0];
    assert_eq!((cmd.channel, cmd.key, cmd.is_note_on), (0, 60, true));
    assert_eq!(cmd.tick, first[0].tick);
    assert!((15..=127).contains(&cmd.velocity));
}

#[test]
fn loops_once_past_the_final_event() {
    let mut s = session(vec![note(0, 0, 60, true), note(0, 12, 60, false)]);
    let frames = stroke(120.0, 33, 1200);

    let (_, rest) = feed_beats(&mut s, &frames, 6);
    assert_eq!(s.port().scheduled().len(), 2);
    let calls_before_loop = s.port().calls.len();

    let (looping, rest) = feed_beats(&mut s, rest, 1);
    assert!(looping[0].looped);
    assert_eq!(looping[0].beat, 1);
    assert_eq!(s.phase(), Phase::CountIn);
    assert_eq!(s.port().all_off_count(), 1);
    assert_eq!(
        &s.port().calls[calls_before_loop..],
        &[Call::AllOff, Call::Program(0, 0)]
    );

    // Second pass: silent count-in again, then the score restarts.
    let (second, _) = feed_beats(&mut s, rest, 6);
    assert_eq!(second.first().map(|b| b.beat), Some(-5));
    let calls = &s.port().calls;
    let all_off = calls.iter().position(|c| *c == Call::AllOff).unwrap();
    let replayed: Vec<_> = calls[all_off..]
        .iter()
        .filter(|c| matches!(c, Call::Schedule(_)))
        .collect();
    assert_eq!(replayed.len(), 2);
    assert_eq!(s.port().all_off_count(), 1);
}

#[test]
fn beat_counter_steps_by_one_except_at_loop() {
    let mut s = session(vec![note(0, 0, 60, true), note(2, 0, 62, true)]);
    let beats = feed(&mut s, &stroke(120.0, 33, 1500));
    assert!(beats.len() > 20);

    for pair in beats.windows(2) {
        let expected = if pair[0].looped { -5 } else { pair[0].beat + 1 };
        assert_eq!(pair[1].beat, expected);
    }
    assert!(beats.iter().any(|b| b.looped));
    assert!(beats.iter().all(|b| (15..=127).contains(&b.velocity)));
}

#[test]
fn tempo_follows_the_hand() {
    let mut s = session(vec![note(0, 0, 60, true)]);
    feed_beats(&mut s, &stroke(120.0, 33, 600), 6);
    assert_eq!(s.tempo().observed(), 4);
    let tpb = s.tempo().current_ticks_per_beat();
    assert!((tpb - 500.0).abs() < 40.0, "ticks per beat {tpb}");
}

#[test]
fn sub_beat_offsets_scale_with_measured_tempo() {
    let mut s = session(vec![note(0, 0, 60, true), note(0, 12, 60, false)]);
    let (beats, _) = feed_beats(&mut s, &stroke(120.0, 33, 600), 6);
    let downbeat = beats.last().unwrap();

    let scheduled = s.port().scheduled();
    assert_eq!(scheduled[0].tick, downbeat.tick);
    let half_beat = (downbeat.ticks_per_beat * 12.0 / 24.0).round() as u64;
    assert_eq!(scheduled[1].tick, downbeat.tick + half_beat);
    assert!(!scheduled[1].is_note_on);
}

#[test]
fn lost_hand_touches_nothing() {
    let mut s = session(vec![note(0, 0, 60, true)]);
    feed(&mut s, &stroke(120.0, 33, 20));

    let history: Vec<_> = s.sampler().history().copied().collect();
    let state = s.beat_state();
    let beat = s.current_beat();
    let calls = s.port().calls.len();

    s.port_mut().now += 33;
    assert_eq!(s.process_frame(None), FrameOutcome::HandLost);
    assert_eq!(s.sampler().history().copied().collect::<Vec<_>>(), history);
    assert_eq!(s.beat_state(), state);
    assert_eq!(s.current_beat(), beat);
    assert_eq!(s.port().calls.len(), calls);
    assert_eq!(s.stats().lost_frames, 1);
}

#[test]
fn duplicate_timestamp_skips_evaluation() {
    let mut s = session(vec![note(0, 0, 60, true)]);
    let frames = stroke(120.0, 33, 10);
    feed(&mut s, &frames);
    let state = s.beat_state();
    let observed = s.tempo().observed();

    // Same tick as the previous frame.
    assert_eq!(
        s.process_frame(Some(Point::new(320, 100))),
        FrameOutcome::Unsettled(MotionError::ZeroInterval {
            window: Window::Near
        })
    );
    assert_eq!(s.beat_state(), state);
    assert_eq!(s.tempo().observed(), observed);
}

#[test]
fn first_frames_read_the_neutral_history() {
    let mut s = session(vec![note(0, 0, 60, true)]);
    s.port_mut().now = 0;
    assert!(matches!(
        s.process_frame(Some(Point::new(320, 300))),
        FrameOutcome::Unsettled(_)
    ));
    assert_eq!(s.beat_state(), BeatState::AwaitingReset);
}

#[test]
fn stop_flag_is_checked_before_every_frame() {
    let mut s = session(vec![note(0, 0, 60, true)]);
    let mut input = ScriptedInput::new(vec![Some(Point::new(320, 240)); 10]);
    let stop = AtomicBool::new(true);

    let stats = s.run(&mut input, &stop);
    assert_eq!(stats.frames, 0);
    assert_eq!(input.remaining(), 10);
    assert_eq!(s.port().all_off_count(), 1);

    // Shutdown is idempotent.
    s.shutdown();
    assert_eq!(s.port().all_off_count(), 1);
}

#[test]
fn run_drains_scripted_input_and_silences() {
    let mut s = session(vec![note(0, 0, 60, true)]);
    let frames: Vec<_> = stroke(120.0, 33, 50).into_iter().map(|(_, p)| Some(p)).collect();
    let mut input = ScriptedInput::new(frames);
    let stop = AtomicBool::new(false);

    let stats = s.run(&mut input, &stop);
    assert_eq!(stats.frames, 50);
    assert_eq!(input.remaining(), 0);
    assert_eq!(s.port().calls.last(), Some(&Call::AllOff));
}
