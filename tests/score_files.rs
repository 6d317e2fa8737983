mod common;

use common::{feed, stroke, RecordingPort};
use gesture_conductor::score::ProgramAssignment;
use gesture_conductor::{ConductorConfig, ConductorSession, Score, ScoreError};

const ODE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/scores/ode_to_joy.txt");

#[test]
fn bundled_score_loads_sorted() {
    let score = Score::load(ODE).unwrap();
    assert_eq!(score.ppqn(), 24);
    assert_eq!(score.len(), 38);
    assert_eq!(
        score.programs(),
        &[
            ProgramAssignment { channel: 0, program: 0 },
            ProgramAssignment { channel: 1, program: 32 },
        ]
    );
    let order: Vec<_> = score.events().iter().map(|e| (e.beat_index, e.tick_offset)).collect();
    let mut sorted = order.clone();
    sorted.sort();
    assert_eq!(order, sorted);
    assert_eq!(score.last_beat(), 15);
}

#[test]
fn one_pass_dispatches_every_event_once() {
    let score = Score::load(ODE).unwrap();
    let expected: Vec<_> = score.events().iter().map(|e| (e.channel, e.key, e.is_note_on)).collect();
    let mut session =
        ConductorSession::new(&ConductorConfig::default(), score, RecordingPort::default()).unwrap();

    // 5 count-in beats, 16 score beats and the beat that loops.
    let beats = feed(&mut session, &stroke(120.0, 33, 800));
    let looped_at = beats.iter().position(|b| b.looped).expect("score should loop");
    assert_eq!(looped_at, 5 + 16);

    let scheduled: Vec<_> = session
        .port()
        .scheduled()
        .iter()
        .take(expected.len())
        .map(|c| (c.channel, c.key, c.is_note_on))
        .collect();
    assert_eq!(scheduled, expected);
}

#[test]
fn malformed_score_aborts_before_playback() {
    let err = Score::parse("1 1 24\n0 0\n0 0 17 60 1\n").unwrap_err();
    assert_eq!(err, ScoreError::ChannelOutOfRange { channel: 17 });
}
