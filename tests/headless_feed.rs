use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use barpath::runtime::{
    drive, Clock, FeedEvent, FixedTicker, ManualClock, ReaderDetectionSource, Runner,
    TestDetectionSource,
};
use barpath::simulate::{generate, SimulationConfig};
use barpath::{Exercise, Session};

// Headless feed through the runtime without any real detector
#[test]
fn channel_feed_completes_every_rep() {
    let detections = generate(&SimulationConfig {
        reps: 4,
        start_ms: 5_000,
        ..Default::default()
    });
    let (tx, rx) = mpsc::channel();

    // Producer thread stands in for a detector
    let producer = {
        let detections = detections.clone();
        thread::spawn(move || {
            for d in detections {
                tx.send(d).unwrap();
            }
        })
    };

    let runner = Runner::new(
        TestDetectionSource::new(rx),
        FixedTicker::new(Duration::from_millis(5)),
    );
    let clock = ManualClock::default();
    let mut session = Session::default();

    let summary = drive(&mut session, &runner, &clock);
    producer.join().unwrap();

    assert_eq!(summary.detections, detections.len());
    assert_eq!(summary.reps_completed, 4);
    assert_eq!(session.completed_reps().len(), 4);
    assert_eq!(session.started_at_ms(), 5_000);

    let last = detections.last().unwrap().timestamp_ms;
    assert_eq!(clock.now_ms(), last);
    assert_eq!(summary.ended_at_ms, last + 1500);
}

#[test]
fn ticks_promote_reps_while_the_feed_is_idle() {
    let (tx, rx) = mpsc::channel();
    let runner = Runner::new(
        TestDetectionSource::new(rx),
        FixedTicker::new(Duration::from_millis(1)),
    );
    let clock = ManualClock::default();
    let mut session = Session::default();

    let detections = generate(&SimulationConfig {
        reps: 1,
        ..Default::default()
    });
    for d in &detections {
        tx.send(*d).unwrap();
    }
    let last = detections.last().unwrap().timestamp_ms;
    session.start_session(0);

    // Drain detections by hand
    for _ in 0..detections.len() {
        match runner.step() {
            FeedEvent::Detection(d) => {
                clock.observe(d.timestamp_ms);
                session.add_detection(&d, clock.now_ms());
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert!(session.completed_reps().is_empty());

    // Feed is quiet; the clock keeps running
    assert_eq!(runner.step(), FeedEvent::Tick);
    clock.set(last + 1500);
    assert_eq!(session.tick(clock.now_ms()), 1);

    drop(tx);
    assert_eq!(runner.step(), FeedEvent::Closed);
}

#[test]
fn reader_feed_from_log_text() {
    let detections = generate(&SimulationConfig {
        reps: 2,
        exercise: Exercise::OverheadPress,
        ..Default::default()
    });
    let mut log = Vec::new();
    barpath::runtime::write_detections(&mut log, &detections).unwrap();

    let runner = Runner::new(
        ReaderDetectionSource::new(std::io::Cursor::new(log)),
        FixedTicker::new(Duration::from_millis(50)),
    );
    let clock = ManualClock::default();
    let mut session = Session::default();
    let mut overlay = session.overlay().clone();
    overlay.exercise = Exercise::OverheadPress;
    session.set_overlay(overlay).unwrap();

    let summary = drive(&mut session, &runner, &clock);
    assert_eq!(summary.detections, 40);
    assert_eq!(summary.reps_completed, 2);

    // Squat pattern does not accept an overhead press trace
    let mut squat = Session::default();
    let mut log = Vec::new();
    barpath::runtime::write_detections(&mut log, &detections).unwrap();
    let runner = Runner::new(
        ReaderDetectionSource::new(std::io::Cursor::new(log)),
        FixedTicker::new(Duration::from_millis(50)),
    );
    let summary = drive(&mut squat, &runner, &ManualClock::default());
    assert_eq!(summary.reps_completed, 0);
}
