//! Record -> save -> load -> replay through the public API.

use std::time::Duration;

use imgrec_core::clock::{Clock, ManualClock};
use imgrec_core::input::{ActionExecutor, DryRunInjector, MouseButton};
use imgrec_core::player::ScriptPlayer;
use imgrec_core::recorder::{PointerSnapshot, PointerSource, ScriptRecorder, StopReason};
use imgrec_core::script::ScriptStore;
use imgrec_core::Result;

/// A person clicking left at (100,100) at t=0.30s and at (200,150) at t=1.30s.
struct TwoClicks<'a> {
    clock: &'a ManualClock,
}

impl PointerSource for TwoClicks<'_> {
    fn sample(&self) -> Result<PointerSnapshot> {
        let ms = self.clock.now().as_millis();
        Ok(match ms {
            300..=420 => PointerSnapshot::at(100, 100).with_pressed(MouseButton::Left),
            1300..=1420 => PointerSnapshot::at(200, 150).with_pressed(MouseButton::Left),
            _ => PointerSnapshot::at(150, 120),
        })
    }
}

#[test]
fn record_save_load_replay() {
    let dir = tempfile::tempdir().unwrap();
    let store = ScriptStore::new(dir.path().join("scripts"));

    let rec_clock = ManualClock::new();
    let recording = ScriptRecorder::new(TwoClicks { clock: &rec_clock }, &rec_clock)
        .with_max_duration(Some(Duration::from_secs(2)))
        .record();
    assert_eq!(recording.reason, StopReason::DurationElapsed);

    let path = store.save(&recording.sequence, Some("two_clicks")).unwrap().unwrap();
    assert!(path.ends_with("two_clicks.json"));

    let loaded = store.load("two_clicks").unwrap().unwrap();
    assert_eq!(loaded, recording.sequence);
    let actions = loaded.actions();
    assert_eq!(actions.len(), 2);
    assert!(actions.iter().all(|a| a.button == MouseButton::Left));
    assert_eq!((actions[0].x, actions[0].y), (100, 100));
    assert_eq!((actions[1].x, actions[1].y), (200, 150));
    assert!((actions[1].delay - 1.0).abs() <= 0.1, "delay {}", actions[1].delay);

    let play_clock = ManualClock::new();
    let executor = ActionExecutor::new(DryRunInjector::new(), &play_clock);
    assert!(ScriptPlayer::new(&executor).run(&loaded));
    assert_eq!(
        executor.injector().clicks(),
        vec![(100, 100, MouseButton::Left), (200, 150, MouseButton::Left)]
    );

    // Every sleep except the replayed delays belongs to the eased moves.
    let long_sleeps: Vec<Duration> = play_clock
        .sleeps()
        .into_iter()
        .filter(|d| *d > Duration::from_millis(100))
        .collect();
    assert_eq!(long_sleeps.len(), 2);
    let second = long_sleeps[1].as_secs_f64();
    assert!((second - 1.0).abs() <= 0.1, "suspension {second}");
}

#[test]
fn empty_recording_is_not_saved() {
    let dir = tempfile::tempdir().unwrap();
    let store = ScriptStore::new(dir.path());

    struct Idle;
    impl PointerSource for Idle {
        fn sample(&self) -> Result<PointerSnapshot> {
            Ok(PointerSnapshot::at(5, 5))
        }
    }

    let clock = ManualClock::new();
    let recording = ScriptRecorder::new(Idle, &clock)
        .with_max_duration(Some(Duration::from_millis(300)))
        .record();
    assert!(recording.sequence.is_empty());
    assert!(store.save(&recording.sequence, None).unwrap().is_none());
    assert!(store.list().unwrap().is_empty());
}
