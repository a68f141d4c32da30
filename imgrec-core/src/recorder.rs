//! Click recording by polling pointer state.
//!
//! The recorder samples a [`PointerSource`] at a fixed interval and keeps an
//! explicit per-button state machine (`Released` / `Pressed`).  Only the
//! `Released -> Pressed` edge produces an [`Action`], so a button held across
//! many polls is recorded once.
//!
//! A session runs `Idle -> Recording -> Stopped`.  It stops when the
//! [`StopHandle`] fires, when the optional maximum duration elapses, or when
//! sampling faults; in every case the actions captured so far are returned.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::errors::Result;
use crate::input::MouseButton;
use crate::script::{Action, ScriptSequence};

/// Default polling interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

// ---------------------------------------------------------------------------
// Pointer sampling
// ---------------------------------------------------------------------------

/// One observation of the pointer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PointerSnapshot {
    pub x: i32,
    pub y: i32,
    pub left: bool,
    pub right: bool,
    pub middle: bool,
}

impl PointerSnapshot {
    pub fn at(x: i32, y: i32) -> Self {
        Self {
            x,
            y,
            ..Self::default()
        }
    }

    pub fn with_pressed(mut self, button: MouseButton) -> Self {
        match button {
            MouseButton::Left => self.left = true,
            MouseButton::Right => self.right = true,
            MouseButton::Middle => self.middle = true,
        }
        self
    }

    pub fn is_pressed(&self, button: MouseButton) -> bool {
        match button {
            MouseButton::Left => self.left,
            MouseButton::Right => self.right,
            MouseButton::Middle => self.middle,
        }
    }
}

/// Reads the live pointer position and button state.
pub trait PointerSource {
    fn sample(&self) -> Result<PointerSnapshot>;
}

impl<S: PointerSource + ?Sized> PointerSource for &S {
    fn sample(&self) -> Result<PointerSnapshot> {
        (**self).sample()
    }
}

#[cfg(windows)]
pub use native::AsyncKeyStatePointer;

#[cfg(windows)]
mod native {
    use windows::Win32::Foundation::POINT;
    use windows::Win32::UI::Input::KeyboardAndMouse::{
        GetAsyncKeyState, VIRTUAL_KEY, VK_LBUTTON, VK_MBUTTON, VK_RBUTTON,
    };
    use windows::Win32::UI::WindowsAndMessaging::GetCursorPos;

    use super::{PointerSnapshot, PointerSource};
    use crate::errors::{AutomationError, Result};

    fn is_down(vk: VIRTUAL_KEY) -> bool {
        // High bit set = key currently down.
        let state = unsafe { GetAsyncKeyState(vk.0 as i32) };
        (state as u16 & 0x8000) != 0
    }

    /// Polls `GetAsyncKeyState` for the three mouse buttons.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct AsyncKeyStatePointer;

    impl PointerSource for AsyncKeyStatePointer {
        fn sample(&self) -> Result<PointerSnapshot> {
            let mut point = POINT::default();
            unsafe { GetCursorPos(&mut point) }.map_err(|e| {
                AutomationError::RecordingError(format!("GetCursorPos failed: {e}"))
            })?;
            Ok(PointerSnapshot {
                x: point.x,
                y: point.y,
                left: is_down(VK_LBUTTON),
                right: is_down(VK_RBUTTON),
                middle: is_down(VK_MBUTTON),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Edge detection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ButtonState {
    #[default]
    Released,
    Pressed,
}

/// Per-button state carried from one poll to the next.
#[derive(Debug, Clone, Default)]
pub struct ButtonTracker {
    left: ButtonState,
    right: ButtonState,
    middle: ButtonState,
}

impl ButtonTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, button: MouseButton) -> ButtonState {
        match button {
            MouseButton::Left => self.left,
            MouseButton::Right => self.right,
            MouseButton::Middle => self.middle,
        }
    }

    fn slot(&mut self, button: MouseButton) -> &mut ButtonState {
        match button {
            MouseButton::Left => &mut self.left,
            MouseButton::Right => &mut self.right,
            MouseButton::Middle => &mut self.middle,
        }
    }

    /// Apply a snapshot; returns the buttons that went `Released -> Pressed`,
    /// in left, right, middle order.
    pub fn update(&mut self, snapshot: &PointerSnapshot) -> Vec<MouseButton> {
        let mut edges = Vec::new();
        for button in MouseButton::ALL {
            let next = if snapshot.is_pressed(button) {
                ButtonState::Pressed
            } else {
                ButtonState::Released
            };
            let slot = self.slot(button);
            if *slot == ButtonState::Released && next == ButtonState::Pressed {
                edges.push(button);
            }
            *slot = next;
        }
        edges
    }
}

// ---------------------------------------------------------------------------
// Recorder
// ---------------------------------------------------------------------------

/// Cooperative interrupt for a recording session.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Recording,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    Interrupted,
    DurationElapsed,
    /// Sampling failed; carries the error text.
    Fault(String),
}

/// Result of one recording session.
#[derive(Debug, Clone)]
pub struct Recording {
    pub sequence: ScriptSequence,
    pub reason: StopReason,
    pub elapsed: Duration,
}

fn wall_clock_stamp() -> String {
    chrono::Local::now().format("%H:%M:%S%.6f").to_string()
}

pub struct ScriptRecorder<P, C> {
    source: P,
    clock: C,
    poll_interval: Duration,
    max_duration: Option<Duration>,
    stop: StopHandle,
    state: RecorderState,
}

impl<P: PointerSource, C: Clock> ScriptRecorder<P, C> {
    pub fn new(source: P, clock: C) -> Self {
        Self {
            source,
            clock,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_duration: None,
            stop: StopHandle::new(),
            state: RecorderState::Idle,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_duration(mut self, max: Option<Duration>) -> Self {
        self.max_duration = max;
        self
    }

    /// Handle that ends the session at the next poll boundary.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    /// Run one session until stopped and return what was captured.
    pub fn record(&mut self) -> Recording {
        self.state = RecorderState::Recording;
        log::info!("recording started (poll every {:?})", self.poll_interval);

        let start = self.clock.now();
        let mut last_action = Duration::ZERO;
        let mut tracker = ButtonTracker::new();
        let mut sequence = ScriptSequence::new();

        let reason = loop {
            if self.stop.is_stopped() {
                break StopReason::Interrupted;
            }
            let elapsed = self.clock.now().saturating_sub(start);
            if matches!(self.max_duration, Some(max) if elapsed > max) {
                break StopReason::DurationElapsed;
            }

            let snapshot = match self.source.sample() {
                Ok(s) => s,
                Err(e) => {
                    log::warn!("recording fault, stopping: {e}");
                    break StopReason::Fault(e.to_string());
                }
            };

            for button in tracker.update(&snapshot) {
                let delay = elapsed.saturating_sub(last_action);
                sequence.push(Action::click(
                    button,
                    snapshot.x,
                    snapshot.y,
                    delay.as_secs_f64(),
                    wall_clock_stamp(),
                ));
                last_action = elapsed;
                log::info!("recorded {button} click at ({},{})", snapshot.x, snapshot.y);
            }

            self.clock.sleep(self.poll_interval);
        };

        self.state = RecorderState::Stopped;
        let elapsed = self.clock.now().saturating_sub(start);
        log::info!(
            "recording stopped ({reason:?}) after {:.2}s with {} action(s)",
            elapsed.as_secs_f64(),
            sequence.len()
        );
        Recording {
            sequence,
            reason,
            elapsed,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::errors::AutomationError;

    /// Press windows on a virtual timeline: (from, to, button, x, y).
    struct Timeline<'a> {
        clock: &'a ManualClock,
        presses: Vec<(Duration, Duration, MouseButton, i32, i32)>,
        fail_after: Option<Duration>,
    }

    impl PointerSource for Timeline<'_> {
        fn sample(&self) -> Result<PointerSnapshot> {
            let now = self.clock.now();
            if matches!(self.fail_after, Some(t) if now >= t) {
                return Err(AutomationError::RecordingError("device lost".into()));
            }
            let mut snap = PointerSnapshot::at(0, 0);
            for &(from, to, button, x, y) in &self.presses {
                if now >= from && now < to {
                    snap = PointerSnapshot { x, y, ..snap }.with_pressed(button);
                }
            }
            Ok(snap)
        }
    }

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_tracker_reports_press_edges_only() {
        let mut t = ButtonTracker::new();
        let down = PointerSnapshot::at(1, 1).with_pressed(MouseButton::Left);
        assert_eq!(t.update(&down), vec![MouseButton::Left]);
        assert_eq!(t.state(MouseButton::Left), ButtonState::Pressed);
        assert!(t.update(&down).is_empty());
        assert!(t.update(&PointerSnapshot::at(1, 1)).is_empty());
        assert_eq!(t.state(MouseButton::Left), ButtonState::Released);
        assert_eq!(t.update(&down), vec![MouseButton::Left]);
    }

    #[test]
    fn test_tracker_buttons_independent() {
        let mut t = ButtonTracker::new();
        let left = PointerSnapshot::at(0, 0).with_pressed(MouseButton::Left);
        t.update(&left);
        let both = left.with_pressed(MouseButton::Middle);
        assert_eq!(t.update(&both), vec![MouseButton::Middle]);
    }

    #[test]
    fn test_no_presses_yields_empty_sequence() {
        let clock = ManualClock::new();
        let source = Timeline {
            clock: &clock,
            presses: vec![],
            fail_after: None,
        };
        let mut rec = ScriptRecorder::new(&source, &clock).with_max_duration(Some(ms(500)));
        assert_eq!(rec.state(), RecorderState::Idle);
        let out = rec.record();
        assert!(out.sequence.is_empty());
        assert_eq!(out.reason, StopReason::DurationElapsed);
        assert_eq!(rec.state(), RecorderState::Stopped);
    }

    #[test]
    fn test_held_button_recorded_once() {
        let clock = ManualClock::new();
        let source = Timeline {
            clock: &clock,
            presses: vec![(ms(100), ms(600), MouseButton::Left, 40, 50)],
            fail_after: None,
        };
        let out = ScriptRecorder::new(&source, &clock)
            .with_max_duration(Some(ms(1000)))
            .record();
        assert_eq!(out.sequence.len(), 1);
        let a = &out.sequence.actions()[0];
        assert_eq!((a.button, a.x, a.y), (MouseButton::Left, 40, 50));
        assert!((a.delay - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_delays_measure_gap_between_actions() {
        let clock = ManualClock::new();
        let source = Timeline {
            clock: &clock,
            presses: vec![
                (ms(200), ms(260), MouseButton::Left, 100, 100),
                (ms(1200), ms(1260), MouseButton::Right, 200, 150),
            ],
            fail_after: None,
        };
        let out = ScriptRecorder::new(&source, &clock)
            .with_max_duration(Some(ms(2000)))
            .record();
        let actions = out.sequence.actions();
        assert_eq!(actions.len(), 2);
        assert!((actions[0].delay - 0.2).abs() < 1e-9);
        assert!((actions[1].delay - 1.0).abs() < 1e-9);
        assert_eq!(actions[1].button, MouseButton::Right);
    }

    #[test]
    fn test_stop_handle_interrupts() {
        let clock = ManualClock::new();
        let source = Timeline {
            clock: &clock,
            presses: vec![],
            fail_after: None,
        };
        let mut rec = ScriptRecorder::new(&source, &clock);
        rec.stop_handle().stop();
        let out = rec.record();
        assert_eq!(out.reason, StopReason::Interrupted);
        assert_eq!(out.elapsed, Duration::ZERO);
    }

    #[test]
    fn test_fault_keeps_partial_results() {
        let clock = ManualClock::new();
        let source = Timeline {
            clock: &clock,
            presses: vec![(ms(100), ms(150), MouseButton::Left, 9, 9)],
            fail_after: Some(ms(300)),
        };
        let mut rec = ScriptRecorder::new(&source, &clock);
        let out = rec.record();
        assert_eq!(out.sequence.len(), 1);
        assert!(matches!(out.reason, StopReason::Fault(ref m) if m.contains("device lost")));
        assert_eq!(rec.state(), RecorderState::Stopped);
    }

    #[test]
    fn test_polls_at_configured_interval() {
        let clock = ManualClock::new();
        let source = Timeline {
            clock: &clock,
            presses: vec![],
            fail_after: None,
        };
        ScriptRecorder::new(&source, &clock)
            .with_max_duration(Some(ms(200)))
            .record();
        let sleeps = clock.sleeps();
        assert!(!sleeps.is_empty());
        assert!(sleeps.iter().all(|&d| d == DEFAULT_POLL_INTERVAL));
    }
}
