//! Pointer input synthesis.
//!
//! [`InputInjector`] is the raw primitive (absolute move, button down/up,
//! cursor query).  [`ActionExecutor`] builds the user-facing actions on top
//! of it: an eased move to the target followed by a press-release.
//!
//! On Windows the primitive is [`SendInputInjector`], which issues Win32
//! `SendInput` events in normalised virtual-desktop coordinates.
//! [`DryRunInjector`] logs calls instead of injecting them.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::errors::{AutomationError, Result};

/// Pause between the two clicks of a double click.
const DOUBLE_CLICK_GAP: Duration = Duration::from_millis(50);

// ---------------------------------------------------------------------------
// Buttons
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    pub const ALL: [MouseButton; 3] = [MouseButton::Left, MouseButton::Right, MouseButton::Middle];

    pub fn as_str(&self) -> &'static str {
        match self {
            MouseButton::Left => "left",
            MouseButton::Right => "right",
            MouseButton::Middle => "middle",
        }
    }
}

impl fmt::Display for MouseButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MouseButton {
    type Err = AutomationError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "left" => Ok(MouseButton::Left),
            "right" => Ok(MouseButton::Right),
            "middle" => Ok(MouseButton::Middle),
            other => Err(AutomationError::InputError(format!(
                "unknown mouse button '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Injector trait
// ---------------------------------------------------------------------------

/// Raw pointer-injection primitive.
pub trait InputInjector {
    /// Current cursor position in screen pixels.
    fn cursor_position(&self) -> Result<(i32, i32)>;

    /// Jump the cursor to (`x`, `y`).
    fn move_to(&self, x: i32, y: i32) -> Result<()>;

    fn button_down(&self, button: MouseButton) -> Result<()>;

    fn button_up(&self, button: MouseButton) -> Result<()>;
}

impl<I: InputInjector + ?Sized> InputInjector for &I {
    fn cursor_position(&self) -> Result<(i32, i32)> {
        (**self).cursor_position()
    }

    fn move_to(&self, x: i32, y: i32) -> Result<()> {
        (**self).move_to(x, y)
    }

    fn button_down(&self, button: MouseButton) -> Result<()> {
        (**self).button_down(button)
    }

    fn button_up(&self, button: MouseButton) -> Result<()> {
        (**self).button_up(button)
    }
}

impl<I: InputInjector + ?Sized> InputInjector for Box<I> {
    fn cursor_position(&self) -> Result<(i32, i32)> {
        (**self).cursor_position()
    }

    fn move_to(&self, x: i32, y: i32) -> Result<()> {
        (**self).move_to(x, y)
    }

    fn button_down(&self, button: MouseButton) -> Result<()> {
        (**self).button_down(button)
    }

    fn button_up(&self, button: MouseButton) -> Result<()> {
        (**self).button_up(button)
    }
}

// ---------------------------------------------------------------------------
// Eased movement
// ---------------------------------------------------------------------------

/// Quadratic ease-in-out on `t` in `[0, 1]`.
pub fn ease_in_out(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    if t < 0.5 {
        2.0 * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
    }
}

/// Intermediate cursor positions from `from` to `to` in `steps` steps.
///
/// The last point is always exactly `to`; `steps == 0` yields just `to`.
pub fn eased_path(from: (i32, i32), to: (i32, i32), steps: u32) -> Vec<(i32, i32)> {
    if steps == 0 {
        return vec![to];
    }
    let (dx, dy) = ((to.0 - from.0) as f64, (to.1 - from.1) as f64);
    (1..=steps)
        .map(|i| {
            let k = ease_in_out(i as f64 / steps as f64);
            (
                from.0 + (dx * k).round() as i32,
                from.1 + (dy * k).round() as i32,
            )
        })
        .collect()
}

// ---------------------------------------------------------------------------
// ActionExecutor
// ---------------------------------------------------------------------------

/// Timing of the animated pointer move preceding every click.
#[derive(Debug, Clone, Copy)]
pub struct MoveProfile {
    pub duration: Duration,
    pub steps: u32,
}

impl Default for MoveProfile {
    fn default() -> Self {
        Self {
            duration: Duration::from_millis(200),
            steps: 20,
        }
    }
}

/// Pointer actions built from an [`InputInjector`].
///
/// Coordinates are not clamped: out-of-bounds targets are the caller's
/// responsibility.
pub struct ActionExecutor<I, C> {
    injector: I,
    clock: C,
    profile: MoveProfile,
}

impl<I: InputInjector, C: Clock> ActionExecutor<I, C> {
    pub fn new(injector: I, clock: C) -> Self {
        Self {
            injector,
            clock,
            profile: MoveProfile::default(),
        }
    }

    pub fn with_profile(mut self, profile: MoveProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn injector(&self) -> &I {
        &self.injector
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Move to (`x`, `y`) over the configured duration.
    pub fn move_to(&self, x: i32, y: i32) -> Result<()> {
        let from = self.injector.cursor_position()?;
        let path = eased_path(from, (x, y), self.profile.steps);
        let pause = self.profile.duration / path.len() as u32;
        for (px, py) in path {
            self.injector.move_to(px, py)?;
            if !pause.is_zero() {
                self.clock.sleep(pause);
            }
        }
        Ok(())
    }

    fn press_release(&self, button: MouseButton) -> Result<()> {
        self.injector.button_down(button)?;
        self.injector.button_up(button)
    }

    /// Eased move to (`x`, `y`) followed by one press-release of `button`.
    pub fn move_and_click(&self, x: i32, y: i32, button: MouseButton) -> Result<()> {
        self.move_to(x, y)?;
        self.press_release(button)?;
        log::debug!("click {button} at ({x},{y})");
        Ok(())
    }

    pub fn click(&self, x: i32, y: i32) -> Result<()> {
        self.move_and_click(x, y, MouseButton::Left)
    }

    pub fn right_click(&self, x: i32, y: i32) -> Result<()> {
        self.move_and_click(x, y, MouseButton::Right)
    }

    pub fn double_click(&self, x: i32, y: i32) -> Result<()> {
        self.move_and_click(x, y, MouseButton::Left)?;
        self.clock.sleep(DOUBLE_CLICK_GAP);
        self.press_release(MouseButton::Left)
    }
}

// ---------------------------------------------------------------------------
// Dry-run injector
// ---------------------------------------------------------------------------

/// One primitive call observed by [`DryRunInjector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Move(i32, i32),
    Down(MouseButton),
    Up(MouseButton),
}

/// Injector that records calls instead of touching the real pointer.
#[derive(Debug, Default)]
pub struct DryRunInjector {
    cursor: Mutex<(i32, i32)>,
    events: Mutex<Vec<InputEvent>>,
}

impl DryRunInjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<InputEvent> {
        self.events.lock().clone()
    }

    /// `(x, y, button)` for every completed press-release pair.
    pub fn clicks(&self) -> Vec<(i32, i32, MouseButton)> {
        let events = self.events.lock();
        let mut pos = (0, 0);
        let mut clicks = Vec::new();
        for ev in events.iter() {
            match *ev {
                InputEvent::Move(x, y) => pos = (x, y),
                InputEvent::Up(b) => clicks.push((pos.0, pos.1, b)),
                InputEvent::Down(_) => {}
            }
        }
        clicks
    }
}

impl InputInjector for DryRunInjector {
    fn cursor_position(&self) -> Result<(i32, i32)> {
        Ok(*self.cursor.lock())
    }

    fn move_to(&self, x: i32, y: i32) -> Result<()> {
        *self.cursor.lock() = (x, y);
        self.events.lock().push(InputEvent::Move(x, y));
        Ok(())
    }

    fn button_down(&self, button: MouseButton) -> Result<()> {
        self.events.lock().push(InputEvent::Down(button));
        Ok(())
    }

    fn button_up(&self, button: MouseButton) -> Result<()> {
        self.events.lock().push(InputEvent::Up(button));
        log::info!("[dry-run] {button} click at {:?}", *self.cursor.lock());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SendInput injector (Windows)
// ---------------------------------------------------------------------------

#[cfg(windows)]
pub use native::SendInputInjector;

#[cfg(windows)]
mod native {
    use windows::Win32::Foundation::POINT;
    use windows::Win32::UI::Input::KeyboardAndMouse::{
        SendInput, INPUT, INPUT_0, INPUT_MOUSE, MOUSEEVENTF_ABSOLUTE, MOUSEEVENTF_LEFTDOWN,
        MOUSEEVENTF_LEFTUP, MOUSEEVENTF_MIDDLEDOWN, MOUSEEVENTF_MIDDLEUP, MOUSEEVENTF_MOVE,
        MOUSEEVENTF_RIGHTDOWN, MOUSEEVENTF_RIGHTUP, MOUSEEVENTF_VIRTUALDESK, MOUSEINPUT,
        MOUSE_EVENT_FLAGS,
    };
    use windows::Win32::UI::WindowsAndMessaging::{
        GetCursorPos, GetSystemMetrics, SM_CXVIRTUALSCREEN, SM_CYVIRTUALSCREEN,
        SM_XVIRTUALSCREEN, SM_YVIRTUALSCREEN,
    };

    use super::{InputInjector, MouseButton};
    use crate::errors::{AutomationError, Result};

    const INPUT_BYTES: i32 = std::mem::size_of::<INPUT>() as i32;

    /// `SendInput` absolute coordinates span 0..=65535 on each axis.
    const ABSOLUTE_SPAN: i64 = 65_535;

    /// The bounding box of all monitors, in pixels.
    struct VirtualDesk {
        left: i32,
        top: i32,
        width: i32,
        height: i32,
    }

    impl VirtualDesk {
        fn query() -> Result<Self> {
            let desk = unsafe {
                VirtualDesk {
                    left: GetSystemMetrics(SM_XVIRTUALSCREEN),
                    top: GetSystemMetrics(SM_YVIRTUALSCREEN),
                    width: GetSystemMetrics(SM_CXVIRTUALSCREEN),
                    height: GetSystemMetrics(SM_CYVIRTUALSCREEN),
                }
            };
            if desk.width <= 1 || desk.height <= 1 {
                return Err(AutomationError::InputError(format!(
                    "virtual desktop reported as {}x{}",
                    desk.width, desk.height
                )));
            }
            Ok(desk)
        }

        /// Pixel position to `SendInput` absolute units, pinned to the desk.
        fn to_absolute(&self, x: i32, y: i32) -> (i32, i32) {
            let scale = |offset: i32, extent: i32| {
                (offset as i64 * ABSOLUTE_SPAN / (extent as i64 - 1)).clamp(0, ABSOLUTE_SPAN) as i32
            };
            (scale(x - self.left, self.width), scale(y - self.top, self.height))
        }
    }

    fn pointer_event(dx: i32, dy: i32, flags: MOUSE_EVENT_FLAGS) -> INPUT {
        INPUT {
            r#type: INPUT_MOUSE,
            Anonymous: INPUT_0 {
                mi: MOUSEINPUT {
                    dx,
                    dy,
                    dwFlags: flags,
                    ..Default::default()
                },
            },
        }
    }

    fn send(inputs: &[INPUT], what: &str) -> Result<()> {
        let sent = unsafe { SendInput(inputs, INPUT_BYTES) };
        if sent as usize != inputs.len() {
            return Err(AutomationError::InputError(format!(
                "SendInput ({what}) injected {sent} of {} events",
                inputs.len()
            )));
        }
        Ok(())
    }

    fn button_flags(button: MouseButton) -> (MOUSE_EVENT_FLAGS, MOUSE_EVENT_FLAGS) {
        match button {
            MouseButton::Left => (MOUSEEVENTF_LEFTDOWN, MOUSEEVENTF_LEFTUP),
            MouseButton::Right => (MOUSEEVENTF_RIGHTDOWN, MOUSEEVENTF_RIGHTUP),
            MouseButton::Middle => (MOUSEEVENTF_MIDDLEDOWN, MOUSEEVENTF_MIDDLEUP),
        }
    }

    /// Win32 `SendInput` mouse injection.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct SendInputInjector;

    impl InputInjector for SendInputInjector {
        fn cursor_position(&self) -> Result<(i32, i32)> {
            let mut point = POINT::default();
            unsafe { GetCursorPos(&mut point) }
                .map_err(|e| AutomationError::InputError(format!("GetCursorPos failed: {e}")))?;
            Ok((point.x, point.y))
        }

        fn move_to(&self, x: i32, y: i32) -> Result<()> {
            let (dx, dy) = VirtualDesk::query()?.to_absolute(x, y);
            let flags = MOUSEEVENTF_ABSOLUTE | MOUSEEVENTF_MOVE | MOUSEEVENTF_VIRTUALDESK;
            send(&[pointer_event(dx, dy, flags)], "move")
        }

        fn button_down(&self, button: MouseButton) -> Result<()> {
            send(&[pointer_event(0, 0, button_flags(button).0)], "button down")
        }

        fn button_up(&self, button: MouseButton) -> Result<()> {
            send(&[pointer_event(0, 0, button_flags(button).1)], "button up")
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
