//! Capture, match, act: the one-call image-triggered click.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::errors::{AutomationError, Result};
use crate::frame::{Frame, Region, Template};
use crate::input::{ActionExecutor, InputInjector};
use crate::matcher::{self, MatchPoint};
use crate::screenshot::{FrameProvider, FrameSource};

/// What to do at a matched location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    #[default]
    Click,
    DoubleClick,
    RightClick,
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ActionType::Click => "click",
            ActionType::DoubleClick => "double_click",
            ActionType::RightClick => "right_click",
        })
    }
}

impl FromStr for ActionType {
    type Err = AutomationError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "click" => Ok(ActionType::Click),
            "double_click" => Ok(ActionType::DoubleClick),
            "right_click" => Ok(ActionType::RightClick),
            other => Err(AutomationError::InputError(format!(
                "unknown action '{other}' (expected click, double_click or right_click)"
            ))),
        }
    }
}

pub struct Recognizer<P, I, C> {
    source: FrameSource<P>,
    executor: ActionExecutor<I, C>,
}

impl<P: FrameProvider, I: InputInjector, C: Clock> Recognizer<P, I, C> {
    pub fn new(source: FrameSource<P>, executor: ActionExecutor<I, C>) -> Self {
        Self { source, executor }
    }

    pub fn executor(&self) -> &ActionExecutor<I, C> {
        &self.executor
    }

    /// Capture the full screen and locate `template`, in screen coordinates.
    ///
    /// # Errors
    ///
    /// Only capture failures; "not found" is `Ok(None)`.
    pub fn locate(&self, template: &Template, threshold: f32) -> Result<Option<MatchPoint>> {
        let (frame, bounds) = self.capture_screen()?;
        Ok(matcher::find(&frame, template, threshold).map(|m| offset(m, &bounds)))
    }

    fn capture_screen(&self) -> Result<(Frame, Region)> {
        let bounds = self.source.provider().screen_bounds()?;
        let frame = self.source.capture(Some(bounds))?;
        Ok((frame, bounds))
    }

    /// Capture, match `template_path`, and perform `action` at the match.
    ///
    /// The screen is captured before the template is read, so a capture
    /// failure surfaces even when the template is missing.  Returns
    /// `Ok(false)` when the template is missing/unreadable or not on screen;
    /// callers are expected to poll.
    pub fn recognize_and_act(
        &self,
        template_path: &Path,
        action: ActionType,
        threshold: f32,
    ) -> Result<bool> {
        let (frame, bounds) = self.capture_screen()?;
        let Some(m) = matcher::find_template(&frame, template_path, threshold)
            .map(|m| offset(m, &bounds))
        else {
            log::debug!("no match for {}", template_path.display());
            return Ok(false);
        };
        log::info!(
            "matched {} at ({},{}) score {:.3}",
            template_path.display(),
            m.x,
            m.y,
            m.score
        );

        match action {
            ActionType::Click => self.executor.click(m.x, m.y)?,
            ActionType::DoubleClick => self.executor.double_click(m.x, m.y)?,
            ActionType::RightClick => self.executor.right_click(m.x, m.y)?,
        }
        Ok(true)
    }
}

/// Shift a frame-relative match into screen space.
fn offset(m: MatchPoint, region: &Region) -> MatchPoint {
    MatchPoint {
        x: m.x + region.x,
        y: m.y + region.y,
        ..m
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::input::{DryRunInjector, InputEvent, MouseButton};
    use crate::screenshot::MemoryFrameProvider;
    use tempfile::TempDir;

    fn screen() -> Frame {
        let mut state: u32 = 0x9E37_79B9;
        let data = (0..48 * 32)
            .flat_map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                let v = (state >> 8) as u8;
                [v, v ^ 0x5A, v / 3]
            })
            .collect();
        Frame::new(48, 32, data).unwrap()
    }

    fn recognizer<P: FrameProvider>(provider: P) -> Recognizer<P, DryRunInjector, ManualClock> {
        Recognizer::new(
            FrameSource::new(provider),
            ActionExecutor::new(DryRunInjector::new(), ManualClock::new()),
        )
    }

    fn write_template(dir: &TempDir, region: Region) -> std::path::PathBuf {
        let path = dir.path().join("button.png");
        let png = screen().crop(&region).unwrap().encode_png().unwrap();
        std::fs::write(&path, png).unwrap();
        path
    }

    #[test]
    fn test_action_type_parse() {
        assert_eq!("double_click".parse::<ActionType>().unwrap(), ActionType::DoubleClick);
        assert_eq!(ActionType::RightClick.to_string(), "right_click");
        assert!("hover".parse::<ActionType>().is_err());
    }

    #[test]
    fn test_recognize_and_click() {
        let dir = TempDir::new().unwrap();
        let path = write_template(&dir, Region::new(20, 10, 8, 6));
        let r = recognizer(MemoryFrameProvider::new(screen()));
        assert!(r.recognize_and_act(&path, ActionType::RightClick, 0.95).unwrap());
        assert_eq!(
            r.executor().injector().clicks(),
            vec![(24, 13, MouseButton::Right)]
        );
    }

    #[test]
    fn test_each_action_type_at_match_center() {
        let dir = TempDir::new().unwrap();
        let path = write_template(&dir, Region::new(6, 18, 10, 8));
        let center = (6 + 5, 18 + 4);
        let cases = [
            (ActionType::Click, vec![MouseButton::Left]),
            (ActionType::DoubleClick, vec![MouseButton::Left, MouseButton::Left]),
            (ActionType::RightClick, vec![MouseButton::Right]),
        ];
        for (action, buttons) in cases {
            let r = recognizer(MemoryFrameProvider::new(screen()));
            assert!(r.recognize_and_act(&path, action, 0.95).unwrap(), "{action}");
            let expected: Vec<_> = buttons.iter().map(|&b| (center.0, center.1, b)).collect();
            assert_eq!(r.executor().injector().clicks(), expected, "{action}");
        }
    }

    #[test]
    fn test_double_click_presses_twice_without_moving_between() {
        let dir = TempDir::new().unwrap();
        let path = write_template(&dir, Region::new(30, 2, 8, 8));
        let r = recognizer(MemoryFrameProvider::new(screen()));
        assert!(r.recognize_and_act(&path, ActionType::DoubleClick, 0.95).unwrap());
        let events = r.executor().injector().events();
        let tail = &events[events.len() - 4..];
        assert_eq!(
            tail,
            &[
                InputEvent::Down(MouseButton::Left),
                InputEvent::Up(MouseButton::Left),
                InputEvent::Down(MouseButton::Left),
                InputEvent::Up(MouseButton::Left),
            ]
        );
        assert_eq!(events[events.len() - 5], InputEvent::Move(34, 6));
    }

    #[test]
    fn test_missing_template_is_false() {
        let r = recognizer(MemoryFrameProvider::new(screen()));
        let ok = r
            .recognize_and_act(Path::new("/nope/missing.png"), ActionType::Click, 0.8)
            .unwrap();
        assert!(!ok);
        assert!(r.executor().injector().events().is_empty());
    }

    #[test]
    fn test_no_match_is_false() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("other.png");
        let other = Frame::new(4, 4, (0..48).map(|i| (i * 37 % 256) as u8).collect()).unwrap();
        std::fs::write(&path, other.encode_png().unwrap()).unwrap();
        let r = recognizer(MemoryFrameProvider::new(screen()));
        assert!(!r.recognize_and_act(&path, ActionType::Click, 0.999).unwrap());
    }

    struct OffsetScreen(MemoryFrameProvider);

    impl FrameProvider for OffsetScreen {
        fn screen_bounds(&self) -> Result<Region> {
            let b = self.0.screen_bounds()?;
            Ok(Region::new(-100, 50, b.width, b.height))
        }

        fn grab(&self, region: Region) -> Result<Frame> {
            self.0.grab(Region::new(region.x + 100, region.y - 50, region.width, region.height))
        }
    }

    #[test]
    fn test_match_translated_to_screen_coordinates() {
        let dir = TempDir::new().unwrap();
        let path = write_template(&dir, Region::new(4, 4, 10, 10));
        let r = recognizer(OffsetScreen(MemoryFrameProvider::new(screen())));
        let t = Template::load(&path).unwrap();
        let m = r.locate(&t, 0.95).unwrap().unwrap();
        assert_eq!((m.x, m.y), (4 + 5 - 100, 4 + 5 + 50));
    }

    struct NoDisplay;

    impl FrameProvider for NoDisplay {
        fn screen_bounds(&self) -> Result<Region> {
            Err(AutomationError::CaptureError("no display".into()))
        }

        fn grab(&self, _region: Region) -> Result<Frame> {
            Err(AutomationError::CaptureError("no display".into()))
        }
    }

    #[test]
    fn test_capture_failure_propagates() {
        let dir = TempDir::new().unwrap();
        let path = write_template(&dir, Region::new(0, 0, 4, 4));
        let r = recognizer(NoDisplay);
        assert!(matches!(
            r.recognize_and_act(&path, ActionType::Click, 0.8),
            Err(AutomationError::CaptureError(_))
        ));
    }

    #[test]
    fn test_capture_failure_reported_before_template_lookup() {
        let r = recognizer(NoDisplay);
        assert!(matches!(
            r.recognize_and_act(Path::new("/nope/missing.png"), ActionType::Click, 0.8),
            Err(AutomationError::CaptureError(_))
        ));
    }
}
