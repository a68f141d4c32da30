//! Replay of recorded scripts.

use std::time::Duration;

use crate::clock::Clock;
use crate::errors::{AutomationError, Result};
use crate::input::{ActionExecutor, InputInjector};
use crate::script::{ActionKind, ScriptSequence};

/// Replays a [`ScriptSequence`] through an [`ActionExecutor`].
pub struct ScriptPlayer<'a, I, C> {
    executor: &'a ActionExecutor<I, C>,
}

impl<'a, I: InputInjector, C: Clock> ScriptPlayer<'a, I, C> {
    pub fn new(executor: &'a ActionExecutor<I, C>) -> Self {
        Self { executor }
    }

    /// Replay every action in order, waiting out each recorded delay first.
    ///
    /// Returns the number of actions executed.  The first failure aborts the
    /// rest of the script; clicks already issued are not undone.
    pub fn try_run(&self, sequence: &ScriptSequence) -> Result<usize> {
        if sequence.is_empty() {
            return Err(AutomationError::ScriptError("script has no actions".into()));
        }
        log::info!("replaying {} action(s)", sequence.len());

        let mut executed = 0;
        for (index, action) in sequence.iter().enumerate() {
            if action.kind != ActionKind::Click {
                log::warn!("skipping action #{index}: unsupported kind");
                continue;
            }
            if action.delay > 0.0 {
                let delay = Duration::try_from_secs_f64(action.delay).map_err(|e| {
                    AutomationError::ScriptError(format!(
                        "action #{index} has unusable delay {}: {e}",
                        action.delay
                    ))
                })?;
                self.executor.clock().sleep(delay);
            }
            self.executor
                .move_and_click(action.x, action.y, action.button)
                .map_err(|e| {
                    AutomationError::InputError(format!(
                        "action #{index} ({} at {},{}) failed: {e}",
                        action.button, action.x, action.y
                    ))
                })?;
            executed += 1;
        }
        log::info!("replay finished, {executed} action(s) executed");
        Ok(executed)
    }

    /// [`try_run`](Self::try_run) reduced to success / failure.
    pub fn run(&self, sequence: &ScriptSequence) -> bool {
        match self.try_run(sequence) {
            Ok(_) => true,
            Err(e) => {
                log::warn!("replay aborted: {e}");
                false
            }
        }
    }
}
