//! `imgrec_core` -- screen automation core for imgrec.
//!
//! Captures the screen, finds a saved image pattern in the capture, and
//! clicks on it.  Also records timed clicks performed by a person and replays
//! them later.  Native Windows back ends (GDI capture, `SendInput`,
//! `GetAsyncKeyState`) sit behind small traits so everything else builds and
//! tests on any host.
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`errors`] | `AutomationError` enum via `thiserror` |
//! | [`config`] | `Settings` loaded from JSON |
//! | [`clock`] | Real and virtual time sources |
//! | [`frame`] | `Frame`, `Region`, `Template` pixel buffers |
//! | [`screenshot`] | `FrameSource` over GDI `BitBlt` or an in-memory image |
//! | [`matcher`] | Normalized-correlation template search (Rayon) |
//! | [`input`] | `ActionExecutor` over `SendInput` or a dry-run injector |
//! | [`recognizer`] | Capture + match + click in one call |
//! | [`recorder`] | Edge-triggered click recording |
//! | [`script`] | `ScriptSequence` and its JSON `ScriptStore` |
//! | [`player`] | Timed replay of a script |

pub mod clock;
pub mod config;
pub mod errors;
pub mod frame;
pub mod input;
pub mod matcher;
pub mod player;
pub mod recognizer;
pub mod recorder;
pub mod screenshot;
pub mod script;

pub use errors::{AutomationError, Result};
