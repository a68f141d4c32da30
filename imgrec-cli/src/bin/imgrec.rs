//! `imgrec` -- record, replay and image-triggered clicks from the command line.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use imgrec_core::clock::{ManualClock, SystemClock};
use imgrec_core::config::Settings;
use imgrec_core::frame::{Frame, Region};
use imgrec_core::input::{ActionExecutor, DryRunInjector};
use imgrec_core::matcher;
use imgrec_core::player::ScriptPlayer;
use imgrec_core::recognizer::{ActionType, Recognizer};
use imgrec_core::recorder::{ScriptRecorder, StopReason};
use imgrec_core::screenshot::FrameSource;
use imgrec_core::script::{generated_name, ScriptStore};
use imgrec_core::{AutomationError, Result};

#[derive(Parser)]
#[command(name = "imgrec", about = "Screen automation: image-triggered clicks and click record/replay")]
struct Args {
    /// Settings file (JSON)
    #[arg(long, global = true, default_value = "imgrec.json")]
    config: PathBuf,

    /// Override the script directory
    #[arg(long, global = true)]
    script_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record clicks until Ctrl+C (or --duration) and save them
    Record {
        /// Stop automatically after this many seconds
        #[arg(short, long)]
        duration: Option<f64>,
        /// Script name (default: script_YYYYmmdd_HHMMSS)
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Replay a saved script
    Run {
        /// Script name, without extension
        name: String,
        /// Print the clicks instead of performing them
        #[arg(long)]
        dry_run: bool,
    },
    /// Save the most recent recording under a new name
    Save {
        /// Target script name
        name: String,
    },
    /// List saved scripts
    List,
    /// Find a template on screen and act on it
    Click {
        /// Template image path
        template: PathBuf,
        /// Action: click, double_click, right_click
        #[arg(short, long, default_value = "click", value_parser = parse_action)]
        action: ActionType,
        /// Match threshold in [0, 1]
        #[arg(short, long)]
        threshold: Option<f32>,
    },
    /// Find a template inside a saved screenshot
    Match {
        /// Screenshot image path
        screenshot: PathBuf,
        /// Template image path
        template: PathBuf,
        /// Match threshold in [0, 1]
        #[arg(short, long)]
        threshold: Option<f32>,
    },
    /// Capture the screen (or a region) to a PNG file
    Capture {
        /// Output file path
        #[arg(short, long, default_value = "screenshot.png")]
        output: PathBuf,
        /// Region as X,Y,W,H
        #[arg(short, long, value_parser = parse_region)]
        region: Option<Region>,
    },
}

fn parse_action(s: &str) -> std::result::Result<ActionType, String> {
    s.parse().map_err(|e: AutomationError| e.to_string())
}

fn parse_region(s: &str) -> std::result::Result<Region, String> {
    Region::parse(s).map_err(|e| e.to_string())
}

// ---------------------------------------------------------------------------
// Native back ends
// ---------------------------------------------------------------------------

#[cfg(windows)]
mod native {
    use imgrec_core::input::SendInputInjector;
    use imgrec_core::recorder::AsyncKeyStatePointer;
    use imgrec_core::screenshot::GdiFrameProvider;
    use imgrec_core::Result;

    pub type Provider = GdiFrameProvider;
    pub type Injector = SendInputInjector;
    pub type Pointer = AsyncKeyStatePointer;

    pub fn open() -> Result<(Provider, Injector, Pointer)> {
        Ok((GdiFrameProvider, SendInputInjector, AsyncKeyStatePointer))
    }
}

#[cfg(not(windows))]
mod native {
    use imgrec_core::errors::{AutomationError, Result};
    use imgrec_core::frame::{Frame, Region};
    use imgrec_core::input::{InputInjector, MouseButton};
    use imgrec_core::recorder::{PointerSnapshot, PointerSource};
    use imgrec_core::screenshot::FrameProvider;

    /// Stand-in type for hosts without a native back end; `open` never
    /// hands one out.
    #[allow(dead_code)]
    pub struct Unsupported;

    pub type Provider = Unsupported;
    pub type Injector = Unsupported;
    pub type Pointer = Unsupported;

    fn unsupported<T>() -> Result<T> {
        Err(AutomationError::CaptureError(
            "live screen access is only supported on Windows".into(),
        ))
    }

    pub fn open() -> Result<(Provider, Injector, Pointer)> {
        unsupported()
    }

    impl FrameProvider for Unsupported {
        fn screen_bounds(&self) -> Result<Region> {
            unsupported()
        }

        fn grab(&self, _region: Region) -> Result<Frame> {
            unsupported()
        }
    }

    impl InputInjector for Unsupported {
        fn cursor_position(&self) -> Result<(i32, i32)> {
            unsupported()
        }

        fn move_to(&self, _x: i32, _y: i32) -> Result<()> {
            unsupported()
        }

        fn button_down(&self, _button: MouseButton) -> Result<()> {
            unsupported()
        }

        fn button_up(&self, _button: MouseButton) -> Result<()> {
            unsupported()
        }
    }

    impl PointerSource for Unsupported {
        fn sample(&self) -> Result<PointerSnapshot> {
            unsupported()
        }
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn load_settings(args: &Args) -> Result<Settings> {
    let mut settings = Settings::load(&args.config)?;
    if let Some(dir) = &args.script_dir {
        settings.script_dir = dir.clone();
    }
    log::debug!("settings: {settings:?}");
    Ok(settings)
}

fn threshold_or(settings: &Settings, threshold: Option<f32>) -> Result<f32> {
    let t = threshold.unwrap_or(settings.threshold);
    if !(0.0..=1.0).contains(&t) {
        return Err(AutomationError::ConfigError(format!(
            "threshold {t} outside [0, 1]"
        )));
    }
    Ok(t)
}

fn record(
    settings: &Settings,
    store: &ScriptStore,
    duration: Option<f64>,
    name: Option<String>,
) -> Result<bool> {
    let (_, _, pointer) = native::open()?;
    let max = match duration {
        Some(secs) if secs.is_finite() && secs > 0.0 => Some(Duration::from_secs_f64(secs)),
        Some(secs) => {
            return Err(AutomationError::ConfigError(format!(
                "duration must be positive, got {secs}"
            )))
        }
        None => None,
    };

    let mut recorder = ScriptRecorder::new(pointer, SystemClock::new())
        .with_poll_interval(settings.poll_interval())
        .with_max_duration(max);
    let stop = recorder.stop_handle();
    ctrlc::set_handler(move || stop.stop()).map_err(|e| {
        AutomationError::RecordingError(format!("cannot install Ctrl+C handler: {e}"))
    })?;

    println!("Recording... press Ctrl+C to stop");
    let recording = recorder.record();
    if let StopReason::Fault(msg) = &recording.reason {
        eprintln!("recording stopped early: {msg}");
    }

    let name = name.unwrap_or_else(generated_name);
    match store.save(&recording.sequence, Some(&name))? {
        Some(path) => println!("Script saved to {}", path.display()),
        None => println!("No actions recorded, nothing saved"),
    }
    Ok(true)
}

fn run_script(settings: &Settings, store: &ScriptStore, name: &str, dry_run: bool) -> Result<bool> {
    let Some(sequence) = store.load(name)? else {
        println!("Script not found: {name}");
        return Ok(false);
    };

    let ok = if dry_run {
        let executor = ActionExecutor::new(DryRunInjector::new(), ManualClock::new())
            .with_profile(settings.move_profile());
        let ok = ScriptPlayer::new(&executor).run(&sequence);
        for (x, y, button) in executor.injector().clicks() {
            println!("{button} click at ({x},{y})");
        }
        ok
    } else {
        let (_, injector, _) = native::open()?;
        let executor =
            ActionExecutor::new(injector, SystemClock::new()).with_profile(settings.move_profile());
        ScriptPlayer::new(&executor).run(&sequence)
    };
    println!("Script run {}", if ok { "succeeded" } else { "failed" });
    Ok(ok)
}

fn save_latest(store: &ScriptStore, name: &str) -> Result<bool> {
    let Some(latest) = store.latest()? else {
        println!("No recording to save");
        return Ok(false);
    };
    let Some(sequence) = store.load(&latest)? else {
        println!("Script not found: {latest}");
        return Ok(false);
    };
    match store.save(&sequence, Some(name))? {
        Some(path) => {
            println!("Saved {latest} as {}", path.display());
            Ok(true)
        }
        None => {
            println!("Latest recording {latest} is empty, nothing saved");
            Ok(false)
        }
    }
}

fn click(settings: &Settings, template: &Path, action: ActionType, threshold: f32) -> Result<bool> {
    let (provider, injector, _) = native::open()?;
    let recognizer = Recognizer::new(
        FrameSource::new(provider),
        ActionExecutor::new(injector, SystemClock::new()).with_profile(settings.move_profile()),
    );
    let hit = recognizer.recognize_and_act(template, action, threshold)?;
    if hit {
        println!("Matched {}: {action} done", template.display());
    } else {
        println!("No match for {}", template.display());
    }
    Ok(hit)
}

fn match_offline(screenshot: &Path, template: &Path, threshold: f32) -> Result<bool> {
    let frame = Frame::open(screenshot)?;
    match matcher::find_template(&frame, template, threshold) {
        Some(m) => {
            println!("Match at ({},{}) score {:.3}", m.x, m.y, m.score);
            Ok(true)
        }
        None => {
            println!("No match");
            Ok(false)
        }
    }
}

fn capture(output: &Path, region: Option<Region>) -> Result<bool> {
    let (provider, _, _) = native::open()?;
    let frame = FrameSource::new(provider).capture(region)?;
    std::fs::write(output, frame.encode_png()?)?;
    println!(
        "Saved {}x{} capture to {}",
        frame.width(),
        frame.height(),
        output.display()
    );
    Ok(true)
}

fn dispatch(args: &Args) -> Result<bool> {
    let settings = load_settings(args)?;
    let store = ScriptStore::new(&settings.script_dir);

    match &args.command {
        Command::Record { duration, name } => record(&settings, &store, *duration, name.clone()),
        Command::Run { name, dry_run } => run_script(&settings, &store, name, *dry_run),
        Command::Save { name } => save_latest(&store, name),
        Command::List => {
            let names = store.list()?;
            if names.is_empty() {
                println!("No scripts in {}", store.dir().display());
            }
            for name in names {
                println!("{name}");
            }
            Ok(true)
        }
        Command::Click {
            template,
            action,
            threshold,
        } => click(&settings, template, *action, threshold_or(&settings, *threshold)?),
        Command::Match {
            screenshot,
            template,
            threshold,
        } => match_offline(screenshot, template, threshold_or(&settings, *threshold)?),
        Command::Capture { output, region } => capture(output, *region),
    }
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(a) => a,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match dispatch(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(1)
        }
    }
}
