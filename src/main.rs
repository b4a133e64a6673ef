use std::fs;
use std::io::{self, BufRead, Read};
use std::path::PathBuf;
use std::thread;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use rand::rngs::StdRng;
use rand::SeedableRng;

use keycadence::config::TypingConfig;
use keycadence::console::{countdown, ConsoleObserver};
use keycadence::control::{PauseController, PauseState};
use keycadence::keyboard::find_first_unsupported_char;
use keycadence::model::Rehearsal;
use keycadence::playback::{open_keyboard, preflight_backend, KeyboardSink};
use keycadence::sim;
use keycadence::sink::{Recorder, ThreadSleeper};
use keycadence::stream::{normalize, NoopObserver, Outcome, Typist};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PlaybackBackendArg {
    Auto,
    Wayland,
    X11,
}

impl PlaybackBackendArg {
    fn to_library(self) -> keycadence::playback::PlaybackBackend {
        match self {
            PlaybackBackendArg::Auto => keycadence::playback::PlaybackBackend::Auto,
            PlaybackBackendArg::Wayland => keycadence::playback::PlaybackBackend::Wayland,
            PlaybackBackendArg::X11 => keycadence::playback::PlaybackBackend::X11,
        }
    }
}

#[derive(Debug, Args, Clone)]
struct TypingArgs {
    /// Input text file, or '-' for stdin
    #[arg(long, value_name = "PATH")]
    input: PathBuf,

    /// JSON typing config. Missing fields use defaults; flags below override it.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Minimum per-character delay, in seconds
    #[arg(long)]
    min_delay: Option<f64>,

    /// Maximum per-character delay, in seconds
    #[arg(long)]
    max_delay: Option<f64>,

    /// Typo probability per eligible character (0.0-1.0)
    #[arg(long)]
    typo_chance: Option<f64>,

    /// Type the text exactly, with no typos or corrections
    #[arg(long)]
    no_typos: bool,

    /// Always wait the minimum delay
    #[arg(long)]
    no_jitter: bool,

    /// Do not slow down over long texts
    #[arg(long)]
    no_fatigue: bool,

    /// Optional RNG seed (for debugging)
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Debug, Parser)]
#[command(name = "keycadence")]
#[command(about = "Types text into the focused window with human timing and typos", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Type the input into the currently focused window
    Type {
        /// Typing backend.
        ///
        /// - auto: choose a backend based on the runtime environment
        /// - wayland: force the Wayland virtual keyboard
        /// - x11: force X11 (XTEST)
        #[arg(long, value_enum, default_value_t = PlaybackBackendArg::Auto)]
        backend: PlaybackBackendArg,

        /// Countdown seconds before typing starts (and again after a restart)
        #[arg(long, default_value_t = 5)]
        countdown: u64,

        /// Wayland seat name to attach the virtual keyboard to (e.g. seat0, seat1).
        #[arg(long, value_name = "NAME")]
        seat: Option<String>,

        /// Disable the progress status line
        #[arg(long)]
        quiet: bool,

        #[command(flatten)]
        typing: TypingArgs,
    },

    /// Run the engine without typing or sleeping and print the action log (JSON)
    Rehearse {
        /// Output log file (defaults to stdout)
        #[arg(long, value_name = "PATH")]
        output: Option<PathBuf>,

        #[command(flatten)]
        typing: TypingArgs,
    },
}

fn read_input(path: &PathBuf) -> Result<String> {
    if path.as_os_str() == std::ffi::OsStr::new("-") {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read stdin")?;
        return Ok(buf);
    }

    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn write_output(path: &PathBuf, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}

fn rng_from_seed(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

fn load_config(args: &TypingArgs) -> Result<TypingConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str(&json)
                .with_context(|| format!("failed to parse typing config {}", path.display()))?
        }
        None => TypingConfig::default(),
    };

    if let Some(v) = args.min_delay {
        config.min_delay = v;
    }
    if let Some(v) = args.max_delay {
        config.max_delay = v;
    }
    if let Some(v) = args.typo_chance {
        config.backtrack_chance = v;
    }
    if args.no_typos {
        config.enable_typos = false;
    }
    if args.no_jitter {
        config.enable_jitter = false;
    }
    if args.no_fatigue {
        config.enable_fatigue = false;
    }

    Ok(config)
}

fn prepare(args: &TypingArgs) -> Result<(String, Typist)> {
    let text = read_input(&args.input)?;
    let typist = Typist::new(load_config(args)?)?;
    Ok((text, typist))
}

fn ensure_typeable(text: &str) -> Result<()> {
    let normalized: String = normalize(text).into_iter().collect();
    if let Some((idx, c)) = find_first_unsupported_char(&normalized) {
        let before = &normalized[..idx];
        let line = before.matches('\n').count() + 1;
        let column = before.rsplit('\n').next().unwrap_or("").chars().count() + 1;
        return Err(anyhow!(
            "unsupported character {c:?} at line {line}, column {column}; only US QWERTY keys can be typed"
        ));
    }
    Ok(())
}

/// Ctrl+C restarts while paused and interrupts otherwise; Enter on the
/// terminal toggles pause.
fn install_operator_signals(signal: &PauseController) -> Result<()> {
    {
        let signal = signal.clone();
        ctrlc::set_handler(move || {
            if !signal.request_restart() {
                signal.interrupt();
            }
        })
        .context("failed to install Ctrl+C handler")?;
    }

    // stdin may be the input text, so read Enter from the terminal itself.
    let tty = match fs::File::open("/dev/tty") {
        Ok(tty) => tty,
        Err(err) => {
            log::warn!("no controlling terminal ({err}); Enter-to-pause is disabled");
            return Ok(());
        }
    };

    let signal = signal.clone();
    thread::spawn(move || {
        for line in io::BufReader::new(tty).lines() {
            if line.is_err() || signal.is_interrupted() {
                break;
            }
            if signal.toggle_pause() == PauseState::PauseRequested {
                eprintln!("Pausing after the current character...");
            }
        }
    });

    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Command::Type {
            backend,
            countdown: countdown_secs,
            seat,
            quiet,
            typing,
        } => {
            let (text, mut typist) = prepare(&typing)?;
            ensure_typeable(&text)?;

            let backend = preflight_backend(backend.to_library(), seat.as_deref())?;
            let mut rng = rng_from_seed(typing.seed);

            let signal = PauseController::new();
            install_operator_signals(&signal)?;

            if !countdown(&signal, countdown_secs) {
                return Err(anyhow!("aborted"));
            }

            let mut sink = KeyboardSink::new(open_keyboard(backend, seat.as_deref())?);
            let mut observer = ConsoleObserver::new(signal.clone())
                .quiet(quiet)
                .restart_countdown(countdown_secs);

            let outcome = typist.type_stream(
                &text,
                &mut sink,
                &ThreadSleeper,
                &signal,
                &mut rng,
                &mut observer,
            );
            drop(sink);

            match outcome.context("typing failed")? {
                Outcome::Completed => {}
                Outcome::Interrupted => return Err(anyhow!("aborted")),
            }
        }
        Command::Rehearse { output, typing } => {
            let (text, mut typist) = prepare(&typing)?;
            let mut rng = rng_from_seed(typing.seed);

            let recorder = Recorder::new();
            let mut sink = recorder.clone();
            let signal = PauseController::new();
            typist
                .type_stream(
                    &text,
                    &mut sink,
                    &recorder,
                    &signal,
                    &mut rng,
                    &mut NoopObserver,
                )
                .context("rehearsal failed")?;

            let actions = recorder.actions();
            let expected: String = normalize(&text).into_iter().collect();
            if sim::simulate_typed_text(&actions) != expected {
                return Err(anyhow!("rehearsal does not reproduce the input text"));
            }

            let stats = sim::stats(&actions);
            eprintln!(
                "Rehearsed: {} actions, {} keystrokes ({} backspaces), ~{:.1} min",
                stats.actions,
                stats.keystrokes,
                stats.backspaces,
                (stats.total_wait_micros as f64) / 1_000_000.0 / 60.0,
            );

            let rehearsal = Rehearsal {
                config: typist.config().clone(),
                seed: typing.seed,
                actions,
            };
            let json =
                serde_json::to_string_pretty(&rehearsal).context("failed to serialize rehearsal")?;
            if let Some(out) = output {
                write_output(&out, &json)?;
            } else {
                println!("{json}");
            }
        }
    }

    Ok(())
}
