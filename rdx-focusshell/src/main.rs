use anyhow::Result;
use colored::Colorize;
use focusclock::prelude::*;
use focusclock::{ENGINE_NAME, VERSION as LIB_VERSION};
use rustyline::highlight::Highlighter;
use rustyline::Editor;
use rustyline_derive::{Completer, Helper, Hinter, Validator};
use std::borrow::Cow;
use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const SHELL_VERSION: &str = env!("CARGO_PKG_VERSION");

const LOGO_TEXT: &str = r"
   __                      _            _
  / _| ___   ___ _   _ ___| | ___   ___| | __
 | |_ / _ \ / __| | | / __| |/ _ \ / __| |/ /
 |  _| (_) | (__| |_| \__ \ | (_) | (__|   <
 |_|  \___/ \___|\__,_|___/_|\___/ \___|_|\_\
";

/// A custom helper struct for rustyline that enables syntax highlighting.
#[derive(Completer, Helper, Hinter, Validator)]
struct MyHighlighter;

impl Highlighter for MyHighlighter {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if let Some((command, rest)) = line.split_once(' ') {
            Cow::Owned(format!("{} {}", command.yellow().bold(), rest.yellow()))
        } else {
            Cow::Owned(line.yellow().bold().to_string())
        }
    }
    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

fn print_banner() {
    if env::var("QUIET_MODE").is_ok() {
        return;
    }
    println!("{}", LOGO_TEXT.cyan());
    let version_string = format!(
        "          Shell   v{:<8} Library   v{:<8}",
        SHELL_VERSION, LIB_VERSION
    );
    println!("{}", "-".repeat(64).dimmed());
    println!("{}", version_string);
    println!(
        "{}",
        "    Distributed under the MIT OR Apache-2.0 license.".dimmed()
    );
    println!("{}", "-".repeat(64).dimmed());
}

/// Spawns the listeners that print clock activity while the prompt is open.
async fn spawn_event_listeners(engine: &FocusclockEngine, is_watching_ticks: Arc<AtomicBool>) {
    let mut clock_rx = engine.subscribe_clock_events();
    tokio::spawn(async move {
        while let Ok(event) = clock_rx.recv().await {
            match event {
                ClockEvent::Tick(tick) => {
                    if is_watching_ticks.load(Ordering::Relaxed) {
                        println!(
                            "<-- [TICK] {} {} ({:.0}%)",
                            tick.mode.label(),
                            tick.formatted,
                            tick.progress_pct
                        );
                    }
                }
                other => println!("\n<-- [CLOCK EVENT] {:?}\n>> ", other),
            }
        }
    });
}

/// Spawns a task that prints everything one broadcast subscriber receives.
fn spawn_observer(mut stream: SubscriberStream) {
    tokio::spawn(async move {
        let id = stream.id().clone();
        while let Some(message) = stream.recv().await {
            let kind = match &message {
                BroadcastMessage::Snapshot(_) => "snapshot",
                BroadcastMessage::Update(_) => "update",
            };
            let session = message.session();
            println!(
                "<-- [{}] {} {:?} {} {}s remaining",
                id.to_string().magenta(),
                kind,
                session.state,
                session.mode,
                session.remaining_at(now_ms())
            );
        }
        println!("<-- [{}] stream closed", id.to_string().magenta());
    });
}

fn now_ms() -> i64 {
    SystemTimeSource.now_ms()
}

fn apply_setting(field: &str, value: &str) -> Result<ConfigPatch, String> {
    let number = || {
        value
            .parse::<i64>()
            .map_err(|_| format!("'{}' is not a number.", value))
    };
    let flag = || {
        value
            .parse::<bool>()
            .map_err(|_| format!("'{}' is not true/false.", value))
    };
    let patch = ConfigPatch::default();
    Ok(match field {
        "work" => patch.work_minutes(number()?),
        "short" => patch.short_rest_minutes(number()?),
        "long" => patch.long_rest_minutes(number()?),
        "cycles" => patch.cycles_before_long_rest(number()?),
        "auto" => patch.auto_advance(flag()?),
        "mode" => patch.start_mode(value.parse::<Mode>()?),
        other => return Err(format!("Unknown setting '{}'.", other)),
    })
}

async fn print_status(engine: &FocusclockEngine) {
    let snapshot = engine.snapshot().await;
    println!(
        "  {:?} | {} | {} of {} | cycle {} of {}",
        snapshot.state,
        snapshot.mode.label().cyan(),
        focusclock::time::format_mm_ss(snapshot.remaining_seconds).bold(),
        focusclock::time::format_mm_ss(snapshot.total_seconds),
        snapshot.cycle_count,
        snapshot.configuration.cycles_before_long_rest
    );
    println!("  subscribers: {}", engine.subscriber_count());
}

#[tokio::main]
async fn main() -> Result<()> {
    print_banner();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .init();

    let config_path = env::args().nth(1).map(PathBuf::from);
    let config = SessionConfig::load(config_path.as_deref())?;
    let engine = FocusclockEngine::new(config);

    let is_watching_ticks = Arc::new(AtomicBool::new(false));
    spawn_event_listeners(&engine, is_watching_ticks.clone()).await;

    info!("Booting {}...", ENGINE_NAME);
    engine.boot().await;

    let mut rl = Editor::new()?;
    rl.set_helper(Some(MyHighlighter {}));

    println!("{} is ready. Type 'help' for commands or 'exit' to quit.", ENGINE_NAME.cyan());

    loop {
        let prompt = format!("{}", ">> ".cyan().bold());
        match rl.readline(&prompt) {
            Ok(line) => {
                rl.add_history_entry(line.as_str())?;
                let args = line.split_whitespace().collect::<Vec<_>>();
                let Some(command) = args.first() else {
                    continue;
                };
                match *command {
                    "start" => match args.get(1).map(|m| m.parse::<Mode>()) {
                        Some(Ok(mode)) => engine.start(Some(mode), None).await,
                        Some(Err(e)) => println!("Error: {}", e),
                        None => engine.start(None, None).await,
                    },
                    "pause" => engine.pause().await,
                    "resume" => engine.resume().await,
                    "stop" => engine.stop().await,
                    "advance" => {
                        if !engine.advance().await {
                            println!("--> Nothing to advance to. Use 'start' instead.");
                        }
                    }
                    "status" => print_status(&engine).await,
                    "set" => match (args.get(1), args.get(2)) {
                        (Some(field), Some(value)) => match apply_setting(field, value) {
                            Ok(patch) => match engine.set_configuration(&patch).await {
                                Ok(()) => println!("--> Updated {}.", field),
                                Err(e) => println!("Error: {}", e),
                            },
                            Err(e) => println!("Error: {}", e),
                        },
                        _ => println!("Usage: set <work|short|long|cycles|auto|mode> <VALUE>"),
                    },
                    "watch" => match args.get(1) {
                        Some(&"on") => {
                            is_watching_ticks.store(true, Ordering::Relaxed);
                            println!("--> Printing ticks.");
                        }
                        Some(&"off") => {
                            is_watching_ticks.store(false, Ordering::Relaxed);
                            println!("--> Stopped printing ticks.");
                        }
                        _ => println!("Usage: watch <on|off>"),
                    },
                    "join" => match args.get(1) {
                        Some(id) => spawn_observer(engine.subscribe(*id).await),
                        None => println!("Usage: join <ID>"),
                    },
                    "leave" => match args.get(1) {
                        Some(id) => {
                            if engine.unsubscribe(&SubscriberId::from(*id)) {
                                println!("--> Subscriber removed.");
                            } else {
                                println!("--> No subscriber named '{}'.", id);
                            }
                        }
                        None => println!("Usage: leave <ID>"),
                    },
                    "snapshot" => match engine.snapshot().await.to_json() {
                        Ok(json) => println!("{}", json),
                        Err(e) => println!("Error: {}", e),
                    },
                    "help" => {
                        println!("Available commands:");
                        println!("  start [work|short|long] - Starts a phase (or resumes if paused).");
                        println!("  pause / resume          - Freezes or continues the countdown.");
                        println!("  stop                    - Resets the session to idle.");
                        println!("  advance                 - Starts the phase after a completed one.");
                        println!("  status                  - Shows the current phase and cycle.");
                        println!("  set <FIELD> <VALUE>     - Changes work/short/long/cycles/auto/mode.");
                        println!("  watch on|off            - Toggles printing every tick.");
                        println!("  join <ID> / leave <ID>  - Attaches or removes a broadcast observer.");
                        println!("  snapshot                - Prints the session snapshot as JSON.");
                        println!("  exit                    - Quits the shell.");
                    }
                    "exit" => break,
                    _ => println!("Unknown command: '{}'. Type 'help'.", line),
                }
            }
            Err(_) => {
                println!("Exiting focusshell...");
                break;
            }
        }
    }

    engine.shutdown().await?;
    Ok(())
}
