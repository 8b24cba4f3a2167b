//! Operator console: stdin commands in, tagged messages out.
//!
//! Each stdin line is one command (`synctime`, `syncweather`,
//! `syncstatus`, `stop`). Replies and broadcasts are written to stdout
//! with the chat color codes translated to ANSI escapes.

use std::sync::Arc;

use realtime_core::command::{OperatorCommand, execute_command};
use realtime_core::config::ConfigStore;
use realtime_core::environment::{MessageSink, tagged};
use realtime_core::settings::SyncFlags;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Chat color code marker.
const COLOR_MARKER: char = '\u{a7}';

/// ANSI reset sequence.
const ANSI_RESET: &str = "\x1b[0m";

/// Broadcasts to the operator console and the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl MessageSink for ConsoleSink {
    fn broadcast(&self, message: &str) {
        println!("{}", to_ansi(message));
        warn!(text = %strip_colors(message), "broadcast");
    }
}

/// Map one chat color code to an ANSI escape.
const fn ansi_for(code: char) -> Option<&'static str> {
    match code {
        '7' => Some("\x1b[37m"),
        '8' => Some("\x1b[90m"),
        'a' => Some("\x1b[92m"),
        'c' => Some("\x1b[91m"),
        'e' => Some("\x1b[93m"),
        'f' => Some("\x1b[97m"),
        'r' => Some(ANSI_RESET),
        _ => None,
    }
}

/// Replace chat color codes with ANSI escapes. Unknown codes are dropped.
pub fn to_ansi(message: &str) -> String {
    let mut out = String::with_capacity(message.len().saturating_add(ANSI_RESET.len()));
    let mut chars = message.chars();
    let mut colored = false;
    while let Some(c) = chars.next() {
        if c == COLOR_MARKER {
            if let Some(escape) = chars.next().and_then(ansi_for) {
                out.push_str(escape);
                colored = true;
            }
        } else {
            out.push(c);
        }
    }
    if colored {
        out.push_str(ANSI_RESET);
    }
    out
}

/// Remove chat color codes.
pub fn strip_colors(message: &str) -> String {
    let mut out = String::with_capacity(message.len());
    let mut chars = message.chars();
    while let Some(c) = chars.next() {
        if c == COLOR_MARKER {
            let _ = chars.next();
        } else {
            out.push(c);
        }
    }
    out
}

/// Capacity of the stdin line channel.
const LINE_BUFFER: usize = 16;

/// Read stdin lines on a dedicated thread.
///
/// Blocking stdin reads cannot be cancelled, so they stay off the runtime:
/// the thread is left behind at shutdown instead of holding the runtime
/// open. The channel closes when stdin reaches EOF or fails.
pub fn read_stdin_lines() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(LINE_BUFFER);
    let spawned = std::thread::Builder::new()
        .name("console-stdin".to_owned())
        .spawn(move || {
            for line in std::io::stdin().lines() {
                match line {
                    Ok(line) => {
                        if tx.blocking_send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to read console input");
                        break;
                    }
                }
            }
            debug!("stdin closed, console reader thread exiting");
        });
    if let Err(e) = spawned {
        warn!(error = %e, "failed to start console reader thread");
    }
    rx
}

/// Spawn the command loop over console `lines`.
///
/// The task ends when `lines` closes, a `stop` command arrives, or
/// `shutdown` turns `true`. `stop` also flips `shutdown`.
pub fn spawn_command_reader(
    mut lines: mpsc::Receiver<String>,
    flags: Arc<SyncFlags>,
    store: Arc<ConfigStore>,
    shutdown: watch::Sender<bool>,
) -> JoinHandle<()> {
    let mut stopping = shutdown.subscribe();
    tokio::spawn(async move {
        loop {
            if *stopping.borrow() {
                break;
            }
            // Any shutdown change ends the loop: only `true` is ever sent.
            let next = tokio::select! {
                biased;
                _ = stopping.changed() => None,
                line = lines.recv() => line,
            };
            let Some(line) = next else {
                debug!("console closed or shutting down, command reader exiting");
                break;
            };

            if line.trim().is_empty() {
                continue;
            }

            let Some(command) = OperatorCommand::parse(&line) else {
                println!(
                    "{}",
                    to_ansi(&tagged(
                        "Unknown command. Try synctime, syncweather, syncstatus or stop"
                    ))
                );
                continue;
            };

            let reply = execute_command(command, &flags, &store).await;
            println!("{}", to_ansi(&reply));

            if command == OperatorCommand::Stop {
                info!("stop requested from console");
                let _ = shutdown.send(true);
                break;
            }
        }
    })
}
