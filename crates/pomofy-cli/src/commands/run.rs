//! Interactive timer.
//!
//! Keys (followed by enter): empty line or `s` start/pause (a new cycle once
//! the current one is complete), `r` reset, `l` reload settings, `q` quit.
//!
//! Settings saved by other processes are picked up while the timer runs.

use std::io::{IsTerminal, Write};
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use pomofy_core::display::{self, DotState};
use pomofy_core::{Chime, Event, Snapshot, TerminalBell, TimerEngine, TimerService};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

use super::open_store_or_memory;

/// How often the settings record is re-read from disk.
const SETTINGS_REFRESH: Duration = Duration::from_secs(2);

#[derive(Args)]
pub struct RunArgs {
    /// Start the clock immediately
    #[arg(long)]
    start: bool,
    /// Print every event as a JSON line instead of the status line
    #[arg(long)]
    json: bool,
}

enum Key {
    Toggle,
    Reset,
    Reload,
    Quit,
    Unknown,
}

impl Key {
    fn parse(line: &str) -> Self {
        match line.trim() {
            "" | "s" => Key::Toggle,
            "r" => Key::Reset,
            "l" => Key::Reload,
            "q" => Key::Quit,
            _ => Key::Unknown,
        }
    }
}

pub fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run_timer(args))
}

async fn run_timer(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(open_store_or_memory());
    let engine = TimerEngine::unloaded().with_chime(Chime::new(Arc::new(TerminalBell)));
    let service = TimerService::new(engine);
    let mut events = service.subscribe();

    // Rejected settings are logged and replaced by defaults.
    let _ = service.load_from(store.clone()).await;
    let watcher = service.watch_settings(store.subscribe());
    let refresh = store.spawn_refresh(SETTINGS_REFRESH);
    let mut screen = Screen::new(args.json);
    screen.status(&service.snapshot(), service.show_in_title());

    if args.start {
        service.start()?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => screen.event(&event, service.show_in_title()),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "display fell behind timer events");
                }
                Err(RecvError::Closed) => break,
            },
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) => match Key::parse(&line) {
                    Key::Toggle => service.toggle()?,
                    Key::Reset => service.reset(),
                    Key::Reload => {
                        if let Err(e) = service.load_from(store.clone()).await {
                            screen.note(&format!("settings rejected: {e}"));
                        }
                    }
                    Key::Quit => break,
                    Key::Unknown => screen.note("keys: <enter>/s start-pause, r reset, l reload, q quit"),
                },
                None => stdin_open = false,
            },
            _ = &mut ctrl_c => break,
        }
    }

    refresh.abort();
    watcher.abort();
    service.pause();
    screen.finish();
    Ok(())
}

/// Terminal output. On a TTY the status line is redrawn in place and the
/// window title follows the clock.
struct Screen {
    json: bool,
    tty: bool,
}

impl Screen {
    fn new(json: bool) -> Self {
        Self {
            json,
            tty: std::io::stdout().is_terminal(),
        }
    }

    fn event(&mut self, event: &Event, show_in_title: bool) {
        if self.json {
            match serde_json::to_string(event) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!(error = %e, "could not encode event"),
            }
            return;
        }
        match event {
            Event::StateSnapshot(snapshot) => self.status(snapshot, show_in_title),
            Event::SessionCompleted { next_kind, .. } => {
                self.note(&format!("session complete, next: {}", next_kind.default_label()));
            }
            Event::CycleCompleted { slots, .. } => {
                self.note(&format!("cycle complete ({slots} sessions)"));
            }
            _ => {}
        }
    }

    fn status(&mut self, snapshot: &Snapshot, show_in_title: bool) {
        if self.json {
            return;
        }
        let dots: String = display::progress_dots(snapshot)
            .into_iter()
            .map(|dot| match dot {
                DotState::Completed => '●',
                DotState::Active => '◉',
                DotState::ActivePaused => '◎',
                DotState::Pending => '○',
            })
            .collect();
        let line = format!(
            "{:<10} {}  {}  [{}] [{}]",
            snapshot.label,
            display::format_clock(snapshot.remaining_secs),
            dots,
            display::control_label(snapshot),
            display::reset_label(snapshot),
        );

        let mut stdout = std::io::stdout().lock();
        let written = if self.tty {
            let title = display::page_title(snapshot, show_in_title)
                .unwrap_or_else(|| "pomofy".to_string());
            write!(stdout, "\x1b]0;{title}\x07\r\x1b[2K{line}").and_then(|_| stdout.flush())
        } else {
            writeln!(stdout, "{line}")
        };
        if let Err(e) = written {
            tracing::warn!(error = %e, "could not write status line");
        }
    }

    fn note(&mut self, message: &str) {
        if self.tty {
            println!();
        }
        println!("{message}");
    }

    fn finish(&mut self) {
        if self.tty && !self.json {
            println!();
        }
    }
}
