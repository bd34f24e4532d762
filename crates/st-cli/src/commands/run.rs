//! Run command: the long-running timer service.
//!
//! A spawned ticker drives the engine at a fixed period on a blocking worker.
//! The main task multiplexes the engine's event channel (printed to stdout as
//! JSON lines) and operator commands read line by line from stdin.
//!
//! Missed ticks are skipped rather than bursted, since every tick recomputes
//! state from the wall clock anyway.

use std::str::FromStr;
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use serde_json::json;
use st_core::{Engine, EngineError, EngineEvent, EntryDraft, Notifier, ScheduleStore, SharedEngine};
use st_db::Database;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::open_engine;
use super::util::format_countdown;
use crate::Config;

/// Fans engine events out to every subscriber.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    tx: broadcast::Sender<EngineEvent>,
}

impl Broadcaster {
    /// Create a new broadcaster holding up to `capacity` unread events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Broadcast an event, ignoring if nobody is subscribed.
    pub fn broadcast_lossy(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Notifier for Broadcaster {
    fn publish(&self, event: EngineEvent) {
        self.broadcast_lossy(event);
    }
}

/// An operator command read from the console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Start,
    Pause,
    Adjust(i64),
    Add(EntryDraft),
    Remove(Vec<usize>),
    Reload,
    Status,
    Message { seconds: u32, text: String },
    Quit,
}

impl FromStr for ConsoleCommand {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            bail!("empty command");
        };
        let command = match verb.to_ascii_lowercase().as_str() {
            "start" => Self::Start,
            "pause" => Self::Pause,
            "adjust" => {
                let delta = words
                    .next()
                    .ok_or_else(|| anyhow!("usage: adjust MINUTES"))?
                    .parse()
                    .context("adjustment must be a whole number of minutes")?;
                Self::Adjust(delta)
            }
            "add" => {
                let (Some(date), Some(start), Some(end)) = (words.next(), words.next(), words.next())
                else {
                    bail!("usage: add DATE START END LABEL");
                };
                let label = words.collect::<Vec<_>>().join(" ");
                Self::Add(EntryDraft::new(date, start, end, label))
            }
            "remove" => {
                let positions = words
                    .map(str::parse)
                    .collect::<Result<Vec<usize>, _>>()
                    .context("positions must be non-negative numbers")?;
                if positions.is_empty() {
                    bail!("usage: remove POSITION...");
                }
                Self::Remove(positions)
            }
            "reload" => Self::Reload,
            "status" => Self::Status,
            "message" => {
                let seconds = words
                    .next()
                    .ok_or_else(|| anyhow!("usage: message SECONDS TEXT"))?
                    .parse()
                    .context("message duration must be a number of seconds")?;
                let text = words.collect::<Vec<_>>().join(" ");
                if text.is_empty() {
                    bail!("usage: message SECONDS TEXT");
                }
                Self::Message { seconds, text }
            }
            "quit" | "exit" => Self::Quit,
            other => bail!("unknown command '{other}'"),
        };
        Ok(command)
    }
}

/// Applies an operator command and describes the outcome.
pub fn execute<S: ScheduleStore>(engine: &mut Engine<S>, command: ConsoleCommand) -> Result<String, EngineError> {
    let reply = match command {
        ConsoleCommand::Start => format!("started, {}", engine.start()?.status),
        ConsoleCommand::Pause => {
            engine.pause();
            "paused".to_string()
        }
        ConsoleCommand::Adjust(delta) => {
            let snapshot = engine.adjust(delta)?;
            format!(
                "adjusted by {delta:+} min, {} left",
                format_countdown(snapshot.remaining_seconds.unwrap_or_default())
            )
        }
        ConsoleCommand::Add(draft) => {
            let id = engine.add_draft(draft)?;
            let position = engine.schedule().position(id).unwrap_or_default();
            format!("added at position {position}")
        }
        ConsoleCommand::Remove(positions) => {
            let removed = engine.remove_entries(&positions)?;
            format!("removed {} entries", removed.len())
        }
        ConsoleCommand::Reload => format!("reloaded {} entries", engine.reload()?),
        ConsoleCommand::Status => {
            let snapshot = engine.snapshot();
            match (&snapshot.active_label, &snapshot.next) {
                (Some(label), _) => format!(
                    "{}: {label}, {} left",
                    snapshot.status,
                    format_countdown(snapshot.remaining_seconds.unwrap_or_default())
                ),
                (None, Some(next)) => format!(
                    "{}: {} in {}",
                    snapshot.status,
                    next.label,
                    format_countdown(next.countdown_seconds)
                ),
                (None, None) => snapshot.status.to_string(),
            }
        }
        ConsoleCommand::Message { seconds, text } => {
            engine.broadcast_message(text, seconds);
            "message sent".to_string()
        }
        ConsoleCommand::Quit => "bye".to_string(),
    };
    Ok(reply)
}

/// Starts the timer service and blocks until `quit`.
pub fn run(config: &Config) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("failed to initialize tokio runtime")?;
    let result = runtime.block_on(serve(config));
    // A blocking stdin read may still be parked on a worker thread
    runtime.shutdown_background();
    result
}

async fn serve(config: &Config) -> Result<()> {
    let broadcaster = Arc::new(Broadcaster::new(config.event_buffer));
    let mut events = broadcaster.subscribe();
    let engine = open_engine(config, broadcaster.clone())?.shared();
    info!(
        database = %config.database_path.display(),
        tick_ms = config.tick_interval_ms,
        "timer running"
    );

    let ticker = spawn_ticker(Arc::clone(&engine), config.tick_interval());
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut console_open = true;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => print_line(&mut stdout, &serde_json::to_value(&event)?).await?,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event output fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            line = lines.next_line(), if console_open => match line.context("failed to read stdin")? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => {
                    let quit = handle_line(&engine, &line, &mut stdout).await?;
                    if quit {
                        break;
                    }
                }
                None => {
                    debug!("stdin closed, console disabled");
                    console_open = false;
                }
            },
        }
    }

    ticker.abort();
    while let Ok(event) = events.try_recv() {
        print_line(&mut stdout, &serde_json::to_value(&event)?).await?;
    }
    info!("timer stopped");
    Ok(())
}

/// Ticks the engine on a blocking worker. Failures are logged and retried
/// on the next tick.
async fn tick_once(engine: &SharedEngine<Database>) {
    let engine = Arc::clone(engine);
    let result = tokio::task::spawn_blocking(move || {
        engine
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .tick()
    })
    .await;
    match result {
        Ok(Ok(_)) => {}
        Ok(Err(err)) => error!(%err, "tick failed"),
        Err(err) => error!(%err, "tick worker failed"),
    }
}

/// Parses and applies one console line. Returns whether to quit.
async fn handle_line<W: AsyncWrite + Unpin>(
    engine: &SharedEngine<Database>,
    line: &str,
    writer: &mut W,
) -> Result<bool> {
    let command = match line.parse::<ConsoleCommand>() {
        Ok(command) => command,
        Err(err) => {
            print_line(writer, &json!({ "error": err.to_string() })).await?;
            return Ok(false);
        }
    };
    let quit = command == ConsoleCommand::Quit;
    let engine = Arc::clone(engine);
    let outcome = tokio::task::spawn_blocking(move || {
        let mut engine = engine.lock().unwrap_or_else(PoisonError::into_inner);
        execute(&mut engine, command)
    })
    .await;

    let reply = match outcome {
        Ok(Ok(reply)) => json!({ "reply": reply }),
        Ok(Err(err)) => {
            warn!(%err, "operator command failed");
            json!({ "error": err.to_string() })
        }
        Err(err) => {
            error!(%err, "console worker failed");
            json!({ "error": "command failed unexpectedly" })
        }
    };
    print_line(writer, &reply).await?;
    Ok(quit)
}

async fn print_line<W: AsyncWrite + Unpin>(writer: &mut W, value: &serde_json::Value) -> Result<()> {
    let mut line = serde_json::to_vec(value)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}

/// Ticks the engine every `period` until the returned handle is aborted.
pub fn spawn_ticker(engine: SharedEngine<Database>, period: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            tick_once(&engine).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use st_core::{ManualClock, PlaybackStatus};

    use crate::commands::testing::{at, engine_with_clock, evening};

    #[test]
    fn parses_console_commands() {
        assert_eq!("start".parse::<ConsoleCommand>().unwrap(), ConsoleCommand::Start);
        assert_eq!("  PAUSE ".parse::<ConsoleCommand>().unwrap(), ConsoleCommand::Pause);
        assert_eq!("adjust +5".parse::<ConsoleCommand>().unwrap(), ConsoleCommand::Adjust(5));
        assert_eq!("adjust -10".parse::<ConsoleCommand>().unwrap(), ConsoleCommand::Adjust(-10));
        assert_eq!(
            "add 2026-07-10 22:00 23:30 The Late Show".parse::<ConsoleCommand>().unwrap(),
            ConsoleCommand::Add(EntryDraft::new("2026-07-10", "22:00", "23:30", "The Late Show"))
        );
        assert_eq!(
            "remove 2 0".parse::<ConsoleCommand>().unwrap(),
            ConsoleCommand::Remove(vec![2, 0])
        );
        assert_eq!(
            "message 30 Doors open".parse::<ConsoleCommand>().unwrap(),
            ConsoleCommand::Message {
                seconds: 30,
                text: "Doors open".to_string()
            }
        );
        assert_eq!("exit".parse::<ConsoleCommand>().unwrap(), ConsoleCommand::Quit);
    }

    #[test]
    fn rejects_malformed_console_commands() {
        for line in ["", "adjust", "adjust soon", "add 2026-07-10 22:00", "remove", "remove x", "message 10", "dance"] {
            assert!(line.parse::<ConsoleCommand>().is_err(), "accepted {line:?}");
        }
        assert_eq!(
            "dance".parse::<ConsoleCommand>().unwrap_err().to_string(),
            "unknown command 'dance'"
        );
    }

    #[test]
    fn execute_drives_the_engine() {
        let (mut engine, clock) = engine_with_clock(&evening(), at("2026-07-10", 18, 0, 0));

        assert_eq!(execute(&mut engine, ConsoleCommand::Start).unwrap(), "started, playing");
        assert_eq!(
            execute(&mut engine, ConsoleCommand::Adjust(10)).unwrap(),
            "adjusted by +10 min, 1:10:00 left"
        );
        clock.set(at("2026-07-10", 18, 30, 0));
        assert_eq!(
            execute(&mut engine, ConsoleCommand::Status).unwrap(),
            "playing: A, 40:00 left"
        );
        assert_eq!(execute(&mut engine, ConsoleCommand::Pause).unwrap(), "paused");
        assert_eq!(
            execute(
                &mut engine,
                ConsoleCommand::Add(EntryDraft::new("2026-07-10", "22:00", "23:00", "C"))
            )
            .unwrap(),
            "added at position 2"
        );
        assert_eq!(
            execute(&mut engine, ConsoleCommand::Remove(vec![2])).unwrap(),
            "removed 1 entries"
        );
        assert_eq!(execute(&mut engine, ConsoleCommand::Reload).unwrap(), "reloaded 2 entries");
    }

    #[test]
    fn execute_reports_rejected_adjustment() {
        let (mut engine, _clock) = engine_with_clock(&evening(), at("2026-07-10", 18, 0, 0));
        execute(&mut engine, ConsoleCommand::Start).unwrap();

        let err = execute(&mut engine, ConsoleCommand::Adjust(45)).unwrap_err();

        assert_eq!(
            err.to_string(),
            "only +30 min possible ('B' starts at 19:30 on 2026-07-10)"
        );
    }

    #[tokio::test]
    async fn console_survives_out_of_range_adjustment() {
        let (engine, _clock) = engine_with_clock(&evening(), at("2026-07-10", 18, 0, 0));
        let engine = engine.shared();
        let mut output = Vec::new();

        for line in ["start", "adjust 200000000000000", "adjust 9223372036854775807", "status"] {
            assert!(!handle_line(&engine, line, &mut output).await.unwrap());
        }

        let replies: Vec<serde_json::Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(replies[0]["reply"], "started, playing");
        assert_eq!(replies[1]["error"], "entry end is out of range");
        assert_eq!(replies[2]["error"], "entry end is out of range");
        assert_eq!(replies[3]["reply"], "playing: A, 1:00:00 left");
    }

    #[test]
    fn broadcaster_fans_out_to_subscribers() {
        let broadcaster = Broadcaster::new(4);
        broadcaster.broadcast_lossy(EngineEvent::Message {
            text: "nobody listening".to_string(),
            seconds: 1,
        });
        let mut first = broadcaster.subscribe();
        let mut second = broadcaster.subscribe();

        broadcaster.publish(EngineEvent::EntryStarted {
            label: "A".to_string(),
        });

        assert_eq!(broadcaster.subscriber_count(), 2);
        assert!(matches!(first.try_recv(), Ok(EngineEvent::EntryStarted { .. })));
        assert!(matches!(second.try_recv(), Ok(EngineEvent::EntryStarted { .. })));
        assert!(first.try_recv().is_err());
    }

    #[tokio::test]
    async fn ticker_publishes_status_events() {
        let broadcaster = Arc::new(Broadcaster::new(16));
        let mut events = broadcaster.subscribe();
        let mut db = Database::open_in_memory().unwrap();
        db.write_entries(&evening()).unwrap();
        let clock = Arc::new(ManualClock::new(at("2026-07-10", 18, 0, 0)));
        let engine = Engine::new(db, clock, broadcaster.clone()).unwrap().shared();

        let ticker = spawn_ticker(engine.clone(), Duration::from_millis(10));
        let started = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Ok(EngineEvent::EntryStarted { label }) = events.recv().await {
                    return label;
                }
            }
        })
        .await
        .unwrap();
        ticker.abort();

        assert_eq!(started, "A");
        let engine = engine.lock().unwrap();
        assert_eq!(engine.snapshot().status, PlaybackStatus::Playing);
    }
}
