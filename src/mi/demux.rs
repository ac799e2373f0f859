//! Classifies parsed records, feeds the correlator, and synthesizes the
//! high-level events the domain facade exposes (§4.4).
//!
//! `Demux::dispatch` is called once per record by the single task that
//! reads the subprocess's stdout (`process.rs`). It never forks the
//! result-record path: result records go straight into the shared
//! `Correlator` by mutable reference through its mutex, and the console,
//! target and log streams are separate `broadcast` channels that any
//! number of observers may subscribe to without consuming each other's
//! copies (§4.4 "must be distinct observers that do not consume records
//! destructively").

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{Mutex, broadcast};

use super::correlator::Correlator;
use super::events::{extract_events, strip_frames};
use super::output::Record;
use crate::domain::{Frame, Thread, ThreadGroup, parse_thread_group_id};

/// A user-visible event surfaced from async/notify/status records or
/// synthesized from them.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The unsynthesized `exec`/`status`/`notify` record, passed through
    /// verbatim for callers that want the raw MI shape.
    Raw {
        kind: &'static str,
        state: String,
        data: Value,
    },
    Stopped {
        reason: Option<String>,
        thread: Option<Thread>,
        breakpoint: Option<BreakpointRef>,
    },
    Running {
        thread: Option<Thread>,
    },
    ThreadCreated(Thread),
    ThreadExited(Thread),
    ThreadGroupStarted(ThreadGroup),
    ThreadGroupExited(ThreadGroup),
    NewObjfile(String),
    /// An event emitted by a user Python script via an embedded frame.
    Custom { name: String, payload: Value },
}

/// The minimal breakpoint reference a `stopped` event can cheaply carry:
/// only the number is known at this point, not the full breakpoint row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakpointRef {
    pub id: u64,
}

pub struct Demux {
    pub console: broadcast::Sender<String>,
    pub target: broadcast::Sender<String>,
    pub log: broadcast::Sender<String>,
    pub events: broadcast::Sender<Event>,
}

impl Default for Demux {
    fn default() -> Self {
        Self::new()
    }
}

impl Demux {
    pub fn new() -> Self {
        let (console, _) = broadcast::channel(256);
        let (target, _) = broadcast::channel(256);
        let (log, _) = broadcast::channel(256);
        let (events, _) = broadcast::channel(256);
        Self { console, target, log, events }
    }

    pub async fn dispatch(&self, correlator: &Arc<Mutex<Correlator>>, cli_echo_token: &str, record: Record) {
        match record {
            Record::Result { class, data, .. } => {
                correlator.lock().await.on_result(class, data);
            }
            Record::Exec { class, data, .. } => {
                self.emit_raw("exec", &class, &data);
                self.synthesize_exec(&class, &data);
            }
            Record::Status { class, data, .. } => {
                self.emit_raw("status", &class, &data);
            }
            Record::Notify { class, data, .. } => {
                self.emit_raw("notify", &class, &data);
                self.synthesize_notify(&class, &data);
            }
            Record::Console(text) => {
                self.handle_console(correlator, cli_echo_token, &text).await;
            }
            Record::Target(text) => {
                let _ = self.target.send(text);
            }
            Record::Log(text) => {
                let _ = self.log.send(text);
            }
            Record::Prompt | Record::Raw(_) => {}
        }
    }

    fn emit_raw(&self, kind: &'static str, class: &str, data: &Value) {
        let _ = self.events.send(Event::Raw {
            kind,
            state: class.to_string(),
            data: data.clone(),
        });
    }

    fn synthesize_exec(&self, class: &str, data: &Value) {
        match class {
            "stopped" => {
                let reason = data.get("reason").and_then(Value::as_str).map(str::to_owned);
                let thread = data
                    .get("thread-id")
                    .and_then(Value::as_str)
                    .filter(|id| *id != "all")
                    .and_then(|id| id.parse::<u64>().ok())
                    .map(|id| Thread {
                        id,
                        status: Some("stopped".to_string()),
                        group: None,
                        frame: data.get("frame").map(Frame::from_value),
                    });
                let breakpoint = if reason.as_deref() == Some("breakpoint-hit") {
                    data.get("bkptno")
                        .and_then(Value::as_str)
                        .and_then(|s| s.parse::<u64>().ok())
                        .map(|id| BreakpointRef { id })
                } else {
                    None
                };
                let _ = self.events.send(Event::Stopped { reason, thread, breakpoint });
            }
            "running" => {
                let thread = data
                    .get("thread-id")
                    .and_then(Value::as_str)
                    .filter(|id| *id != "all")
                    .and_then(|id| id.parse::<u64>().ok())
                    .map(|id| Thread {
                        id,
                        status: Some("running".to_string()),
                        group: None,
                        frame: None,
                    });
                let _ = self.events.send(Event::Running { thread });
            }
            _ => {}
        }
    }

    fn synthesize_notify(&self, class: &str, data: &Value) {
        match class {
            "thread-created" | "thread-exited" => {
                let id = data
                    .get("id")
                    .and_then(Value::as_str)
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or_default();
                let group = data
                    .get("group-id")
                    .and_then(Value::as_str)
                    .and_then(|s| parse_thread_group_id(s).ok())
                    .map(|id| ThreadGroup { id, pid: None });
                let thread = Thread { id, status: None, group, frame: None };
                let event = if class == "thread-created" {
                    Event::ThreadCreated(thread)
                } else {
                    Event::ThreadExited(thread)
                };
                let _ = self.events.send(event);
            }
            "thread-group-started" | "thread-group-exited" => {
                let id = data
                    .get("id")
                    .and_then(Value::as_str)
                    .and_then(|s| parse_thread_group_id(s).ok())
                    .unwrap_or_default();
                let pid = data.get("pid").and_then(Value::as_str).and_then(|s| s.parse().ok());
                let group = ThreadGroup { id, pid };
                let event = if class == "thread-group-started" {
                    Event::ThreadGroupStarted(group)
                } else {
                    Event::ThreadGroupExited(group)
                };
                let _ = self.events.send(event);
            }
            _ => {}
        }
    }

    async fn handle_console(&self, correlator: &Arc<Mutex<Correlator>>, cli_echo_token: &str, text: &str) {
        if let Some(body) = text.strip_prefix(cli_echo_token) {
            correlator.lock().await.on_cli_echo(body.to_string());
        }
        for event in extract_events(text) {
            if event.name == "objfile" {
                let file = event
                    .payload
                    .as_str()
                    .map(str::to_owned)
                    .or_else(|| event.payload.get("file").and_then(Value::as_str).map(str::to_owned))
                    .unwrap_or_default();
                let _ = self.events.send(Event::NewObjfile(file));
            } else {
                let _ = self.events.send(Event::Custom { name: event.name, payload: event.payload });
            }
        }
        let _ = self.console.send(strip_frames(text));
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mi::output::ResultClass;

    #[tokio::test]
    async fn stopped_at_breakpoint_synthesizes_event() {
        let demux = Demux::new();
        let correlator = Arc::new(Mutex::new(Correlator::new()));
        let mut events = demux.events.subscribe();
        let record = Record::parse(
            r#"*stopped,reason="breakpoint-hit",bkptno="1",thread-id="1",frame={fullname="/p/hello.c",line="9"}"#,
        );
        demux.dispatch(&correlator, "GDBJS^", record).await;
        match events.try_recv().unwrap() {
            Event::Raw { kind, .. } => assert_eq!(kind, "exec"),
            other => panic!("expected Raw first, got {other:?}"),
        }
        match events.try_recv().unwrap() {
            Event::Stopped { thread, breakpoint, .. } => {
                assert_eq!(thread.unwrap().id, 1);
                assert_eq!(breakpoint.unwrap().id, 1);
            }
            other => panic!("expected Stopped, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn result_record_feeds_correlator_not_events() {
        let demux = Demux::new();
        let correlator = Arc::new(Mutex::new(Correlator::new()));
        let mut events = demux.events.subscribe();
        let record = Record::parse(r#"^done"#);
        demux.dispatch(&correlator, "GDBJS^", record).await;
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn console_strips_markers_before_exposing() {
        let demux = Demux::new();
        let correlator = Arc::new(Mutex::new(Correlator::new()));
        let mut console = demux.console.subscribe();
        let record = Record::Console("<gdbjs:event:a 1 a:event:gdbjs>visible text".to_string());
        demux.dispatch(&correlator, "GDBJS^", record).await;
        let seen = console.try_recv().unwrap();
        assert!(!seen.contains("gdbjs"));
        assert_eq!(seen, "visible text");
    }

    #[test]
    fn result_class_is_comparable() {
        assert_eq!(ResultClass::Done, ResultClass::Done);
    }
}
