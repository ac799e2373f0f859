//! Pairs `^`-prefixed result records with the queue of pending requests,
//! and for CLI requests additionally pairs them with their framed console
//! echo (§4.5, variant A: "magic prefix").
//!
//! The correlator is driven synchronously, in-line, by the single demux
//! task (`demux.rs`) that also owns the subprocess's stdout. There is no
//! literal fan-out of the result-record stream into a second consumer:
//! §9's "stream fan-out hazard" is sidestepped entirely by never forking
//! in the first place — both the result path and the console-echo path
//! mutate the same `Correlator` value from the one place records are read.

use std::collections::VecDeque;

use tokio::sync::oneshot;

use super::output::ResultClass;
use crate::error::Error;

/// Which wire convention a pending request expects its answer through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpreter {
    Mi,
    Cli,
}

/// The resolved payload of a pending request.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Mi(serde_json::Value),
    /// The console body GDB echoed back for a CLI command (prefix already
    /// stripped).
    Cli(String),
}

pub type ReplySender = oneshot::Sender<Result<Reply, Error>>;

struct PendingRequest {
    command_text: String,
    interpreter: Interpreter,
    resolve: ReplySender,
}

/// FIFO request/response pairing plus CLI echo correlation.
#[derive(Default)]
pub struct Correlator {
    pending: VecDeque<PendingRequest>,
    /// CLI requests whose result record has already arrived, waiting on
    /// their console echo.
    cli_awaiting_echo: VecDeque<PendingRequest>,
    /// Console echoes that arrived before the result record that would
    /// have paired with them.
    buffered_echoes: VecDeque<String>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues a request immediately after its command bytes are written
    /// (§4.5: "the dispatcher only enqueues a request after having written
    /// the command, preserving ordering").
    pub fn enqueue(&mut self, command_text: String, interpreter: Interpreter, resolve: ReplySender) {
        self.pending.push_back(PendingRequest {
            command_text,
            interpreter,
            resolve,
        });
    }

    /// Feeds one `Result` record. `code` is the `^error` numeric code, if
    /// any; `msg` is its message. `data` is the record's flattened payload.
    pub fn on_result(&mut self, class: ResultClass, data: serde_json::Value) {
        let Some(req) = self.pending.pop_front() else {
            tracing::warn!("result record with no pending request");
            return;
        };
        if class == ResultClass::Error {
            let msg = data
                .get("msg")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("")
                .to_string();
            let code = data.get("code").and_then(serde_json::Value::as_str).and_then(|s| s.parse().ok());
            let _ = req.resolve.send(Err(Error::Gdb {
                msg,
                code,
                command: req.command_text,
            }));
            return;
        }
        match req.interpreter {
            Interpreter::Mi => {
                let _ = req.resolve.send(Ok(Reply::Mi(data)));
            }
            Interpreter::Cli => {
                if let Some(echo) = self.buffered_echoes.pop_front() {
                    let _ = req.resolve.send(Ok(Reply::Cli(echo)));
                } else {
                    self.cli_awaiting_echo.push_back(req);
                }
            }
        }
    }

    /// Feeds one console body already confirmed to carry the magic prefix
    /// (prefix stripped by the caller).
    pub fn on_cli_echo(&mut self, body: String) {
        if let Some(req) = self.cli_awaiting_echo.pop_front() {
            let _ = req.resolve.send(Ok(Reply::Cli(body)));
        } else {
            self.buffered_echoes.push_back(body);
        }
    }

    /// Rejects every outstanding request with [`Error::ProcessTerminated`]
    /// (§5 "failure of the subprocess").
    pub fn fail_all(&mut self) {
        for req in self.pending.drain(..) {
            let _ = req.resolve.send(Err(Error::ProcessTerminated));
        }
        for req in self.cli_awaiting_echo.drain(..) {
            let _ = req.resolve.send(Err(Error::ProcessTerminated));
        }
        self.buffered_echoes.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.cli_awaiting_echo.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn mi_request_resolves_on_matching_result() {
        let mut c = Correlator::new();
        let (tx, rx) = oneshot::channel();
        c.enqueue("-break-insert main".to_string(), Interpreter::Mi, tx);
        c.on_result(ResultClass::Done, json!({"bkpt": {"number": "1"}}));
        let reply = rx.try_recv().unwrap().unwrap();
        assert_eq!(reply, Reply::Mi(json!({"bkpt": {"number": "1"}})));
    }

    #[test]
    fn error_result_rejects_with_command_text() {
        let mut c = Correlator::new();
        let (tx, rx) = oneshot::channel();
        c.enqueue("-break-insert bogus".to_string(), Interpreter::Mi, tx);
        c.on_result(ResultClass::Error, json!({"msg": "No such file", "code": "1"}));
        match rx.try_recv().unwrap() {
            Err(Error::Gdb { msg, command, .. }) => {
                assert_eq!(msg, "No such file");
                assert_eq!(command, "-break-insert bogus");
            }
            other => panic!("expected Gdb error, got {other:?}"),
        }
    }

    #[test]
    fn cli_request_resolves_result_then_echo() {
        let mut c = Correlator::new();
        let (tx, rx) = oneshot::channel();
        c.enqueue("echo hi".to_string(), Interpreter::Cli, tx);
        c.on_result(ResultClass::Done, json!({}));
        assert!(rx.try_recv().is_err());
        c.on_cli_echo("hi".to_string());
        assert_eq!(rx.try_recv().unwrap().unwrap(), Reply::Cli("hi".to_string()));
    }

    #[test]
    fn cli_request_resolves_echo_then_result() {
        let mut c = Correlator::new();
        let (tx, rx) = oneshot::channel();
        c.enqueue("echo hi".to_string(), Interpreter::Cli, tx);
        c.on_cli_echo("hi".to_string());
        assert!(rx.try_recv().is_err());
        c.on_result(ResultClass::Done, json!({}));
        assert_eq!(rx.try_recv().unwrap().unwrap(), Reply::Cli("hi".to_string()));
    }

    #[test]
    fn fifo_pairing_across_multiple_requests() {
        let mut c = Correlator::new();
        let (tx1, rx1) = oneshot::channel();
        let (tx2, rx2) = oneshot::channel();
        c.enqueue("a".to_string(), Interpreter::Mi, tx1);
        c.enqueue("b".to_string(), Interpreter::Mi, tx2);
        c.on_result(ResultClass::Done, json!({"n": "1"}));
        c.on_result(ResultClass::Done, json!({"n": "2"}));
        assert_eq!(rx1.try_recv().unwrap().unwrap(), Reply::Mi(json!({"n": "1"})));
        assert_eq!(rx2.try_recv().unwrap().unwrap(), Reply::Mi(json!({"n": "2"})));
    }

    #[test]
    fn fail_all_rejects_pending_and_awaiting() {
        let mut c = Correlator::new();
        let (tx1, rx1) = oneshot::channel();
        let (tx2, rx2) = oneshot::channel();
        c.enqueue("a".to_string(), Interpreter::Mi, tx1);
        c.enqueue("echo hi".to_string(), Interpreter::Cli, tx2);
        c.on_result(ResultClass::Done, json!({})); // resolves tx1 is not cli, matches first enqueued
        c.fail_all();
        assert!(matches!(rx1.try_recv().unwrap(), Ok(Reply::Mi(_))));
        assert!(matches!(rx2.try_recv().unwrap(), Err(Error::ProcessTerminated)));
    }
}
