//! A programmatic wrapper around GDB's Machine Interface (MI).
//!
//! Spawn (or adopt) a GDB subprocess running `--interpreter=mi`, and this
//! crate multiplexes its single bidirectional byte stream into a structured
//! request/response channel plus several asynchronous event channels, atop
//! which [`Debugger`] presents a typed API for breakpoint management,
//! execution control, thread/thread-group navigation, evaluation, and
//! user-defined command/event extensions.
//!
//! # Scope
//!
//! This crate is the core: the [`mi::output`] record parser, the
//! [`mi::demux`]/[`mi::correlator`] stream multiplexer, and the
//! [`mi::dispatcher`] command/serialization layer. It does not manage the
//! child process's lifecycle beyond spawning it ([`mi::GdbBuilder`]), does
//! not interpret or enrich MI payload semantics beyond field-name coercion,
//! and does not implement any debugger logic of its own.
//!
//! # Limitation: shared target/MI output
//!
//! GDB writes the inferior's own stdout/stderr and its MI protocol stream to
//! the same file descriptor unless told otherwise. This crate cannot
//! reliably tell them apart when that happens; pass `--tty=<path>` (see
//! [`mi::GdbBuilder::opt_tty`]) to give the inferior a separate terminal.
pub mod config;
pub mod domain;
pub mod error;
pub mod info_variables;
pub mod mi;

pub use config::Config;
pub use domain::{
    Breakpoint, BreakpointFunc, Frame, GlobalVariable, Scope, Thread, ThreadGroup, Variable,
    parse_thread_group_id, thread_group_mi_id,
};
pub use error::{Error, Result};
pub use info_variables::parse_info_variables;
pub use mi::commands::{BreakPointLocation, BreakPointNumber, MiCommand, WatchMode};
pub use mi::correlator::{Interpreter, Reply};
pub use mi::demux::{BreakpointRef, Event};
pub use mi::output::{Record, ResultClass};
pub use mi::{CONCAT_HELPER_SCRIPT, Debugger, GdbBuilder, GdbProcess};
