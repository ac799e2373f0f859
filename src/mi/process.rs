//! Spawns the GDB subprocess and drives the read side of the pipeline
//! (§4.3 line splitting, wired into §4.4 demultiplexing).
//!
//! Adapted from the teacher's `GDBBuilder`/`GDB::try_spawn`: the
//! builder's flag surface is unchanged, but the reader task now feeds
//! [`LineSplitter`] and [`Record::parse`] into a [`Demux`] instead of a
//! single `mpsc` channel of `ResultRecord`s.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

use super::correlator::Correlator;
use super::demux::Demux;
use super::output::Record;
use super::stream::LineSplitter;
use crate::error::{Error, Result};

pub struct GdbProcess {
    pub child: Arc<Mutex<Child>>,
    pub stdin: Arc<Mutex<ChildStdin>>,
    pub demux: Arc<Demux>,
    pub correlator: Arc<Mutex<Correlator>>,
    pub reader_task: JoinHandle<()>,
    /// Flipped by `read_loop` once the subprocess's stdout closes (or a read
    /// errors), right after it rejects every outstanding request (§5
    /// "failure of the subprocess"). The dispatcher checks this before
    /// sending a new command so a call issued after the reader has exited
    /// fails fast with `Error::ProcessTerminated` instead of enqueueing a
    /// request nothing will ever drain.
    pub terminated: Arc<AtomicBool>,
}

/// A fluent builder for GDB's command line, mirroring the flags
/// `--interpreter=mi` debugging actually uses.
pub struct GdbBuilder {
    pub gdb_path: PathBuf,
    pub opt_nh: bool,
    pub opt_nx: bool,
    pub opt_quiet: bool,
    pub opt_cd: Option<PathBuf>,
    pub opt_symbol_file: Option<PathBuf>,
    pub opt_core_file: Option<PathBuf>,
    pub opt_proc_id: Option<u32>,
    pub opt_command: Option<PathBuf>,
    pub opt_source_dir: Option<PathBuf>,
    pub opt_args: Vec<OsString>,
    pub opt_program: Option<PathBuf>,
    pub opt_tty: Option<PathBuf>,
}

impl GdbBuilder {
    pub fn new(gdb_path: PathBuf) -> Self {
        GdbBuilder {
            gdb_path,
            opt_nh: false,
            opt_nx: false,
            opt_quiet: false,
            opt_cd: None,
            opt_symbol_file: None,
            opt_core_file: None,
            opt_proc_id: None,
            opt_command: None,
            opt_source_dir: None,
            opt_args: Vec::new(),
            opt_program: None,
            opt_tty: None,
        }
    }

    /// Spawns GDB in MI mode and starts the single reader task that owns
    /// its stdout. `cli_echo_token` is the magic prefix the correlator
    /// watches for (§4.5 variant A).
    pub fn try_spawn(self, cli_echo_token: String) -> Result<GdbProcess> {
        let mut gdb_args = Vec::<OsString>::new();
        if self.opt_nh {
            gdb_args.push("--nh".into());
        }
        if self.opt_nx {
            gdb_args.push("--nx".into());
        }
        if self.opt_quiet {
            gdb_args.push("--quiet".into());
        }
        if let Some(cd) = &self.opt_cd {
            let mut opt = OsString::from("--cd=");
            opt.push(cd);
            gdb_args.push(opt);
        }
        if let Some(symbol_file) = &self.opt_symbol_file {
            let mut opt = OsString::from("--symbols=");
            opt.push(symbol_file);
            gdb_args.push(opt);
        }
        if let Some(core_file) = &self.opt_core_file {
            let mut opt = OsString::from("--core=");
            opt.push(core_file);
            gdb_args.push(opt);
        }
        if let Some(proc_id) = self.opt_proc_id {
            gdb_args.push(format!("--pid={proc_id}").into());
        }
        if let Some(command) = &self.opt_command {
            let mut opt = OsString::from("--command=");
            opt.push(command);
            gdb_args.push(opt);
        }
        if let Some(source_dir) = &self.opt_source_dir {
            let mut opt = OsString::from("--directory=");
            opt.push(source_dir);
            gdb_args.push(opt);
        }
        if let Some(tty) = &self.opt_tty {
            let mut opt = OsString::from("--tty=");
            opt.push(tty);
            gdb_args.push(opt);
        }
        if !self.opt_args.is_empty() {
            gdb_args.push("--args".into());
            gdb_args.push(
                self.opt_program
                    .clone()
                    .ok_or_else(|| Error::Usage("--args given without a program to run".to_string()))?
                    .into_os_string(),
            );
            gdb_args.extend(self.opt_args.clone());
        } else if let Some(program) = &self.opt_program {
            gdb_args.push(program.into());
        }

        let mut command = Command::new(&self.gdb_path);
        command.arg("--interpreter=mi").args(&gdb_args);
        debug!("starting GDB process: {:?}", command);

        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Io(format!("failed to start GDB process: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Io("GDB child has no stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Io("GDB child has no stdout".to_string()))?;

        let demux = Arc::new(Demux::new());
        let correlator = Arc::new(Mutex::new(Correlator::new()));
        let terminated = Arc::new(AtomicBool::new(false));

        let reader_task = tokio::spawn(read_loop(
            stdout,
            demux.clone(),
            correlator.clone(),
            cli_echo_token,
            terminated.clone(),
        ));

        Ok(GdbProcess {
            child: Arc::new(Mutex::new(child)),
            stdin: Arc::new(Mutex::new(stdin)),
            demux,
            correlator,
            reader_task,
            terminated,
        })
    }
}

async fn read_loop<R: AsyncReadExt + Unpin>(
    mut stdout: R,
    demux: Arc<Demux>,
    correlator: Arc<Mutex<Correlator>>,
    cli_echo_token: String,
    terminated: Arc<AtomicBool>,
) {
    let mut splitter = LineSplitter::new();
    let mut buf = [0u8; 4096];
    loop {
        match stdout.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                for line in splitter.feed(&buf[..n]) {
                    demux.dispatch(&correlator, &cli_echo_token, Record::parse(&line)).await;
                }
            }
            Err(_) => break,
        }
    }
    // A partial, unterminated line left in the buffer at EOF is discarded,
    // not dispatched: matches the teacher's `process_output`, which returns
    // immediately on `Ok(0)` without flushing a partial buffer.
    let _ = splitter.finish();
    correlator.lock().await.fail_all();
    terminated.store(true, Ordering::SeqCst);
}

impl GdbProcess {
    #[cfg(unix)]
    pub async fn interrupt_signal(&self) -> Result<()> {
        use nix::sys::signal;
        use nix::unistd::Pid;
        let pid = self
            .child
            .lock()
            .await
            .id()
            .ok_or(Error::ProcessTerminated)?;
        signal::kill(Pid::from_raw(pid as i32), signal::Signal::SIGINT).map_err(|e| Error::Io(e.to_string()))
    }

    #[cfg(windows)]
    pub async fn interrupt_signal(&self) -> Result<()> {
        Err(Error::Usage("signal-based interrupt is unavailable on this platform; use enableAsync + interrupt instead".to_string()))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mi::correlator::Interpreter;
    use tokio::io::AsyncWriteExt as _;

    #[tokio::test]
    async fn read_loop_demuxes_lines_from_a_duplex_stream() {
        let (mut client, server) = tokio::io::duplex(4096);
        let demux = Arc::new(Demux::new());
        let correlator = Arc::new(Mutex::new(Correlator::new()));
        let (tx, rx) = tokio::sync::oneshot::channel();
        correlator.lock().await.enqueue("-break-insert main".to_string(), Interpreter::Mi, tx);

        let terminated = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(read_loop(
            server,
            demux.clone(),
            correlator.clone(),
            "GDBJS^".to_string(),
            terminated.clone(),
        ));
        client
            .write_all(b"^done,bkpt={number=\"1\"}\n")
            .await
            .unwrap();
        drop(client);
        task.await.unwrap();

        let reply = rx.await.unwrap().unwrap();
        assert!(matches!(reply, super::super::correlator::Reply::Mi(_)));
        assert!(terminated.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn terminated_flag_flips_and_rejects_pending_requests_on_eof() {
        let (client, server) = tokio::io::duplex(4096);
        let demux = Arc::new(Demux::new());
        let correlator = Arc::new(Mutex::new(Correlator::new()));
        let (tx, rx) = tokio::sync::oneshot::channel();
        correlator.lock().await.enqueue("-break-list".to_string(), Interpreter::Mi, tx);

        let terminated = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(read_loop(server, demux, correlator, "GDBJS^".to_string(), terminated.clone()));
        drop(client); // EOF with no reply ever sent
        task.await.unwrap();

        assert!(terminated.load(Ordering::SeqCst));
        assert!(matches!(rx.await.unwrap(), Err(Error::ProcessTerminated)));
    }
}
