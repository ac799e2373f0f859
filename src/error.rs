use thiserror::Error;

/// Error taxonomy for the GDB/MI wrapper (see spec §7).
///
/// `Gdb` and `Protocol` are per-request failures; `ProcessTerminated` is
/// pipeline-wide and rejects every outstanding request. `Usage` never
/// touches the subprocess.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// The debugger replied `^error` to a request.
    #[error("gdb error executing `{command}`: {msg}")]
    Gdb {
        msg: String,
        code: Option<i64>,
        command: String,
    },

    /// An impossible pairing: a result with no pending request, a CLI echo
    /// without a matching CLI request, or a malformed embedded event frame.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The subprocess closed its streams or exited before replying.
    #[error("gdb process terminated")]
    ProcessTerminated,

    /// Invalid arguments, rejected synchronously without sending anything.
    #[error("usage error: {0}")]
    Usage(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("json error: {0}")]
    Json(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
