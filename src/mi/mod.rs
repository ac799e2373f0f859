pub mod commands;
pub mod correlator;
pub mod demux;
pub mod dispatcher;
pub mod events;
pub mod output;
pub mod process;
pub mod stream;

pub use dispatcher::{CONCAT_HELPER_SCRIPT, Debugger};
pub use process::{GdbBuilder, GdbProcess};
