//! Builders for MI command strings (§4.7 "Command formatting").
//!
//! Each constructor returns an [`MiCommand`] describing the `-operation`
//! head plus its `options`/`parameters` halves; [`MiCommand::write_interpreter_string`]
//! serializes it with the leading numeric token GDB's MI syntax expects.
//! Scope injection (`--thread`/`--thread-group`) and CLI wrapping (the
//! magic-prefix convention, §4.5) are layered on top by the dispatcher,
//! which can freely push extra options onto a built command before it is
//! sent.

use std::borrow::Cow;
use std::ffi::OsString;
use std::fmt;
use std::io::Error;
use std::path::Path;

use tokio::io::AsyncWriteExt;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct MiCommand {
    pub operation: Cow<'static, str>,
    pub options: Option<Vec<OsString>>,
    pub parameters: Option<Vec<OsString>>,
}

pub enum WatchMode {
    Read,
    Write,
    Access,
}

/// Where a new breakpoint should be placed (§6 `addBreak`/`addFunctionBreak`/
/// `addLabelBreak`/`addOptionsBreak`).
pub enum BreakPointLocation<'a> {
    /// `file:line`.
    File(&'a Path, usize),
    /// A bare function name, with no source file (`addFunctionBreak`).
    Function(&'a str),
    /// A label name (`addLabelBreak`).
    Label(&'a str),
    /// Raw `-break-insert` options, passed through verbatim
    /// (`addOptionsBreak`) for callers that need flags this builder
    /// doesn't otherwise expose (`-t`, `-c COND`, `-i IGNORE`, ...).
    Options(Vec<OsString>),
}

#[derive(Copy, Clone, Hash, PartialEq, Eq)]
pub struct BreakPointNumber {
    pub major: usize,
    pub minor: Option<usize>,
}

impl std::str::FromStr for BreakPointNumber {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(dot_pos) = s.find('.') {
            let major = s[..dot_pos].parse::<usize>().map_err(|e| e.to_string())?;
            let minor = s[dot_pos + 1..]
                .parse::<usize>()
                .map_err(|e| e.to_string())?;
            Ok(BreakPointNumber { major, minor: Some(minor) })
        } else {
            match s.parse::<usize>() {
                Ok(val) => Ok(BreakPointNumber { major: val, minor: None }),
                Err(e) => Err(e.to_string()),
            }
        }
    }
}

impl fmt::Display for BreakPointNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(minor) = self.minor {
            write!(f, "{}.{}", self.major, minor)
        } else {
            write!(f, "{}", self.major)
        }
    }
}

/// Encodes a string for the `-interpreter-exec console "..."` escaping
/// convention (§4.7 "Init"): `\` then `"`, then the control escapes as
/// their literal two-character sequences.
pub fn escape_command(input: &str) -> String {
    let mut output = '\"'.to_string();
    for c in input.chars() {
        match c {
            '\\' => output.push_str("\\\\"),
            '\"' => output.push_str("\\\""),
            '\r' => output.push_str("\\r"),
            '\n' => output.push_str("\\n"),
            '\t' => output.push_str("\\t"),
            other => output.push(other),
        }
    }
    output.push('\"');
    output
}

impl MiCommand {
    pub async fn write_interpreter_string<S: AsyncWriteExt + Unpin>(
        &self,
        sink: &mut S,
        token: u64,
    ) -> Result<(), Error> {
        let mut command = OsString::new();
        if !self.operation.is_empty() {
            command.push(format!("{}-{}", token, self.operation));
        }
        if let Some(options) = &self.options {
            for option in options {
                command.push(" ");
                command.push(option);
            }
        }
        if let Some(parameters) = &self.parameters {
            if self.options.is_some() {
                command.push(" --");
            }
            for parameter in parameters {
                command.push(" ");
                command.push(parameter);
            }
        }
        command.push("\n");
        debug!("writing GDB command: {}", String::from_utf8_lossy(command.as_encoded_bytes()));
        sink.write_all(command.as_encoded_bytes()).await?;
        Ok(())
    }

    /// Returns the fully formatted command text (without the leading
    /// token), for correlator bookkeeping and error messages.
    pub fn render(&self) -> String {
        let mut out = format!("-{}", self.operation);
        if let Some(options) = &self.options {
            for option in options {
                out.push(' ');
                out.push_str(&option.to_string_lossy());
            }
        }
        if let Some(parameters) = &self.parameters {
            if self.options.is_some() {
                out.push_str(" --");
            }
            for parameter in parameters {
                out.push(' ');
                out.push_str(&parameter.to_string_lossy());
            }
        }
        out
    }

    /// Prepends an option, used by the dispatcher to inject `--thread`/
    /// `--thread-group` ahead of whatever options a builder produced.
    pub fn with_leading_option(mut self, option: impl Into<OsString>) -> Self {
        let mut options = self.options.take().unwrap_or_default();
        options.insert(0, option.into());
        self.options = Some(options);
        self
    }

    pub fn interpreter_exec<S1: Into<OsString>, S2: Into<OsString>>(interpreter: S1, command: S2) -> MiCommand {
        MiCommand {
            operation: "interpreter-exec".into(),
            options: Some(vec![interpreter.into(), command.into()]),
            parameters: None,
        }
    }

    /// Wraps `command` with the magic-prefix `concat` helper (§4.5 variant A).
    pub fn cli_exec(command: &str, cli_echo_token: &str) -> MiCommand {
        let wrapped = format!("concat {cli_echo_token} {command}");
        Self::interpreter_exec("console", escape_command(&wrapped))
    }

    /// `python\n<script>`, escaped, for helper-script injection at `init()`.
    pub fn python_exec(script: &str) -> MiCommand {
        let wrapped = format!("python\n{script}");
        Self::interpreter_exec("console", escape_command(&wrapped))
    }

    pub fn data_evaluate_expression(expression: &str) -> MiCommand {
        MiCommand {
            operation: "data-evaluate-expression".into(),
            options: Some(vec![escape_command(expression).into()]),
            parameters: None,
        }
    }

    pub fn insert_breakpoint(location: BreakPointLocation) -> MiCommand {
        MiCommand {
            operation: "break-insert".into(),
            options: match location {
                BreakPointLocation::File(path, line) => {
                    let mut spec = OsString::from(path);
                    spec.push(":");
                    spec.push(line.to_string());
                    Some(vec![spec])
                }
                BreakPointLocation::Function(name) => Some(vec![OsString::from(name)]),
                BreakPointLocation::Label(name) => Some(vec![OsString::from(name)]),
                BreakPointLocation::Options(options) => Some(options),
            },
            parameters: None,
        }
    }

    pub fn delete_breakpoints(breakpoint_numbers: Vec<OsString>) -> MiCommand {
        // GDB rejects a second delete of a sub-breakpoint already covered
        // by deleting its parent; dedup keeps repeated callers harmless.
        let mut options = breakpoint_numbers;
        options.sort();
        options.dedup();
        MiCommand { operation: "break-delete".into(), options: Some(options), parameters: None }
    }

    pub fn breakpoints_list() -> MiCommand {
        MiCommand { operation: "break-list".into(), ..Default::default() }
    }

    pub fn insert_watchpoint(expression: &str, mode: WatchMode) -> MiCommand {
        let options = match mode {
            WatchMode::Write => None,
            WatchMode::Read => Some(vec!["-r".into()]),
            WatchMode::Access => Some(vec!["-a".into()]),
        };
        MiCommand { operation: "break-watch".into(), options, parameters: Some(vec![expression.into()]) }
    }

    pub fn gdb_set(param: &str, value: &str) -> MiCommand {
        MiCommand {
            operation: "gdb-set".into(),
            options: None,
            parameters: Some(vec![param.into(), value.into()]),
        }
    }

    pub fn enable_async() -> MiCommand {
        Self::gdb_set("mi-async", "on")
    }

    pub fn target_attach(pid: u32) -> MiCommand {
        MiCommand { operation: "target-attach".into(), options: Some(vec![pid.to_string().into()]), parameters: None }
    }

    pub fn target_detach() -> MiCommand {
        MiCommand { operation: "target-detach".into(), ..Default::default() }
    }

    pub fn gdb_attach_on_fork() -> MiCommand {
        Self::gdb_set("detach-on-fork", "off")
    }

    pub fn exec_interrupt_all() -> MiCommand {
        MiCommand { operation: "exec-interrupt".into(), options: Some(vec!["--all".into()]), parameters: None }
    }

    pub fn exec_interrupt() -> MiCommand {
        MiCommand { operation: "exec-interrupt".into(), ..Default::default() }
    }

    pub fn exec_run() -> MiCommand {
        MiCommand { operation: "exec-run".into(), ..Default::default() }
    }

    pub fn exec_continue() -> MiCommand {
        MiCommand { operation: "exec-continue".into(), ..Default::default() }
    }

    pub fn exec_step() -> MiCommand {
        MiCommand { operation: "exec-step".into(), ..Default::default() }
    }

    pub fn exec_next() -> MiCommand {
        MiCommand { operation: "exec-next".into(), ..Default::default() }
    }

    pub fn exec_finish() -> MiCommand {
        MiCommand { operation: "exec-finish".into(), ..Default::default() }
    }

    pub fn exit() -> MiCommand {
        MiCommand { operation: "gdb-exit".into(), ..Default::default() }
    }

    pub fn thread_select(thread_id: u64) -> MiCommand {
        MiCommand { operation: "thread-select".into(), options: Some(vec![thread_id.to_string().into()]), parameters: None }
    }

    pub fn stack_list_frames(low_frame: Option<usize>, high_frame: Option<usize>) -> MiCommand {
        let options = match (low_frame, high_frame) {
            (Some(low), Some(high)) if low > high => Some(vec![high.to_string().into(), low.to_string().into()]),
            (Some(low), Some(high)) => Some(vec![low.to_string().into(), high.to_string().into()]),
            (Some(low), None) => Some(vec![low.to_string().into(), String::from("99999").into()]),
            (None, Some(high)) => Some(vec![String::from("0").into(), high.to_string().into()]),
            (None, None) => None,
        };
        MiCommand { operation: "stack-list-frames".into(), options, parameters: None }
    }

    pub fn stack_list_variables(thread_number: Option<u64>, frame_number: Option<usize>) -> MiCommand {
        let mut parameters = vec![];
        if let Some(thread_number) = thread_number {
            parameters.push("--thread".into());
            parameters.push(thread_number.to_string().into());
        }
        if let Some(frame_number) = frame_number {
            parameters.push("--frame".into());
            parameters.push(frame_number.to_string().into());
        }
        parameters.push("--simple-values".into());
        MiCommand { operation: "stack-list-variables".into(), options: None, parameters: Some(parameters) }
    }

    pub fn thread_info(thread_id: Option<u64>) -> MiCommand {
        MiCommand {
            operation: "thread-info".into(),
            options: thread_id.map(|id| vec![id.to_string().into()]),
            parameters: None,
        }
    }

    pub fn file_exec_and_symbols(file: &Path) -> MiCommand {
        MiCommand { operation: "file-exec-and-symbols".into(), options: Some(vec![file.into()]), parameters: None }
    }

    pub fn list_thread_groups(list_all_available: bool, thread_group_ids: &[u64]) -> MiCommand {
        MiCommand {
            operation: "list-thread-groups".into(),
            options: if list_all_available { Some(vec![OsString::from("--available")]) } else { None },
            parameters: Some(thread_group_ids.iter().map(|id| format!("i{id}").into()).collect()),
        }
    }

    pub fn var_create(name: Option<OsString>, expression: &str, frame_addr: Option<u64>) -> MiCommand {
        MiCommand {
            operation: "var-create".into(),
            options: None,
            parameters: Some(vec![
                name.unwrap_or_else(|| "\"-\"".into()),
                frame_addr.map(|s| s.to_string()).unwrap_or_else(|| "\"*\"".to_string()).into(),
                escape_command(expression).into(),
            ]),
        }
    }

    pub fn var_delete(name: impl Into<OsString>) -> MiCommand {
        MiCommand { operation: "var-delete".into(), options: None, parameters: Some(vec![name.into()]) }
    }

    pub fn empty() -> MiCommand {
        MiCommand { operation: "".into(), ..Default::default() }
    }

    /// Builds a command from a user-supplied raw MI command string, e.g.
    /// `"-break-list"` or `"-data-evaluate-expression 1+1"` (§6 `execMI`).
    /// The leading `-` and the head/options split follow §4.7's rule:
    /// split at the first space, head becomes the operation.
    pub fn from_raw_text(text: &str) -> MiCommand {
        let trimmed = text.trim().trim_start_matches('-');
        let (head, rest) = trimmed.split_once(' ').unwrap_or((trimmed, ""));
        let options = if rest.is_empty() {
            None
        } else {
            Some(rest.split_whitespace().map(OsString::from).collect())
        };
        MiCommand { operation: head.to_string().into(), options, parameters: None }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn escape_command_uses_literal_two_character_sequences() {
        let escaped = escape_command("line one\nline two\ttabbed");
        assert_eq!(escaped, "\"line one\\nline two\\ttabbed\"");
    }

    #[test]
    fn escape_command_doubles_backslash_and_quote() {
        assert_eq!(escape_command("a\\b\"c"), "\"a\\\\b\\\"c\"");
    }

    #[test]
    fn breakpoint_number_parses_major_minor() {
        let n: BreakPointNumber = "2.1".parse().unwrap();
        assert_eq!(n.major, 2);
        assert_eq!(n.minor, Some(1));
        assert_eq!(n.to_string(), "2.1");
    }

    #[test]
    fn cli_exec_wraps_with_concat_and_token() {
        let cmd = MiCommand::cli_exec("echo hi", "GDBJS^");
        assert_eq!(cmd.operation.as_ref(), "interpreter-exec");
        let rendered = cmd.render();
        assert!(rendered.contains("concat GDBJS^ echo hi"));
    }

    #[test]
    fn from_raw_text_splits_head_and_options() {
        let cmd = MiCommand::from_raw_text("-break-list --thread 1");
        assert_eq!(cmd.operation.as_ref(), "break-list");
        assert_eq!(cmd.render(), "-break-list --thread 1");
    }

    #[test]
    fn with_leading_option_prepends() {
        let cmd = MiCommand::exec_continue().with_leading_option("--thread-group")
            .with_leading_option("i1");
        assert_eq!(cmd.render(), "-exec-continue i1 --thread-group");
    }
}
