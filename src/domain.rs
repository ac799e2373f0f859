//! Domain entities (§3). Immutable value types constructed fresh from an MI
//! payload on each API call — no shared mutable graph, no back-reference to
//! the dispatcher that produced them (§9 "Entity identity").

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// A thread inside the debuggee, as reported by `-thread-info` or
/// synthesized from a `stopped`/`running`/`thread-*` async record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub id: u64,
    pub status: Option<String>,
    pub group: Option<ThreadGroup>,
    pub frame: Option<Frame>,
}

/// An inferior. MI encodes the id as `i<N>`; `id` holds the numeric suffix
/// and the `i` prefix is reconstructed whenever the id is sent back to GDB
/// (see [`thread_group_mi_id`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadGroup {
    pub id: u64,
    pub pid: Option<u64>,
}

/// Formats a thread-group id back into MI's `i<N>` wire form.
pub fn thread_group_mi_id(id: u64) -> String {
    format!("i{id}")
}

/// Strips the `i` prefix GDB puts on thread-group ids, e.g. in
/// `group-id="i1"` or `id="i1"`.
pub fn parse_thread_group_id(raw: &str) -> Result<u64> {
    raw.strip_prefix('i')
        .unwrap_or(raw)
        .parse()
        .map_err(|_| Error::Protocol(format!("malformed thread-group id: {raw}")))
}

/// A breakpoint. `func` is a single name for an ordinary breakpoint, or a
/// sequence of names when `-break-insert` returned a composite/overloaded
/// location (§4.8).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breakpoint {
    pub id: u64,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub func: Option<BreakpointFunc>,
    pub thread: Option<Thread>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BreakpointFunc {
    Single(String),
    Multiple(Vec<String>),
}

/// A stack frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub file: Option<String>,
    pub line: Option<u32>,
    pub func: Option<String>,
    pub level: Option<u32>,
}

/// A named variable as reported by `-stack-list-variables` or `var-create`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub r#type: Option<String>,
    pub scope: Option<String>,
    pub value: Option<String>,
}

/// A `{file, type, name}` row parsed from `info variables` (§4.2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalVariable {
    pub file: String,
    pub r#type: String,
    pub name: String,
}

/// Thread/thread-group scope injected into a public operation (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Thread(u64),
    ThreadGroup(u64),
}

fn get_str<'a>(data: &'a Value, key: &str) -> Option<&'a str> {
    data.get(key).and_then(Value::as_str)
}

fn parse_u32(s: &str) -> Option<u32> {
    s.parse().ok()
}

fn parse_u64(s: &str) -> Option<u64> {
    s.parse().ok()
}

impl Frame {
    /// Builds a `Frame` from an MI `frame={...}` tuple. Every field is
    /// optional: GDB omits `file`/`line` when debug info is missing.
    pub fn from_value(data: &Value) -> Frame {
        Frame {
            file: get_str(data, "fullname")
                .or_else(|| get_str(data, "file"))
                .map(str::to_owned),
            line: get_str(data, "line").and_then(parse_u32),
            func: get_str(data, "func").map(str::to_owned),
            level: get_str(data, "level").and_then(parse_u32),
        }
    }
}

impl Thread {
    /// Builds a `Thread` from a `-thread-info` entry or the `thread-id`/
    /// `frame` fields of a `stopped`/`running` async record.
    pub fn from_value(data: &Value) -> Thread {
        let id = get_str(data, "id")
            .or_else(|| get_str(data, "thread-id"))
            .and_then(parse_u64)
            .unwrap_or_default();
        Thread {
            id,
            status: get_str(data, "state").map(str::to_owned),
            group: None,
            frame: data.get("frame").map(Frame::from_value),
        }
    }
}

impl Breakpoint {
    /// Builds a `Breakpoint` from a single MI `bkpt={...}` tuple (the common
    /// case) or from a flattened composite-location list (§4.8): the first
    /// element carries `number`/`file`/`line`, subsequent elements each
    /// contribute one `func` name collected into `BreakpointFunc::Multiple`.
    pub fn from_bkpt_value(data: &Value) -> Result<Breakpoint> {
        match data {
            Value::Array(items) => {
                let head = items
                    .first()
                    .ok_or_else(|| Error::Protocol("empty breakpoint list".to_string()))?;
                let mut bp = Self::from_single(head)?;
                let mut funcs = Vec::new();
                for item in items.iter().skip(1) {
                    if let Some(f) = get_str(item, "func") {
                        funcs.push(f.to_owned());
                    }
                }
                if !funcs.is_empty() {
                    bp.func = Some(BreakpointFunc::Multiple(funcs));
                }
                Ok(bp)
            }
            other => Self::from_single(other),
        }
    }

    fn from_single(data: &Value) -> Result<Breakpoint> {
        let id = get_str(data, "number")
            .and_then(|s| s.split('.').next())
            .and_then(parse_u64)
            .ok_or_else(|| Error::Protocol("breakpoint missing number".to_string()))?;
        Ok(Breakpoint {
            id,
            file: get_str(data, "fullname")
                .or_else(|| get_str(data, "file"))
                .map(str::to_owned),
            line: get_str(data, "line").and_then(parse_u32),
            func: get_str(data, "func").map(|f| BreakpointFunc::Single(f.to_owned())),
            thread: None,
        })
    }
}

impl Variable {
    pub fn from_value(data: &Value) -> Variable {
        Variable {
            name: get_str(data, "name").unwrap_or_default().to_owned(),
            r#type: get_str(data, "type").map(str::to_owned),
            scope: get_str(data, "scope").map(str::to_owned),
            value: get_str(data, "value").map(str::to_owned),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn breakpoint_from_single_tuple() {
        let data = json!({
            "number": "1",
            "fullname": "/p/hello.c",
            "line": "4",
            "func": "main",
        });
        let bp = Breakpoint::from_bkpt_value(&data).unwrap();
        assert_eq!(bp.id, 1);
        assert_eq!(bp.file.as_deref(), Some("/p/hello.c"));
        assert_eq!(bp.line, Some(4));
        assert_eq!(bp.func, Some(BreakpointFunc::Single("main".to_string())));
    }

    #[test]
    fn breakpoint_from_composite_list_collects_funcs() {
        let data = json!([
            {"number": "2", "fullname": "/p/t.cpp", "line": "10"},
            {"number": "2.1", "func": "foo<int>"},
            {"number": "2.2", "func": "foo<double>"},
        ]);
        let bp = Breakpoint::from_bkpt_value(&data).unwrap();
        assert_eq!(bp.id, 2);
        assert_eq!(
            bp.func,
            Some(BreakpointFunc::Multiple(vec![
                "foo<int>".to_string(),
                "foo<double>".to_string()
            ]))
        );
    }

    #[test]
    fn thread_group_id_roundtrip() {
        assert_eq!(parse_thread_group_id("i1").unwrap(), 1);
        assert_eq!(thread_group_mi_id(1), "i1");
    }
}
