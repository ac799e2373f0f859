//! Grammar-driven parser for GDB/MI's line-oriented record syntax (§4.1).
//!
//! The parser is pure: one line in, one [`Record`] out, no hidden state
//! across lines. A line that doesn't match any known shape is never an
//! error — it classifies as [`Record::Raw`] (§7 `ParseIgnored`).

use nom::branch::alt;
use nom::bytes::complete::{is_not, tag, take_while1, take_while_m_n};
use nom::character::complete::{char, digit1};
use nom::combinator::{map, map_opt, map_res, opt, value, verify};
use nom::error::{FromExternalError, ParseError};
use nom::multi::{fold, many0, separated_list0};
use nom::sequence::{delimited, preceded, separated_pair};
use nom::{IResult, Parser};
use serde_json::{Map, Value};

/// The `^`-prefixed completion class of a [`Record::Result`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultClass {
    Done,
    Running,
    Connected,
    Error,
    Exit,
}

/// One parsed MI line (§3 "MI Record").
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Result {
        token: Option<u64>,
        class: ResultClass,
        data: Value,
    },
    Exec {
        token: Option<u64>,
        class: String,
        data: Value,
    },
    Status {
        token: Option<u64>,
        class: String,
        data: Value,
    },
    Notify {
        token: Option<u64>,
        class: String,
        data: Value,
    },
    Console(String),
    Target(String),
    Log(String),
    /// The literal `(gdb) ` prompt on its own line.
    Prompt,
    /// Any line that didn't match a known shape.
    Raw(String),
}

impl Record {
    /// Parses one complete line (without its trailing newline). Never
    /// fails: an unparseable line becomes [`Record::Raw`].
    pub fn parse(line: &str) -> Record {
        match record(line) {
            Ok((_, r)) => r,
            Err(_) => Record::Raw(line.to_string()),
        }
    }
}

fn result_class(input: &str) -> IResult<&str, ResultClass> {
    alt((
        value(ResultClass::Done, tag("done")),
        value(ResultClass::Running, tag("running")),
        value(ResultClass::Connected, tag("connected")),
        value(ResultClass::Error, tag("error")),
        value(ResultClass::Exit, tag("exit")),
    ))
    .parse(input)
}

fn unicode<'a, E>(input: &'a str) -> IResult<&'a str, char, E>
where
    E: ParseError<&'a str> + FromExternalError<&'a str, std::num::ParseIntError>,
{
    let parse_hex = take_while_m_n(1, 6, |c: char| c.is_ascii_hexdigit());
    let parse_delimited_hex = preceded(char('u'), delimited(char('{'), parse_hex, char('}')));
    let parse_u32 = map_res(parse_delimited_hex, |hex| u32::from_str_radix(hex, 16));
    map_opt(parse_u32, std::char::from_u32).parse(input)
}

/// Decodes `\\ \" \b \f \n \r \t` and `\u{XXXX}` per §4.1 "Escape decoding".
fn escaped_char(input: &str) -> IResult<&str, char> {
    preceded(
        char('\\'),
        alt((
            unicode,
            value('\n', char('n')),
            value('\r', char('r')),
            value('\t', char('t')),
            value('\u{08}', char('b')),
            value('\u{0C}', char('f')),
            value('\\', char('\\')),
            value('/', char('/')),
            value('"', char('"')),
        )),
    )
    .parse(input)
}

fn literal(input: &str) -> IResult<&str, &str> {
    verify(is_not("\"\\"), |s: &str| !s.is_empty()).parse(input)
}

#[derive(Debug, PartialEq, Eq, Clone)]
enum StringFragment<'a> {
    Literal(&'a str),
    EscapedChar(char),
}

fn parse_fragment(input: &str) -> IResult<&str, StringFragment> {
    alt((
        map(literal, StringFragment::Literal),
        map(escaped_char, StringFragment::EscapedChar),
    ))
    .parse(input)
}

/// A C-string literal, decoded (§4.1 "cstring").
fn cstring(input: &str) -> IResult<&str, String> {
    let build = fold(0.., parse_fragment, String::new, |mut s, frag| {
        match frag {
            StringFragment::Literal(l) => s.push_str(l),
            StringFragment::EscapedChar(c) => s.push(c),
        }
        s
    });
    delimited(char('"'), build, char('"')).parse(input)
}

/// `[a-zA-Z_-][a-zA-Z0-9_-]*`
fn name(input: &str) -> IResult<&str, &str> {
    verify(
        take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-'),
        |s: &str| !s.chars().next().unwrap().is_ascii_digit(),
    )
    .parse(input)
}

fn token(input: &str) -> IResult<&str, u64> {
    map_res(digit1, |s: &str| s.parse::<u64>()).parse(input)
}

/// Flattens a non-empty container (tuple body, or the unbracketed comma
/// list after `^`/`*`/`+`/`=`) into a mapping. Duplicate names collapse
/// into an ordered array; an entry with no name inherits the immediately
/// preceding entry's name, and a leading unnamed entry is bound under the
/// synthetic key `unnamed` (§4.1 "Tuple/list-of-results flattening").
fn build_tuple(entries: Vec<(Option<String>, Value)>) -> Value {
    let mut map: Map<String, Value> = Map::new();
    let mut last_name: Option<String> = None;
    for (entry_name, entry_value) in entries {
        let key = entry_name.unwrap_or_else(|| last_name.clone().unwrap_or_else(|| "unnamed".to_string()));
        last_name = Some(key.clone());
        match map.get_mut(&key) {
            None => {
                map.insert(key, entry_value);
            }
            Some(existing) => {
                if let Value::Array(arr) = existing {
                    arr.push(entry_value);
                } else {
                    let prev = existing.take();
                    *existing = Value::Array(vec![prev, entry_value]);
                }
            }
        }
    }
    Value::Object(map)
}

/// Flattens a bracketed `[...]` body. If every entry is unnamed it is a
/// plain ordered sequence of values and stays an array; otherwise it is a
/// list of results and collapses via [`build_tuple`] (§4.1 "list").
fn build_list(entries: Vec<(Option<String>, Value)>) -> Value {
    if entries.is_empty() {
        return Value::Array(Vec::new());
    }
    if entries.iter().all(|(n, _)| n.is_none()) {
        return Value::Array(entries.into_iter().map(|(_, v)| v).collect());
    }
    build_tuple(entries)
}

fn to_map(entries: Vec<(Option<String>, Value)>) -> Value {
    build_tuple(entries)
}

/// `name "=" value`, yielding `(Some(name), value)`.
fn named_entry(input: &str) -> IResult<&str, (Option<String>, Value)> {
    map(
        separated_pair(name, char('='), buggy_gdb_value_list),
        |(n, v)| (Some(n.to_string()), v),
    )
    .parse(input)
}

/// A bare value with no `name=` prefix, yielding `(None, value)`.
fn unnamed_entry(input: &str) -> IResult<&str, (Option<String>, Value)> {
    map(value_parser, |v| (None, v)).parse(input)
}

/// One container entry: `result := name? "=" value` (§4.1 grammar).
fn result_entry(input: &str) -> IResult<&str, (Option<String>, Value)> {
    alt((named_entry, unnamed_entry)).parse(input)
}

fn value_parser(input: &str) -> IResult<&str, Value> {
    alt((
        map(cstring, Value::String),
        map(
            delimited(char('{'), separated_list0(char(','), result_entry), char('}')),
            |entries| if entries.is_empty() { Value::Object(Map::new()) } else { build_tuple(entries) },
        ),
        map(
            delimited(char('['), separated_list0(char(','), result_entry), char(']')),
            build_list,
        ),
    ))
    .parse(input)
}

/// GDB sometimes emits several comma-separated values for a single
/// `name=` slot instead of wrapping them in brackets. A single value
/// passes through unchanged; more than one collapses into an array.
fn buggy_gdb_value_list(input: &str) -> IResult<&str, Value> {
    map(separated_list0(tag(","), value_parser), |mut values: Vec<Value>| {
        if values.len() == 1 {
            values.pop().expect("len == 1")
        } else {
            Value::Array(values)
        }
    })
    .parse(input)
}

fn result_record(input: &str) -> IResult<&str, Record> {
    map(
        (opt(token), char('^'), result_class, many0(preceded(char(','), result_entry))),
        |(t, _, c, entries)| Record::Result {
            token: t,
            class: c,
            data: to_map(entries),
        },
    )
    .parse(input)
}

fn async_class(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_lowercase() || c == '-').parse(input)
}

fn exec_record(input: &str) -> IResult<&str, Record> {
    map(
        (opt(token), char('*'), async_class, many0(preceded(char(','), result_entry))),
        |(t, _, c, entries)| Record::Exec {
            token: t,
            class: c.to_string(),
            data: to_map(entries),
        },
    )
    .parse(input)
}

fn status_record(input: &str) -> IResult<&str, Record> {
    map(
        (opt(token), char('+'), async_class, many0(preceded(char(','), result_entry))),
        |(t, _, c, entries)| Record::Status {
            token: t,
            class: c.to_string(),
            data: to_map(entries),
        },
    )
    .parse(input)
}

fn notify_record(input: &str) -> IResult<&str, Record> {
    map(
        (opt(token), char('='), async_class, many0(preceded(char(','), result_entry))),
        |(t, _, c, entries)| Record::Notify {
            token: t,
            class: c.to_string(),
            data: to_map(entries),
        },
    )
    .parse(input)
}

fn console_record(input: &str) -> IResult<&str, Record> {
    map(preceded(char('~'), cstring), Record::Console).parse(input)
}

fn target_record(input: &str) -> IResult<&str, Record> {
    map(preceded(char('@'), cstring), Record::Target).parse(input)
}

fn log_record(input: &str) -> IResult<&str, Record> {
    map(preceded(char('&'), cstring), Record::Log).parse(input)
}

fn prompt(input: &str) -> IResult<&str, Record> {
    value(Record::Prompt, tag("(gdb) ")).parse(input)
}

fn record(input: &str) -> IResult<&str, Record> {
    alt((
        result_record,
        exec_record,
        status_record,
        notify_record,
        console_record,
        target_record,
        log_record,
        prompt,
    ))
    .parse(input)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn anonymous_result_binds_under_unnamed() {
        // §8 scenario 1
        let record = Record::parse(r#"+download,{section=".isr_vector",section-size="776"}"#);
        match record {
            Record::Status { class, data, .. } => {
                assert_eq!(class, "download");
                let unnamed = data.get("unnamed").expect("unnamed key");
                assert_eq!(unnamed["section"], Value::String(".isr_vector".to_string()));
                assert_eq!(unnamed["section-size"], Value::String("776".to_string()));
            }
            other => panic!("expected Status, got {other:?}"),
        }
    }

    #[test]
    fn underscored_field_name_preserved() {
        // §8 scenario 2
        let record = Record::parse(
            r#"^done,name="v1",numchild="0",value="1",type="int",thread-id="1",has_more="0""#,
        );
        match record {
            Record::Result { class, data, .. } => {
                assert_eq!(class, ResultClass::Done);
                assert_eq!(data["has_more"], Value::String("0".to_string()));
            }
            other => panic!("expected Result, got {other:?}"),
        }
    }

    #[test]
    fn breakpoint_insert_result() {
        let record = Record::parse(
            r#"^done,bkpt={number="1",fullname="/p/hello.c",line="4",func="main"}"#,
        );
        match record {
            Record::Result { class, data, .. } => {
                assert_eq!(class, ResultClass::Done);
                let bkpt = &data["bkpt"];
                assert_eq!(bkpt["number"], Value::String("1".to_string()));
                assert_eq!(bkpt["func"], Value::String("main".to_string()));
            }
            other => panic!("expected Result, got {other:?}"),
        }
    }

    #[test]
    fn stopped_at_breakpoint() {
        let record = Record::parse(
            r#"*stopped,reason="breakpoint-hit",bkptno="1",thread-id="1",frame={fullname="/p/hello.c",line="9"}"#,
        );
        match record {
            Record::Exec { class, data, .. } => {
                assert_eq!(class, "stopped");
                assert_eq!(data["reason"], Value::String("breakpoint-hit".to_string()));
                assert_eq!(data["frame"]["line"], Value::String("9".to_string()));
            }
            other => panic!("expected Exec, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_names_collapse_into_array() {
        let record = Record::parse(r#"=breakpoint-modified,bkpt={number="1"},addr="<MULTIPLE>",addr="0x1",addr="0x2""#);
        match record {
            Record::Notify { data, .. } => {
                assert_eq!(
                    data["addr"],
                    Value::Array(vec![
                        Value::String("<MULTIPLE>".to_string()),
                        Value::String("0x1".to_string()),
                        Value::String("0x2".to_string()),
                    ])
                );
            }
            other => panic!("expected Notify, got {other:?}"),
        }
    }

    #[test]
    fn empty_list_stays_array() {
        let record = Record::parse(r#"=library-loaded,ranges=[{}]"#);
        match record {
            Record::Notify { data, .. } => {
                assert_eq!(data["ranges"], Value::Array(vec![Value::Object(Map::new())]));
            }
            other => panic!("expected Notify, got {other:?}"),
        }
    }

    #[test]
    fn plain_value_list_is_array() {
        let record = Record::parse(r#"^done,thread-groups=["i1"]"#);
        match record {
            Record::Result { data, .. } => {
                assert_eq!(data["thread-groups"], Value::Array(vec![Value::String("i1".to_string())]));
            }
            other => panic!("expected Result, got {other:?}"),
        }
    }

    #[test]
    fn console_stream_record() {
        let record = Record::parse(r#"~"Hello World!\n""#);
        assert_eq!(record, Record::Console("Hello World!\n".to_string()));
    }

    #[test]
    fn prompt_line() {
        assert_eq!(Record::parse("(gdb) "), Record::Prompt);
    }

    #[test]
    fn malformed_line_is_raw() {
        let record = Record::parse("this is not mi at all {{{");
        assert_eq!(record, Record::Raw("this is not mi at all {{{".to_string()));
    }

    #[test]
    fn escape_roundtrip_through_cstring() {
        let (_, decoded) = cstring("\"line one\\nline two\\ttabbed\\\"quoted\\\"\"").unwrap();
        assert_eq!(decoded, "line one\nline two\ttabbed\"quoted\"");
    }
}
