//! Parses the textual output of the CLI command `info variables` (§4.2).
//!
//! GDB prints global/static variables grouped by defining file:
//!
//! ```text
//! All defined variables:
//!
//! File hello.c:
//! int counter;
//! static char *name;
//!
//! File util.c:
//! unsigned long total;
//! ```
//!
//! This module flattens that into an ordered [`GlobalVariable`] list across
//! every file section. It is used only by an optional globals helper built
//! atop [`crate::mi::Debugger`] (§1 "external collaborators") and is never
//! called by the dispatcher itself — grounded on the teacher's own
//! parser-combinator house style (`nom::{alt, tag, take_until, ...}` in
//! `models.rs`'s register-value parser).

use nom::Parser;
use nom::bytes::complete::{tag, take_until};
use nom::character::complete::char;
use nom::sequence::delimited;
use nom::{IResult, error::Error as NomError};

use crate::domain::GlobalVariable;

/// `File <path>:`, yielding `<path>`.
fn file_header(input: &str) -> IResult<&str, &str> {
    delimited(tag("File "), take_until(":"), char(':')).parse(input)
}

/// One `<type> <name>;` declaration line, split at the last whitespace run
/// before the trailing `;` so multi-word types (`unsigned long`, `struct Foo
/// *`) stay intact and the declared name is whatever follows it. A leading
/// run of `*` on the name side is folded back into the type, matching how
/// GDB prints pointer declarations (`int *ptr;`); any `[...]` array suffix
/// on the name is dropped, keeping only the identifier.
fn declaration(line: &str) -> Option<(String, String)> {
    let body = line.strip_suffix(';')?.trim();
    let split_at = body.rfind(|c: char| c.is_whitespace())?;
    let (type_part, name_part) = body.split_at(split_at);
    let mut name_part = name_part.trim_start();
    let mut stars = String::new();
    while let Some(rest) = name_part.strip_prefix('*') {
        stars.push('*');
        name_part = rest;
    }
    let name = name_part.split('[').next().unwrap_or(name_part).trim();
    if name.is_empty() {
        return None;
    }
    let r#type = if stars.is_empty() {
        type_part.trim().to_string()
    } else {
        format!("{} {}", type_part.trim(), stars)
    };
    Some((r#type, name.to_string()))
}

/// Parses the full `info variables` transcript into a flat, ordered list of
/// `{file, type, name}` rows. The leading `All defined ...:` banner and
/// blank lines between file sections are skipped; any trailing text after
/// the last file section that isn't a declaration is ignored (§4.2).
pub fn parse_info_variables(text: &str) -> Vec<GlobalVariable> {
    let mut out = Vec::new();
    let mut current_file: Option<&str> = None;
    for line in text.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        if let Ok((_, path)) = file_header(line) {
            current_file = Some(path);
            continue;
        }
        let Some(file) = current_file else { continue };
        if let Some((r#type, name)) = declaration(line) {
            out.push(GlobalVariable { file: file.to_string(), r#type, name });
        }
    }
    out
}

/// Separate entry point kept as a thin `nom`-typed alias of
/// [`parse_info_variables`]'s per-line declaration step, for callers that
/// want to validate one line at a time (e.g. incremental CLI echo parsing)
/// without buffering the whole transcript.
pub fn parse_declaration_line(line: &str) -> Result<(String, String), NomError<&str>> {
    declaration(line).ok_or_else(|| NomError::new(line, nom::error::ErrorKind::Fail))
}

#[cfg(test)]
mod test {
    use super::*;

    const TRANSCRIPT: &str = "All defined variables:\n\nFile hello.c:\nint counter;\nstatic char *name;\n\nFile util.c:\nunsigned long total;\n\nNon-debugging symbols:\n0x0000000000004020  _edata\n";

    #[test]
    fn flattens_all_files_in_order() {
        let vars = parse_info_variables(TRANSCRIPT);
        assert_eq!(vars.len(), 3);
        assert_eq!(vars[0], GlobalVariable { file: "hello.c".to_string(), r#type: "int".to_string(), name: "counter".to_string() });
        assert_eq!(vars[1].name, "name");
        assert_eq!(vars[1].r#type, "char *");
        assert_eq!(vars[2], GlobalVariable { file: "util.c".to_string(), r#type: "unsigned long".to_string(), name: "total".to_string() });
    }

    #[test]
    fn trailing_tail_after_last_file_is_ignored() {
        let vars = parse_info_variables(TRANSCRIPT);
        assert!(vars.iter().all(|v| v.name != "_edata"));
    }

    #[test]
    fn array_suffix_is_dropped_from_name() {
        let vars = parse_info_variables("File a.c:\nint table[16];\n");
        assert_eq!(vars[0].name, "table");
        assert_eq!(vars[0].r#type, "int");
    }

    #[test]
    fn empty_transcript_yields_no_rows() {
        assert!(parse_info_variables("").is_empty());
    }
}
