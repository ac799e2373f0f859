//! Scans console records for embedded `<gdbjs:event:...>` frames (§4.6).
//!
//! User Python scripts loaded at `init()` push asynchronous events to the
//! wrapper by printing a frame to the console stream:
//! `<gdbjs:event:<name> <payload> <name>:event:gdbjs>`. This module finds
//! every such frame in a line of console text and decodes its JSON body.

use serde_json::Value;

const OPEN_PREFIX: &str = "<gdbjs:event:";
const CMD_OPEN_PREFIX: &str = "<gdbjs:cmd:";
const CMD_CLOSE_SUFFIX: &str = ":cmd:gdbjs>";

/// One decoded embedded event.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedEvent {
    pub name: String,
    pub payload: Value,
}

/// Removes `<gdbjs:cmd:<name> ... <name>:cmd:gdbjs>` framed CLI-reply bodies
/// from `text`, leaving event frames untouched. §4.6 requires scanning for
/// events only after this step ("events embedded in framed CLI replies must
/// be ignored") — a CLI reply body is arbitrary program output a user
/// script doesn't control, and could coincidentally contain something that
/// looks like an event frame.
fn strip_command_frames(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open_at) = rest.find(CMD_OPEN_PREFIX) {
        out.push_str(&rest[..open_at]);
        let after_open = &rest[open_at + CMD_OPEN_PREFIX.len()..];
        match after_open.find(CMD_CLOSE_SUFFIX) {
            Some(close_at) => rest = &after_open[close_at + CMD_CLOSE_SUFFIX.len()..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Finds every embedded event frame in `text`, in order, after first
/// stripping any framed CLI-reply (`<gdbjs:cmd:...:cmd:gdbjs>`) bodies
/// (§4.6 "events embedded in framed CLI replies must be ignored"). Malformed
/// frames (missing closer, unbalanced name, invalid JSON payload) are
/// skipped rather than surfaced as protocol errors — a partial/truncated
/// frame in console output is not distinguishable from a user script bug,
/// and the extractor must never crash the pipeline (§7 `ProtocolError`).
pub fn extract_events(text: &str) -> Vec<EmbeddedEvent> {
    let stripped = strip_command_frames(text);
    let mut events = Vec::new();
    let mut rest = stripped.as_str();
    while let Some(open_at) = rest.find(OPEN_PREFIX) {
        let after_open = &rest[open_at + OPEN_PREFIX.len()..];
        let Some(name_end) = after_open.find(' ') else {
            rest = after_open;
            continue;
        };
        let name = &after_open[..name_end];
        let closer = format!("{name}:event:gdbjs>");
        let body_start = name_end + 1;
        let Some(closer_at) = after_open[body_start..].find(closer.as_str()) else {
            rest = after_open;
            continue;
        };
        let payload_text = after_open[body_start..body_start + closer_at].trim();
        if let Ok(payload) = serde_json::from_str::<Value>(payload_text) {
            events.push(EmbeddedEvent {
                name: name.to_string(),
                payload,
            });
        }
        rest = &after_open[body_start + closer_at + closer.len()..];
    }
    events
}

/// Removes every embedded event frame (and framed CLI-reply bodies, which
/// share the same `<gdbjs:...:gdbjs>` bracket shape) from console text, so
/// the user-visible console stream never shows wrapper-internal markers
/// (§8 invariant: "never contains a substring matching `<gdbjs:...:gdbjs>`").
pub fn strip_frames(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open_at) = rest.find("<gdbjs:") {
        out.push_str(&rest[..open_at]);
        let after_open = &rest[open_at + "<gdbjs:".len()..];
        match after_open.find(":gdbjs>") {
            Some(close_at) => rest = &after_open[close_at + ":gdbjs>".len()..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_single_event() {
        let text = r#"<gdbjs:event:objfile {"file":"/bin/a.out"} objfile:event:gdbjs>"#;
        let events = extract_events(text);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "objfile");
        assert_eq!(events[0].payload, json!({"file": "/bin/a.out"}));
    }

    #[test]
    fn extracts_multiple_events_in_order() {
        let text = "<gdbjs:event:a 1 a:event:gdbjs> middle <gdbjs:event:b 2 b:event:gdbjs>";
        let events = extract_events(text);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].name, "a");
        assert_eq!(events[1].name, "b");
    }

    #[test]
    fn malformed_frame_is_skipped_not_panicked() {
        let text = "<gdbjs:event:broken no closer here";
        assert!(extract_events(text).is_empty());
    }

    #[test]
    fn strip_frames_removes_event_and_cmd_frames() {
        let text = r#"hello <gdbjs:event:a 1 a:event:gdbjs> world <gdbjs:cmd:x {} x:cmd:gdbjs> end"#;
        assert_eq!(strip_frames(text), "hello  world  end");
    }

    #[test]
    fn event_frame_embedded_inside_a_cmd_reply_is_ignored() {
        // a CLI reply body is arbitrary program output; if it happens to
        // contain something shaped like an event frame, it must not be
        // picked up as a real one (§4.6).
        let text = "<gdbjs:cmd:echo <gdbjs:event:fake 1 fake:event:gdbjs> echo:cmd:gdbjs>";
        assert!(extract_events(text).is_empty());
    }

    #[test]
    fn real_event_frame_outside_any_cmd_frame_still_extracted() {
        let text = "<gdbjs:cmd:echo hi echo:cmd:gdbjs> <gdbjs:event:real 1 real:event:gdbjs>";
        let events = extract_events(text);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "real");
    }
}
