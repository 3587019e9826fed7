//! The machine-owned region of a config file.
//!
//! Saving never rewrites a config file wholesale.  Instead the file carries
//! one delimited *autogenerated section* holding a snapshot of the current
//! map, and only that section is regenerated:
//!
//! ```text
//! // anything the user wrote stays byte-for-byte
//! // @@@AUTOGENERATED SECTION, DON'T EDIT@@@
//! set_config(
//! {
//!   "port": 4005
//! }
//! );
//! // @@@/AUTOGENERATED SECTION@@@
//! // ...and so does anything after it
//! ```
//!
//! The section is itself a valid call to the script setter hook, so a
//! script-form file picks the saved values back up when it is evaluated.
//!
//! # Marker grammar
//!
//! A start marker is `//`, optional whitespace, `@@@AUTOGENERATED`, then any
//! text on the same line up to the next `@@@`, then optional whitespace that
//! ends in a newline.  An end marker is the same shape with
//! `@@@/AUTOGENERATED` and needs no trailing newline.  The section ends at
//! the *first* end marker that has a start marker before it, and opens at the
//! nearest such start marker.  Choosing the nearest start keeps
//! [`replace`] idempotent even when the user text contains a stray start
//! marker.

use std::ops::Range;

use super::config_map::{to_document, ConfigMap};

/// Name of the script hook that merges values into the config map.
pub const SETTER_HOOK: &str = "set_config";

/// Name of the script hook that registers a profile.
pub const PROFILE_HOOK: &str = "set_profile";

/// Text written before the serialized map.
pub const SECTION_START: &str = "// @@@AUTOGENERATED SECTION, DON'T EDIT@@@\nset_config(\n";

/// Text written after the serialized map.
pub const SECTION_END: &str = "\n);\n// @@@/AUTOGENERATED SECTION@@@";

const START_TAG: &str = "@@@AUTOGENERATED";
const END_TAG: &str = "@@@/AUTOGENERATED";
const TAG_CLOSE: &str = "@@@";

/// Location of an autogenerated section inside a text buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Byte range of the whole section, markers included.
    pub span: Range<usize>,
    /// Byte range between the start marker's line break and the end marker.
    pub body: Range<usize>,
}

/// A marker occurrence; `end` is just past its closing `@@@`.
#[derive(Debug, Clone, Copy)]
struct Marker {
    start: usize,
    end: usize,
}

/// Finds the first autogenerated section in `text`.
pub fn locate(text: &str) -> Option<Section> {
    let starts: Vec<(Marker, usize)> = markers(text, START_TAG)
        .filter_map(|m| line_break_after(text, m.end).map(|body_start| (m, body_start)))
        .collect();

    markers(text, END_TAG).find_map(|end| {
        starts
            .iter()
            .rev()
            .find(|(_, body_start)| *body_start <= end.start)
            .map(|(start, body_start)| Section {
                span: start.start..end.end,
                body: *body_start..end.start,
            })
    })
}

/// Renders a complete section holding `config`.
///
/// The map is pretty-printed JSON with a 2-space indent.  Every `@@@` inside
/// the JSON (only possible within strings) is written as `@@\u0040`, which
/// parses back to the same string but can never be mistaken for a marker.
pub fn render(config: &ConfigMap) -> String {
    let json = to_document(config).replace(TAG_CLOSE, "@@\\u0040");
    let mut out = String::with_capacity(SECTION_START.len() + json.len() + SECTION_END.len());
    out.push_str(SECTION_START);
    out.push_str(&json);
    out.push_str(SECTION_END);
    out
}

/// Returns `text` with its autogenerated section replaced by a fresh
/// rendering of `config`.
///
/// Bytes outside the section are untouched.  Without a section, one is
/// appended after a newline: `text + "\n" + section + "\n"`.
pub fn replace(text: &str, config: &ConfigMap) -> String {
    let section = render(config);
    match locate(text) {
        Some(found) => {
            let mut out = String::with_capacity(text.len() - found.span.len() + section.len());
            out.push_str(&text[..found.span.start]);
            out.push_str(&section);
            out.push_str(&text[found.span.end..]);
            out
        }
        None => format!("{text}\n{section}\n"),
    }
}

/// Parses the JSON payload of a located section.
///
/// Returns `None` unless the body has the exact shape [`render`] produces,
/// `set_config( <json object> );`.  Hand-edited bodies are left for the
/// script engine to evaluate as written.
pub fn payload(text: &str, section: &Section) -> Option<ConfigMap> {
    let body = text.get(section.body.clone())?.trim();
    let call = body.strip_prefix(SETTER_HOOK)?.trim_start().strip_prefix('(')?;
    let call = call.trim_end();
    let call = call.strip_suffix(';').unwrap_or(call).trim_end();
    let json = call.strip_suffix(')')?;
    serde_json::from_str(json).ok()
}

/// Iterates over every marker carrying `tag`, in text order.
fn markers<'a>(text: &'a str, tag: &'a str) -> impl Iterator<Item = Marker> + 'a {
    let mut from = 0;
    std::iter::from_fn(move || {
        while let Some(offset) = text.get(from..)?.find("//") {
            let at = from + offset;
            from = at + 1;
            if let Some(marker) = marker_at(text, at, tag) {
                return Some(marker);
            }
        }
        None
    })
}

/// Matches `//`, whitespace, `tag`, then the rest of the line up to `@@@`.
fn marker_at(text: &str, at: usize, tag: &str) -> Option<Marker> {
    let rest = text[at..].strip_prefix("//")?.trim_start();
    let tag_start = text.len() - rest.len();
    let after_tag = rest.strip_prefix(tag)?;
    let line = after_tag.split('\n').next().unwrap_or_default();
    let close = line.find(TAG_CLOSE)?;
    Some(Marker {
        start: at,
        end: tag_start + tag.len() + close + TAG_CLOSE.len(),
    })
}

/// Position just past the first newline in the whitespace run at `at`.
fn line_break_after(text: &str, at: usize) -> Option<usize> {
    let rest = &text[at..];
    let ws_len = rest.len() - rest.trim_start().len();
    rest[..ws_len].find('\n').map(|i| at + i + 1)
}
