//! Extraction of structured fields from raw model output.
//!
//! Models wrap their answer in commentary, echo the prompt's example object,
//! or emit several attempts. The parser normalizes the text, drops anything
//! before the preamble marker, then scans for `{ ... }` spans and keeps the
//! last one that decodes to a complete record. Failures are returned as
//! [`ParseFailure`] values and logged together with the raw text; nothing
//! here returns an error to the caller.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use contentfill_shared::DEFAULT_PREAMBLE_MARKER;

/// Quote characters stripped from both ends of a generated title.
const TITLE_QUOTES: &[char] = &['"', '\'', '`', '\u{201C}', '\u{201D}', '\u{2018}', '\u{2019}'];

/// The three fields requested by the description prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFields {
    pub title: String,
    pub description: String,
    pub category: String,
}

/// Why a response was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseFailure {
    /// Nothing but whitespace came back.
    EmptyResponse,
    /// No span decoded to a JSON object.
    NoObject,
    /// Objects were found but none carried this field as a non-blank string.
    MissingField(&'static str),
}

impl std::fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyResponse => write!(f, "response is empty"),
            Self::NoObject => write!(f, "no JSON object found in response"),
            Self::MissingField(field) => write!(f, "missing or blank field '{field}'"),
        }
    }
}

/// Parser for generation responses.
#[derive(Debug, Clone)]
pub struct ResponseParser {
    preamble_marker: String,
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new(DEFAULT_PREAMBLE_MARKER)
    }
}

impl ResponseParser {
    pub fn new(preamble_marker: impl Into<String>) -> Self {
        Self {
            preamble_marker: preamble_marker.into(),
        }
    }

    /// Extract `Title`, `Description` and `Category` from a raw answer.
    ///
    /// When several objects are present, the last complete one wins.
    pub fn parse(&self, raw: &str) -> Result<ParsedFields, ParseFailure> {
        let Some(text) = self.normalize(raw) else {
            warn!("response is empty");
            return Err(ParseFailure::EmptyResponse);
        };
        debug!(raw, "parsing structured response");

        let objects = scan_objects(&text);
        if objects.is_empty() {
            warn!(raw, "could not extract a JSON object from response");
            return Err(ParseFailure::NoObject);
        }

        let mut last_failure = ParseFailure::NoObject;
        for object in objects.iter().rev() {
            match extract_fields(object) {
                Ok(fields) => {
                    debug!(title = %fields.title, category = %fields.category, "parsed response");
                    return Ok(fields);
                }
                Err(failure) => {
                    if last_failure == ParseFailure::NoObject {
                        last_failure = failure;
                    }
                }
            }
        }

        warn!(raw, reason = %last_failure, "response has no complete record");
        Err(last_failure)
    }

    /// Clean a plain-text title answer.
    ///
    /// Takes the first non-blank line, strips surrounding quotes, hard-cuts
    /// it to `max_chars` characters and re-trims trailing whitespace.
    pub fn parse_title(&self, raw: &str, max_chars: usize) -> Result<String, ParseFailure> {
        let Some(text) = self.normalize(raw) else {
            warn!("title response is empty");
            return Err(ParseFailure::EmptyResponse);
        };

        let line = text
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or_default();
        let unquoted = line.trim_matches(TITLE_QUOTES).trim();

        if unquoted.is_empty() {
            warn!(raw, "title response has no usable text");
            return Err(ParseFailure::MissingField("Title"));
        }

        Ok(truncate_chars(unquoted, max_chars))
    }

    /// Normalize line endings, trim, and drop any preamble.
    /// Returns `None` when nothing is left.
    fn normalize(&self, raw: &str) -> Option<String> {
        let text = raw.replace("\r\n", "\n");
        let mut text = text.trim();

        if !self.preamble_marker.is_empty() {
            if let Some((_, rest)) = text.split_once(self.preamble_marker.as_str()) {
                text = rest.trim();
            }
        }

        (!text.is_empty()).then(|| text.to_string())
    }
}

/// Hard-cut `text` to at most `max_chars` characters, then trim the end.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => text[..cut].trim_end().to_string(),
        None => text.to_string(),
    }
}

/// Decode every `{ ... }` span, scanning left to right.
///
/// A span runs from the first `{` after the cursor to the first `}` after
/// it. Spans that do not decode to an object are skipped; the cursor always
/// moves past the span's end.
fn scan_objects(text: &str) -> Vec<Map<String, Value>> {
    let mut objects = Vec::new();
    let mut cursor = 0;

    while let Some(open) = text[cursor..].find('{').map(|i| cursor + i) {
        let Some(close) = text[open..].find('}').map(|i| open + i) else {
            break;
        };
        let span = &text[open..=close];

        match serde_json::from_str::<Value>(span) {
            Ok(Value::Object(map)) => objects.push(map),
            Ok(_) => {}
            Err(e) => debug!(error = %e, span, "skipping undecodable span"),
        }
        cursor = close + 1;
    }

    objects
}

fn extract_fields(object: &Map<String, Value>) -> Result<ParsedFields, ParseFailure> {
    Ok(ParsedFields {
        title: required(object, "Title")?,
        description: required(object, "Description")?,
        category: required(object, "Category")?,
    })
}

fn required(object: &Map<String, Value>, key: &'static str) -> Result<String, ParseFailure> {
    object
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(String::from)
        .ok_or(ParseFailure::MissingField(key))
}
