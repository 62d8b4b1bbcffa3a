//! Sanitizing of upstream event content.
//!
//! Event text comes from several upstreams and ends up in HTML-capable
//! views. Before an event leaves the aggregator:
//! - `<script>` blocks, inline `on*=` handlers and `javascript:` URIs are
//!   stripped from title and description, and the remainder is HTML-escaped
//! - sensitive keys are removed from the raw upstream record

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::event::CalendarEvent;

/// `<script ...> ... </script>` blocks, including their content.
static SCRIPT_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<\s*script\b[^>]*>.*?<\s*/\s*script\s*>").expect("Invalid script regex")
});

/// Stray opening or closing script tags left after block removal.
static SCRIPT_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<\s*/?\s*script\b[^>]*>?").expect("Invalid script tag regex")
});

/// Inline event handler attributes such as `onclick="..."`.
static EVENT_HANDLER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\s*\bon[a-z]+\s*=\s*("[^"]*"|'[^']*'|[^\s>]+)"#)
        .expect("Invalid event handler regex")
});

/// `javascript:` URI schemes, tolerating whitespace before the colon.
static JAVASCRIPT_URI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)javascript\s*:").expect("Invalid javascript regex"));

/// Keys removed from raw upstream records, compared after lowercasing and
/// dropping `_` and `-`.
const SENSITIVE_KEYS: &[&str] = &[
    "password",
    "token",
    "authtoken",
    "authcode",
    "accesstoken",
    "refreshtoken",
    "apikey",
    "secret",
    "clientsecret",
    "internalid",
    "nationalid",
    "passportnumber",
];

/// Escapes HTML special characters.
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

/// Strips active content from a piece of event text and escapes the rest.
pub fn sanitize_text(input: &str) -> String {
    let without_blocks = SCRIPT_BLOCK.replace_all(input, "");
    let without_tags = SCRIPT_TAG.replace_all(&without_blocks, "");
    let without_handlers = EVENT_HANDLER.replace_all(&without_tags, "");
    let without_js = JAVASCRIPT_URI.replace_all(&without_handlers, "");
    html_escape(without_js.trim())
}

/// Returns true if a record key names a secret or internal identifier.
pub fn is_sensitive_key(key: &str) -> bool {
    let normalized: String = key
        .chars()
        .filter(|c| *c != '_' && *c != '-')
        .collect::<String>()
        .to_ascii_lowercase();
    SENSITIVE_KEYS.contains(&normalized.as_str())
        || normalized.ends_with("token")
        || normalized.ends_with("secret")
        || normalized.ends_with("password")
}

/// Removes sensitive keys from a JSON value, recursively.
pub fn strip_sensitive(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(key, _)| !is_sensitive_key(key))
                .map(|(key, value)| (key, strip_sensitive(value)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(strip_sensitive).collect()),
        other => other,
    }
}

/// Sanitizes an event's text fields and raw record.
pub fn sanitize_event(mut event: CalendarEvent) -> CalendarEvent {
    event.title = sanitize_text(&event.title);
    event.description = sanitize_text(&event.description);
    event.location = sanitize_text(&event.location);
    event.original_data = strip_sensitive(std::mem::take(&mut event.original_data));
    event
}
