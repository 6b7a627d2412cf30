//! Small text and time helpers shared across modules.

/// Trim an optional string, mapping blank values to `None`.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

/// Whether the value looks like an HTTP(S) URL.
pub fn is_http_url(value: &str) -> bool {
    ["http://", "https://"]
        .iter()
        .any(|scheme| value.starts_with(scheme))
}

/// Clamp free-form text (error response bodies, mostly) to one short line.
pub fn compact_text(value: &str) -> String {
    const MAX_CHARS: usize = 180;
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(MAX_CHARS).collect()
}

/// Current Unix timestamp in seconds.
pub fn unix_timestamp_now() -> i64 {
    chrono::Utc::now().timestamp()
}
