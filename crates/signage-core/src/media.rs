//! Media classification and naming for uploaded content.

use uuid::Uuid;

use signage_types::models::ContentKind;

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

pub fn extension(file_name: &str) -> Option<String> {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .filter(|ext| !ext.is_empty())
}

/// Classify an upload from its MIME type, falling back to the extension for HTML.
pub fn classify(content_type: Option<&str>, file_name: &str) -> ContentKind {
    let content_type = content_type.unwrap_or(DEFAULT_CONTENT_TYPE).to_lowercase();

    if content_type.starts_with("image/") {
        ContentKind::Image
    } else if content_type.starts_with("video/") {
        ContentKind::Video
    } else if content_type == "application/pdf" {
        ContentKind::Document
    } else if extension(file_name).as_deref() == Some("html") {
        ContentKind::Html
    } else {
        ContentKind::Other
    }
}

/// Human readable size, 1024 based, one decimal.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

/// Storage object name: `<unix-millis>-<id>-<file name>` with path-unsafe characters replaced.
/// The id keeps same-named uploads in the same millisecond apart.
pub fn object_name(unix_millis: i64, id: Uuid, file_name: &str) -> String {
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    let cleaned = if cleaned.is_empty() { "upload" } else { cleaned };
    format!("{}-{}-{}", unix_millis, id.simple(), cleaned)
}
