//! Centralized input validation for all objstore entry points.
//!
//! The facade and both reference backends funnel every caller-supplied key,
//! backend name, and prefix through these checks before touching storage,
//! so path traversal and injection attempts are rejected at a single choke
//! point. All functions here are pure and allocation-light; they run on
//! every call.

use std::collections::HashMap;

use crate::{Error, Result};

/// Maximum allowed length for object keys, in bytes.
pub const MAX_KEY_LENGTH: usize = 1024;

/// Maximum allowed length for backend names, in bytes.
pub const MAX_BACKEND_NAME_LENGTH: usize = 64;

/// Maximum allowed length for a key reference: backend name, colon, key.
pub const MAX_KEY_REFERENCE_LENGTH: usize = MAX_BACKEND_NAME_LENGTH + 1 + MAX_KEY_LENGTH;

/// Maximum number of custom metadata entries per object.
pub const MAX_METADATA_ENTRIES: usize = 100;

/// Maximum allowed length for custom metadata keys, in bytes.
pub const MAX_METADATA_KEY_LENGTH: usize = 256;

/// Maximum allowed length for custom metadata values, in bytes.
pub const MAX_METADATA_VALUE_LENGTH: usize = 2048;

/// Maximum length of a user-supplied string in a log line, in characters.
const MAX_LOG_LENGTH: usize = 1000;

fn validation_error(field: &'static str, message: impl Into<String>) -> Error {
    Error::Validation {
        field,
        message: message.into(),
    }
}

fn is_control(c: char) -> bool {
    (c as u32) < 32 || c as u32 == 127
}

/// Validates an object key.
///
/// Rejects empty keys, null bytes, over-long keys, absolute paths, parent
/// directory traversal (`..` as a path component), control characters, and
/// any character outside `[A-Za-z0-9_.\-/]`.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(validation_error("key", "key cannot be empty"));
    }

    if key.contains('\0') {
        return Err(validation_error("key", "key contains null byte"));
    }

    // Length check before the per-character scan to bound work on hostile input
    if key.len() > MAX_KEY_LENGTH {
        return Err(validation_error(
            "key",
            format!("key too long (max {MAX_KEY_LENGTH} characters)"),
        ));
    }

    if key.starts_with('/') {
        return Err(validation_error("key", "key cannot be an absolute path"));
    }

    // ".." is only a traversal when it forms a whole path component;
    // "file..txt" is allowed.
    if key == ".."
        || key.starts_with("../")
        || key.ends_with("/..")
        || key.contains("/../")
    {
        return Err(validation_error(
            "key",
            "key contains path traversal attempt",
        ));
    }

    for c in key.chars() {
        if is_control(c) {
            return Err(validation_error("key", "key contains control characters"));
        }
        if !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | '/')) {
            return Err(validation_error(
                "key",
                "key contains invalid characters (allowed: a-z, A-Z, 0-9, -, _, ., /)",
            ));
        }
    }

    Ok(())
}

/// Validates a backend name.
///
/// Backend names are simple lowercase identifiers: `[a-z0-9-]{1,64}`.
pub fn validate_backend_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(validation_error("backend", "backend name cannot be empty"));
    }

    if name.contains('\0') {
        return Err(validation_error("backend", "backend name contains null byte"));
    }

    if name.len() > MAX_BACKEND_NAME_LENGTH {
        return Err(validation_error(
            "backend",
            format!("backend name too long (max {MAX_BACKEND_NAME_LENGTH} characters)"),
        ));
    }

    for c in name.chars() {
        if is_control(c) {
            return Err(validation_error(
                "backend",
                "backend name contains control characters",
            ));
        }
        if !(c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
            return Err(validation_error(
                "backend",
                "backend name contains invalid characters (allowed: a-z, 0-9, -)",
            ));
        }
    }

    Ok(())
}

/// Validates a key reference of the form `backend:key` or a bare `key`.
pub fn validate_key_reference(key_ref: &str) -> Result<()> {
    if key_ref.is_empty() {
        return Err(validation_error(
            "key_reference",
            "key reference cannot be empty",
        ));
    }

    if key_ref.contains('\0') {
        return Err(validation_error(
            "key_reference",
            "key reference contains null byte",
        ));
    }

    if key_ref.len() > MAX_KEY_REFERENCE_LENGTH {
        return Err(validation_error(
            "key_reference",
            format!("key reference too long (max {MAX_KEY_REFERENCE_LENGTH} characters)"),
        ));
    }

    if key_ref.chars().any(is_control) {
        return Err(validation_error(
            "key_reference",
            "key reference contains control characters",
        ));
    }

    match key_ref.split_once(':') {
        Some((backend, key)) => {
            validate_backend_name(backend)?;
            validate_key(key)
        }
        None => validate_key(key_ref),
    }
}

/// Splits a key reference into its optional backend name and bare key.
///
/// `"secondary:logs/a.txt"` parses to `(Some("secondary"), "logs/a.txt")`;
/// a bare key parses to `(None, key)`. Splits on the first colon only.
pub fn parse_key_reference(key_ref: &str) -> (Option<&str>, &str) {
    match key_ref.split_once(':') {
        Some((backend, key)) => (Some(backend), key),
        None => (None, key_ref),
    }
}

/// Validates a list prefix. Same rules as keys, except an empty prefix is
/// valid and means "match everything".
pub fn validate_prefix(prefix: &str) -> Result<()> {
    if prefix.is_empty() {
        return Ok(());
    }
    validate_key(prefix)
}

/// Validates caller-supplied custom metadata entries.
pub fn validate_metadata(custom: &HashMap<String, String>) -> Result<()> {
    if custom.len() > MAX_METADATA_ENTRIES {
        return Err(validation_error(
            "metadata",
            format!("metadata cannot have more than {MAX_METADATA_ENTRIES} entries"),
        ));
    }

    for (key, value) in custom {
        if key.is_empty() {
            return Err(validation_error("metadata", "metadata key cannot be empty"));
        }
        if key.len() > MAX_METADATA_KEY_LENGTH {
            return Err(validation_error(
                "metadata",
                format!("metadata key exceeds maximum length of {MAX_METADATA_KEY_LENGTH} bytes"),
            ));
        }
        if key.contains('\0') || value.contains('\0') {
            return Err(validation_error(
                "metadata",
                "metadata cannot contain null bytes",
            ));
        }
        if value.len() > MAX_METADATA_VALUE_LENGTH {
            return Err(validation_error(
                "metadata",
                format!(
                    "metadata value exceeds maximum length of {MAX_METADATA_VALUE_LENGTH} bytes"
                ),
            ));
        }
    }

    Ok(())
}

/// Sanitizes a string for safe logging.
///
/// Strips control characters and null bytes (prevents log injection) and
/// truncates to a bounded length (prevents log flooding).
pub fn sanitize_for_log(s: &str) -> String {
    let mut cleaned: String = s.chars().filter(|c| !is_control(*c)).collect();

    if cleaned.chars().count() > MAX_LOG_LENGTH {
        cleaned = cleaned.chars().take(MAX_LOG_LENGTH).collect();
        cleaned.push_str("...[truncated]");
    }

    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_invalid(result: Result<()>) {
        assert!(matches!(result, Err(Error::Validation { .. })));
    }

    #[test]
    fn test_validate_key_accepts_safe_keys() {
        for key in [
            "a",
            "logs/2024/01/app.log",
            "file..txt",
            "dir.with.dots/file-name_1.bin",
            "UPPER/lower/123",
        ] {
            assert!(validate_key(key).is_ok(), "expected {key:?} to be valid");
        }
    }

    #[test]
    fn test_validate_key_rejects_empty_and_null() {
        assert_invalid(validate_key(""));
        assert_invalid(validate_key("a\0b"));
    }

    #[test]
    fn test_validate_key_rejects_long_keys() {
        let long_key = "a".repeat(MAX_KEY_LENGTH);
        assert!(validate_key(&long_key).is_ok());
        let too_long = "a".repeat(MAX_KEY_LENGTH + 1);
        assert_invalid(validate_key(&too_long));
    }

    #[test]
    fn test_validate_key_rejects_absolute_paths() {
        assert_invalid(validate_key("/etc/passwd"));
    }

    #[test]
    fn test_validate_key_rejects_traversal() {
        for key in ["..", "../etc/passwd", "a/../b", "a/b/..", "a/../../b"] {
            assert_invalid(validate_key(key));
        }
        // ".." embedded in a file name is not traversal
        assert!(validate_key("backup..2024.tar").is_ok());
    }

    #[test]
    fn test_validate_key_rejects_control_and_unsafe_chars() {
        assert_invalid(validate_key("a\nb"));
        assert_invalid(validate_key("a\tb"));
        assert_invalid(validate_key("a b"));
        assert_invalid(validate_key("a*b"));
        assert_invalid(validate_key("a:b"));
        assert_invalid(validate_key("a\\b"));
    }

    #[test]
    fn test_validate_backend_name() {
        assert!(validate_backend_name("local").is_ok());
        assert!(validate_backend_name("archive-2").is_ok());

        assert_invalid(validate_backend_name(""));
        assert_invalid(validate_backend_name("Local"));
        assert_invalid(validate_backend_name("my_backend"));
        assert_invalid(validate_backend_name("a\0b"));
        assert_invalid(validate_backend_name(&"a".repeat(65)));
    }

    #[test]
    fn test_validate_key_reference() {
        assert!(validate_key_reference("logs/app.log").is_ok());
        assert!(validate_key_reference("secondary:logs/app.log").is_ok());

        assert_invalid(validate_key_reference(""));
        assert_invalid(validate_key_reference("BAD:key"));
        assert_invalid(validate_key_reference("backend:../escape"));
        assert_invalid(validate_key_reference("backend:"));

        let max_ref = format!("{}:{}", "b".repeat(64), "k".repeat(1024));
        assert!(validate_key_reference(&max_ref).is_ok());
        let too_long = format!("{}:{}", "b".repeat(64), "k".repeat(1025));
        assert_invalid(validate_key_reference(&too_long));
    }

    #[test]
    fn test_parse_key_reference() {
        assert_eq!(
            parse_key_reference("secondary:a/b.txt"),
            (Some("secondary"), "a/b.txt")
        );
        assert_eq!(parse_key_reference("a/b.txt"), (None, "a/b.txt"));
        // Splits on the first colon only
        assert_eq!(parse_key_reference("b:k:v"), (Some("b"), "k:v"));
    }

    #[test]
    fn test_validate_prefix_allows_empty() {
        assert!(validate_prefix("").is_ok());
        assert!(validate_prefix("logs/").is_ok());
        assert_invalid(validate_prefix("../logs"));
    }

    #[test]
    fn test_validate_metadata_limits() {
        let mut ok = HashMap::new();
        ok.insert("owner".to_string(), "team-a".to_string());
        assert!(validate_metadata(&ok).is_ok());

        let mut empty_key = HashMap::new();
        empty_key.insert(String::new(), "v".to_string());
        assert_invalid(validate_metadata(&empty_key));

        let mut long_value = HashMap::new();
        long_value.insert("k".to_string(), "v".repeat(MAX_METADATA_VALUE_LENGTH + 1));
        assert_invalid(validate_metadata(&long_value));

        let mut too_many = HashMap::new();
        for i in 0..=MAX_METADATA_ENTRIES {
            too_many.insert(format!("key-{i}"), "v".to_string());
        }
        assert_invalid(validate_metadata(&too_many));
    }

    #[test]
    fn test_sanitize_for_log() {
        assert_eq!(sanitize_for_log("normal-key"), "normal-key");
        assert_eq!(sanitize_for_log("bad\nkey\x00!"), "badkey!");

        let long = "x".repeat(1500);
        let sanitized = sanitize_for_log(&long);
        assert!(sanitized.ends_with("...[truncated]"));
        assert_eq!(sanitized.chars().count(), 1000 + "...[truncated]".len());
    }
}
