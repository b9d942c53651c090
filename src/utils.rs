//! Utility functions for edition naming, log truncation, and file system checks.
//!
//! This module provides helper functions used throughout the application:
//! - Time classification for edition naming
//! - String truncation for logging
//! - JSON error detection for handling LLM response truncation
//! - File system validation for output directories

use chrono::{Local, NaiveTime, Timelike};
use std::error::Error;
use std::fs as stdfs;
use tokio::fs;
use tracing::{info, instrument};

/// Classify the current local time into morning, afternoon, or evening.
///
/// Used as the edition name of run summary files. See [`edition_for`].
#[instrument]
pub fn time_of_day() -> String {
    let tod = Local::now().time();
    let which = edition_for(tod);
    tracing::debug!(%tod, %which, "Computed time_of_day");
    which.to_string()
}

/// Edition for a time of day:
/// - **Morning**: 00:00 - 08:00
/// - **Afternoon**: 08:00 - 16:00
/// - **Evening**: 16:00 - 24:00
pub fn edition_for(tod: NaiveTime) -> &'static str {
    match tod.hour() {
        0..8 => "morning",
        8..16 => "afternoon",
        _ => "evening",
    }
}

/// Truncate a string for logging purposes.
///
/// Strings longer than `max` characters are cut on a character boundary and
/// get an ellipsis plus the number of dropped characters.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 chars)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        None => s.to_string(),
        Some((cut, _)) => {
            let dropped = s[cut..].chars().count();
            format!("{}…(+{} chars)", &s[..cut], dropped)
        }
    }
}

/// Detect if a serde_json error indicates truncated/incomplete JSON.
///
/// When the LLM response is cut off (e.g., due to token limits), the
/// resulting JSON will fail to parse with an EOF error.
pub fn looks_truncated(e: &serde_json::Error) -> bool {
    use serde_json::error::Category;
    matches!(e.classify(), Category::Eof)
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if it doesn't exist, then performs a write test by
/// creating and immediately deleting a probe file.
///
/// # Errors
///
/// Returns an error if:
/// - The directory cannot be created
/// - The directory is not writable (permission denied, read-only filesystem, etc.)
#[instrument(level = "info", skip_all, fields(path = %path))]
pub async fn ensure_writable_dir(path: &str) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    // Try a small sync write using std fs (simpler error surface)
    let probe_path = format!("{}/..__probe_write__", path.trim_end_matches('/'));
    match stdfs::File::create(&probe_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&probe_path);
            info!("Output directory is writable");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_truncate_for_log_short_string() {
        let s = "Hello, world!";
        assert_eq!(truncate_for_log(s, 100), "Hello, world!");
        assert_eq!(truncate_for_log(s, 13), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.ends_with("…(+400 chars)"));
    }

    #[test]
    fn test_truncate_for_log_multibyte() {
        assert_eq!(truncate_for_log("日本語のテキスト", 3), "日本語…(+5 chars)");
    }

    #[test]
    fn test_edition_boundaries() {
        let at = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap();
        assert_eq!(edition_for(at(0, 0)), "morning");
        assert_eq!(edition_for(at(7, 59)), "morning");
        assert_eq!(edition_for(at(8, 0)), "afternoon");
        assert_eq!(edition_for(at(15, 59)), "afternoon");
        assert_eq!(edition_for(at(16, 0)), "evening");
        assert_eq!(edition_for(at(23, 59)), "evening");
    }

    #[test]
    fn test_looks_truncated() {
        let cut: Result<serde_json::Value, _> = serde_json::from_str(r#"{"field": "value"#);
        assert!(looks_truncated(&cut.unwrap_err()));

        let prose: Result<serde_json::Value, _> = serde_json::from_str("not json");
        assert!(!looks_truncated(&prose.unwrap_err()));
    }

    #[tokio::test]
    async fn test_ensure_writable_dir_creates() {
        let dir = std::env::temp_dir().join(format!("feed_digest_utils_{}/nested", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        ensure_writable_dir(dir.to_str().unwrap()).await.unwrap();
        assert!(dir.is_dir());
    }
}
