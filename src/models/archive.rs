//! Archive naming convention and records.
//!
//! Archives live in a flat directory and are named
//! `<label>_<YYYYMMDD>_<HHMMSS>.<ext>`. Anything that does not match the
//! convention is invisible to enumeration.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Extensions accepted by the naming convention.
const ACCEPTED_EXTENSIONS: &[&str] = &["zip", "tar.gz", "gz", "bz2", "7z", "xz"];

/// A local archive file that matched the naming convention.
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveRecord {
    pub file_name: String,
    pub size: u64,
}

/// Build a fresh timestamped archive name for `label`.
///
/// A new name is derived from the current timestamp on every call so an
/// existing archive is never overwritten.
pub fn archive_name(label: &str, now: DateTime<Utc>) -> String {
    format!("{}_{}.zip", label, now.format("%Y%m%d_%H%M%S"))
}

/// Whether `label` may appear before the timestamp in an archive name.
pub fn is_valid_label(label: &str) -> bool {
    !label.is_empty()
        && label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Whether `name` matches `<label>_<YYYYMMDD>_<HHMMSS>.<ext>`.
pub fn matches_convention(name: &str) -> bool {
    let Some(stem) = ACCEPTED_EXTENSIONS
        .iter()
        .find_map(|e| name.strip_suffix(&format!(".{e}")))
    else {
        return false;
    };

    // stem must end in _YYYYMMDD_HHMMSS with a non-empty label before it
    let mut parts = stem.rsplitn(3, '_');
    let (Some(hms), Some(ymd), Some(label)) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    if label.is_empty() || !is_valid_label(label) {
        return false;
    }
    ymd.len() == 8
        && ymd.chars().all(|c| c.is_ascii_digit())
        && hms.len() == 6
        && hms.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_conventional_names() {
        assert!(matches_convention("server_20240101_010101.zip"));
        assert!(matches_convention("pre-restore_20241231_235959.zip"));
        assert!(matches_convention("world_backup_20240704_120000.tar.gz"));
        assert!(matches_convention("a_20240101_010101.xz"));
    }

    #[test]
    fn rejects_non_conventional_names() {
        assert!(!matches_convention("server.zip"));
        assert!(!matches_convention("server_2024_010101.zip"));
        assert!(!matches_convention("server_20240101_0101.zip"));
        assert!(!matches_convention("_20240101_010101.zip"));
        assert!(!matches_convention("server_20240101_010101.rar"));
        assert!(!matches_convention("server_20240101_010101"));
        assert!(!matches_convention("bad name_20240101_010101.zip"));
    }

    #[test]
    fn fresh_names_carry_the_timestamp() {
        let now = DateTime::parse_from_rfc3339("2024-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(archive_name("server", now), "server_20240102_030405.zip");
        assert!(matches_convention(&archive_name("server", now)));
    }
}
