//! Object path conventions.
//!
//! Two path shapes exist in a bucket:
//!
//! - chunk objects: `{sessionId}/{chunkNumber}` (1-based), written while a
//!   session is in flight and deleted after merge or by the stale-chunk sweep;
//! - final objects: `{folderPath}/{YYYY}/{MM}/{DD}/{contentHash}/{fileName}`,
//!   written once by compose. Date partitioning bounds per-directory object
//!   counts; the content hash sits second-to-last so it can be recovered from
//!   the path alone, without a catalog lookup.
//!
//! The reconciler tells the two shapes apart purely by pattern, so both
//! builders and predicates live here in one place.

use std::sync::OnceLock;

use chrono::{DateTime, Datelike, Utc};
use regex::Regex;

fn final_path_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // folder (one or more segments) / YYYY / MM / DD / hash / filename
        Regex::new(r"^(?:[^/]+/)+\d{4}/\d{2}/\d{2}/[0-9a-fA-F]{8,128}/[^/]+$")
            .expect("final path pattern is valid")
    })
}

fn chunk_path_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[^/]+/[1-9]\d*$").expect("chunk path pattern is valid")
    })
}

/// Store path of one chunk object. Chunk numbers are 1-based.
pub fn chunk_object_path(session_id: &str, chunk_number: i32) -> String {
    format!("{}/{}", session_id, chunk_number)
}

/// Deterministic final object path for the given date.
pub fn final_object_path_on(
    date: DateTime<Utc>,
    folder_path: &str,
    content_hash: &str,
    file_name: &str,
) -> String {
    format!(
        "{}/{:04}/{:02}/{:02}/{}/{}",
        folder_path.trim_matches('/'),
        date.year(),
        date.month(),
        date.day(),
        content_hash,
        file_name
    )
}

/// Final object path dated today.
pub fn final_object_path(folder_path: &str, content_hash: &str, file_name: &str) -> String {
    final_object_path_on(Utc::now(), folder_path, content_hash, file_name)
}

/// Recover the content hash embedded in a final object path (second-to-last
/// segment). Returns `None` when the path does not follow the final-object
/// convention.
pub fn extract_content_hash(path: &str) -> Option<&str> {
    if !is_final_object_path(path) {
        return None;
    }
    let mut parts = path.rsplit('/');
    parts.next()?;
    parts.next()
}

/// Whether a path follows the final-object naming convention.
pub fn is_final_object_path(path: &str) -> bool {
    final_path_pattern().is_match(path)
}

/// Whether a path follows the chunk-object naming convention.
pub fn is_chunk_object_path(path: &str) -> bool {
    chunk_path_pattern().is_match(path)
}
