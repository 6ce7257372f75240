//! Path sanitization for persistence operations.

use crate::error::IndexError;

const FILE_SCHEME: &str = "file://";

/// Strip a leading `file://` scheme and reject any path containing `..`.
///
/// This is a conservative traversal guard, not a canonicalization: a path is
/// rejected whenever the two-character sequence appears anywhere in it.
pub fn sanitize_path(path: &str) -> Result<&str, IndexError> {
    let stripped = path.strip_prefix(FILE_SCHEME).unwrap_or(path);
    if stripped.contains("..") {
        return Err(IndexError::SecurityViolation(path.to_string()));
    }
    Ok(stripped)
}
