//! Destination naming.
//!
//! # Responsibilities
//! - Flatten a request path into a single file-name component
//! - Combine remote endpoint, flattened path and sequence number
//!
//! # Design Decisions
//! - Purely lexical: no filesystem access happens here
//! - Sequence numbers are zero-padded to six digits so names sort in
//!   allocation order; larger numbers simply grow wider

use std::fmt;

/// Character substituted for path separators.
const SEPARATOR_SUBSTITUTE: char = '_';

/// Minimum width of the sequence number component.
const SEQUENCE_WIDTH: usize = 6;

/// A file name under the output directory, derived from
/// `(remote endpoint, request path, sequence number)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DestinationName(String);

impl DestinationName {
    /// Build the candidate name for the given sequence number.
    pub fn new(remote: &str, path: &str, sequence: u64) -> Self {
        Self(format!(
            "{}_{}_{:0width$}",
            remote.replace('/', "_"),
            flatten_path(path),
            sequence,
            width = SEQUENCE_WIDTH,
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DestinationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<std::path::Path> for DestinationName {
    fn as_ref(&self) -> &std::path::Path {
        std::path::Path::new(&self.0)
    }
}

/// Clean `path`, drop the leading `/` and replace the remaining separators.
///
/// `/a/b/c` becomes `a_b_c`, `/` becomes the empty string.
pub fn flatten_path(path: &str) -> String {
    let cleaned = clean_path(path);
    cleaned
        .strip_prefix('/')
        .unwrap_or(&cleaned)
        .replace('/', &SEPARATOR_SUBSTITUTE.to_string())
}

/// Lexically normalize a slash-separated path.
///
/// Repeated separators and `.` segments are dropped, `..` removes the
/// preceding segment, and a rooted path never climbs above `/`. An empty
/// result is `.` (or `/` when rooted).
pub fn clean_path(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }

    let rooted = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(last) if *last != ".." => {
                    segments.pop();
                }
                _ if rooted => {}
                _ => segments.push(".."),
            },
            other => segments.push(other),
        }
    }

    let joined = segments.join("/");
    if rooted {
        format!("/{}", joined)
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}
