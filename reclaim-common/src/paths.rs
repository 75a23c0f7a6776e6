//! Lexical path containment.
//!
//! Project roots and working directories arrive as operator-supplied strings
//! with mixed separators and redundant segments (`./`, `a/../`). Classification
//! here is purely lexical and never touches the filesystem, so a directory that
//! was already removed by an earlier cleanup can still be classified.

use std::borrow::Cow;
use std::path::Path;

type Rule = fn(&str) -> Option<String>;

/// Rewrite rules, tried in order. One rule firing can re-enable an earlier
/// one, so [`normalize_path`] restarts from the top after every rewrite.
const RULES: [Rule; 7] = [
    backslashes,
    drive_prefix,
    parent_segments,
    leading_dot,
    inner_dot,
    trailing_dot,
    trailing_slash,
];

/// Normalize a path string to its fixed point under the rewrite rules.
///
/// - `\` becomes `/`
/// - a leading `C:` drive prefix becomes `/C`
/// - `name/..` pairs are removed
/// - leading `./`, inner `/./`, trailing `/.` and trailing `/` are dropped
///
/// The lone root `/` is preserved. Already-normalized input is returned as-is.
pub fn normalize_path(path: &str) -> String {
    let mut current = path.to_string();
    while let Some(next) = RULES.iter().find_map(|rule| rule(&current)) {
        current = next;
    }
    current
}

/// Whether `child` is the same directory as `parent` or nested below it.
///
/// Both sides are normalized first. A relative path is never considered to be
/// inside an absolute one (or vice versa), since answering that would require
/// resolving against the process working directory.
pub fn is_directory_or_subdirectory(parent: &str, child: &str) -> bool {
    let parent = normalize_path(parent);
    let child = normalize_path(child);
    if parent == child {
        return true;
    }

    let parent = LexicalPath::parse(&parent);
    let child = LexicalPath::parse(&child);
    if parent.absolute != child.absolute {
        return false;
    }

    let shared = parent
        .segments
        .iter()
        .zip(&child.segments)
        .take_while(|(a, b)| a == b)
        .count();

    // Anything left over on the parent side means the relative path climbs out.
    if shared < parent.segments.len() {
        return false;
    }

    match child.segments.get(shared) {
        Some(first) => *first != "..",
        // Same segments, different spelling (`a//b` vs `a/b`).
        None => true,
    }
}

/// [`is_directory_or_subdirectory`] for `Path` values.
pub fn path_contains(parent: &Path, child: &Path) -> bool {
    is_directory_or_subdirectory(&lossy(parent), &lossy(child))
}

pub(crate) fn lossy(path: &Path) -> Cow<'_, str> {
    path.to_string_lossy()
}

struct LexicalPath<'a> {
    absolute: bool,
    segments: Vec<&'a str>,
}

impl<'a> LexicalPath<'a> {
    fn parse(normalized: &'a str) -> Self {
        Self {
            absolute: normalized.starts_with('/'),
            segments: normalized
                .split('/')
                .filter(|segment| !segment.is_empty() && *segment != ".")
                .collect(),
        }
    }
}

fn is_named_segment(segment: &str) -> bool {
    !segment.is_empty() && segment != "." && segment != ".."
}

/// Rewrites that empty an absolute path must leave the root behind.
fn keep_root(rewritten: String, original: &str) -> String {
    if rewritten.is_empty() && original.starts_with('/') {
        "/".to_string()
    } else {
        rewritten
    }
}

fn backslashes(path: &str) -> Option<String> {
    path.contains('\\').then(|| path.replace('\\', "/"))
}

fn drive_prefix(path: &str) -> Option<String> {
    let bytes = path.as_bytes();
    match bytes {
        [drive, b':', ..] if drive.is_ascii_alphabetic() => {
            Some(format!("/{}{}", &path[..1], &path[2..]))
        }
        _ => None,
    }
}

fn parent_segments(path: &str) -> Option<String> {
    let mut segments: Vec<&str> = path.split('/').collect();
    let index = segments
        .windows(2)
        .position(|pair| is_named_segment(pair[0]) && pair[1] == "..")?;
    segments.drain(index..index + 2);
    Some(keep_root(segments.join("/"), path))
}

fn leading_dot(path: &str) -> Option<String> {
    path.strip_prefix("./").map(str::to_string)
}

fn inner_dot(path: &str) -> Option<String> {
    path.contains("/./").then(|| path.replace("/./", "/"))
}

fn trailing_dot(path: &str) -> Option<String> {
    path.strip_suffix("/.")
        .map(|stripped| keep_root(stripped.to_string(), path))
}

fn trailing_slash(path: &str) -> Option<String> {
    if path.len() > 1 {
        path.strip_suffix('/').map(str::to_string)
    } else {
        None
    }
}
