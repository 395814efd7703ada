//! Directory-tree containment between watch paths.
//!
//! Comparisons are component-wise, so `/proj` contains `/proj/sub` but not
//! `/project`. Paths are normalized lexically; symlinks are not resolved here
//! (callers canonicalize before sending a request).

use std::path::{Component, Path, PathBuf};

/// Lexically normalize `path`: drop `.` components, fold `..` into the
/// preceding component and strip trailing separators.
///
/// `..` never climbs above the root of an absolute path.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(out.components().next_back(), Some(Component::Normal(_)))
                    && out.pop();
                if !popped && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// `true` if `ancestor` is `descendant` or one of its ancestors.
pub fn contains(ancestor: &Path, descendant: &Path) -> bool {
    normalize(descendant).starts_with(normalize(ancestor))
}

/// `true` if `ancestor` strictly contains `descendant` (they are not equal).
pub fn strictly_contains(ancestor: &Path, descendant: &Path) -> bool {
    let ancestor = normalize(ancestor);
    let descendant = normalize(descendant);
    ancestor != descendant && descendant.starts_with(&ancestor)
}
