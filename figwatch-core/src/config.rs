//! Per-user configuration directory.
//!
//! # Layout
//!
//! ```text
//! ~/.figwatch/
//!   template.svg      (copied by `figwatch create`)
//!   run/              (pid record + daemon socket)
//!   logs/             (daemon stdout / stderr sinks)
//! ```
//!
//! Every function that touches the filesystem has two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{io_err, FigwatchError};

/// Bundled template written on first init.
pub const DEFAULT_TEMPLATE: &str = include_str!("../assets/template.svg");

pub const TEMPLATE_FILE: &str = "template.svg";

// ---------------------------------------------------------------------------
// Path helpers (pure)
// ---------------------------------------------------------------------------

/// `<home>/.figwatch`
pub fn figwatch_root(home: &Path) -> PathBuf {
    home.join(".figwatch")
}

/// `<home>/.figwatch/template.svg`
pub fn template_path(home: &Path) -> PathBuf {
    figwatch_root(home).join(TEMPLATE_FILE)
}

/// The current user's home directory.
pub fn home() -> Result<PathBuf, FigwatchError> {
    dirs::home_dir().ok_or(FigwatchError::HomeNotFound)
}

// ---------------------------------------------------------------------------
// Bootstrapping
// ---------------------------------------------------------------------------

/// Create `~/.figwatch/` and write the default template if none exists.
///
/// Idempotent: an existing template is never overwritten, so users can
/// replace it with their own.
pub fn ensure_init_at(home: &Path) -> Result<PathBuf, FigwatchError> {
    let root = figwatch_root(home);
    if !root.is_dir() {
        fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;
        tracing::debug!(path = %root.display(), "created config directory");
    }

    let template = template_path(home);
    if !template.is_file() {
        fs::write(&template, DEFAULT_TEMPLATE).map_err(|e| io_err(&template, e))?;
        tracing::debug!(path = %template.display(), "wrote default figure template");
    }

    Ok(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn ensure_init_creates_root_and_template() {
        let home = TempDir::new().expect("home");
        let root = ensure_init_at(home.path()).expect("init");

        assert_eq!(root, home.path().join(".figwatch"));
        let template = fs::read_to_string(template_path(home.path())).expect("template");
        assert_eq!(template, DEFAULT_TEMPLATE);
    }

    #[test]
    fn ensure_init_keeps_user_template() {
        let home = TempDir::new().expect("home");
        fs::create_dir_all(figwatch_root(home.path())).expect("mkdir");
        fs::write(template_path(home.path()), "<svg>custom</svg>").expect("write");

        ensure_init_at(home.path()).expect("init");
        ensure_init_at(home.path()).expect("second init");

        let template = fs::read_to_string(template_path(home.path())).expect("template");
        assert_eq!(template, "<svg>custom</svg>");
    }
}
