//! Figure files: naming, recognition and discovery.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::{io_err, FigwatchError};

/// Extension (without the dot) of vector figure sources.
pub const FIGURE_EXTENSION: &str = "svg";

/// `true` if `path` names a figure source. The match is case-sensitive.
pub fn is_figure(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some(FIGURE_EXTENSION)
}

/// File name for a new figure: the alternate text trimmed, lower-cased and
/// with spaces turned into dashes.
///
/// `"Phase Diagram"` becomes `phase-diagram.svg`.
pub fn figure_file_name(alternate_text: &str) -> String {
    let stem = alternate_text.trim().replace(' ', "-").to_lowercase();
    format!("{stem}.{FIGURE_EXTENSION}")
}

/// Markdown snippet that includes the exported image.
pub fn markdown_include(alternate_text: &str, image_path: &str) -> String {
    format!("![{alternate_text}]({image_path})")
}

/// Figures directly inside `dir` (not recursive), most recently modified
/// first.
pub fn list_figures(dir: &Path) -> Result<Vec<PathBuf>, FigwatchError> {
    if !dir.is_dir() {
        return Err(FigwatchError::NotADirectory {
            path: dir.to_path_buf(),
        });
    }

    let mut figures: Vec<(SystemTime, PathBuf)> = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| io_err(dir, e))? {
        let entry = entry.map_err(|e| io_err(dir, e))?;
        let path = entry.path();
        if !path.is_file() || !is_figure(&path) {
            continue;
        }
        let modified = entry
            .metadata()
            .and_then(|meta| meta.modified())
            .map_err(|e| io_err(&path, e))?;
        figures.push((modified, path));
    }

    figures.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    Ok(figures.into_iter().map(|(_, path)| path).collect())
}

/// Display name of a figure: its file stem.
pub fn figure_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}
