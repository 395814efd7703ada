//! Figure export on change.
//!
//! Every create/modify event for a figure file runs the rasterizer once.
//! Editors often write a figure twice per save; both events export, which is
//! harmless because export overwrites the same artifact.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::sync::Arc;

use figwatch_core::figure::is_figure;
use thiserror::Error;

use crate::engine::EventHandler;

/// Raster format produced next to each figure.
pub const EXPORT_EXTENSION: &str = "png";
pub const EXPORT_DPI: u32 = 300;
pub const RASTERIZER: &str = "inkscape";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to launch {program} for {figure}: {source}")]
    Spawn {
        program: String,
        figure: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{program} exited with {status} while exporting {figure}")]
    Failed {
        program: String,
        figure: PathBuf,
        status: ExitStatus,
    },
}

/// Something that turns a figure into its raster artifact.
pub trait Exporter: Send + Sync {
    fn export(&self, figure: &Path) -> Result<(), ExportError>;
}

/// Runs Inkscape with a fixed page-area export.
#[derive(Debug, Clone)]
pub struct InkscapeExporter {
    program: String,
}

impl Default for InkscapeExporter {
    fn default() -> Self {
        Self {
            program: RASTERIZER.to_string(),
        }
    }
}

impl InkscapeExporter {
    /// Use a different executable with the same command-line contract.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn command(&self, figure: &Path) -> Command {
        let mut command = Command::new(&self.program);
        command
            .arg(figure)
            .arg("--export-area-page")
            .args(["--export-dpi", &EXPORT_DPI.to_string()])
            .arg(format!("--export-type={EXPORT_EXTENSION}"));
        command
    }
}

impl Exporter for InkscapeExporter {
    fn export(&self, figure: &Path) -> Result<(), ExportError> {
        let status = self
            .command(figure)
            .status()
            .map_err(|source| ExportError::Spawn {
                program: self.program.clone(),
                figure: figure.to_path_buf(),
                source,
            })?;
        if !status.success() {
            return Err(ExportError::Failed {
                program: self.program.clone(),
                figure: figure.to_path_buf(),
                status,
            });
        }
        Ok(())
    }
}

/// Where the exported artifact of `figure` lands.
pub fn export_target(figure: &Path) -> PathBuf {
    figure.with_extension(EXPORT_EXTENSION)
}

/// Filters subscription events down to figures and exports them.
pub struct ExportTrigger<E> {
    exporter: E,
}

impl<E: Exporter + 'static> ExportTrigger<E> {
    pub fn new(exporter: E) -> Self {
        Self { exporter }
    }

    /// Handle one event. Returns `true` if an export was attempted.
    ///
    /// Export failures are logged here and never propagate.
    pub fn on_event(&self, path: &Path, is_dir: bool) -> bool {
        if is_dir || !is_figure(path) {
            return false;
        }

        tracing::info!(figure = %path.display(), "figure modified; exporting");
        match self.exporter.export(path) {
            Ok(()) => tracing::info!(
                figure = %path.display(),
                artifact = %export_target(path).display(),
                "figure exported",
            ),
            Err(err) => tracing::error!(error = %err, "figure export failed"),
        }
        true
    }

    pub fn into_handler(self) -> EventHandler {
        let trigger = Arc::new(self);
        Arc::new(move |path: &Path, is_dir: bool| {
            trigger.on_event(path, is_dir);
        })
    }
}
