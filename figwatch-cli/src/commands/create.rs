//! `figwatch create <alt text> [dir]`

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;

use figwatch_core::config::{self, ensure_init_at, template_path};
use figwatch_core::figure::{figure_file_name, figure_stem, markdown_include};

use super::{open_in_editor, watch::ensure_watched};
use crate::failure::Failure;

/// Create a figure from the template and print its Markdown include.
#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Alternate text of the image. The file name is derived from it:
    /// "Phase Diagram" becomes phase-diagram.svg.
    pub alt: String,

    /// Directory to create the figure in; created if missing.
    #[arg(default_value = ".")]
    pub dir: PathBuf,

    /// Do not launch Inkscape on the new figure.
    #[arg(long)]
    pub no_open: bool,

    /// Do not ask the daemon to watch the figure directory.
    #[arg(long)]
    pub no_watch: bool,
}

impl CreateArgs {
    pub fn run(self) -> Result<()> {
        let alt = self.alt.trim();
        if alt.is_empty() {
            bail!("alternate text must not be empty");
        }

        let home = config::home()?;
        ensure_init_at(&home).context("failed to initialise ~/.figwatch")?;

        if !self.dir.exists() {
            fs::create_dir_all(&self.dir)
                .with_context(|| format!("failed to create '{}'", self.dir.display()))?;
        }
        if !self.dir.is_dir() {
            return Err(Failure::NotADirectory(self.dir).into());
        }
        let dir = self
            .dir
            .canonicalize()
            .with_context(|| format!("cannot resolve path '{}'", self.dir.display()))?;

        let figure = dir.join(figure_file_name(alt));
        if figure.exists() {
            return Err(Failure::FigureExists(figure).into());
        }

        let template = template_path(&home);
        fs::copy(&template, &figure).with_context(|| {
            format!(
                "failed to copy template '{}' to '{}'",
                template.display(),
                figure.display()
            )
        })?;
        tracing::info!(figure = %figure.display(), "figure created");

        if !self.no_open {
            open_in_editor(&figure);
        }
        println!("{}", markdown_include(alt, &figure_stem(&figure)));

        if !self.no_watch {
            ensure_watched(&home, &dir)?;
        }
        Ok(())
    }
}
