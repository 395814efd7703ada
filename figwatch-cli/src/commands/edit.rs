//! `figwatch edit [path]`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use figwatch_core::figure::{figure_stem, list_figures};

use super::open_in_editor;
use crate::failure::Failure;
use crate::picker;

/// Open a figure, or pick one among the figures of a directory.
#[derive(Args, Debug)]
pub struct EditArgs {
    /// A figure, or a directory holding figures. Defaults to the current
    /// directory.
    pub path: Option<PathBuf>,

    /// Print the chosen figure instead of opening it.
    #[arg(long)]
    pub no_open: bool,
}

impl EditArgs {
    pub fn run(self) -> Result<()> {
        let path = match self.path {
            Some(path) => path,
            None => std::env::current_dir().context("cannot determine current directory")?,
        };
        if !path.exists() {
            return Err(Failure::PathMissing(path).into());
        }
        let path = path
            .canonicalize()
            .with_context(|| format!("cannot resolve path '{}'", path.display()))?;

        let selected = if path.is_dir() {
            let Some(figure) = choose_figure(list_figures(&path)?)? else {
                return Ok(());
            };
            figure
        } else {
            path
        };

        println!("{}", selected.display());
        if !self.no_open {
            open_in_editor(&selected);
        }
        Ok(())
    }
}

/// One figure is taken as is; several go through the picker. `None` when
/// there is nothing to open.
fn choose_figure(mut figures: Vec<PathBuf>) -> Result<Option<PathBuf>> {
    match figures.len() {
        0 => {
            println!("No figures found.");
            Ok(None)
        }
        1 => Ok(figures.pop()),
        _ => {
            let names: Vec<String> = figures.iter().map(|figure| figure_stem(figure)).collect();
            let pick = picker::pick(&names)?;
            if pick.status != 0 {
                println!("Picker returned with non-zero exit status.");
                return Ok(None);
            }
            match pick.index {
                Some(index) => Ok(Some(figures.swap_remove(index))),
                None => {
                    println!("The picker selection did not match any figure.");
                    Ok(None)
                }
            }
        }
    }
}
