use std::path::PathBuf;

use thiserror::Error;

/// Exit status for failures without a dedicated code.
pub const GENERIC_EXIT_CODE: u8 = 5;

/// User-facing failures with stable exit codes.
#[derive(Debug, Error)]
pub enum Failure {
    #[error("a figure with the same name already exists at '{}'", .0.display())]
    FigureExists(PathBuf),

    #[error("the path does not exist: '{}'", .0.display())]
    PathMissing(PathBuf),

    #[error("no git repository found at or above '{}'", .0.display())]
    NoGitRepository(PathBuf),

    #[error("not a directory: '{}'", .0.display())]
    NotADirectory(PathBuf),
}

impl Failure {
    pub fn exit_code(&self) -> u8 {
        match self {
            Failure::FigureExists(_) => 1,
            Failure::PathMissing(_) => 2,
            Failure::NoGitRepository(_) => 3,
            Failure::NotADirectory(_) => 4,
        }
    }
}
