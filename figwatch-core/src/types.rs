//! Domain types shared by the registry and the daemon protocol.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// A directory under recursive subscription, plus the handle needed to
/// cancel it.
#[derive(Debug)]
pub struct WatchedDirectory<H> {
    path: PathBuf,
    handle: H,
}

impl<H> WatchedDirectory<H> {
    pub fn new(path: PathBuf, handle: H) -> Self {
        Self { path, handle }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn handle(&self) -> &H {
        &self.handle
    }

    pub(crate) fn into_handle(self) -> H {
        self.handle
    }
}

/// What a single `reconcile` call did to the watch set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// The requested path was already watched, directly or through an
    /// ancestor. Nothing changed.
    AlreadyCovered { path: PathBuf, by: PathBuf },

    /// The requested path is now watched. `superseded` lists the former
    /// entries beneath it whose subscriptions were cancelled.
    Added {
        path: PathBuf,
        superseded: Vec<PathBuf>,
    },
}

impl ReconcileOutcome {
    pub fn changed(&self) -> bool {
        matches!(self, ReconcileOutcome::Added { .. })
    }
}
