//! In-memory watch set.
//!
//! The set of watched paths is kept as an antichain under directory
//! containment: no entry is an ancestor of another. [`WatchSet::reconcile`]
//! is the only way paths enter the set, and it maintains that invariant:
//!
//! 1. a path already covered by an entry is a no-op;
//! 2. otherwise the path is subscribed and every entry beneath it is
//!    unsubscribed and dropped.
//!
//! The set is owned by exactly one caller (the daemon's request loop), so no
//! locking happens here.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::containment::{contains, normalize, strictly_contains};
use crate::types::{ReconcileOutcome, WatchedDirectory};

/// Recursive directory subscriptions, as seen by the registry.
///
/// Implemented by the daemon on top of the OS notification facility and by
/// recording fakes in tests.
pub trait Subscriber {
    /// Opaque token identifying one subscription.
    type Handle;
    type Error: std::error::Error;

    /// Begin recursive observation of `path`.
    fn subscribe(&mut self, path: &Path) -> Result<Self::Handle, Self::Error>;

    /// Stop the subscription. No callbacks for it may start after this
    /// returns.
    fn unsubscribe(&mut self, handle: Self::Handle) -> Result<(), Self::Error>;
}

/// Watched directories keyed by normalized path.
pub struct WatchSet<S: Subscriber> {
    subscriber: S,
    entries: BTreeMap<PathBuf, WatchedDirectory<S::Handle>>,
}

impl<S: Subscriber> WatchSet<S> {
    pub fn new(subscriber: S) -> Self {
        Self {
            subscriber,
            entries: BTreeMap::new(),
        }
    }

    /// Make sure `requested` is observed, keeping the set free of nested
    /// entries.
    ///
    /// The new subscription is established before superseded children are
    /// cancelled, so a failed subscribe leaves the set exactly as it was.
    pub fn reconcile(&mut self, requested: &Path) -> Result<ReconcileOutcome, S::Error> {
        let path = normalize(requested);

        if let Some(covering) = self.covering_entry(&path) {
            tracing::debug!(
                path = %path.display(),
                by = %covering.display(),
                "watch request already covered",
            );
            return Ok(ReconcileOutcome::AlreadyCovered {
                path,
                by: covering.to_path_buf(),
            });
        }

        let handle = self.subscriber.subscribe(&path)?;

        let superseded: Vec<PathBuf> = self
            .entries
            .keys()
            .filter(|existing| strictly_contains(&path, existing))
            .cloned()
            .collect();
        for child in &superseded {
            self.drop_entry(child);
        }

        tracing::info!(
            path = %path.display(),
            superseded = superseded.len(),
            "watching directory",
        );
        self.entries
            .insert(path.clone(), WatchedDirectory::new(path.clone(), handle));

        Ok(ReconcileOutcome::Added { path, superseded })
    }

    /// Stop watching an exact entry. Returns `false` if `path` was not in the
    /// set (a descendant of an entry is not an entry).
    pub fn unwatch(&mut self, path: &Path) -> bool {
        let path = normalize(path);
        if !self.entries.contains_key(&path) {
            return false;
        }
        self.drop_entry(&path);
        tracing::info!(path = %path.display(), "stopped watching directory");
        true
    }

    /// The entry that already observes `path`, if any.
    pub fn covering_entry(&self, path: &Path) -> Option<&Path> {
        self.entries
            .keys()
            .find(|existing| contains(existing, path))
            .map(PathBuf::as_path)
    }

    /// Watched paths in sorted order.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.entries.keys().cloned().collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = &WatchedDirectory<S::Handle>> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn subscriber(&self) -> &S {
        &self.subscriber
    }

    fn drop_entry(&mut self, path: &Path) {
        let Some(entry) = self.entries.remove(path) else {
            return;
        };
        if let Err(err) = self.subscriber.unsubscribe(entry.into_handle()) {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "failed to cancel subscription; dropping entry anyway",
            );
        }
    }
}
