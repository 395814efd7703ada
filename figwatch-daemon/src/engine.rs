//! Recursive directory subscriptions on top of `notify`.
//!
//! Each subscription owns its own OS watcher, so cancelling one never
//! disturbs the kernel watches held by another (an ancestor and its former
//! child overlap briefly while the registry swaps them). Callbacks run on the
//! watcher's own thread, never on the request loop.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use figwatch_core::Subscriber;
use notify::event::CreateKind;
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::error::{io_err, DaemonError};

/// Called with `(event_path, is_directory)` for every create/modify event.
pub type EventHandler = Arc<dyn Fn(&Path, bool) + Send + Sync>;

/// Identifies one live subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

struct Subscription {
    root: PathBuf,
    active: Arc<AtomicBool>,
    watcher: RecommendedWatcher,
}

pub struct SubscriptionEngine {
    handler: EventHandler,
    next_id: u64,
    subscriptions: HashMap<SubscriptionId, Subscription>,
}

impl SubscriptionEngine {
    pub fn new(handler: EventHandler) -> Self {
        Self {
            handler,
            next_id: 0,
            subscriptions: HashMap::new(),
        }
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    #[cfg(test)]
    fn root(&self, id: SubscriptionId) -> Option<&Path> {
        self.subscriptions.get(&id).map(|sub| sub.root.as_path())
    }
}

impl Subscriber for SubscriptionEngine {
    type Handle = SubscriptionId;
    type Error = DaemonError;

    fn subscribe(&mut self, path: &Path) -> Result<SubscriptionId, DaemonError> {
        let meta = fs::metadata(path).map_err(|e| io_err(path, e))?;
        if !meta.is_dir() {
            return Err(DaemonError::NotADirectory {
                path: path.to_path_buf(),
            });
        }

        let active = Arc::new(AtomicBool::new(true));
        let flag = active.clone();
        let handler = self.handler.clone();
        let root = path.to_path_buf();
        let mut watcher = recommended_watcher(move |event: notify::Result<Event>| match event {
            Ok(event) => dispatch(&event, &flag, &handler),
            Err(err) => {
                tracing::warn!(root = %root.display(), error = %err, "watcher event error");
            }
        })?;
        watcher.watch(path, RecursiveMode::Recursive)?;

        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        tracing::debug!(id = %id, path = %path.display(), "subscribed");
        self.subscriptions.insert(
            id,
            Subscription {
                root: path.to_path_buf(),
                active,
                watcher,
            },
        );
        Ok(id)
    }

    fn unsubscribe(&mut self, id: SubscriptionId) -> Result<(), DaemonError> {
        let Some(mut sub) = self.subscriptions.remove(&id) else {
            return Ok(());
        };
        sub.active.store(false, Ordering::SeqCst);
        if let Err(err) = sub.watcher.unwatch(&sub.root) {
            // The root may have been deleted; dropping the watcher below
            // releases whatever is left.
            tracing::debug!(id = %id, error = %err, "unwatch failed");
        }
        tracing::debug!(id = %id, path = %sub.root.display(), "unsubscribed");
        Ok(())
    }
}

fn is_relevant_event_kind(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}

fn dispatch(event: &Event, active: &AtomicBool, handler: &EventHandler) {
    if !is_relevant_event_kind(&event.kind) {
        return;
    }
    for path in &event.paths {
        if !active.load(Ordering::SeqCst) {
            return;
        }
        let is_dir = matches!(event.kind, EventKind::Create(CreateKind::Folder)) || path.is_dir();
        (**handler)(path, is_dir);
    }
}
