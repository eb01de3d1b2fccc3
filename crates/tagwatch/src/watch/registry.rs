//! Watch registry
//!
//! Owns every live watch handle, keyed by [`WatchKey`]. Native callbacks run
//! on notify's threads; they only translate events and push them onto the
//! shared queue drained by the [`Reconciler`].
//!
//! Installing a handle under a key that already has one tears the old handle
//! down first. Stopping a handle clears its `active` flag before the
//! debouncer is dropped, so nothing more is forwarded from it.

use super::filter::{crosses_symlink, PathFilter};
use super::reconciler::Reconciler;
use super::translate::translate;
use super::types::{FileGroupId, WatchEvent, WatchEventKind, WatchKey};
use crate::error::{Result, WatchError};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use notify_debouncer_full::{new_debouncer, DebounceEventResult, Debouncer, FileIdMap};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tagwatch_db::DirectoryId;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

type EventDebouncer = Debouncer<RecommendedWatcher, FileIdMap>;

/// Options applied to every handle the registry installs.
#[derive(Debug, Clone)]
pub struct WatchSettings {
    /// Write-stability delay
    pub debounce: Duration,
    pub filter: PathFilter,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(1000),
            filter: PathFilter::default(),
        }
    }
}

struct WatchHandle {
    directory_id: DirectoryId,
    active: Arc<AtomicBool>,
    debouncer: EventDebouncer,
}

impl WatchHandle {
    fn close(self) {
        self.active.store(false, Ordering::SeqCst);
        drop(self.debouncer);
    }
}

/// Which events a handle forwards.
enum Scope {
    /// Everything below `root` that passes the filter
    Tree { root: PathBuf, filter: PathFilter },
    /// Exactly these paths
    Files(HashSet<PathBuf>),
}

/// Runs inside the debouncer callback.
struct EventForwarder {
    key: WatchKey,
    directory_id: DirectoryId,
    active: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<WatchEvent>,
    scope: Scope,
}

impl EventForwarder {
    fn forward(&self, result: DebounceEventResult) {
        if !self.active.load(Ordering::SeqCst) {
            return;
        }

        match result {
            Ok(events) => {
                for debounced in events {
                    for (kind, path) in translate(&debounced.event) {
                        if self.in_scope(&kind, &path) {
                            self.send(kind, path);
                        }
                    }
                }
            }
            Err(errors) => {
                for error in errors {
                    let path = error.paths.first().cloned().unwrap_or_default();
                    self.send(WatchEventKind::Error(error.to_string()), path);
                }
            }
        }
    }

    fn in_scope(&self, kind: &WatchEventKind, path: &Path) -> bool {
        match &self.scope {
            Scope::Tree { root, filter } => {
                if filter.is_ignored(root, path) {
                    return false;
                }
                match kind {
                    WatchEventKind::Add | WatchEventKind::Change | WatchEventKind::AddDir => {
                        !crosses_symlink(root, path)
                    }
                    _ => true,
                }
            }
            Scope::Files(paths) => paths.contains(path),
        }
    }

    fn send(&self, kind: WatchEventKind, path: PathBuf) {
        let event = WatchEvent {
            key: self.key.clone(),
            kind,
            path,
            directory_id: self.directory_id,
        };
        if self.events.send(event).is_err() {
            debug!(key = %self.key, "Event queue closed, dropping event");
        }
    }
}

pub struct WatchRegistry {
    handles: Mutex<HashMap<WatchKey, WatchHandle>>,
    /// None once the registry has been closed
    events: Mutex<Option<mpsc::UnboundedSender<WatchEvent>>>,
    reconciler: Arc<Reconciler>,
    settings: WatchSettings,
}

impl WatchRegistry {
    pub fn new(
        reconciler: Arc<Reconciler>,
        events: mpsc::UnboundedSender<WatchEvent>,
        settings: WatchSettings,
    ) -> Self {
        Self {
            handles: Mutex::new(HashMap::new()),
            events: Mutex::new(Some(events)),
            reconciler,
            settings,
        }
    }

    fn handles(&self) -> MutexGuard<'_, HashMap<WatchKey, WatchHandle>> {
        self.handles.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn event_sender(&self) -> Result<mpsc::UnboundedSender<WatchEvent>> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(WatchError::RegistryClosed)
    }

    /// Watch a directory tree, attributing every event to `directory_id`.
    ///
    /// Returns false and logs the cause when the watch cannot be installed.
    pub fn start_directory_watch(&self, path: &Path, directory_id: DirectoryId) -> bool {
        match self.try_start_directory_watch(path, directory_id) {
            Ok(()) => true,
            Err(e) => {
                warn!(path = %path.display(), directory_id, error = %e, "Failed to start directory watch");
                false
            }
        }
    }

    fn try_start_directory_watch(&self, path: &Path, directory_id: DirectoryId) -> Result<()> {
        if !path.is_dir() {
            return Err(WatchError::NotADirectory(path.to_path_buf()));
        }

        let key = WatchKey::Directory(path.to_path_buf());
        self.stop_watch(&key);

        let active = Arc::new(AtomicBool::new(true));
        let forwarder = EventForwarder {
            key: key.clone(),
            directory_id,
            active: active.clone(),
            events: self.event_sender()?,
            scope: Scope::Tree {
                root: path.to_path_buf(),
                filter: self.settings.filter.clone(),
            },
        };

        let mut debouncer = self.new_debouncer(path, forwarder)?;
        debouncer
            .watcher()
            .watch(path, RecursiveMode::Recursive)
            .map_err(|source| WatchError::WatchInstall {
                path: path.to_path_buf(),
                source,
            })?;
        debouncer.cache().add_root(path, RecursiveMode::Recursive);

        self.install(
            key,
            WatchHandle {
                directory_id,
                active,
                debouncer,
            },
        );
        info!(path = %path.display(), directory_id, "Directory watch started");
        Ok(())
    }

    /// Watch an explicit set of files under a fresh key.
    ///
    /// Files that already exist are reconciled right away, since native
    /// watchers do not report files that predate the watch.
    pub async fn start_file_group_watch(&self, paths: &[PathBuf], directory_id: DirectoryId) -> bool {
        let key = match self.try_start_file_group_watch(paths, directory_id) {
            Ok(key) => key,
            Err(e) => {
                warn!(files = paths.len(), directory_id, error = %e, "Failed to start file group watch");
                return false;
            }
        };

        for path in paths {
            let is_file = tokio::fs::symlink_metadata(path)
                .await
                .map(|m| m.file_type().is_file())
                .unwrap_or(false);
            if !is_file {
                continue;
            }

            let event = WatchEvent {
                key: key.clone(),
                kind: WatchEventKind::Add,
                path: path.clone(),
                directory_id,
            };
            if let Err(e) = self.reconciler.apply(&event).await {
                warn!(key = %key, path = %path.display(), error = %e, "Initial reconcile failed");
            }
        }
        true
    }

    fn try_start_file_group_watch(
        &self,
        paths: &[PathBuf],
        directory_id: DirectoryId,
    ) -> Result<WatchKey> {
        let key = WatchKey::FileGroup(FileGroupId::new());
        let active = Arc::new(AtomicBool::new(true));
        let forwarder = EventForwarder {
            key: key.clone(),
            directory_id,
            active: active.clone(),
            events: self.event_sender()?,
            scope: Scope::Files(paths.iter().cloned().collect()),
        };

        // One non-recursive watch per distinct parent that still exists
        let parents: BTreeSet<&Path> = paths
            .iter()
            .filter_map(|p| p.parent())
            .filter(|p| p.is_dir())
            .collect();

        let first = parents.iter().next().copied().unwrap_or_else(|| Path::new(""));
        let mut debouncer = self.new_debouncer(first, forwarder)?;
        for parent in &parents {
            debouncer
                .watcher()
                .watch(parent, RecursiveMode::NonRecursive)
                .map_err(|source| WatchError::WatchInstall {
                    path: parent.to_path_buf(),
                    source,
                })?;
            debouncer.cache().add_root(*parent, RecursiveMode::NonRecursive);
        }

        self.install(
            key.clone(),
            WatchHandle {
                directory_id,
                active,
                debouncer,
            },
        );
        info!(key = %key, files = paths.len(), directory_id, "File group watch started");
        Ok(key)
    }

    fn new_debouncer(&self, path: &Path, forwarder: EventForwarder) -> Result<EventDebouncer> {
        new_debouncer(self.settings.debounce, None, move |result: DebounceEventResult| {
            forwarder.forward(result)
        })
        .map_err(|source| WatchError::WatchInstall {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Record a handle, closing whatever held the key before.
    fn install(&self, key: WatchKey, handle: WatchHandle) {
        let replaced = self.handles().insert(key, handle);
        if let Some(old) = replaced {
            old.close();
        }
    }

    /// Close and forget the handle for `key`. Absent keys are a no-op.
    pub fn stop_watch(&self, key: &WatchKey) -> bool {
        let removed = self.handles().remove(key);
        if let Some(handle) = removed {
            handle.close();
            info!(key = %key, "Watch stopped");
        }
        true
    }

    /// Close every handle.
    pub fn stop_all(&self) {
        let drained: Vec<(WatchKey, WatchHandle)> = self.handles().drain().collect();
        let count = drained.len();
        for (_, handle) in drained {
            handle.close();
        }
        if count > 0 {
            info!(count, "All watches stopped");
        }
    }

    /// Close every handle and refuse new ones.
    ///
    /// Once the last handle's callback is gone the event queue closes and
    /// the reconciler finishes the events already queued.
    pub fn close(&self) {
        self.stop_all();
        self.events.lock().unwrap_or_else(|e| e.into_inner()).take();
    }

    pub fn list_watched_keys(&self) -> Vec<WatchKey> {
        self.handles().keys().cloned().collect()
    }

    pub fn keys_for_directory(&self, directory_id: DirectoryId) -> Vec<WatchKey> {
        self.handles()
            .iter()
            .filter(|(_, h)| h.directory_id == directory_id)
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Close every handle attributed to `directory_id`. Returns how many were closed.
    pub fn stop_watches_for_directory(&self, directory_id: DirectoryId) -> usize {
        let removed: Vec<WatchHandle> = {
            let mut handles = self.handles();
            let keys: Vec<WatchKey> = handles
                .iter()
                .filter(|(_, h)| h.directory_id == directory_id)
                .map(|(k, _)| k.clone())
                .collect();
            keys.iter().filter_map(|k| handles.remove(k)).collect()
        };

        let count = removed.len();
        for handle in removed {
            handle.close();
        }
        if count > 0 {
            info!(directory_id, count, "Watches stopped for directory");
        }
        count
    }

    pub fn is_watching(&self, key: &WatchKey) -> bool {
        self.handles().contains_key(key)
    }
}

impl Drop for WatchRegistry {
    fn drop(&mut self) {
        self.stop_all();
    }
}
