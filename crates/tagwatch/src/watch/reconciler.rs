//! Event reconciler
//!
//! Drains the single ordered event queue and applies each change to the
//! catalog. A failing event is logged and dropped; the loop keeps going.
//!
//! Under a directory watch, a directory that shows up (created or moved in)
//! is walked and its files recorded, and one that disappears takes the rows
//! below it along. A rename into the tree raises no per-file events, so this
//! is the only place those files get seen before the next index pass.

use super::filter::PathFilter;
use super::indexer::{spawn_walk, WalkItem};
use super::types::{modified_millis, WatchEvent, WatchEventKind, WatchKey};
use crate::catalog::Catalog;
use crate::error::{Result, WatchError};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tagwatch_db::{DirectoryId, FileUpsert};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Walk batch size for directories that appear under a live watch
const SUBTREE_BATCH: usize = 256;

/// What applying one event did to the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    Upserted { file_id: i64, is_new: bool },
    Removed { file_id: i64 },
    /// A directory appeared and this many files below it were recorded
    SubtreeIndexed { files: u64 },
    /// A directory went away and this many rows below it were dropped
    SubtreeRemoved { files: u64 },
    /// Symlink, unknown path or a watcher error: nothing written
    Skipped,
}

pub struct Reconciler {
    catalog: Arc<dyn Catalog>,
    filter: PathFilter,
}

impl Reconciler {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self {
            catalog,
            filter: PathFilter::default(),
        }
    }

    /// Filter applied when walking directories that appear under a watch.
    pub fn with_filter(mut self, filter: PathFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Consume events until every sender is gone.
    pub async fn run(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<WatchEvent>) {
        info!("Event reconciler started");
        while let Some(event) = events.recv().await {
            if let Err(e) = self.apply(&event).await {
                warn!(
                    key = %event.key,
                    kind = event.kind.as_str(),
                    path = %event.path.display(),
                    error = %e,
                    "Failed to reconcile event"
                );
            }
        }
        info!("Event reconciler stopped");
    }

    /// Apply one event to the catalog.
    pub async fn apply(&self, event: &WatchEvent) -> Result<Reconciled> {
        match &event.kind {
            WatchEventKind::Add | WatchEventKind::Change | WatchEventKind::AddDir => {
                self.upsert_path(event).await
            }
            WatchEventKind::Unlink | WatchEventKind::UnlinkDir => self.remove_path(event).await,
            WatchEventKind::Error(message) => {
                warn!(
                    key = %event.key,
                    path = %event.path.display(),
                    error = %message,
                    "Watcher error"
                );
                Ok(Reconciled::Skipped)
            }
        }
    }

    async fn upsert_path(&self, event: &WatchEvent) -> Result<Reconciled> {
        let path = event.path.as_path();
        let directory_id = event.directory_id;
        let meta = match tokio::fs::symlink_metadata(path).await {
            Ok(meta) => meta,
            Err(e) => {
                // Usually a file that vanished again before the debounce fired
                debug!(path = %path.display(), error = %e, "Stat failed, dropping event");
                return Err(WatchError::unreadable(path, e));
            }
        };

        let file_type = meta.file_type();
        if file_type.is_dir() {
            return match &event.key {
                WatchKey::Directory(_) => self.index_subtree(path, directory_id).await,
                WatchKey::FileGroup(_) => Ok(Reconciled::Skipped),
            };
        }
        if !file_type.is_file() {
            debug!(path = %path.display(), "Skipping non-regular entry");
            return Ok(Reconciled::Skipped);
        }

        let upsert = FileUpsert::new(path, meta.len(), modified_millis(&meta), Some(directory_id));
        let result = self.catalog.upsert_file(&upsert).await?;

        self.catalog.recompute_directory_stats(directory_id).await?;
        if let Some(previous) = result.previous_directory_id {
            self.catalog.recompute_directory_stats(previous).await?;
        }

        debug!(
            path = %path.display(),
            directory_id,
            file_id = result.id,
            is_new = result.is_new,
            "File reconciled"
        );
        Ok(Reconciled::Upserted {
            file_id: result.id,
            is_new: result.is_new,
        })
    }

    /// Record every regular file below a directory that just appeared.
    async fn index_subtree(&self, dir: &Path, directory_id: DirectoryId) -> Result<Reconciled> {
        let (mut batch_rx, walk) = spawn_walk(dir, &self.filter, SUBTREE_BATCH);

        let mut files = 0;
        let mut moved_from = BTreeSet::new();
        while let Some(batch) = batch_rx.recv().await {
            for item in batch {
                match item {
                    WalkItem::File { path, size, mtime } => {
                        let upsert = FileUpsert::new(&path, size, mtime, Some(directory_id));
                        match self.catalog.upsert_file(&upsert).await {
                            Ok(result) => {
                                files += 1;
                                if let Some(previous) = result.previous_directory_id {
                                    moved_from.insert(previous);
                                }
                            }
                            Err(e) if e.is_unavailable() => return Err(e.into()),
                            Err(e) => {
                                warn!(path = %path.display(), error = %e, "Failed to record file")
                            }
                        }
                    }
                    WalkItem::Unreadable { path, message } => {
                        warn!(path = %path.display(), error = %message, "Skipping unreadable entry");
                    }
                }
            }
        }
        walk.await??;

        self.catalog.recompute_directory_stats(directory_id).await?;
        for previous in moved_from {
            self.catalog.recompute_directory_stats(previous).await?;
        }

        debug!(path = %dir.display(), directory_id, files, "Directory reconciled");
        Ok(Reconciled::SubtreeIndexed { files })
    }

    async fn remove_path(&self, event: &WatchEvent) -> Result<Reconciled> {
        let path = event.path.as_path();
        if event.kind == WatchEventKind::Unlink {
            let key = path.to_string_lossy();
            if let Some(record) = self.catalog.get_file_by_path(&key).await? {
                self.catalog.delete_file(record.id).await?;
                if let Some(directory_id) = record.directory_id {
                    self.catalog.recompute_directory_stats(directory_id).await?;
                }

                debug!(path = %path.display(), file_id = record.id, "File removed");
                return Ok(Reconciled::Removed { file_id: record.id });
            }
        }

        // A rename out of the tree reports the directory as a plain unlink
        match &event.key {
            WatchKey::Directory(_) => self.remove_subtree(path, event.directory_id).await,
            WatchKey::FileGroup(_) => Ok(Reconciled::Skipped),
        }
    }

    /// Drop the rows below a directory that is no longer there.
    async fn remove_subtree(&self, dir: &Path, directory_id: DirectoryId) -> Result<Reconciled> {
        // Moved away and back within one debounce window
        if let Ok(meta) = tokio::fs::symlink_metadata(dir).await {
            if meta.is_dir() {
                return Ok(Reconciled::Skipped);
            }
        }

        let files = self.catalog.delete_files_under(directory_id, dir).await?;
        if files == 0 {
            return Ok(Reconciled::Skipped);
        }
        self.catalog.recompute_directory_stats(directory_id).await?;

        debug!(path = %dir.display(), directory_id, files, "Directory removed");
        Ok(Reconciled::SubtreeRemoved { files })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watch::types::FileGroupId;
    use tagwatch_db::CatalogDb;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, CatalogDb, Reconciler, DirectoryId) {
        let tmp = TempDir::new().unwrap();
        let db = CatalogDb::open_in_memory().await.unwrap();
        let dir_id = db
            .add_directory(&tmp.path().to_string_lossy(), true)
            .await
            .unwrap();
        let reconciler = Reconciler::new(Arc::new(db.clone()));
        (tmp, db, reconciler, dir_id)
    }

    fn event(kind: WatchEventKind, path: &Path, directory_id: DirectoryId) -> WatchEvent {
        WatchEvent {
            key: WatchKey::Directory(path.parent().unwrap().to_path_buf()),
            kind,
            path: path.to_path_buf(),
            directory_id,
        }
    }

    #[tokio::test]
    async fn test_add_then_unlink_updates_stats() {
        let (tmp, db, reconciler, dir_id) = setup().await;
        let file = tmp.path().join("y.txt");
        std::fs::write(&file, b"hello").unwrap();

        let out = reconciler.apply(&event(WatchEventKind::Add, &file, dir_id)).await.unwrap();
        assert!(matches!(out, Reconciled::Upserted { is_new: true, .. }));

        let dir = db.get_directory_by_id(dir_id).await.unwrap().unwrap();
        assert_eq!((dir.files_count, dir.total_size), (1, 5));

        std::fs::remove_file(&file).unwrap();
        let out = reconciler.apply(&event(WatchEventKind::Unlink, &file, dir_id)).await.unwrap();
        assert!(matches!(out, Reconciled::Removed { .. }));

        let dir = db.get_directory_by_id(dir_id).await.unwrap().unwrap();
        assert_eq!((dir.files_count, dir.total_size), (0, 0));
    }

    #[tokio::test]
    async fn test_change_keeps_id() {
        let (tmp, db, reconciler, dir_id) = setup().await;
        let file = tmp.path().join("x.txt");
        std::fs::write(&file, b"1").unwrap();
        reconciler.apply(&event(WatchEventKind::Add, &file, dir_id)).await.unwrap();
        let before = db.get_file_by_path(&file.to_string_lossy()).await.unwrap().unwrap();

        std::fs::write(&file, b"12345678").unwrap();
        reconciler.apply(&event(WatchEventKind::Change, &file, dir_id)).await.unwrap();
        let after = db.get_file_by_path(&file.to_string_lossy()).await.unwrap().unwrap();

        assert_eq!(before.id, after.id);
        assert_eq!(after.size, 8);
    }

    #[tokio::test]
    async fn test_unknown_unlink_and_empty_directory_write_nothing() {
        let (tmp, db, reconciler, dir_id) = setup().await;

        let ghost = tmp.path().join("ghost.txt");
        let out = reconciler.apply(&event(WatchEventKind::Unlink, &ghost, dir_id)).await.unwrap();
        assert_eq!(out, Reconciled::Skipped);

        let sub = tmp.path().join("sub");
        std::fs::create_dir(&sub).unwrap();
        let out = reconciler.apply(&event(WatchEventKind::AddDir, &sub, dir_id)).await.unwrap();
        assert_eq!(out, Reconciled::SubtreeIndexed { files: 0 });

        assert!(db.get_all_files().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_directory_moved_in_records_its_files() {
        let (tmp, db, reconciler, dir_id) = setup().await;
        let outside = TempDir::new().unwrap();
        let staged = outside.path().join("out");
        std::fs::create_dir_all(staged.join("nested")).unwrap();
        std::fs::create_dir_all(staged.join("node_modules")).unwrap();
        std::fs::write(staged.join("a.txt"), b"aa").unwrap();
        std::fs::write(staged.join("nested/b.txt"), b"bbb").unwrap();
        std::fs::write(staged.join(".hidden"), b"h").unwrap();
        std::fs::write(staged.join("node_modules/x.js"), b"x").unwrap();

        let moved = tmp.path().join("out");
        std::fs::rename(&staged, &moved).unwrap();

        // A rename into the tree arrives as a plain add of the directory path
        let out = reconciler.apply(&event(WatchEventKind::Add, &moved, dir_id)).await.unwrap();
        assert_eq!(out, Reconciled::SubtreeIndexed { files: 2 });

        let inner = moved.join("nested/b.txt");
        let row = db.get_file_by_path(&inner.to_string_lossy()).await.unwrap().unwrap();
        assert_eq!(row.directory_id, Some(dir_id));

        let dir = db.get_directory_by_id(dir_id).await.unwrap().unwrap();
        assert_eq!((dir.files_count, dir.total_size), (2, 5));
    }

    #[tokio::test]
    async fn test_directory_moved_out_drops_rows_below_it() {
        let (tmp, db, reconciler, dir_id) = setup().await;
        let sub = tmp.path().join("sub");
        std::fs::create_dir_all(sub.join("deep")).unwrap();
        std::fs::write(sub.join("a.txt"), b"a").unwrap();
        std::fs::write(sub.join("deep/b.txt"), b"b").unwrap();
        std::fs::write(tmp.path().join("keep.txt"), b"k").unwrap();
        reconciler.apply(&event(WatchEventKind::AddDir, &sub, dir_id)).await.unwrap();
        reconciler
            .apply(&event(WatchEventKind::Add, &tmp.path().join("keep.txt"), dir_id))
            .await
            .unwrap();

        let outside = TempDir::new().unwrap();
        std::fs::rename(&sub, outside.path().join("sub")).unwrap();

        let out = reconciler.apply(&event(WatchEventKind::Unlink, &sub, dir_id)).await.unwrap();
        assert_eq!(out, Reconciled::SubtreeRemoved { files: 2 });

        let names: Vec<String> = db.get_all_files().await.unwrap().into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["keep.txt"]);
        let dir = db.get_directory_by_id(dir_id).await.unwrap().unwrap();
        assert_eq!(dir.files_count, 1);

        let again = reconciler.apply(&event(WatchEventKind::UnlinkDir, &sub, dir_id)).await.unwrap();
        assert_eq!(again, Reconciled::Skipped);
    }

    #[tokio::test]
    async fn test_unlink_of_directory_still_on_disk_keeps_rows() {
        let (tmp, db, reconciler, dir_id) = setup().await;
        let sub = tmp.path().join("sub");
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(sub.join("a.txt"), b"a").unwrap();
        reconciler.apply(&event(WatchEventKind::AddDir, &sub, dir_id)).await.unwrap();

        let out = reconciler.apply(&event(WatchEventKind::UnlinkDir, &sub, dir_id)).await.unwrap();
        assert_eq!(out, Reconciled::Skipped);
        assert_eq!(db.get_all_files().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_group_directory_events_are_ignored() {
        let (tmp, db, reconciler, _dir_id) = setup().await;
        let virtual_id = db.ensure_virtual_grouping().await.unwrap();
        let sub = tmp.path().join("sub");
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(sub.join("a.txt"), b"a").unwrap();

        let group_event = WatchEvent {
            key: WatchKey::FileGroup(FileGroupId::new()),
            kind: WatchEventKind::AddDir,
            path: sub,
            directory_id: virtual_id,
        };
        assert_eq!(reconciler.apply(&group_event).await.unwrap(), Reconciled::Skipped);
        assert!(db.get_all_files().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_vanished_file_is_an_error_not_a_panic() {
        let (tmp, _db, reconciler, dir_id) = setup().await;
        let gone = tmp.path().join("gone.txt");

        let err = reconciler.apply(&event(WatchEventKind::Add, &gone, dir_id)).await.unwrap_err();
        assert!(matches!(err, WatchError::PathUnreadable { .. }));
    }

    #[tokio::test]
    async fn test_move_between_groups_recomputes_both() {
        let (tmp, db, reconciler, dir_id) = setup().await;
        let virtual_id = db.ensure_virtual_grouping().await.unwrap();
        let file = tmp.path().join("shared.txt");
        std::fs::write(&file, b"abc").unwrap();

        let group_event = WatchEvent {
            key: WatchKey::FileGroup(FileGroupId::new()),
            kind: WatchEventKind::Add,
            path: file.clone(),
            directory_id: virtual_id,
        };
        reconciler.apply(&group_event).await.unwrap();
        reconciler.apply(&event(WatchEventKind::Add, &file, dir_id)).await.unwrap();

        let group = db.get_directory_by_id(virtual_id).await.unwrap().unwrap();
        let dir = db.get_directory_by_id(dir_id).await.unwrap().unwrap();
        assert_eq!(group.files_count, 0);
        assert_eq!(dir.files_count, 1);
    }

    #[tokio::test]
    async fn test_run_continues_after_failure() {
        let (tmp, db, reconciler, dir_id) = setup().await;
        let good = tmp.path().join("good.txt");
        std::fs::write(&good, b"ok").unwrap();

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(event(WatchEventKind::Add, &tmp.path().join("missing"), dir_id)).unwrap();
        tx.send(event(WatchEventKind::Error("overflow".into()), tmp.path(), dir_id)).unwrap();
        tx.send(event(WatchEventKind::Add, &good, dir_id)).unwrap();
        drop(tx);

        Arc::new(reconciler).run(rx).await;

        assert!(db.get_file_by_path(&good.to_string_lossy()).await.unwrap().is_some());
    }
}
