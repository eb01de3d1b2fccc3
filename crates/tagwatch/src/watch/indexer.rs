//! One-shot directory indexer
//!
//! The walk runs on a blocking thread and streams batches over a bounded
//! channel; the async side upserts each batch as it arrives, so memory stays
//! at O(batch_size) regardless of tree size.
//!
//! After the walk, rows of the directory that were neither seen nor inside an
//! unreadable subtree are deleted, unless a fresh stat shows the file is back
//! (the live reconciler may have written it after the walk passed). Pruning is
//! skipped when any upsert failed, because an unwritten file would otherwise
//! look deleted.

use super::filter::PathFilter;
use super::types::modified_millis;
use crate::catalog::Catalog;
use crate::error::{Result, WatchError};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tagwatch_db::{DirectoryId, DirectoryStats, FileUpsert};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Batches in flight between the walker and the writer
const WALK_CHANNEL_BATCHES: usize = 8;

#[derive(Debug, Clone)]
pub struct IndexConfig {
    pub filter: PathFilter,
    /// Entries per batch sent from the walker
    pub batch_size: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            filter: PathFilter::default(),
            batch_size: 500,
        }
    }
}

/// An entry that was skipped during the walk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexError {
    pub path: PathBuf,
    pub message: String,
}

/// Outcome of one index pass
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexReport {
    pub directory_id: DirectoryId,
    /// Regular files written to the catalog
    pub files_indexed: u64,
    pub files_new: u64,
    pub files_changed: u64,
    /// Rows deleted because the file is gone
    pub files_removed: u64,
    pub stats: DirectoryStats,
    pub errors: Vec<IndexError>,
    pub duration_ms: u64,
}

pub(super) enum WalkItem {
    File { path: PathBuf, size: u64, mtime: i64 },
    Unreadable { path: PathBuf, message: String },
}

pub struct Indexer {
    catalog: Arc<dyn Catalog>,
    config: IndexConfig,
}

impl Indexer {
    pub fn new(catalog: Arc<dyn Catalog>, config: IndexConfig) -> Self {
        Self { catalog, config }
    }

    /// Walk `root` and bring the catalog rows of `directory_id` in line with it.
    pub async fn index_directory(&self, root: &Path, directory_id: DirectoryId) -> Result<IndexReport> {
        let start = Instant::now();

        match tokio::fs::metadata(root).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(WatchError::NotADirectory(root.to_path_buf())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(WatchError::NotADirectory(root.to_path_buf()))
            }
            Err(e) => return Err(WatchError::unreadable(root, e)),
        }

        info!(path = %root.display(), directory_id, "Starting index");

        let (mut batch_rx, walk) = spawn_walk(root, &self.config.filter, self.config.batch_size);

        let mut report = IndexReport {
            directory_id,
            ..IndexReport::default()
        };
        let mut seen: HashSet<String> = HashSet::new();
        let mut unreadable: Vec<PathBuf> = Vec::new();
        let mut moved_from: BTreeSet<DirectoryId> = BTreeSet::new();
        let mut persist_ok = true;

        while let Some(batch) = batch_rx.recv().await {
            for item in batch {
                match item {
                    WalkItem::File { path, size, mtime } => {
                        let upsert = FileUpsert::new(&path, size, mtime, Some(directory_id));
                        seen.insert(upsert.path.clone());

                        match self.catalog.upsert_file(&upsert).await {
                            Ok(result) => {
                                report.files_indexed += 1;
                                if result.is_new {
                                    report.files_new += 1;
                                } else if result.is_changed {
                                    report.files_changed += 1;
                                }
                                if let Some(previous) = result.previous_directory_id {
                                    moved_from.insert(previous);
                                }
                            }
                            Err(e) if e.is_unavailable() => return Err(e.into()),
                            Err(e) => {
                                persist_ok = false;
                                warn!(path = %path.display(), error = %e, "Failed to record file");
                                report.errors.push(IndexError {
                                    path,
                                    message: e.to_string(),
                                });
                            }
                        }
                    }
                    WalkItem::Unreadable { path, message } => {
                        warn!(path = %path.display(), error = %message, "Skipping unreadable entry");
                        unreadable.push(path.clone());
                        report.errors.push(IndexError { path, message });
                    }
                }
            }
        }

        walk.await??;

        if persist_ok {
            let existing = self.catalog.list_file_paths_in_directory(directory_id).await?;
            for (file_id, path) in existing {
                if seen.contains(&path) {
                    continue;
                }
                let stored = Path::new(&path);
                if unreadable.iter().any(|u| stored.starts_with(u)) {
                    continue;
                }
                if self.is_live_file(root, stored).await {
                    debug!(path = %path, "File appeared after the walk, keeping it");
                    continue;
                }
                if self.catalog.delete_file(file_id).await? {
                    report.files_removed += 1;
                }
            }
        } else {
            warn!(
                path = %root.display(),
                errors = report.errors.len(),
                "Skipping removal of vanished files due to write failures"
            );
        }

        report.stats = self
            .catalog
            .recompute_directory_stats(directory_id)
            .await?
            .unwrap_or_default();
        for previous in moved_from {
            self.catalog.recompute_directory_stats(previous).await?;
        }
        self.catalog.touch_directory_scan_time(directory_id).await?;

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            path = %root.display(),
            directory_id,
            indexed = report.files_indexed,
            new = report.files_new,
            changed = report.files_changed,
            removed = report.files_removed,
            errors = report.errors.len(),
            duration_ms = report.duration_ms,
            "Index complete"
        );

        Ok(report)
    }

    async fn is_live_file(&self, root: &Path, path: &Path) -> bool {
        if self.config.filter.is_ignored(root, path) {
            return false;
        }
        tokio::fs::symlink_metadata(path)
            .await
            .map(|meta| meta.file_type().is_file())
            .unwrap_or(false)
    }
}

/// Start [`walk_tree`] on a blocking thread and hand back the batch receiver.
pub(super) fn spawn_walk(
    root: &Path,
    filter: &PathFilter,
    batch_size: usize,
) -> (mpsc::Receiver<Vec<WalkItem>>, JoinHandle<Result<()>>) {
    let (batch_tx, batch_rx) = mpsc::channel::<Vec<WalkItem>>(WALK_CHANNEL_BATCHES);
    let root = root.to_path_buf();
    let filter = filter.clone();
    let batch_size = batch_size.max(1);
    let walk = tokio::task::spawn_blocking(move || walk_tree(&root, &filter, batch_size, batch_tx));
    (batch_rx, walk)
}

/// Depth-first walk, sending batches until done or the receiver goes away.
fn walk_tree(
    root: &Path,
    filter: &PathFilter,
    batch_size: usize,
    batch_tx: mpsc::Sender<Vec<WalkItem>>,
) -> Result<()> {
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0 || !filter.skip_entry(entry.file_name(), entry.file_type().is_dir())
        });

    let mut batch = Vec::with_capacity(batch_size);
    for entry in walker {
        let item = match entry {
            Ok(entry) => {
                // Symlinks are never followed or recorded
                if !entry.file_type().is_file() {
                    continue;
                }
                match entry.metadata() {
                    Ok(meta) => WalkItem::File {
                        size: meta.len(),
                        mtime: modified_millis(&meta),
                        path: entry.into_path(),
                    },
                    Err(e) => WalkItem::Unreadable {
                        path: entry.path().to_path_buf(),
                        message: e.to_string(),
                    },
                }
            }
            Err(e) if e.depth() == 0 => {
                return Err(WatchError::unreadable(root, e.into()));
            }
            Err(e) => WalkItem::Unreadable {
                path: e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf()),
                message: e.to_string(),
            },
        };

        batch.push(item);
        if batch.len() >= batch_size {
            let full = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
            if batch_tx.blocking_send(full).is_err() {
                return Ok(());
            }
        }
    }

    if !batch.is_empty() {
        let _ = batch_tx.blocking_send(batch);
    }
    Ok(())
}
