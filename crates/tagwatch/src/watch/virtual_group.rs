//! Individually watched files
//!
//! Files added one by one live under the virtual grouping row, a directory
//! row with a reserved path that never appears in user listings.

use super::reconciler::{Reconciled, Reconciler};
use super::types::{FileGroupId, WatchEvent, WatchEventKind, WatchKey};
use crate::catalog::Catalog;
use crate::error::Result;
use std::path::{Path, PathBuf};
use tagwatch_db::DirectoryId;
use tracing::warn;

/// Keep the paths that currently exist as regular files, dropping duplicates.
///
/// Kept paths are made absolute through their parent directory, so the file
/// itself is never resolved through a symlink.
pub async fn existing_regular_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut out: Vec<PathBuf> = Vec::with_capacity(paths.len());
    for path in paths {
        match tokio::fs::symlink_metadata(path).await {
            Ok(meta) if meta.file_type().is_file() => {
                let absolute = absolute_file_path(path).await;
                if !out.contains(&absolute) {
                    out.push(absolute);
                }
            }
            Ok(_) => warn!(path = %path.display(), "Not a regular file, skipping"),
            Err(e) => warn!(path = %path.display(), error = %e, "Cannot read file, skipping"),
        }
    }
    out
}

async fn absolute_file_path(path: &Path) -> PathBuf {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    match (tokio::fs::canonicalize(&parent).await, path.file_name()) {
        (Ok(parent), Some(name)) => parent.join(name),
        _ => path.to_path_buf(),
    }
}

/// Paths of every file currently attributed to the grouping.
pub async fn group_file_paths(catalog: &dyn Catalog, group_id: DirectoryId) -> Result<Vec<PathBuf>> {
    Ok(catalog
        .list_file_paths_in_directory(group_id)
        .await?
        .into_iter()
        .map(|(_, path)| PathBuf::from(path))
        .collect())
}

/// Outcome of re-checking grouped files against the filesystem
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupRescan {
    pub scanned_files: u64,
    pub removed_files: u64,
}

/// Re-stat every grouped file: present files are refreshed, missing ones removed.
pub async fn rescan_group(
    catalog: &dyn Catalog,
    reconciler: &Reconciler,
    group_id: DirectoryId,
) -> Result<GroupRescan> {
    let key = WatchKey::FileGroup(FileGroupId::new());
    let mut outcome = GroupRescan::default();

    for path in group_file_paths(catalog, group_id).await? {
        let kind = if is_regular_file(&path).await {
            WatchEventKind::Change
        } else {
            WatchEventKind::Unlink
        };
        let event = WatchEvent {
            key: key.clone(),
            kind,
            path,
            directory_id: group_id,
        };

        match reconciler.apply(&event).await {
            Ok(Reconciled::Upserted { .. }) => outcome.scanned_files += 1,
            Ok(Reconciled::Removed { .. }) => outcome.removed_files += 1,
            Ok(_) => {}
            Err(e) => warn!(path = %event.path.display(), error = %e, "Rescan of grouped file failed"),
        }
    }

    catalog.recompute_directory_stats(group_id).await?;
    catalog.touch_directory_scan_time(group_id).await?;
    Ok(outcome)
}

async fn is_regular_file(path: &Path) -> bool {
    tokio::fs::symlink_metadata(path)
        .await
        .map(|m| m.file_type().is_file())
        .unwrap_or(false)
}
