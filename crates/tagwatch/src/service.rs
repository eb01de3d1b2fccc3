//! Caller-facing operations
//!
//! [`TagWatch`] wires one catalog, one registry, one indexer and the
//! reconciler task together. The catalog pool is opened in [`TagWatch::open`]
//! and closed in [`TagWatch::shutdown`].

use crate::catalog::Catalog;
use crate::config::TagwatchConfig;
use crate::error::{Result, WatchError};
use crate::watch::virtual_group::{existing_regular_files, group_file_paths, rescan_group};
use crate::watch::{
    FileGroupId, IndexConfig, IndexReport, Indexer, Reconciler, WatchEvent, WatchEventKind,
    WatchKey, WatchRegistry, WatchSettings,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tagwatch_db::{CatalogDb, DatabaseInfo, Directory, DirectoryId};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// How long shutdown waits for queued events to be applied
const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Setting that decides whether persisted watches come back on startup
const AUTO_START_SETTING: &str = "auto_start_monitoring";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectorySummary {
    pub directory: Directory,
    /// False when the native watch could not be installed
    pub watching: bool,
    pub index: IndexReport,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RescanSummary {
    pub scanned_files: u64,
    pub removed_files: u64,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddFilesSummary {
    /// Files recorded under the virtual grouping
    pub count: usize,
    pub directory_id: Option<DirectoryId>,
    pub watching: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeSummary {
    pub directories: usize,
    pub file_groups: usize,
    pub failed: usize,
}

pub struct TagWatch {
    db: CatalogDb,
    catalog: Arc<dyn Catalog>,
    reconciler: Arc<Reconciler>,
    registry: WatchRegistry,
    indexer: Indexer,
    config: TagwatchConfig,
    reconciler_task: Mutex<Option<JoinHandle<()>>>,
}

impl TagWatch {
    /// Open the catalog named by the config and start the reconciler.
    pub async fn open(config: TagwatchConfig) -> Result<Self> {
        let db = CatalogDb::open(&config.database_path).await?;
        Ok(Self::with_catalog(db, config))
    }

    /// Build on an already opened catalog. Must run inside a Tokio runtime.
    pub fn with_catalog(db: CatalogDb, config: TagwatchConfig) -> Self {
        let catalog: Arc<dyn Catalog> = Arc::new(db.clone());
        let reconciler = Arc::new(Reconciler::new(catalog.clone()).with_filter(config.path_filter()));

        let (events_tx, events_rx) = mpsc::unbounded_channel::<WatchEvent>();
        let registry = WatchRegistry::new(
            reconciler.clone(),
            events_tx,
            WatchSettings {
                debounce: config.debounce(),
                filter: config.path_filter(),
            },
        );
        let reconciler_task = tokio::spawn(reconciler.clone().run(events_rx));

        let indexer = Indexer::new(
            catalog.clone(),
            IndexConfig {
                filter: config.path_filter(),
                batch_size: config.index_batch_size,
            },
        );

        Self {
            db,
            catalog,
            reconciler,
            registry,
            indexer,
            config,
            reconciler_task: Mutex::new(Some(reconciler_task)),
        }
    }

    /// The catalog, for tag and settings operations
    pub fn catalog(&self) -> &CatalogDb {
        &self.db
    }

    pub fn registry(&self) -> &WatchRegistry {
        &self.registry
    }

    pub fn config(&self) -> &TagwatchConfig {
        &self.config
    }

    /// Register a directory, watch it and index its current contents.
    ///
    /// The watch goes in before the sweep so that changes made during the
    /// sweep are not lost.
    pub async fn add_and_watch_directory(&self, path: &Path) -> Result<DirectorySummary> {
        let root = canonical_dir(path).await?;
        let root_str = root.to_string_lossy();

        let directory_id = self.catalog.add_directory(&root_str, true).await?;
        let watching = self.registry.start_directory_watch(&root, directory_id);
        self.catalog
            .set_directory_watching(directory_id, watching)
            .await?;

        let index = self.indexer.index_directory(&root, directory_id).await?;

        let directory = self
            .catalog
            .get_directory_by_id(directory_id)
            .await?
            .ok_or(WatchError::DirectoryNotFound(directory_id))?;

        info!(
            path = %root.display(),
            directory_id,
            watching,
            files = index.files_indexed,
            "Directory added"
        );
        Ok(DirectorySummary {
            directory,
            watching,
            index,
        })
    }

    /// Flip a directory's watching state and return the new state.
    ///
    /// Turning a real directory back on also sweeps it, picking up changes
    /// made while it was not watched.
    pub async fn toggle_watch(&self, directory_id: DirectoryId) -> Result<bool> {
        let directory = self.require_directory(directory_id).await?;

        if directory.is_watching {
            self.registry.stop_watches_for_directory(directory_id);
            self.catalog
                .set_directory_watching(directory_id, false)
                .await?;
            info!(directory_id, "Watching disabled");
            return Ok(false);
        }

        let started = if directory.is_virtual() {
            let paths =
                existing_regular_files(&group_file_paths(self.catalog.as_ref(), directory_id).await?)
                    .await;
            paths.is_empty() || self.registry.start_file_group_watch(&paths, directory_id).await
        } else {
            let root = PathBuf::from(&directory.path);
            let started = self.registry.start_directory_watch(&root, directory_id);
            if started {
                if let Err(e) = self.indexer.index_directory(&root, directory_id).await {
                    warn!(directory_id, error = %e, "Catch-up index failed");
                }
            }
            started
        };

        if !started {
            return Ok(false);
        }
        self.catalog
            .set_directory_watching(directory_id, true)
            .await?;
        info!(directory_id, "Watching enabled");
        Ok(true)
    }

    /// Re-walk a directory (or re-stat the virtual grouping's files).
    pub async fn rescan_directory(&self, directory_id: DirectoryId) -> Result<RescanSummary> {
        let start = Instant::now();
        let directory = self.require_directory(directory_id).await?;

        let (scanned_files, removed_files) = if directory.is_virtual() {
            let outcome =
                rescan_group(self.catalog.as_ref(), &self.reconciler, directory_id).await?;
            (outcome.scanned_files, outcome.removed_files)
        } else {
            let report = self
                .indexer
                .index_directory(Path::new(&directory.path), directory_id)
                .await?;
            (report.files_indexed, report.files_removed)
        };

        Ok(RescanSummary {
            scanned_files,
            removed_files,
            elapsed_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Watch individual files under the virtual grouping.
    ///
    /// Paths that are not existing regular files are skipped.
    pub async fn add_watched_files(&self, paths: &[PathBuf]) -> Result<AddFilesSummary> {
        let files = existing_regular_files(paths).await;
        if files.is_empty() {
            return Ok(AddFilesSummary::default());
        }

        let group_id = self.catalog.ensure_virtual_grouping().await?;
        let watching = self.registry.start_file_group_watch(&files, group_id).await;
        if watching {
            self.catalog.set_directory_watching(group_id, true).await?;
        } else {
            // Record the files even though nothing will report later changes
            let key = WatchKey::FileGroup(FileGroupId::new());
            for path in &files {
                let event = WatchEvent {
                    key: key.clone(),
                    kind: WatchEventKind::Add,
                    path: path.clone(),
                    directory_id: group_id,
                };
                if let Err(e) = self.reconciler.apply(&event).await {
                    warn!(path = %path.display(), error = %e, "Failed to record file");
                }
            }
        }

        info!(count = files.len(), directory_id = group_id, watching, "Files added");
        Ok(AddFilesSummary {
            count: files.len(),
            directory_id: Some(group_id),
            watching,
        })
    }

    /// Close every live watch. Persisted watching flags are left alone.
    pub fn stop_watching_everything(&self) {
        self.registry.stop_all();
    }

    /// Reinstall the watches of every directory flagged as watching.
    ///
    /// The `auto_start_monitoring` setting, when present, overrides the config.
    /// Real directories are swept after their watch is back, catching changes
    /// made while nothing was running.
    pub async fn resume_watches(&self) -> Result<ResumeSummary> {
        let enabled = self
            .db
            .get_bool_setting(AUTO_START_SETTING)
            .await?
            .unwrap_or(self.config.auto_start_monitoring);
        if !enabled {
            info!("Automatic monitoring disabled, not resuming watches");
            return Ok(ResumeSummary::default());
        }

        let mut summary = ResumeSummary::default();
        for directory in self.db.list_watching_directories().await? {
            if directory.is_virtual() {
                let paths = existing_regular_files(
                    &group_file_paths(self.catalog.as_ref(), directory.id).await?,
                )
                .await;
                if paths.is_empty() {
                    continue;
                }
                if self.registry.start_file_group_watch(&paths, directory.id).await {
                    summary.file_groups += 1;
                } else {
                    summary.failed += 1;
                }
                continue;
            }

            let root = PathBuf::from(&directory.path);
            if !self.registry.start_directory_watch(&root, directory.id) {
                summary.failed += 1;
                continue;
            }
            summary.directories += 1;
            if let Err(e) = self.indexer.index_directory(&root, directory.id).await {
                warn!(directory_id = directory.id, error = %e, "Catch-up index failed");
            }
        }

        info!(
            directories = summary.directories,
            file_groups = summary.file_groups,
            failed = summary.failed,
            "Watches resumed"
        );
        Ok(summary)
    }

    /// Stop watching a directory and delete it with all of its files.
    pub async fn remove_directory(&self, directory_id: DirectoryId) -> Result<bool> {
        self.registry.stop_watches_for_directory(directory_id);
        Ok(self.catalog.delete_directory(directory_id).await?)
    }

    /// User-visible directories, newest first
    pub async fn list_directories(&self) -> Result<Vec<Directory>> {
        Ok(self.catalog.list_directories().await?)
    }

    pub async fn database_info(&self) -> Result<DatabaseInfo> {
        Ok(self.db.database_info().await?)
    }

    /// Stop every watch, let queued events finish, then close the catalog.
    pub async fn shutdown(&self) {
        self.stop_watching_everything();
        self.registry.close();

        let task = self
            .reconciler_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(mut task) = task {
            if tokio::time::timeout(SHUTDOWN_DRAIN_TIMEOUT, &mut task)
                .await
                .is_err()
            {
                warn!("Event queue did not drain in time, abandoning remaining events");
                task.abort();
            }
        }

        self.db.close().await;
        info!("Tagwatch shut down");
    }

    async fn require_directory(&self, directory_id: DirectoryId) -> Result<Directory> {
        self.catalog
            .get_directory_by_id(directory_id)
            .await?
            .ok_or(WatchError::DirectoryNotFound(directory_id))
    }
}

/// Resolve `path` to an absolute, symlink-free directory path.
async fn canonical_dir(path: &Path) -> Result<PathBuf> {
    let root = match tokio::fs::canonicalize(path).await {
        Ok(root) => root,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(WatchError::NotADirectory(path.to_path_buf()))
        }
        Err(e) => return Err(WatchError::unreadable(path, e)),
    };

    match tokio::fs::metadata(&root).await {
        Ok(meta) if meta.is_dir() => Ok(root),
        Ok(_) => Err(WatchError::NotADirectory(path.to_path_buf())),
        Err(e) => Err(WatchError::unreadable(path, e)),
    }
}
