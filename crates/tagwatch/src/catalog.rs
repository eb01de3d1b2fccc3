//! Catalog abstraction used by the watching core.
//!
//! The indexer, reconciler and service only see `Arc<dyn Catalog>`, so tests
//! can swap in a double and several isolated instances can coexist.

use async_trait::async_trait;
use std::path::Path;
use tagwatch_db::{
    CatalogDb, Directory, DirectoryId, DirectoryStats, FileId, FileRecord, FileUpsert, Result,
    UpsertResult,
};

/// Persistent store of directories and files.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Insert a file or update the row already holding its path.
    async fn upsert_file(&self, file: &FileUpsert) -> Result<UpsertResult>;

    async fn get_file_by_path(&self, path: &str) -> Result<Option<FileRecord>>;

    /// Returns false when the row was already gone.
    async fn delete_file(&self, id: FileId) -> Result<bool>;

    /// Drop the rows of `directory_id` that live below `dir`; returns how many went.
    async fn delete_files_under(&self, directory_id: DirectoryId, dir: &Path) -> Result<u64>;

    /// Replace a directory's aggregates with values computed from its rows.
    async fn recompute_directory_stats(&self, id: DirectoryId) -> Result<Option<DirectoryStats>>;

    async fn touch_directory_scan_time(&self, id: DirectoryId) -> Result<()>;

    /// Create the virtual grouping row if needed and return its id.
    async fn ensure_virtual_grouping(&self) -> Result<DirectoryId>;

    async fn get_virtual_grouping_id(&self) -> Result<Option<DirectoryId>>;

    async fn get_directory_by_id(&self, id: DirectoryId) -> Result<Option<Directory>>;

    async fn add_directory(&self, path: &str, is_watching: bool) -> Result<DirectoryId>;

    /// Delete a directory together with its files.
    async fn delete_directory(&self, id: DirectoryId) -> Result<bool>;

    async fn get_all_files(&self) -> Result<Vec<FileRecord>>;

    /// User-visible directories; the virtual grouping is excluded.
    async fn list_directories(&self) -> Result<Vec<Directory>>;

    async fn list_file_paths_in_directory(
        &self,
        id: DirectoryId,
    ) -> Result<Vec<(FileId, String)>>;

    async fn set_directory_watching(&self, id: DirectoryId, watching: bool) -> Result<bool>;
}

#[async_trait]
impl Catalog for CatalogDb {
    async fn upsert_file(&self, file: &FileUpsert) -> Result<UpsertResult> {
        CatalogDb::upsert_file(self, file).await
    }

    async fn get_file_by_path(&self, path: &str) -> Result<Option<FileRecord>> {
        CatalogDb::get_file_by_path(self, path).await
    }

    async fn delete_file(&self, id: FileId) -> Result<bool> {
        CatalogDb::delete_file(self, id).await
    }

    async fn delete_files_under(&self, directory_id: DirectoryId, dir: &Path) -> Result<u64> {
        CatalogDb::delete_files_under(self, directory_id, dir).await
    }

    async fn recompute_directory_stats(&self, id: DirectoryId) -> Result<Option<DirectoryStats>> {
        CatalogDb::recompute_directory_stats(self, id).await
    }

    async fn touch_directory_scan_time(&self, id: DirectoryId) -> Result<()> {
        CatalogDb::touch_directory_scan_time(self, id).await
    }

    async fn ensure_virtual_grouping(&self) -> Result<DirectoryId> {
        CatalogDb::ensure_virtual_grouping(self).await
    }

    async fn get_virtual_grouping_id(&self) -> Result<Option<DirectoryId>> {
        CatalogDb::get_virtual_grouping_id(self).await
    }

    async fn get_directory_by_id(&self, id: DirectoryId) -> Result<Option<Directory>> {
        CatalogDb::get_directory_by_id(self, id).await
    }

    async fn add_directory(&self, path: &str, is_watching: bool) -> Result<DirectoryId> {
        CatalogDb::add_directory(self, path, is_watching).await
    }

    async fn delete_directory(&self, id: DirectoryId) -> Result<bool> {
        CatalogDb::delete_directory(self, id).await
    }

    async fn get_all_files(&self) -> Result<Vec<FileRecord>> {
        CatalogDb::get_all_files(self).await
    }

    async fn list_directories(&self) -> Result<Vec<Directory>> {
        CatalogDb::list_directories(self).await
    }

    async fn list_file_paths_in_directory(
        &self,
        id: DirectoryId,
    ) -> Result<Vec<(FileId, String)>> {
        CatalogDb::list_file_paths_in_directory(self, id).await
    }

    async fn set_directory_watching(&self, id: DirectoryId, watching: bool) -> Result<bool> {
        CatalogDb::set_directory_watching(self, id, watching).await
    }
}
