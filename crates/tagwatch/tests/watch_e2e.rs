//! End-to-end tests: real directories, real native watches, real catalog.
//!
//! Live-watch assertions poll the catalog with a deadline instead of sleeping
//! for a fixed time.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tagwatch::{TagWatch, TagwatchConfig, WatchError, WatchKey};
use tagwatch_db::CatalogDb;
use tempfile::TempDir;

const POLL_DEADLINE: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_millis(50);

fn test_config(tmp: &TempDir) -> TagwatchConfig {
    TagwatchConfig {
        database_path: tmp.path().join("catalog.sqlite3"),
        debounce_ms: 100,
        ..TagwatchConfig::default()
    }
}

async fn open_service(tmp: &TempDir) -> TagWatch {
    TagWatch::open(test_config(tmp)).await.unwrap()
}

/// Make a fresh data directory inside `tmp`, returned in canonical form.
fn data_dir(tmp: &TempDir, name: &str) -> PathBuf {
    let dir = tmp.path().join(name);
    std::fs::create_dir_all(&dir).unwrap();
    dir.canonicalize().unwrap()
}

async fn wait_until<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + POLL_DEADLINE;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

async fn has_file(db: &CatalogDb, path: &Path) -> bool {
    db.get_file_by_path(&path.to_string_lossy())
        .await
        .unwrap()
        .is_some()
}

#[tokio::test]
async fn test_index_reports_count_and_size() {
    let tmp = TempDir::new().unwrap();
    let dir = data_dir(&tmp, "a");
    std::fs::write(dir.join("x.txt"), b"abc").unwrap();
    std::fs::create_dir(dir.join("sub")).unwrap();
    std::fs::write(dir.join("sub").join("z.bin"), vec![0u8; 10]).unwrap();

    let tw = open_service(&tmp).await;
    let summary = tw.add_and_watch_directory(&dir).await.unwrap();

    assert!(summary.watching);
    assert_eq!(summary.directory.path, dir.to_string_lossy());
    assert_eq!(summary.directory.name, "a");
    assert_eq!(summary.directory.files_count, 2);
    assert_eq!(summary.directory.total_size, 13);
    assert!(summary.directory.last_scan.is_some());
    assert_eq!(summary.index.files_new, 2);

    let db = tw.catalog().clone();
    let x = db
        .get_file_by_path(&dir.join("x.txt").to_string_lossy())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(x.name, "x.txt");
    assert_eq!(x.size, 3);
    assert_eq!(x.directory_id, Some(summary.directory.id));

    tw.shutdown().await;
}

#[tokio::test]
async fn test_live_add_and_delete() {
    let tmp = TempDir::new().unwrap();
    let dir = data_dir(&tmp, "a");
    std::fs::write(dir.join("x.txt"), b"abc").unwrap();

    let tw = open_service(&tmp).await;
    let summary = tw.add_and_watch_directory(&dir).await.unwrap();
    let id = summary.directory.id;
    let db = tw.catalog().clone();

    let y = dir.join("y.txt");
    std::fs::write(&y, b"hello").unwrap();

    let added = wait_until(|| {
        let db = db.clone();
        let y = y.clone();
        async move {
            let dir = db.get_directory_by_id(id).await.unwrap().unwrap();
            has_file(&db, &y).await && dir.files_count == 2 && dir.total_size == 8
        }
    })
    .await;
    assert!(added, "live add was not reconciled");

    let record = db.get_file_by_path(&y.to_string_lossy()).await.unwrap().unwrap();
    assert_eq!(record.size, 5);
    assert_eq!(record.directory_id, Some(id));

    std::fs::remove_file(&y).unwrap();
    let removed = wait_until(|| {
        let db = db.clone();
        let y = y.clone();
        async move {
            let dir = db.get_directory_by_id(id).await.unwrap().unwrap();
            !has_file(&db, &y).await && dir.files_count == 1 && dir.total_size == 3
        }
    })
    .await;
    assert!(removed, "live delete was not reconciled");

    tw.shutdown().await;
}

#[tokio::test]
async fn test_live_change_keeps_id_and_tags() {
    let tmp = TempDir::new().unwrap();
    let dir = data_dir(&tmp, "a");
    let x = dir.join("x.txt");
    std::fs::write(&x, b"abc").unwrap();

    let tw = open_service(&tmp).await;
    let summary = tw.add_and_watch_directory(&dir).await.unwrap();
    let db = tw.catalog().clone();

    let before = db.get_file_by_path(&x.to_string_lossy()).await.unwrap().unwrap();
    let tag = db.add_tag("work", None).await.unwrap();
    db.tag_file(before.id, tag.id).await.unwrap();

    std::fs::write(&x, b"abcdefgh").unwrap();
    let changed = wait_until(|| {
        let db = db.clone();
        let x = x.clone();
        async move {
            db.get_file_by_path(&x.to_string_lossy())
                .await
                .unwrap()
                .map(|f| f.size == 8)
                .unwrap_or(false)
        }
    })
    .await;
    assert!(changed, "content change was not reconciled");

    let after = db.get_file_by_path(&x.to_string_lossy()).await.unwrap().unwrap();
    assert_eq!(after.id, before.id);
    assert!(db.is_file_tagged(after.id, tag.id).await.unwrap());

    let dir_row = db.get_directory_by_id(summary.directory.id).await.unwrap().unwrap();
    assert_eq!(dir_row.total_size, 8);

    tw.shutdown().await;
}

#[tokio::test]
async fn test_hidden_files_are_not_reconciled() {
    let tmp = TempDir::new().unwrap();
    let dir = data_dir(&tmp, "a");

    let tw = open_service(&tmp).await;
    let summary = tw.add_and_watch_directory(&dir).await.unwrap();
    let db = tw.catalog().clone();

    std::fs::write(dir.join(".secret"), b"hidden").unwrap();
    let visible = dir.join("visible.txt");
    std::fs::write(&visible, b"v").unwrap();

    let seen = wait_until(|| {
        let db = db.clone();
        let visible = visible.clone();
        async move { has_file(&db, &visible).await }
    })
    .await;
    assert!(seen);
    assert!(!has_file(&db, &dir.join(".secret")).await);
    let files = db.list_files_in_directory(summary.directory.id).await.unwrap();
    assert_eq!(files.len(), 1);

    tw.shutdown().await;
}

#[tokio::test]
async fn test_add_watched_files_records_immediately() {
    let tmp = TempDir::new().unwrap();
    let dir = data_dir(&tmp, "loose");
    let f = dir.join("f.txt");
    std::fs::write(&f, b"12345").unwrap();

    let tw = open_service(&tmp).await;
    let summary = tw
        .add_watched_files(&[f.clone(), dir.join("missing.txt")])
        .await
        .unwrap();
    assert_eq!(summary.count, 1);
    assert!(summary.watching);

    let db = tw.catalog().clone();
    let group = db.get_virtual_grouping_id().await.unwrap().unwrap();
    assert_eq!(summary.directory_id, Some(group));

    // Synthetic add, no filesystem event needed
    let record = db.get_file_by_path(&f.to_string_lossy()).await.unwrap().unwrap();
    assert_eq!(record.directory_id, Some(group));
    assert_eq!(record.size, 5);

    // The grouping never shows up as a user directory
    assert!(tw.list_directories().await.unwrap().is_empty());
    assert_eq!(tw.database_info().await.unwrap().directory_count, 0);

    std::fs::write(&f, b"1234567890").unwrap();
    let changed = wait_until(|| {
        let db = db.clone();
        let f = f.clone();
        async move {
            db.get_file_by_path(&f.to_string_lossy())
                .await
                .unwrap()
                .map(|r| r.size == 10)
                .unwrap_or(false)
        }
    })
    .await;
    assert!(changed, "change to an individually watched file was not reconciled");

    tw.shutdown().await;
}

#[tokio::test]
async fn test_file_group_records_every_existing_file() {
    let tmp = TempDir::new().unwrap();
    let dir = data_dir(&tmp, "b");
    let one = dir.join("one.txt");
    let two = dir.join("two.txt");
    std::fs::write(&one, b"1").unwrap();
    std::fs::write(&two, b"22").unwrap();

    let tw = open_service(&tmp).await;
    let summary = tw.add_watched_files(&[one.clone(), two.clone()]).await.unwrap();
    assert_eq!(summary.count, 2);

    let group = summary.directory_id.unwrap();
    let mut files = tw.catalog().get_all_files().await.unwrap();
    files.sort_by(|a, b| a.name.cmp(&b.name));
    let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["one.txt", "two.txt"]);
    assert!(files.iter().all(|f| f.directory_id == Some(group)));

    let row = tw.catalog().get_directory_by_id(group).await.unwrap().unwrap();
    assert_eq!((row.files_count, row.total_size), (2, 3));
    assert!(row.is_watching);

    tw.shutdown().await;
}

#[tokio::test]
async fn test_add_watched_files_with_nothing_valid() {
    let tmp = TempDir::new().unwrap();
    let tw = open_service(&tmp).await;

    let summary = tw
        .add_watched_files(&[tmp.path().join("nope.txt"), tmp.path().to_path_buf()])
        .await
        .unwrap();
    assert_eq!(summary.count, 0);
    assert_eq!(summary.directory_id, None);
    assert!(tw.catalog().get_virtual_grouping_id().await.unwrap().is_none());

    tw.shutdown().await;
}

#[tokio::test]
async fn test_rewatch_replaces_handle() {
    let tmp = TempDir::new().unwrap();
    let dir = data_dir(&tmp, "a");

    let tw = open_service(&tmp).await;
    let first = tw.add_and_watch_directory(&dir).await.unwrap();
    let second = tw.add_and_watch_directory(&dir).await.unwrap();

    assert_eq!(first.directory.id, second.directory.id);
    let keys = tw.registry().list_watched_keys();
    assert_eq!(keys, vec![WatchKey::Directory(dir.clone())]);

    tw.shutdown().await;
}

#[tokio::test]
async fn test_add_non_directory_fails() {
    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("plain.txt");
    std::fs::write(&file, b"x").unwrap();

    let tw = open_service(&tmp).await;
    let err = tw.add_and_watch_directory(&file).await.unwrap_err();
    assert!(matches!(err, WatchError::NotADirectory(_)));
    let err = tw
        .add_and_watch_directory(&tmp.path().join("missing"))
        .await
        .unwrap_err();
    assert!(matches!(err, WatchError::NotADirectory(_)));
    assert!(tw.list_directories().await.unwrap().is_empty());

    tw.shutdown().await;
}

#[tokio::test]
async fn test_rescan_prunes_files_removed_while_unwatched() {
    let tmp = TempDir::new().unwrap();
    let dir = data_dir(&tmp, "a");
    std::fs::write(dir.join("keep.txt"), b"k").unwrap();
    std::fs::write(dir.join("drop.txt"), b"dd").unwrap();

    let tw = open_service(&tmp).await;
    let summary = tw.add_and_watch_directory(&dir).await.unwrap();
    let id = summary.directory.id;
    assert!(!tw.toggle_watch(id).await.unwrap());
    assert!(tw.registry().keys_for_directory(id).is_empty());

    std::fs::remove_file(dir.join("drop.txt")).unwrap();
    let rescan = tw.rescan_directory(id).await.unwrap();
    assert_eq!(rescan.scanned_files, 1);
    assert_eq!(rescan.removed_files, 1);

    let row = tw.catalog().get_directory_by_id(id).await.unwrap().unwrap();
    assert_eq!((row.files_count, row.total_size), (1, 1));
    assert!(!row.is_watching);

    tw.shutdown().await;
}

#[tokio::test]
async fn test_toggle_on_catches_up() {
    let tmp = TempDir::new().unwrap();
    let dir = data_dir(&tmp, "a");

    let tw = open_service(&tmp).await;
    let id = tw.add_and_watch_directory(&dir).await.unwrap().directory.id;
    assert!(!tw.toggle_watch(id).await.unwrap());

    std::fs::write(dir.join("offline.txt"), b"off").unwrap();
    assert!(tw.toggle_watch(id).await.unwrap());

    assert!(has_file(tw.catalog(), &dir.join("offline.txt")).await);
    assert!(tw
        .registry()
        .is_watching(&WatchKey::Directory(dir.clone())));
    assert!(tw.catalog().get_directory_by_id(id).await.unwrap().unwrap().is_watching);

    tw.shutdown().await;
}

#[tokio::test]
async fn test_toggle_unknown_directory() {
    let tmp = TempDir::new().unwrap();
    let tw = open_service(&tmp).await;
    let err = tw.toggle_watch(4242).await.unwrap_err();
    assert!(matches!(err, WatchError::DirectoryNotFound(4242)));
    tw.shutdown().await;
}

#[tokio::test]
async fn test_remove_directory_cascades() {
    let tmp = TempDir::new().unwrap();
    let dir = data_dir(&tmp, "a");
    std::fs::write(dir.join("x.txt"), b"abc").unwrap();

    let tw = open_service(&tmp).await;
    let id = tw.add_and_watch_directory(&dir).await.unwrap().directory.id;
    let db = tw.catalog().clone();
    let tag = db.add_tag("keep-me", None).await.unwrap();
    let file = db
        .get_file_by_path(&dir.join("x.txt").to_string_lossy())
        .await
        .unwrap()
        .unwrap();
    db.tag_file(file.id, tag.id).await.unwrap();

    assert!(tw.remove_directory(id).await.unwrap());
    assert!(tw.registry().list_watched_keys().is_empty());
    assert!(db.get_all_files().await.unwrap().is_empty());
    assert_eq!(db.count_files_for_tag(tag.id).await.unwrap(), 0);
    assert!(db.get_tag_by_name("keep-me").await.unwrap().is_some());
    assert!(!tw.remove_directory(id).await.unwrap());

    tw.shutdown().await;
}

#[tokio::test]
async fn test_resume_after_reopen() {
    let tmp = TempDir::new().unwrap();
    let dir = data_dir(&tmp, "a");
    let loose = data_dir(&tmp, "loose").join("f.txt");
    std::fs::write(&loose, b"f").unwrap();

    {
        let tw = open_service(&tmp).await;
        tw.add_and_watch_directory(&dir).await.unwrap();
        tw.add_watched_files(&[loose.clone()]).await.unwrap();
        tw.shutdown().await;
    }

    // Created while nothing was running
    std::fs::write(dir.join("late.txt"), b"late").unwrap();

    let tw = open_service(&tmp).await;
    assert!(tw.registry().list_watched_keys().is_empty());
    let summary = tw.resume_watches().await.unwrap();
    assert_eq!(summary.directories, 1);
    assert_eq!(summary.file_groups, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(tw.registry().list_watched_keys().len(), 2);
    assert!(has_file(tw.catalog(), &dir.join("late.txt")).await);

    tw.stop_watching_everything();
    assert!(tw.registry().list_watched_keys().is_empty());
    // Persisted flags survive a stop
    assert!(tw.list_directories().await.unwrap()[0].is_watching);

    tw.shutdown().await;
}

#[tokio::test]
async fn test_resume_respects_auto_start_setting() {
    let tmp = TempDir::new().unwrap();
    let dir = data_dir(&tmp, "a");

    let tw = open_service(&tmp).await;
    tw.add_and_watch_directory(&dir).await.unwrap();
    tw.stop_watching_everything();
    tw.catalog()
        .set_setting("auto_start_monitoring", "false")
        .await
        .unwrap();

    let summary = tw.resume_watches().await.unwrap();
    assert_eq!(summary.directories, 0);
    assert!(tw.registry().list_watched_keys().is_empty());

    tw.shutdown().await;
}

#[tokio::test]
async fn test_live_rename_within_tree() {
    let tmp = TempDir::new().unwrap();
    let dir = data_dir(&tmp, "a");
    let old = dir.join("draft.txt");
    std::fs::write(&old, b"abc").unwrap();

    let tw = open_service(&tmp).await;
    let id = tw.add_and_watch_directory(&dir).await.unwrap().directory.id;
    let db = tw.catalog().clone();

    let new = dir.join("final.txt");
    std::fs::rename(&old, &new).unwrap();

    let renamed = wait_until(|| {
        let db = db.clone();
        let (old, new) = (old.clone(), new.clone());
        async move {
            let dir = db.get_directory_by_id(id).await.unwrap().unwrap();
            !has_file(&db, &old).await && has_file(&db, &new).await && dir.files_count == 1
        }
    })
    .await;
    assert!(renamed, "rename inside the tree was not reconciled");

    tw.shutdown().await;
}

#[tokio::test]
async fn test_directory_moved_into_tree_is_cataloged() {
    let tmp = TempDir::new().unwrap();
    let dir = data_dir(&tmp, "a");
    std::fs::write(dir.join("keep.txt"), b"k").unwrap();
    let staging = data_dir(&tmp, "staging");
    std::fs::create_dir_all(staging.join("out/nested")).unwrap();
    std::fs::write(staging.join("out/a.txt"), b"aa").unwrap();
    std::fs::write(staging.join("out/nested/b.txt"), b"bbb").unwrap();

    let tw = open_service(&tmp).await;
    let id = tw.add_and_watch_directory(&dir).await.unwrap().directory.id;
    let db = tw.catalog().clone();

    std::fs::rename(staging.join("out"), dir.join("out")).unwrap();
    let nested = dir.join("out/nested/b.txt");

    let arrived = wait_until(|| {
        let db = db.clone();
        let nested = nested.clone();
        async move {
            let dir = db.get_directory_by_id(id).await.unwrap().unwrap();
            has_file(&db, &nested).await && dir.files_count == 3 && dir.total_size == 6
        }
    })
    .await;
    assert!(arrived, "files of a moved-in directory were not cataloged");

    let row = db.get_file_by_path(&nested.to_string_lossy()).await.unwrap().unwrap();
    assert_eq!(row.directory_id, Some(id));

    tw.shutdown().await;
}

#[tokio::test]
async fn test_directory_moved_out_of_tree_drops_its_files() {
    let tmp = TempDir::new().unwrap();
    let dir = data_dir(&tmp, "a");
    std::fs::write(dir.join("keep.txt"), b"k").unwrap();
    std::fs::create_dir_all(dir.join("sub/deep")).unwrap();
    std::fs::write(dir.join("sub/a.txt"), b"aa").unwrap();
    std::fs::write(dir.join("sub/deep/b.txt"), b"bbb").unwrap();

    let tw = open_service(&tmp).await;
    let summary = tw.add_and_watch_directory(&dir).await.unwrap();
    assert_eq!(summary.directory.files_count, 3);
    let id = summary.directory.id;
    let db = tw.catalog().clone();

    let elsewhere = data_dir(&tmp, "elsewhere");
    std::fs::rename(dir.join("sub"), elsewhere.join("sub")).unwrap();
    let gone = dir.join("sub/deep/b.txt");

    let dropped = wait_until(|| {
        let db = db.clone();
        let gone = gone.clone();
        async move {
            let dir = db.get_directory_by_id(id).await.unwrap().unwrap();
            !has_file(&db, &gone).await && dir.files_count == 1 && dir.total_size == 1
        }
    })
    .await;
    assert!(dropped, "rows of a moved-out directory were left behind");

    tw.shutdown().await;
}

#[tokio::test]
async fn test_rescan_during_live_add_keeps_new_file() {
    let tmp = TempDir::new().unwrap();
    let dir = data_dir(&tmp, "a");
    std::fs::write(dir.join("x.txt"), b"x").unwrap();

    let tw = open_service(&tmp).await;
    let id = tw.add_and_watch_directory(&dir).await.unwrap().directory.id;
    let db = tw.catalog().clone();

    let y = dir.join("y.txt");
    std::fs::write(&y, b"late").unwrap();
    tw.rescan_directory(id).await.unwrap();

    let settled = wait_until(|| {
        let db = db.clone();
        let y = y.clone();
        async move {
            let dir = db.get_directory_by_id(id).await.unwrap().unwrap();
            has_file(&db, &y).await && dir.files_count == 2
        }
    })
    .await;
    assert!(settled, "file added during a rescan went missing");

    // Let the debounced add land after the rescan, then sweep again
    tokio::time::sleep(Duration::from_millis(300)).await;
    let rescan = tw.rescan_directory(id).await.unwrap();
    assert_eq!(rescan.removed_files, 0);
    assert!(has_file(&db, &y).await);

    tw.shutdown().await;
}
