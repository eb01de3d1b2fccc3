//! Watch commands: `watch`, `add-files`, `run`, `rescan`, `toggle`, `remove`

use super::output::{format_size, print_json};
use super::{wait_for_shutdown, CliContext};
use anyhow::{bail, Result};
use std::path::PathBuf;
use tagwatch::TagWatch;
use tagwatch_db::DirectoryId;

/// Add a directory, index it and watch it until Ctrl-C.
pub async fn run_watch(ctx: &CliContext, path: PathBuf, json: bool) -> Result<()> {
    let tw = ctx.open().await?;
    let summary = match tw.add_and_watch_directory(&path).await {
        Ok(summary) => summary,
        Err(e) => {
            tw.shutdown().await;
            return Err(e.into());
        }
    };

    if json {
        print_json(&summary)?;
    } else {
        let report = &summary.index;
        println!(
            "Indexed {} ({} files, {}) in {} ms",
            summary.directory.path,
            report.stats.files_count,
            format_size(report.stats.total_size),
            report.duration_ms
        );
        if report.files_removed > 0 {
            println!("  {} stale entries removed", report.files_removed);
        }
        for err in &report.errors {
            println!("  skipped {}: {}", err.path.display(), err.message);
        }
        if !summary.watching {
            println!("  warning: could not install a watch, changes will not be tracked");
        }
    }

    if !summary.watching {
        tw.shutdown().await;
        return Ok(());
    }
    wait_for_shutdown(&tw).await
}

/// Watch individual files until Ctrl-C.
pub async fn run_add_files(ctx: &CliContext, paths: Vec<PathBuf>, json: bool) -> Result<()> {
    let tw = ctx.open().await?;
    let summary = match tw.add_watched_files(&paths).await {
        Ok(summary) => summary,
        Err(e) => {
            tw.shutdown().await;
            return Err(e.into());
        }
    };

    if json {
        print_json(&summary)?;
    } else {
        println!("Added {} of {} files", summary.count, paths.len());
    }

    if summary.count == 0 || !summary.watching {
        tw.shutdown().await;
        return Ok(());
    }
    wait_for_shutdown(&tw).await
}

/// Bring back every persisted watch and keep running until Ctrl-C.
pub async fn run_resume(ctx: &CliContext) -> Result<()> {
    let tw = ctx.open().await?;
    let summary = match tw.resume_watches().await {
        Ok(summary) => summary,
        Err(e) => {
            tw.shutdown().await;
            return Err(e.into());
        }
    };

    println!(
        "Resumed {} directories and {} file groups ({} failed)",
        summary.directories, summary.file_groups, summary.failed
    );
    if summary.directories + summary.file_groups == 0 {
        println!("Nothing to watch.");
        tw.shutdown().await;
        return Ok(());
    }
    wait_for_shutdown(&tw).await
}

pub async fn run_rescan(ctx: &CliContext, directory_id: DirectoryId, json: bool) -> Result<()> {
    let tw = ctx.open().await?;
    let result = rescan(&tw, directory_id, json).await;
    tw.shutdown().await;
    result
}

async fn rescan(tw: &TagWatch, directory_id: DirectoryId, json: bool) -> Result<()> {
    let summary = tw.rescan_directory(directory_id).await?;
    if json {
        print_json(&summary)?;
    } else {
        println!(
            "Rescanned directory {}: {} files, {} removed, {} ms",
            directory_id, summary.scanned_files, summary.removed_files, summary.elapsed_ms
        );
    }
    Ok(())
}

/// Flip the persisted watching flag. The watch itself only lives while a
/// foreground command (`run`) is active.
pub async fn run_toggle(ctx: &CliContext, directory_id: DirectoryId) -> Result<()> {
    let tw = ctx.open().await?;
    let result = toggle(&tw, directory_id).await;
    tw.shutdown().await;
    result
}

async fn toggle(tw: &TagWatch, directory_id: DirectoryId) -> Result<()> {
    let Some(directory) = tw.catalog().get_directory_by_id(directory_id).await? else {
        bail!("Directory {} not found", directory_id);
    };

    let watching = tw.toggle_watch(directory_id).await?;
    if watching == directory.is_watching {
        println!("Directory {}: could not start watching", directory_id);
    } else if watching {
        println!("Directory {}: watching enabled", directory_id);
    } else {
        println!("Directory {}: watching disabled", directory_id);
    }
    Ok(())
}

pub async fn run_remove(ctx: &CliContext, directory_id: DirectoryId) -> Result<()> {
    let tw = ctx.open().await?;
    let result = tw.remove_directory(directory_id).await;
    tw.shutdown().await;

    if !result? {
        bail!("Directory {} not found", directory_id);
    }
    println!("Removed directory {} and its files", directory_id);
    Ok(())
}
