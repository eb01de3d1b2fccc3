//! Read-only catalog commands: `dirs`, `files`, `info`

use super::output::{format_size, format_timestamp, print_json, print_table};
use super::CliContext;
use anyhow::{bail, Result};
use serde::Serialize;
use tagwatch::TagWatch;
use tagwatch_db::{DatabaseInfo, FileRecord};

pub async fn run_dirs(ctx: &CliContext, json: bool) -> Result<()> {
    let tw = ctx.open().await?;
    let result = list_dirs(&tw, json).await;
    tw.shutdown().await;
    result
}

async fn list_dirs(tw: &TagWatch, json: bool) -> Result<()> {
    let directories = tw.list_directories().await?;
    if json {
        return print_json(&directories);
    }
    if directories.is_empty() {
        println!("No directories. Add one with `tagwatch watch <DIR>`.");
        return Ok(());
    }

    let rows = directories
        .iter()
        .map(|d| {
            vec![
                d.id.to_string(),
                d.path.clone(),
                if d.is_watching { "yes" } else { "no" }.to_string(),
                d.files_count.to_string(),
                format_size(d.total_size),
                format_timestamp(d.last_scan),
            ]
        })
        .collect();
    print_table(&["ID", "PATH", "WATCHING", "FILES", "SIZE", "LAST SCAN"], rows);
    Ok(())
}

pub async fn run_files(ctx: &CliContext, tag: Option<String>, json: bool) -> Result<()> {
    let tw = ctx.open().await?;
    let result = list_files(&tw, tag.as_deref(), json).await;
    tw.shutdown().await;
    result
}

async fn list_files(tw: &TagWatch, tag: Option<&str>, json: bool) -> Result<()> {
    let db = tw.catalog();
    let files: Vec<FileRecord> = match tag {
        Some(name) => {
            let Some(tag) = db.get_tag_by_name(name).await? else {
                bail!("Tag '{}' not found", name);
            };
            db.files_by_tag(tag.id).await?
        }
        None => db.get_all_files().await?,
    };

    if json {
        return print_json(&files);
    }
    if files.is_empty() {
        println!("No files.");
        return Ok(());
    }

    let mut rows = Vec::with_capacity(files.len());
    for file in &files {
        let tags = db
            .tags_for_file(file.id)
            .await?
            .into_iter()
            .map(|t| t.name)
            .collect::<Vec<_>>()
            .join(", ");
        rows.push(vec![
            file.id.to_string(),
            file.path.clone(),
            format_size(file.size),
            tags,
        ]);
    }
    print_table(&["ID", "PATH", "SIZE", "TAGS"], rows);
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InfoOutput {
    database_path: String,
    #[serde(flatten)]
    counts: DatabaseInfo,
    settings: Vec<(String, String)>,
}

pub async fn run_info(ctx: &CliContext, json: bool) -> Result<()> {
    let tw = ctx.open().await?;
    let result = info(&tw, json).await;
    tw.shutdown().await;
    result
}

async fn info(tw: &TagWatch, json: bool) -> Result<()> {
    let output = InfoOutput {
        database_path: tw.config().database_path.display().to_string(),
        counts: tw.database_info().await?,
        settings: tw.catalog().list_settings().await?,
    };
    if json {
        return print_json(&output);
    }

    println!("Database:    {}", output.database_path);
    println!("Directories: {}", output.counts.directory_count);
    println!("Files:       {}", output.counts.file_count);
    println!("Tags:        {}", output.counts.tag_count);
    println!();
    let rows = output
        .settings
        .iter()
        .map(|(key, value)| vec![key.clone(), value.replace('\n', " ")])
        .collect();
    print_table(&["SETTING", "VALUE"], rows);
    Ok(())
}
