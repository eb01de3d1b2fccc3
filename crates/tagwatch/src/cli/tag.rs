//! Tag commands: `tag add|rm|ls|attach|detach`

use super::output::{print_json, print_table};
use super::CliContext;
use anyhow::{bail, Result};
use clap::Subcommand;
use std::path::{Path, PathBuf};
use tagwatch::TagWatch;
use tagwatch_db::{CatalogDb, FileRecord, Tag};

#[derive(Subcommand, Debug)]
pub enum TagCommand {
    /// Create a tag (no-op when it already exists)
    Add {
        name: String,
        /// Hex color, e.g. "#FF9500"
        #[arg(long)]
        color: Option<String>,
    },
    /// Delete a tag; tagged files stay in the catalog
    Rm { name: String },
    /// List tags with their file counts
    Ls {
        #[arg(long)]
        json: bool,
    },
    /// Attach a tag to a cataloged file
    Attach { name: String, file: PathBuf },
    /// Detach a tag from a file
    Detach { name: String, file: PathBuf },
}

pub async fn run(ctx: &CliContext, command: TagCommand) -> Result<()> {
    let tw = ctx.open().await?;
    let result = dispatch(&tw, command).await;
    tw.shutdown().await;
    result
}

async fn dispatch(tw: &TagWatch, command: TagCommand) -> Result<()> {
    let db = tw.catalog();
    match command {
        TagCommand::Add { name, color } => {
            let tag = db.add_tag(&name, color.as_deref()).await?;
            println!("Tag '{}' ({}) id {}", tag.name, tag.color, tag.id);
        }
        TagCommand::Rm { name } => {
            let tag = require_tag(db, &name).await?;
            db.delete_tag(tag.id).await?;
            println!("Deleted tag '{}'", tag.name);
        }
        TagCommand::Ls { json } => {
            let tags = db.list_tags().await?;
            let mut rows = Vec::with_capacity(tags.len());
            for tag in &tags {
                rows.push((tag, db.count_files_for_tag(tag.id).await?));
            }
            if json {
                let out: Vec<_> = rows
                    .iter()
                    .map(|(tag, count)| serde_json::json!({ "tag": tag, "fileCount": count }))
                    .collect();
                return print_json(&out);
            }
            if rows.is_empty() {
                println!("No tags.");
                return Ok(());
            }
            print_table(
                &["ID", "NAME", "COLOR", "FILES"],
                rows.into_iter()
                    .map(|(tag, count)| {
                        vec![
                            tag.id.to_string(),
                            tag.name.clone(),
                            tag.color.clone(),
                            count.to_string(),
                        ]
                    })
                    .collect(),
            );
        }
        TagCommand::Attach { name, file } => {
            let tag = require_tag(db, &name).await?;
            let file = require_file(db, &file).await?;
            db.tag_file(file.id, tag.id).await?;
            println!("Tagged {} with '{}'", file.path, tag.name);
        }
        TagCommand::Detach { name, file } => {
            let tag = require_tag(db, &name).await?;
            let file = require_file(db, &file).await?;
            if db.untag_file(file.id, tag.id).await? {
                println!("Removed '{}' from {}", tag.name, file.path);
            } else {
                println!("{} was not tagged '{}'", file.path, tag.name);
            }
        }
    }
    Ok(())
}

async fn require_tag(db: &CatalogDb, name: &str) -> Result<Tag> {
    match db.get_tag_by_name(name.trim()).await? {
        Some(tag) => Ok(tag),
        None => bail!("Tag '{}' not found", name),
    }
}

/// Look a file up by its cataloged (absolute) path.
async fn require_file(db: &CatalogDb, path: &Path) -> Result<FileRecord> {
    let absolute = match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => {
            let parent = if parent.as_os_str().is_empty() {
                PathBuf::from(".")
            } else {
                parent.to_path_buf()
            };
            parent
                .canonicalize()
                .map(|p| p.join(name))
                .unwrap_or_else(|_| path.to_path_buf())
        }
        _ => path.to_path_buf(),
    };

    match db.get_file_by_path(&absolute.to_string_lossy()).await? {
        Some(file) => Ok(file),
        None => bail!(
            "File is not in the catalog: {} (add it with `tagwatch add-files`)",
            absolute.display()
        ),
    }
}
