//! Tagwatch - keeps a tagging catalog in sync with the filesystem
//!
//! Directories are indexed once and then watched; individually added files
//! are watched under a virtual grouping. Every change ends up as an upsert or
//! delete in the SQLite catalog owned by `tagwatch_db`, so tag links survive
//! edits and re-indexing.
//!
//! # Usage
//!
//! ```rust,ignore
//! use tagwatch::{TagWatch, TagwatchConfig};
//!
//! let tw = TagWatch::open(TagwatchConfig::default()).await?;
//! let summary = tw.add_and_watch_directory("/home/me/photos".as_ref()).await?;
//! println!("{} files", summary.index.files_indexed);
//! tw.shutdown().await;
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod service;
pub mod watch;

pub use catalog::Catalog;
pub use config::TagwatchConfig;
pub use error::{Result, WatchError};
pub use service::{AddFilesSummary, DirectorySummary, RescanSummary, ResumeSummary, TagWatch};
pub use watch::{WatchEvent, WatchEventKind, WatchKey, WatchRegistry};
