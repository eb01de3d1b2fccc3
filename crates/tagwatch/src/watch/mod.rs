//! Watching and indexing
//!
//! The registry installs native watches, the indexer performs one-shot
//! sweeps, and the reconciler applies live events to the catalog.

pub mod filter;
pub mod indexer;
pub mod reconciler;
pub mod registry;
pub mod translate;
pub mod types;
pub mod virtual_group;

pub use filter::PathFilter;
pub use indexer::{IndexConfig, IndexError, IndexReport, Indexer};
pub use reconciler::{Reconciled, Reconciler};
pub use registry::{WatchRegistry, WatchSettings};
pub use types::{FileGroupId, WatchEvent, WatchEventKind, WatchKey};
