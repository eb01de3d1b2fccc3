//! Entry filtering shared by the indexer and live directory watches.

use std::ffi::OsStr;
use std::path::{Component, Path};
use std::sync::Arc;

/// Decides which entries under a watched root are ignored.
///
/// Hidden entries (leading `.`) are skipped unless `include_hidden` is set.
/// Directories whose name is in the exclude list are never descended into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathFilter {
    include_hidden: bool,
    exclude_dir_names: Arc<[String]>,
}

impl Default for PathFilter {
    fn default() -> Self {
        Self::new(
            false,
            crate::config::DEFAULT_EXCLUDE_DIR_NAMES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        )
    }
}

impl PathFilter {
    pub fn new(include_hidden: bool, exclude_dir_names: Vec<String>) -> Self {
        Self {
            include_hidden,
            exclude_dir_names: Arc::from(exclude_dir_names),
        }
    }

    fn is_hidden(&self, name: &OsStr) -> bool {
        !self.include_hidden && name.to_string_lossy().starts_with('.')
    }

    fn is_excluded_dir_name(&self, name: &OsStr) -> bool {
        let name = name.to_string_lossy();
        self.exclude_dir_names
            .iter()
            .any(|n| n.as_str() == name.as_ref())
    }

    /// True when a walked entry must be skipped (and, for a directory, not descended).
    pub fn skip_entry(&self, name: &OsStr, is_dir: bool) -> bool {
        self.is_hidden(name) || (is_dir && self.is_excluded_dir_name(name))
    }

    /// True when an event path below `root` falls inside an ignored entry.
    ///
    /// Every component is checked for hidden names; all but the last are
    /// directories, so those are also checked against the exclude list.
    /// Paths outside `root` are never ignored.
    pub fn is_ignored(&self, root: &Path, path: &Path) -> bool {
        let Ok(relative) = path.strip_prefix(root) else {
            return false;
        };

        let names: Vec<&OsStr> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(name) => Some(name),
                _ => None,
            })
            .collect();

        let Some((last, parents)) = names.split_last() else {
            return false;
        };

        self.is_hidden(last)
            || parents
                .iter()
                .any(|name| self.is_hidden(name) || self.is_excluded_dir_name(name))
    }
}

/// True when a directory strictly between `root` and `path` is a symlink.
///
/// Native watchers may descend through symlinked directories; entries reached
/// that way are not part of the watched tree. Ancestors that cannot be stat'ed
/// do not count as symlinks.
pub fn crosses_symlink(root: &Path, path: &Path) -> bool {
    let Ok(relative) = path.strip_prefix(root) else {
        return false;
    };

    let mut current = root.to_path_buf();
    let mut components = relative.components().peekable();
    while let Some(component) = components.next() {
        if components.peek().is_none() {
            break;
        }
        current.push(component);
        if std::fs::symlink_metadata(&current)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false)
        {
            return true;
        }
    }
    false
}
