//! Mapping of native notify events onto [`WatchEventKind`].

use super::types::WatchEventKind;
use notify::event::{CreateKind, MetadataKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind};
use std::path::PathBuf;

/// Translate one native event into zero or more typed changes.
///
/// Renames become an unlink of the old path plus an add of the new one.
/// Access events and atime-only metadata changes are dropped.
pub fn translate(event: &Event) -> Vec<(WatchEventKind, PathBuf)> {
    let all = |kind: WatchEventKind| -> Vec<(WatchEventKind, PathBuf)> {
        event
            .paths
            .iter()
            .map(|p| (kind.clone(), p.clone()))
            .collect()
    };

    match event.kind {
        EventKind::Create(CreateKind::Folder) => all(WatchEventKind::AddDir),
        EventKind::Create(_) => all(WatchEventKind::Add),

        EventKind::Remove(RemoveKind::Folder) => all(WatchEventKind::UnlinkDir),
        EventKind::Remove(_) => all(WatchEventKind::Unlink),

        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => all(WatchEventKind::Unlink),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => all(WatchEventKind::Add),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut out = Vec::with_capacity(2);
            if let Some(from) = event.paths.first() {
                out.push((WatchEventKind::Unlink, from.clone()));
            }
            if let Some(to) = event.paths.get(1) {
                out.push((WatchEventKind::Add, to.clone()));
            }
            out
        }
        // Backends that cannot tell which side of a rename they saw
        EventKind::Modify(ModifyKind::Name(_)) => event
            .paths
            .iter()
            .map(|p| {
                let kind = if p.exists() {
                    WatchEventKind::Add
                } else {
                    WatchEventKind::Unlink
                };
                (kind, p.clone())
            })
            .collect(),

        EventKind::Modify(ModifyKind::Metadata(MetadataKind::AccessTime)) => Vec::new(),
        EventKind::Modify(_) => all(WatchEventKind::Change),

        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}
