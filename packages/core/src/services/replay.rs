//! Parent-first reconstruction of workspace content under fresh ids
//!
//! Pull, restore and import all rebuild a desktop forest from a source whose
//! ids must not be reused (remote rows, a snapshot, a portable document). They
//! share this routine: desktops are created in a caller-supplied parent-first
//! order, then notes, assets, folders and connections are created in source
//! order with every reference rewritten through the maps built so far.
//!
//! A record whose reference cannot be resolved is skipped and counted in
//! [`SkipCounts`]; it never fails the whole replay.

use crate::models::{Desktop, SkipCounts, WorkspaceContent};
use crate::services::id_map::IdMap;
use std::collections::HashSet;

/// What to do with a desktop whose parent did not resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrphanPolicy {
    /// Drop it (and, transitively, what it owns)
    Skip,
    /// Re-parent it under the replayed root
    AttachToRoot,
}

#[derive(Debug, Clone)]
pub struct ReplayOptions {
    /// Workspace that receives the replayed desktops
    pub workspace_id: String,
    /// Source desktop ids, parents before children
    pub desktop_order: Vec<String>,
    /// Source id of the subtree root, and the existing desktop to graft it under
    pub graft: Option<(String, Option<String>)>,
    pub orphans: OrphanPolicy,
}

#[derive(Debug, Clone, Default)]
pub struct Replayed {
    pub content: WorkspaceContent,
    pub desktops: IdMap,
    pub notes: IdMap,
    pub skipped: SkipCounts,
    /// New id of the grafted root, or of the first root-level desktop
    pub root_desktop_id: Option<String>,
}

/// Source desktop ids in parent-first order
///
/// Depth-first from every desktop whose parent is absent from `content`, in
/// source order; desktops only reachable through a parent cycle are appended
/// afterwards in source order.
pub fn parent_first_order(content: &WorkspaceContent) -> Vec<String> {
    let ids: HashSet<&str> = content.desktops.iter().map(|d| d.id.as_str()).collect();
    let mut visited: HashSet<&str> = HashSet::new();
    let mut order = Vec::with_capacity(content.desktops.len());

    let roots = content
        .desktops
        .iter()
        .filter(|d| d.parent_id.as_deref().map_or(true, |p| !ids.contains(p)));

    for root in roots {
        let mut stack = vec![root.id.as_str()];
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            order.push(id.to_string());
            let children: Vec<&str> = content
                .desktops
                .iter()
                .filter(|d| d.parent_id.as_deref() == Some(id))
                .map(|d| d.id.as_str())
                .collect();
            stack.extend(children.into_iter().rev());
        }
    }

    for desktop in &content.desktops {
        if visited.insert(desktop.id.as_str()) {
            order.push(desktop.id.clone());
        }
    }

    order
}

pub fn replay(source: &WorkspaceContent, options: &ReplayOptions) -> Replayed {
    let mut out = Replayed::default();

    let graft_root = options.graft.as_ref().map(|(root, _)| root.as_str());
    let graft_parent = options.graft.as_ref().and_then(|(_, parent)| parent.clone());

    for source_id in &options.desktop_order {
        let Some(desktop) = source.desktops.iter().find(|d| &d.id == source_id) else {
            continue;
        };

        let parent_id = if Some(desktop.id.as_str()) == graft_root {
            graft_parent.clone()
        } else {
            match desktop.parent_id.as_deref() {
                None if graft_root.is_none() => None,
                None => out.root_desktop_id.clone(),
                Some(parent) => match out.desktops.resolve(parent) {
                    Some(new_parent) => Some(new_parent.to_string()),
                    None => match (options.orphans, &out.root_desktop_id) {
                        (OrphanPolicy::AttachToRoot, Some(root)) => Some(root.clone()),
                        _ => {
                            tracing::debug!(desktop = %desktop.id, parent, "Skipping orphaned desktop");
                            out.skipped.desktops += 1;
                            continue;
                        }
                    },
                },
            }
        };

        let new_id = out.desktops.mint(&desktop.id);
        let is_root = Some(desktop.id.as_str()) == graft_root
            || (graft_root.is_none() && parent_id.is_none());
        if is_root && out.root_desktop_id.is_none() {
            out.root_desktop_id = Some(new_id.clone());
        }

        out.content.desktops.push(Desktop {
            id: new_id,
            workspace_id: options.workspace_id.clone(),
            parent_id,
            ..desktop.clone()
        });
    }

    for note in &source.notes {
        let Some(desktop_id) = out.desktops.resolve(&note.desktop_id).map(str::to_string) else {
            out.skipped.notes += 1;
            continue;
        };
        let mut note = note.clone();
        note.id = out.notes.mint(&note.id);
        note.desktop_id = desktop_id;
        out.content.notes.push(note);
    }

    for asset in &source.assets {
        let Some(note_id) = out.notes.resolve(&asset.note_id).map(str::to_string) else {
            out.skipped.assets += 1;
            continue;
        };
        let mut asset = asset.clone();
        asset.id = uuid::Uuid::new_v4().to_string();
        asset.note_id = note_id;
        out.content.assets.push(asset);
    }

    for folder in &source.folders {
        let desktop_id = out.desktops.resolve(&folder.desktop_id);
        let target_id = out.desktops.resolve(&folder.target_desktop_id);
        let (Some(desktop_id), Some(target_id)) = (desktop_id, target_id) else {
            tracing::debug!(folder = %folder.id, "Skipping folder with unresolved desktop");
            out.skipped.folders += 1;
            continue;
        };
        let mut folder = folder.clone();
        folder.id = uuid::Uuid::new_v4().to_string();
        folder.desktop_id = desktop_id.to_string();
        folder.target_desktop_id = target_id.to_string();
        out.content.folders.push(folder);
    }

    for connection in &source.connections {
        let desktop_id = out.desktops.resolve(&connection.desktop_id).map(str::to_string);
        let from = out.notes.resolve(&connection.from_note_id).map(str::to_string);
        let to = out.notes.resolve(&connection.to_note_id).map(str::to_string);

        let resolved = match (desktop_id, from, to) {
            (Some(d), Some(f), Some(t)) if endpoints_on(&out.content, &d, &f, &t) => Some((d, f, t)),
            _ => None,
        };
        let Some((desktop_id, from, to)) = resolved else {
            tracing::debug!(connection = %connection.id, "Skipping connection with unresolved endpoint");
            out.skipped.connections += 1;
            continue;
        };

        let mut connection = connection.clone();
        connection.id = uuid::Uuid::new_v4().to_string();
        connection.desktop_id = desktop_id;
        connection.from_note_id = from;
        connection.to_note_id = to;
        out.content.connections.push(connection);
    }

    out
}

fn endpoints_on(content: &WorkspaceContent, desktop_id: &str, from: &str, to: &str) -> bool {
    let on_desktop = |note_id: &str| {
        content
            .notes
            .iter()
            .any(|n| n.id == note_id && n.desktop_id == desktop_id)
    };
    on_desktop(from) && on_desktop(to)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Asset, Connection, Folder, Note, Position};

    fn sample() -> WorkspaceContent {
        let root = Desktop::new("old-ws", None, "root");
        let child = Desktop::new("old-ws", Some(root.id.clone()), "child");
        let n1 = Note::new(root.id.clone(), "n1", Position::new(100.0, 100.0));
        let n2 = Note::new(root.id.clone(), "n2", Position::new(200.0, 100.0));
        WorkspaceContent {
            // child listed before its parent
            desktops: vec![child.clone(), root.clone()],
            assets: vec![Asset::new(n1.id.clone(), vec![1, 2], "image/png")],
            folders: vec![Folder::new(root.id.clone(), child.id.clone(), "go", Position::default())],
            connections: vec![Connection::new(root.id.clone(), n1.id.clone(), n2.id.clone())],
            notes: vec![n1, n2],
        }
    }

    fn options(content: &WorkspaceContent) -> ReplayOptions {
        ReplayOptions {
            workspace_id: "new-ws".to_string(),
            desktop_order: parent_first_order(content),
            graft: None,
            orphans: OrphanPolicy::Skip,
        }
    }

    #[test]
    fn test_order_puts_parents_first() {
        let content = sample();
        let order = parent_first_order(&content);
        assert_eq!(order, vec![content.desktops[1].id.clone(), content.desktops[0].id.clone()]);
    }

    #[test]
    fn test_replay_remaps_every_reference() {
        let source = sample();
        let out = replay(&source, &options(&source));

        assert_eq!(out.content.counts(), source.counts());
        assert!(out.skipped.is_empty());

        let source_ids = source.id_sets();
        let new_ids = out.content.id_sets();
        assert!(source_ids.desktops.is_disjoint(&new_ids.desktops));
        assert!(source_ids.notes.is_disjoint(&new_ids.notes));

        let root = out.root_desktop_id.clone().unwrap();
        let folder = &out.content.folders[0];
        assert_eq!(folder.desktop_id, root);
        assert!(new_ids.desktops.contains(&folder.target_desktop_id));
        assert!(out.content.desktops.iter().all(|d| d.workspace_id == "new-ws"));
    }

    #[test]
    fn test_dangling_references_are_skipped() {
        let mut source = sample();
        source.connections[0].to_note_id = "missing".to_string();
        source.folders[0].target_desktop_id = "missing".to_string();

        let out = replay(&source, &options(&source));
        assert_eq!(out.skipped.connections, 1);
        assert_eq!(out.skipped.folders, 1);
        assert_eq!(out.content.notes.len(), 2);
        assert!(out.content.connections.is_empty());
    }

    #[test]
    fn test_graft_and_orphans() {
        let mut source = sample();
        let stray = Desktop::new("old-ws", Some("gone".to_string()), "stray");
        source.desktops.push(stray);
        let root_id = source.desktops[1].id.clone();

        let mut opts = options(&source);
        opts.graft = Some((root_id, Some("existing-parent".to_string())));
        opts.orphans = OrphanPolicy::AttachToRoot;
        let out = replay(&source, &opts);

        let root = out.root_desktop_id.clone().unwrap();
        let new_root = out.content.desktops.iter().find(|d| d.id == root).unwrap();
        assert_eq!(new_root.parent_id.as_deref(), Some("existing-parent"));
        let stray = out.content.desktops.iter().find(|d| d.name == "stray").unwrap();
        assert_eq!(stray.parent_id.as_deref(), Some(root.as_str()));

        opts.orphans = OrphanPolicy::Skip;
        let out = replay(&source, &opts);
        assert_eq!(out.skipped.desktops, 1);
    }
}
