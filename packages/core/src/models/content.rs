//! Full-content captures of a workspace
//!
//! [`WorkspaceContent`] is the flat, dependency-free list of everything a
//! workspace owns. It is the unit that push reads, pull and restore replay, and
//! version snapshots persist.

use super::{Asset, Connection, Desktop, Folder, Note, ThemeConfig, Workspace};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WorkspaceContent {
    pub desktops: Vec<Desktop>,
    pub notes: Vec<Note>,
    pub assets: Vec<Asset>,
    pub folders: Vec<Folder>,
    pub connections: Vec<Connection>,
}

impl WorkspaceContent {
    pub fn counts(&self) -> EntityCounts {
        EntityCounts {
            desktops: self.desktops.len(),
            notes: self.notes.len(),
            assets: self.assets.len(),
            folders: self.folders.len(),
            connections: self.connections.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.counts().total() == 0
    }

    pub fn notes_in<'a>(&'a self, desktop_id: &'a str) -> impl Iterator<Item = &'a Note> + 'a {
        self.notes.iter().filter(move |n| n.desktop_id == desktop_id)
    }

    pub fn assets_of<'a>(&'a self, note_id: &'a str) -> impl Iterator<Item = &'a Asset> + 'a {
        self.assets.iter().filter(move |a| a.note_id == note_id)
    }

    pub fn folders_in<'a>(&'a self, desktop_id: &'a str) -> impl Iterator<Item = &'a Folder> + 'a {
        self.folders.iter().filter(move |f| f.desktop_id == desktop_id)
    }

    pub fn connections_in<'a>(
        &'a self,
        desktop_id: &'a str,
    ) -> impl Iterator<Item = &'a Connection> + 'a {
        self.connections
            .iter()
            .filter(move |c| c.desktop_id == desktop_id)
    }

    /// Ids of every entity, grouped by kind
    pub fn id_sets(&self) -> ContentIds {
        ContentIds {
            desktops: self.desktops.iter().map(|d| d.id.clone()).collect(),
            notes: self.notes.iter().map(|n| n.id.clone()).collect(),
            assets: self.assets.iter().map(|a| a.id.clone()).collect(),
            folders: self.folders.iter().map(|f| f.id.clone()).collect(),
            connections: self.connections.iter().map(|c| c.id.clone()).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentIds {
    pub desktops: HashSet<String>,
    pub notes: HashSet<String>,
    pub assets: HashSet<String>,
    pub folders: HashSet<String>,
    pub connections: HashSet<String>,
}

/// Workspace attributes carried inside a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WorkspaceHeader {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub theme_config: ThemeConfig,
}

impl From<&Workspace> for WorkspaceHeader {
    fn from(ws: &Workspace) -> Self {
        Self {
            id: ws.id.clone(),
            owner_id: ws.owner_id.clone(),
            name: ws.name.clone(),
            description: ws.description.clone(),
            theme_config: ws.theme_config.clone(),
        }
    }
}

/// Serialized body of a [`super::Version`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WorkspaceSnapshot {
    pub version_number: i64,
    pub change_summary: String,
    pub captured_at: DateTime<Utc>,
    pub workspace: WorkspaceHeader,
    pub content: WorkspaceContent,
}

/// Per-kind entity counts reported by push, pull, restore and import
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityCounts {
    pub desktops: usize,
    pub notes: usize,
    pub assets: usize,
    pub folders: usize,
    pub connections: usize,
}

impl EntityCounts {
    pub fn total(&self) -> usize {
        self.desktops + self.notes + self.assets + self.folders + self.connections
    }
}

impl fmt::Display for EntityCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} desktops, {} notes, {} assets, {} folders, {} connections",
            self.desktops, self.notes, self.assets, self.folders, self.connections
        )
    }
}

/// Records dropped during reconstruction because a reference did not resolve
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkipCounts {
    pub desktops: usize,
    pub notes: usize,
    pub assets: usize,
    pub folders: usize,
    pub connections: usize,
}

impl SkipCounts {
    pub fn total(&self) -> usize {
        self.desktops + self.notes + self.assets + self.folders + self.connections
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}
