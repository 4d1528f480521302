//! Entity kinds and the tagged `Entity` envelope used by the generic store API

use super::{Asset, Connection, Desktop, Folder, Note, PendingChange, Version, Workspace};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Every entity kind the store persists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Workspace,
    Desktop,
    Note,
    Asset,
    Folder,
    Connection,
    Version,
    PendingChange,
}

impl EntityKind {
    pub const ALL: [EntityKind; 8] = [
        EntityKind::Workspace,
        EntityKind::Desktop,
        EntityKind::Note,
        EntityKind::Asset,
        EntityKind::Folder,
        EntityKind::Connection,
        EntityKind::Version,
        EntityKind::PendingChange,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Workspace => "workspace",
            EntityKind::Desktop => "desktop",
            EntityKind::Note => "note",
            EntityKind::Asset => "asset",
            EntityKind::Folder => "folder",
            EntityKind::Connection => "connection",
            EntityKind::Version => "version",
            EntityKind::PendingChange => "pending_change",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("Unknown entity kind: {}", s))
    }
}

/// Any persisted entity, tagged by kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Entity {
    Workspace(Workspace),
    Desktop(Desktop),
    Note(Note),
    Asset(Asset),
    Folder(Folder),
    Connection(Connection),
    Version(Version),
    PendingChange(PendingChange),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Workspace(_) => EntityKind::Workspace,
            Entity::Desktop(_) => EntityKind::Desktop,
            Entity::Note(_) => EntityKind::Note,
            Entity::Asset(_) => EntityKind::Asset,
            Entity::Folder(_) => EntityKind::Folder,
            Entity::Connection(_) => EntityKind::Connection,
            Entity::Version(_) => EntityKind::Version,
            Entity::PendingChange(_) => EntityKind::PendingChange,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Entity::Workspace(e) => &e.id,
            Entity::Desktop(e) => &e.id,
            Entity::Note(e) => &e.id,
            Entity::Asset(e) => &e.id,
            Entity::Folder(e) => &e.id,
            Entity::Connection(e) => &e.id,
            Entity::Version(e) => &e.id,
            Entity::PendingChange(e) => &e.id,
        }
    }
}

macro_rules! impl_from_entity {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for Entity {
                fn from(value: $variant) -> Self {
                    Entity::$variant(value)
                }
            }
        )*
    };
}

impl_from_entity!(Workspace, Desktop, Note, Asset, Folder, Connection, Version, PendingChange);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Position;

    #[test]
    fn test_kind_round_trips_through_str() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.as_str().parse::<EntityKind>().unwrap(), kind);
        }
        assert!("widget".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_entity_envelope_is_tagged() {
        let note = Note::new("desk-1", "n1", Position::new(100.0, 100.0));
        let entity = Entity::from(note.clone());
        let value = serde_json::to_value(&entity).unwrap();

        assert_eq!(value["kind"], "note");
        assert_eq!(value["data"]["title"], "n1");
        assert_eq!(entity.id(), note.id);
        assert_eq!(entity.kind(), EntityKind::Note);
    }

    #[test]
    fn test_unknown_entity_kind_is_rejected() {
        let json = r#"{"kind":"widget","data":{}}"#;
        assert!(serde_json::from_str::<Entity>(json).is_err());
    }
}
