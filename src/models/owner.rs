//! Programs, studies and assays that reference storage folders.

use super::folder::StorageDriveFolder;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;

/// An entity that folders can be attached to. The entities themselves live
/// in other services; only their ids are stored here.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum FolderOwner {
    Program(Uuid),
    Study(Uuid),
    Assay(Uuid),
}

impl FolderOwner {
    /// Parse a kind segment (`program`, `study`, `assay`, or their plurals).
    pub fn from_kind(kind: &str, id: Uuid) -> Option<Self> {
        match kind.to_ascii_lowercase().as_str() {
            "program" | "programs" => Some(FolderOwner::Program(id)),
            "study" | "studies" => Some(FolderOwner::Study(id)),
            "assay" | "assays" => Some(FolderOwner::Assay(id)),
            _ => None,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            FolderOwner::Program(id) | FolderOwner::Study(id) | FolderOwner::Assay(id) => *id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FolderOwner::Program(_) => "program",
            FolderOwner::Study(_) => "study",
            FolderOwner::Assay(_) => "assay",
        }
    }

    /// Join table holding this owner kind's folder links.
    pub(crate) fn table(&self) -> &'static str {
        match self {
            FolderOwner::Program(_) => "program_storage_folders",
            FolderOwner::Study(_) => "study_storage_folders",
            FolderOwner::Assay(_) => "assay_storage_folders",
        }
    }
}

impl fmt::Display for FolderOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.id())
    }
}

impl FromStr for FolderOwner {
    type Err = String;

    /// Parses `kind:uuid`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (kind, id) = value
            .split_once(':')
            .ok_or_else(|| format!("expected `kind:id`, got `{}`", value))?;
        let id = Uuid::parse_str(id).map_err(|e| e.to_string())?;
        FolderOwner::from_kind(kind, id).ok_or_else(|| format!("unknown owner kind `{}`", kind))
    }
}

/// A folder attached to an owner, with the owner-scoped primary flag.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OwnedFolder {
    pub primary: bool,
    pub folder: StorageDriveFolder,
}
