//! Records kept by the record store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::permissions::Rights;

pub type UserId = Uuid;
pub type GroupId = Uuid;
pub type DirectoryId = Uuid;
pub type FileId = Uuid;

/// Name of the implicit group every registered user belongs to.
pub const EVERYONE_GROUP: &str = "@everyone";
/// Members of this group hold every right on every directory.
pub const ADMIN_GROUP: &str = "admin";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Directory {
    pub id: DirectoryId,
    pub name: String,
    /// `None` for top-level directories.
    pub parent: Option<DirectoryId>,
    pub owner: UserId,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct File {
    pub id: FileId,
    pub name: String,
    pub parent: DirectoryId,
    pub owner: UserId,
}

/// One (directory, group) permission row.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Permission {
    pub directory: DirectoryId,
    pub group: GroupId,
    pub rights: Rights,
}

/// A directory together with every permission row attached to it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectoryRecord {
    pub directory: Directory,
    pub permissions: Vec<Permission>,
}

#[derive(Clone, Debug)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub verified: bool,
}

#[derive(Clone, Debug)]
pub struct NewDirectory {
    pub name: String,
    pub parent: Option<DirectoryId>,
    pub owner: UserId,
}

#[derive(Clone, Debug)]
pub struct NewFile {
    pub name: String,
    pub parent: DirectoryId,
    pub owner: UserId,
}
