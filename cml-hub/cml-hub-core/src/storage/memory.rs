//! In-memory record store, optionally persisted as a JSON document on disk.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::RecordStore;
use crate::error::{Error, Result};
use crate::model::{
    Directory, DirectoryId, DirectoryRecord, File, FileId, Group, GroupId, NewDirectory, NewFile,
    NewUser, Permission, User, UserId,
};
use crate::permissions::{PermissionSet, Rights};

const RECORDS_FILE: &str = "records.json";

#[derive(Clone, Default, Serialize, Deserialize)]
struct Tables {
    users: HashMap<UserId, User>,
    groups: HashMap<GroupId, Group>,
    memberships: HashMap<UserId, BTreeSet<GroupId>>,
    directories: HashMap<DirectoryId, Directory>,
    files: HashMap<FileId, File>,
    permissions: HashMap<DirectoryId, BTreeMap<GroupId, Rights>>,
}

impl Tables {
    fn directory_named(&self, name: &str, parent: Option<DirectoryId>) -> Option<&Directory> {
        self.directories
            .values()
            .find(|d| d.name == name && d.parent == parent)
    }

    fn rows_of(&self, directory: DirectoryId) -> Vec<Permission> {
        self.permissions
            .get(&directory)
            .map(|rows| {
                rows.iter()
                    .map(|(group, rights)| Permission {
                        directory,
                        group: *group,
                        rights: *rights,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn require_user(&self, id: UserId) -> Result<()> {
        if self.users.contains_key(&id) {
            Ok(())
        } else {
            Err(Error::not_found(format!("User with ID {}", id)))
        }
    }

    fn require_group(&self, id: GroupId) -> Result<()> {
        if self.groups.contains_key(&id) {
            Ok(())
        } else {
            Err(Error::not_found(format!("Group with ID {}", id)))
        }
    }

    fn require_directory(&self, id: DirectoryId) -> Result<()> {
        if self.directories.contains_key(&id) {
            Ok(())
        } else {
            Err(Error::not_found(format!("Directory with ID {}", id)))
        }
    }
}

/// Record store keeping every table in memory behind a single lock.
///
/// When opened on a directory, the full table set is rewritten to
/// `records.json` after each successful mutation and loaded back on open.
/// A mutation only becomes visible once its records have been written.
pub struct MemoryStore {
    tables: RwLock<Tables>,
    path: Option<PathBuf>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Purely in-memory store; nothing survives the process.
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            path: None,
        }
    }

    /// Open (or create) a persistent store under `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(RECORDS_FILE);
        let tables = if path.exists() {
            let data = std::fs::read_to_string(&path)?;
            serde_json::from_str(&data)?
        } else {
            Tables::default()
        };
        Ok(Self {
            tables: RwLock::new(tables),
            path: Some(path),
        })
    }

    fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> T {
        f(&*self.tables.read())
    }

    /// Apply `f` and persist the result. On a persistent store `f` runs
    /// against a staged copy that replaces the live tables only after the
    /// write succeeded, so any error leaves the tables untouched.
    fn mutate<T>(&self, f: impl FnOnce(&mut Tables) -> Result<T>) -> Result<T> {
        let mut tables = self.tables.write();
        let Some(path) = &self.path else {
            return f(&mut *tables);
        };
        let mut staged = tables.clone();
        let out = f(&mut staged)?;
        persist(path, &staged)?;
        *tables = staged;
        Ok(out)
    }
}

/// Write `tables` next to `path` and rename over it, so a crash never
/// leaves a partially written record file behind.
fn persist(path: &Path, tables: &Tables) -> Result<()> {
    let data = serde_json::to_vec(tables)
        .map_err(|e| Error::Storage(format!("failed to encode records: {}", e)))?;
    let staging = path.with_extension("json.tmp");
    std::fs::write(&staging, data)
        .map_err(|e| Error::Storage(format!("failed to write {}: {}", staging.display(), e)))?;
    std::fs::rename(&staging, path).map_err(|e| {
        let _ = std::fs::remove_file(&staging);
        Error::Storage(format!("failed to replace {}: {}", path.display(), e))
    })
}

fn sorted_by_name<T>(mut items: Vec<T>, name: impl Fn(&T) -> &str) -> Vec<T> {
    items.sort_by(|a, b| name(a).cmp(name(b)));
    items
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn create_user(&self, user: NewUser) -> Result<User> {
        self.mutate(|t| {
            if t.users.values().any(|u| u.name == user.name) {
                return Err(Error::Conflict(format!(
                    "A user named '{}' already exists.",
                    user.name
                )));
            }
            let record = User {
                id: Uuid::new_v4(),
                name: user.name,
                email: user.email,
                verified: user.verified,
                created_at: Utc::now(),
            };
            t.users.insert(record.id, record.clone());
            Ok(record)
        })
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.read(|t| t.users.get(&id).cloned()))
    }

    async fn find_user_by_name(&self, name: &str) -> Result<Option<User>> {
        Ok(self.read(|t| t.users.values().find(|u| u.name == name).cloned()))
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let users: Vec<User> = self.read(|t| t.users.values().cloned().collect());
        Ok(sorted_by_name(users, |u: &User| u.name.as_str()))
    }

    async fn set_verified(&self, id: UserId, verified: bool) -> Result<()> {
        self.mutate(|t| {
            let user = t
                .users
                .get_mut(&id)
                .ok_or_else(|| Error::not_found(format!("User with ID {}", id)))?;
            user.verified = verified;
            Ok(())
        })
    }

    async fn delete_user(&self, id: UserId) -> Result<()> {
        self.mutate(|t| {
            t.require_user(id)?;
            let owns_records = t.directories.values().any(|d| d.owner == id)
                || t.files.values().any(|f| f.owner == id);
            if owns_records {
                return Err(Error::Conflict(format!(
                    "User with ID {} still owns directories or files.",
                    id
                )));
            }
            t.users.remove(&id);
            t.memberships.remove(&id);
            Ok(())
        })
    }

    async fn create_group(&self, name: &str) -> Result<Group> {
        self.mutate(|t| {
            if t.groups.values().any(|g| g.name == name) {
                return Err(Error::Conflict(format!(
                    "A group named '{}' already exists.",
                    name
                )));
            }
            let group = Group {
                id: Uuid::new_v4(),
                name: name.to_string(),
            };
            t.groups.insert(group.id, group.clone());
            Ok(group)
        })
    }

    async fn get_group(&self, id: GroupId) -> Result<Option<Group>> {
        Ok(self.read(|t| t.groups.get(&id).cloned()))
    }

    async fn find_group_by_name(&self, name: &str) -> Result<Option<Group>> {
        Ok(self.read(|t| t.groups.values().find(|g| g.name == name).cloned()))
    }

    async fn list_groups(&self) -> Result<Vec<Group>> {
        let groups: Vec<Group> = self.read(|t| t.groups.values().cloned().collect());
        Ok(sorted_by_name(groups, |g: &Group| g.name.as_str()))
    }

    async fn add_member(&self, user: UserId, group: GroupId) -> Result<()> {
        self.mutate(|t| {
            t.require_user(user)?;
            t.require_group(group)?;
            t.memberships.entry(user).or_default().insert(group);
            Ok(())
        })
    }

    async fn remove_member(&self, user: UserId, group: GroupId) -> Result<()> {
        self.mutate(|t| {
            let removed = t
                .memberships
                .get_mut(&user)
                .map(|groups| groups.remove(&group))
                .unwrap_or(false);
            if removed {
                Ok(())
            } else {
                Err(Error::NotFound(format!(
                    "User with ID {} is not a member of group {}.",
                    user, group
                )))
            }
        })
    }

    async fn groups_of(&self, user: UserId) -> Result<Vec<Group>> {
        let groups: Vec<Group> = self.read(|t| {
            t.memberships
                .get(&user)
                .map(|ids| {
                    ids.iter()
                        .filter_map(|id| t.groups.get(id).cloned())
                        .collect()
                })
                .unwrap_or_default()
        });
        Ok(sorted_by_name(groups, |g: &Group| g.name.as_str()))
    }

    async fn members_of(&self, group: GroupId) -> Result<Vec<User>> {
        let users: Vec<User> = self.read(|t| {
            t.memberships
                .iter()
                .filter(|(_, groups)| groups.contains(&group))
                .filter_map(|(user, _)| t.users.get(user).cloned())
                .collect()
        });
        Ok(sorted_by_name(users, |u: &User| u.name.as_str()))
    }

    async fn create_directory(
        &self,
        directory: NewDirectory,
        permissions: &PermissionSet,
    ) -> Result<Directory> {
        self.mutate(|t| {
            if let Some(parent) = directory.parent {
                t.require_directory(parent)?;
            }
            for (group, _) in permissions.iter() {
                t.require_group(group)?;
            }
            if t.directory_named(&directory.name, directory.parent).is_some() {
                return Err(Error::Conflict(format!(
                    "Directory '{}' already exists under {:?}.",
                    directory.name, directory.parent
                )));
            }
            let record = Directory {
                id: Uuid::new_v4(),
                name: directory.name,
                parent: directory.parent,
                owner: directory.owner,
            };
            let rows = permissions.iter().collect::<BTreeMap<_, _>>();
            t.permissions.insert(record.id, rows);
            t.directories.insert(record.id, record.clone());
            Ok(record)
        })
    }

    async fn get_directory(&self, id: DirectoryId) -> Result<Option<Directory>> {
        Ok(self.read(|t| t.directories.get(&id).cloned()))
    }

    async fn find_directory(
        &self,
        name: &str,
        parent: Option<DirectoryId>,
    ) -> Result<Option<Directory>> {
        Ok(self.read(|t| t.directory_named(name, parent).cloned()))
    }

    async fn load_directories_with_permissions(&self) -> Result<Vec<DirectoryRecord>> {
        let records: Vec<DirectoryRecord> = self.read(|t| {
            t.directories
                .values()
                .map(|d| DirectoryRecord {
                    directory: d.clone(),
                    permissions: t.rows_of(d.id),
                })
                .collect()
        });
        Ok(sorted_by_name(records, |r: &DirectoryRecord| r.directory.name.as_str()))
    }

    async fn count_directories(&self) -> Result<usize> {
        Ok(self.read(|t| t.directories.len()))
    }

    async fn permissions_of(&self, directory: DirectoryId) -> Result<Vec<Permission>> {
        self.read(|t| {
            t.require_directory(directory)?;
            Ok(t.rows_of(directory))
        })
    }

    async fn upsert_permission(&self, permission: Permission) -> Result<()> {
        self.mutate(|t| {
            t.require_directory(permission.directory)?;
            t.require_group(permission.group)?;
            t.permissions
                .entry(permission.directory)
                .or_default()
                .insert(permission.group, permission.rights);
            Ok(())
        })
    }

    async fn reassign_owner(&self, from: UserId, to: UserId) -> Result<usize> {
        self.mutate(|t| {
            t.require_user(to)?;
            let mut touched = 0;
            for directory in t.directories.values_mut().filter(|d| d.owner == from) {
                directory.owner = to;
                touched += 1;
            }
            for file in t.files.values_mut().filter(|f| f.owner == from) {
                file.owner = to;
                touched += 1;
            }
            Ok(touched)
        })
    }

    async fn create_file(&self, file: NewFile) -> Result<File> {
        self.mutate(|t| {
            t.require_directory(file.parent)?;
            let record = File {
                id: Uuid::new_v4(),
                name: file.name,
                parent: file.parent,
                owner: file.owner,
            };
            t.files.insert(record.id, record.clone());
            Ok(record)
        })
    }

    async fn get_file(&self, id: FileId) -> Result<Option<File>> {
        Ok(self.read(|t| t.files.get(&id).cloned()))
    }

    async fn find_file(&self, name: &str, parent: DirectoryId) -> Result<Option<File>> {
        Ok(self.read(|t| {
            t.files
                .values()
                .find(|f| f.name == name && f.parent == parent)
                .cloned()
        }))
    }

    async fn files_in(&self, directory: DirectoryId) -> Result<Vec<File>> {
        let files: Vec<File> = self.read(|t| {
            t.files
                .values()
                .filter(|f| f.parent == directory)
                .cloned()
                .collect()
        });
        Ok(sorted_by_name(files, |f: &File| f.name.as_str()))
    }

    async fn list_files(&self) -> Result<Vec<File>> {
        let files: Vec<File> = self.read(|t| t.files.values().cloned().collect());
        Ok(sorted_by_name(files, |f: &File| f.name.as_str()))
    }
}
