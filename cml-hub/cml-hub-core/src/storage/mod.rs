//! Storage seams consumed by the core: the record store holding users,
//! groups, directories, files and permission rows, and the blob store
//! holding file contents.

pub mod blob;
pub mod memory;
#[cfg(test)]
pub(crate) mod testing;

pub use blob::{BlobStorage, FsBlobStorage, MemoryBlobStorage};
pub use memory::MemoryStore;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{
    Directory, DirectoryId, DirectoryRecord, File, FileId, Group, GroupId, NewDirectory, NewFile,
    NewUser, Permission, User, UserId,
};
use crate::permissions::PermissionSet;

/// Query/mutation interface over the persistent records.
///
/// Implementations generate every id. Uniqueness violations (user name,
/// group name, directory (name, parent)) are reported as
/// [`Error::Conflict`](crate::Error::Conflict) so callers can fall back to a
/// re-fetch.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn create_user(&self, user: NewUser) -> Result<User>;
    async fn get_user(&self, id: UserId) -> Result<Option<User>>;
    async fn find_user_by_name(&self, name: &str) -> Result<Option<User>>;
    async fn list_users(&self) -> Result<Vec<User>>;
    async fn set_verified(&self, id: UserId, verified: bool) -> Result<()>;
    /// Remove a user and its memberships. Ownership must be reassigned first.
    async fn delete_user(&self, id: UserId) -> Result<()>;

    async fn create_group(&self, name: &str) -> Result<Group>;
    async fn get_group(&self, id: GroupId) -> Result<Option<Group>>;
    async fn find_group_by_name(&self, name: &str) -> Result<Option<Group>>;
    async fn list_groups(&self) -> Result<Vec<Group>>;
    /// Idempotent: joining a group twice is not an error.
    async fn add_member(&self, user: UserId, group: GroupId) -> Result<()>;
    async fn remove_member(&self, user: UserId, group: GroupId) -> Result<()>;
    async fn groups_of(&self, user: UserId) -> Result<Vec<Group>>;
    async fn members_of(&self, group: GroupId) -> Result<Vec<User>>;

    /// Create a directory and its permission rows in one step.
    async fn create_directory(
        &self,
        directory: NewDirectory,
        permissions: &PermissionSet,
    ) -> Result<Directory>;
    async fn get_directory(&self, id: DirectoryId) -> Result<Option<Directory>>;
    async fn find_directory(
        &self,
        name: &str,
        parent: Option<DirectoryId>,
    ) -> Result<Option<Directory>>;
    /// Every directory joined with its permission rows, in a single read.
    async fn load_directories_with_permissions(&self) -> Result<Vec<DirectoryRecord>>;
    async fn count_directories(&self) -> Result<usize>;
    async fn permissions_of(&self, directory: DirectoryId) -> Result<Vec<Permission>>;
    /// Insert the (directory, group) row or overwrite its flags in place.
    async fn upsert_permission(&self, permission: Permission) -> Result<()>;
    /// Hand every directory and file owned by `from` to `to`; returns the
    /// number of records touched.
    async fn reassign_owner(&self, from: UserId, to: UserId) -> Result<usize>;

    async fn create_file(&self, file: NewFile) -> Result<File>;
    async fn get_file(&self, id: FileId) -> Result<Option<File>>;
    async fn find_file(&self, name: &str, parent: DirectoryId) -> Result<Option<File>>;
    async fn files_in(&self, directory: DirectoryId) -> Result<Vec<File>>;
    async fn list_files(&self) -> Result<Vec<File>>;
}
