//! Record store wrapper for unit tests: counts lookups and can answer
//! directory lookups with stale misses.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{MemoryStore, RecordStore};
use crate::error::Result;
use crate::model::{
    Directory, DirectoryId, DirectoryRecord, File, FileId, Group, GroupId, NewDirectory, NewFile,
    NewUser, Permission, User, UserId,
};
use crate::permissions::PermissionSet;

#[derive(Default)]
pub(crate) struct InstrumentedStore {
    pub inner: MemoryStore,
    stale_lookups: AtomicUsize,
    user_reads: AtomicUsize,
    membership_reads: AtomicUsize,
}

impl InstrumentedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` calls to `find_directory` report nothing, as if another
    /// writer's insert were not yet visible.
    pub fn miss_next_lookups(&self, n: usize) {
        self.stale_lookups.store(n, Ordering::SeqCst);
    }

    pub fn user_reads(&self) -> usize {
        self.user_reads.load(Ordering::SeqCst)
    }

    pub fn membership_reads(&self) -> usize {
        self.membership_reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordStore for InstrumentedStore {
    async fn create_user(&self, user: NewUser) -> Result<User> {
        self.inner.create_user(user).await
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        self.user_reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get_user(id).await
    }

    async fn find_user_by_name(&self, name: &str) -> Result<Option<User>> {
        self.inner.find_user_by_name(name).await
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        self.inner.list_users().await
    }

    async fn set_verified(&self, id: UserId, verified: bool) -> Result<()> {
        self.inner.set_verified(id, verified).await
    }

    async fn delete_user(&self, id: UserId) -> Result<()> {
        self.inner.delete_user(id).await
    }

    async fn create_group(&self, name: &str) -> Result<Group> {
        self.inner.create_group(name).await
    }

    async fn get_group(&self, id: GroupId) -> Result<Option<Group>> {
        self.inner.get_group(id).await
    }

    async fn find_group_by_name(&self, name: &str) -> Result<Option<Group>> {
        self.inner.find_group_by_name(name).await
    }

    async fn list_groups(&self) -> Result<Vec<Group>> {
        self.inner.list_groups().await
    }

    async fn add_member(&self, user: UserId, group: GroupId) -> Result<()> {
        self.inner.add_member(user, group).await
    }

    async fn remove_member(&self, user: UserId, group: GroupId) -> Result<()> {
        self.inner.remove_member(user, group).await
    }

    async fn groups_of(&self, user: UserId) -> Result<Vec<Group>> {
        self.membership_reads.fetch_add(1, Ordering::SeqCst);
        self.inner.groups_of(user).await
    }

    async fn members_of(&self, group: GroupId) -> Result<Vec<User>> {
        self.inner.members_of(group).await
    }

    async fn create_directory(
        &self,
        directory: NewDirectory,
        permissions: &PermissionSet,
    ) -> Result<Directory> {
        self.inner.create_directory(directory, permissions).await
    }

    async fn get_directory(&self, id: DirectoryId) -> Result<Option<Directory>> {
        self.inner.get_directory(id).await
    }

    async fn find_directory(
        &self,
        name: &str,
        parent: Option<DirectoryId>,
    ) -> Result<Option<Directory>> {
        let stale = self
            .stale_lookups
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if stale {
            return Ok(None);
        }
        self.inner.find_directory(name, parent).await
    }

    async fn load_directories_with_permissions(&self) -> Result<Vec<DirectoryRecord>> {
        self.inner.load_directories_with_permissions().await
    }

    async fn count_directories(&self) -> Result<usize> {
        self.inner.count_directories().await
    }

    async fn permissions_of(&self, directory: DirectoryId) -> Result<Vec<Permission>> {
        self.inner.permissions_of(directory).await
    }

    async fn upsert_permission(&self, permission: Permission) -> Result<()> {
        self.inner.upsert_permission(permission).await
    }

    async fn reassign_owner(&self, from: UserId, to: UserId) -> Result<usize> {
        self.inner.reassign_owner(from, to).await
    }

    async fn create_file(&self, file: NewFile) -> Result<File> {
        self.inner.create_file(file).await
    }

    async fn get_file(&self, id: FileId) -> Result<Option<File>> {
        self.inner.get_file(id).await
    }

    async fn find_file(&self, name: &str, parent: DirectoryId) -> Result<Option<File>> {
        self.inner.find_file(name, parent).await
    }

    async fn files_in(&self, directory: DirectoryId) -> Result<Vec<File>> {
        self.inner.files_in(directory).await
    }

    async fn list_files(&self) -> Result<Vec<File>> {
        self.inner.list_files().await
    }
}
