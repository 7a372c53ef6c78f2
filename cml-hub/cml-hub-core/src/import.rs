//! Mirror external directory trees into the managed hierarchy.
//!
//! Each mapping entry resolves its target path into a chain of directories
//! (reusing any that already exist), then walks the source one level at a
//! time. Content files are recorded and their bytes copied to the blob store;
//! everything else is logged and skipped. Re-running an entry against an
//! already imported tree creates nothing new.

use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::model::{DirectoryId, GroupId, NewDirectory, NewFile, UserId};
use crate::permissions::PermissionSet;
use crate::storage::{BlobStorage, RecordStore};

pub const DEFAULT_EXTENSION: &str = "cml";

/// One `source -> target` mapping.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportEntry {
    pub source: PathBuf,
    /// Slash-separated virtual path; empty segments are ignored.
    pub target: String,
    pub recursive: bool,
    /// Whether `@everyone` gets read on every directory this entry creates.
    pub readable: bool,
}

impl ImportEntry {
    pub fn validate(&self) -> Result<()> {
        if self.source.as_os_str().is_empty() {
            return Err(Error::Invalid(format!(
                "Import entry for '{}' has an empty source.",
                self.target
            )));
        }
        if self.segments().next().is_none() {
            return Err(Error::Invalid(format!(
                "Import entry for {} has no target directory.",
                self.source.display()
            )));
        }
        Ok(())
    }

    fn segments(&self) -> impl Iterator<Item = &str> {
        self.target.split('/').filter(|s| !s.is_empty())
    }
}

/// Counters accumulated over an import run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub directories_created: usize,
    pub directories_reused: usize,
    pub files_imported: usize,
    pub files_present: usize,
    pub entries_skipped: usize,
}

impl ImportReport {
    fn merge(&mut self, other: ImportReport) {
        self.directories_created += other.directories_created;
        self.directories_reused += other.directories_reused;
        self.files_imported += other.files_imported;
        self.files_present += other.files_present;
        self.entries_skipped += other.entries_skipped;
    }
}

pub struct Importer<'a> {
    store: &'a dyn RecordStore,
    blobs: &'a dyn BlobStorage,
    owner: UserId,
    extension: String,
    read: PermissionSet,
    none: PermissionSet,
}

impl<'a> Importer<'a> {
    /// Directories created by this importer belong to `owner`; `everyone`
    /// receives either a read-only or an empty permission row on each.
    pub fn new(
        store: &'a dyn RecordStore,
        blobs: &'a dyn BlobStorage,
        owner: UserId,
        everyone: GroupId,
    ) -> Self {
        Self {
            store,
            blobs,
            owner,
            extension: DEFAULT_EXTENSION.to_string(),
            read: PermissionSet::new().add_read(everyone),
            none: PermissionSet::new().add_none(everyone),
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Process `entries` strictly in order. The first hard failure aborts
    /// the remaining entries; work already done is kept.
    pub async fn run(&self, entries: &[ImportEntry]) -> Result<ImportReport> {
        let mut total = ImportReport::default();
        for entry in entries {
            let report = self.import_entry(entry).await?;
            info!(
                target_path = %entry.target,
                source = %entry.source.display(),
                created = report.directories_created,
                reused = report.directories_reused,
                imported = report.files_imported,
                present = report.files_present,
                skipped = report.entries_skipped,
                "Finished import entry"
            );
            total.merge(report);
        }
        Ok(total)
    }

    pub async fn import_entry(&self, entry: &ImportEntry) -> Result<ImportReport> {
        entry.validate()?;
        if !entry.source.is_dir() {
            return Err(Error::Invalid(format!(
                "Import source {} is not a directory.",
                entry.source.display()
            )));
        }

        let mut report = ImportReport::default();
        let perms = if entry.readable { &self.read } else { &self.none };

        let mut parent = None;
        for segment in entry.segments() {
            parent = Some(
                self.find_or_create_directory(segment, parent, perms, &mut report)
                    .await?,
            );
        }
        let root = parent.ok_or_else(|| {
            Error::Invalid(format!("Import target '{}' is empty.", entry.target))
        })?;

        info!(
            "Importing {} (ID: {}). Recursive? {}; readable? {}",
            entry.target, root, entry.recursive, entry.readable
        );
        self.walk(&entry.source, root, entry.recursive, perms, &mut report)
            .await?;
        Ok(report)
    }

    /// Find `(name, parent)` or create it with `perms`. A conflict on create
    /// means another writer got there first, so the lookup is repeated once.
    pub async fn find_or_create_directory(
        &self,
        name: &str,
        parent: Option<DirectoryId>,
        perms: &PermissionSet,
        report: &mut ImportReport,
    ) -> Result<DirectoryId> {
        if let Some(existing) = self.store.find_directory(name, parent).await? {
            report.directories_reused += 1;
            return Ok(existing.id);
        }

        let created = self
            .store
            .create_directory(
                NewDirectory {
                    name: name.to_string(),
                    parent,
                    owner: self.owner,
                },
                perms,
            )
            .await;

        match created {
            Ok(directory) => {
                report.directories_created += 1;
                Ok(directory.id)
            }
            Err(e) if e.is_conflict() => match self.store.find_directory(name, parent).await? {
                Some(existing) => {
                    report.directories_reused += 1;
                    Ok(existing.id)
                }
                None => Err(Error::Storage(format!(
                    "directory '{}' conflicted on create but could not be found: {}",
                    name, e
                ))),
            },
            Err(e) => Err(e),
        }
    }

    async fn walk(
        &self,
        source: &Path,
        root: DirectoryId,
        recursive: bool,
        perms: &PermissionSet,
        report: &mut ImportReport,
    ) -> Result<()> {
        let mut stack = vec![(source.to_path_buf(), root)];

        while let Some((dir, id)) = stack.pop() {
            let mut subdirectories = Vec::new();

            let entries = WalkDir::new(&dir)
                .min_depth(1)
                .max_depth(1)
                .follow_links(false)
                .sort_by_file_name()
                .into_iter()
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(std::io::Error::from)?;

            for entry in entries {
                let path = entry.path();
                let name = entry.file_name().to_string_lossy().into_owned();
                let file_type = entry.file_type();

                if file_type.is_file() {
                    if self.is_content(&name) {
                        self.import_file(path, &name, id, report).await?;
                    } else {
                        debug!("Not importing entry {}. It's not a content file.", path.display());
                        report.entries_skipped += 1;
                    }
                } else if file_type.is_dir() {
                    if !recursive {
                        info!(
                            "Entry {} is a directory, but recursive iteration is disabled.",
                            path.display()
                        );
                        report.entries_skipped += 1;
                    } else if name.starts_with('.') {
                        info!("Ignoring hidden directory {}.", path.display());
                        report.entries_skipped += 1;
                    } else {
                        debug!("Recursing into {}", path.display());
                        let child = self
                            .find_or_create_directory(&name, Some(id), perms, report)
                            .await?;
                        subdirectories.push((path.to_path_buf(), child));
                    }
                } else {
                    info!("Entry {} is of an unsupported type.", path.display());
                    report.entries_skipped += 1;
                }
            }

            // Reverse so siblings are visited in name order.
            stack.extend(subdirectories.into_iter().rev());
        }
        Ok(())
    }

    fn is_content(&self, name: &str) -> bool {
        name.len() > self.extension.len() + 1
            && name
                .strip_suffix(self.extension.as_str())
                .is_some_and(|stem| stem.ends_with('.'))
    }

    async fn import_file(
        &self,
        path: &Path,
        name: &str,
        parent: DirectoryId,
        report: &mut ImportReport,
    ) -> Result<()> {
        if let Some(existing) = self.store.find_file(name, parent).await? {
            if !self.blobs.exists(existing.id).await? {
                let bytes = tokio::fs::read(path).await?;
                self.blobs.put(existing.id, &bytes).await?;
            }
            debug!("File {} already imported as {}.", path.display(), existing.id);
            report.files_present += 1;
            return Ok(());
        }

        info!("Importing {} into database.", path.display());
        let bytes = tokio::fs::read(path).await?;
        let file = self
            .store
            .create_file(NewFile {
                name: name.to_string(),
                parent,
                owner: self.owner,
            })
            .await?;
        self.blobs.put(file.id, &bytes).await?;
        report.files_imported += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewUser;
    use crate::storage::testing::InstrumentedStore;
    use crate::storage::{MemoryBlobStorage, MemoryStore};
    use uuid::Uuid;

    fn entry(source: &Path, target: &str) -> ImportEntry {
        ImportEntry {
            source: source.to_path_buf(),
            target: target.to_string(),
            recursive: true,
            readable: true,
        }
    }

    async fn owner_and_everyone(store: &dyn RecordStore) -> (UserId, GroupId) {
        let owner = store
            .create_user(NewUser {
                name: "admin".to_string(),
                email: "admin@test.com".to_string(),
                verified: true,
            })
            .await
            .unwrap();
        let everyone = store.create_group("@everyone").await.unwrap();
        (owner.id, everyone.id)
    }

    #[test]
    fn validate_rejects_empty_target_and_source() {
        let ok = entry(Path::new("/ext"), "/a//b/");
        assert!(ok.validate().is_ok());
        assert_eq!(ok.segments().collect::<Vec<_>>(), vec!["a", "b"]);
        assert!(matches!(
            entry(Path::new("/ext"), "//").validate(),
            Err(Error::Invalid(_))
        ));
        assert!(matches!(
            entry(Path::new(""), "/a").validate(),
            Err(Error::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn content_extension_is_matched_on_the_suffix() {
        let store = MemoryStore::new();
        let blobs = MemoryBlobStorage::new();
        let importer = Importer::new(&store, &blobs, Uuid::new_v4(), Uuid::new_v4());
        assert!(importer.is_content("a.cml"));
        assert!(!importer.is_content("a.xml"));
        assert!(!importer.is_content("acml"));
        assert!(!importer.is_content(".cml"));

        let importer = importer.with_extension("txt");
        assert!(importer.is_content("notes.txt"));
        assert!(!importer.is_content("a.cml"));
    }

    #[tokio::test]
    async fn missing_source_is_invalid() {
        let tempdir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();
        let blobs = MemoryBlobStorage::new();
        let (owner, everyone) = owner_and_everyone(&store).await;
        let importer = Importer::new(&store, &blobs, owner, everyone);
        let err = importer
            .run(&[entry(&tempdir.path().join("missing"), "/x")])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Invalid(_)));
        assert_eq!(store.count_directories().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn non_recursive_entry_skips_subdirectories() {
        let tempdir = tempfile::tempdir().unwrap();
        std::fs::write(tempdir.path().join("top.cml"), "<top/>").unwrap();
        std::fs::create_dir(tempdir.path().join("nested")).unwrap();
        std::fs::write(tempdir.path().join("nested/inner.cml"), "<inner/>").unwrap();

        let store = MemoryStore::new();
        let blobs = MemoryBlobStorage::new();
        let (owner, everyone) = owner_and_everyone(&store).await;
        let importer = Importer::new(&store, &blobs, owner, everyone);
        let mut flat = entry(tempdir.path(), "flat");
        flat.recursive = false;
        let report = importer.run(&[flat]).await.unwrap();

        assert_eq!(report.files_imported, 1);
        assert_eq!(report.entries_skipped, 1);
        assert_eq!(store.count_directories().await.unwrap(), 1);
        assert_eq!(blobs.len(), 1);
    }

    #[tokio::test]
    async fn unreadable_entry_gets_an_empty_everyone_row() {
        let tempdir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();
        let blobs = MemoryBlobStorage::new();
        let (owner, everyone) = owner_and_everyone(&store).await;
        let importer = Importer::new(&store, &blobs, owner, everyone);
        let mut private = entry(tempdir.path(), "private");
        private.readable = false;
        importer.run(&[private]).await.unwrap();

        let dir = store.find_directory("private", None).await.unwrap().unwrap();
        let rows = store.permissions_of(dir.id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].group, everyone);
        assert!(!rows[0].rights.any());
    }

    #[tokio::test]
    async fn conflicting_create_falls_back_to_the_existing_directory() {
        let tempdir = tempfile::tempdir().unwrap();
        let store = InstrumentedStore::new();
        let blobs = MemoryBlobStorage::new();
        let (owner, everyone) = owner_and_everyone(&store).await;
        let importer = Importer::new(&store, &blobs, owner, everyone);
        let mut report = ImportReport::default();
        let existing = importer
            .find_or_create_directory("pub", None, &importer.read, &mut report)
            .await
            .unwrap();

        // The first lookup misses, the create conflicts, the re-fetch wins.
        store.miss_next_lookups(1);
        let report = importer.run(&[entry(tempdir.path(), "pub")]).await.unwrap();
        assert_eq!(report.directories_created, 0);
        assert_eq!(report.directories_reused, 1);
        assert_eq!(store.count_directories().await.unwrap(), 1);
        let found = store.find_directory("pub", None).await.unwrap().unwrap();
        assert_eq!(found.id, existing);
    }

    #[tokio::test]
    async fn repeated_conflict_is_a_storage_failure() {
        let tempdir = tempfile::tempdir().unwrap();
        let store = InstrumentedStore::new();
        let blobs = MemoryBlobStorage::new();
        let (owner, everyone) = owner_and_everyone(&store).await;
        let importer = Importer::new(&store, &blobs, owner, everyone);
        let mut report = ImportReport::default();
        importer
            .find_or_create_directory("pub", None, &importer.read, &mut report)
            .await
            .unwrap();

        store.miss_next_lookups(2);
        let err = importer
            .run(&[entry(tempdir.path(), "pub")])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        assert_eq!(store.count_directories().await.unwrap(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlinks_are_skipped() {
        use std::os::unix::fs::symlink;

        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("real.cml"), "<real/>").unwrap();
        std::fs::create_dir(outside.path().join("linked")).unwrap();
        std::fs::write(outside.path().join("linked/inner.cml"), "<inner/>").unwrap();

        let source = tempfile::tempdir().unwrap();
        std::fs::write(source.path().join("own.cml"), "<own/>").unwrap();
        symlink(outside.path().join("real.cml"), source.path().join("alias.cml")).unwrap();
        symlink(outside.path().join("linked"), source.path().join("linked")).unwrap();

        let store = MemoryStore::new();
        let blobs = MemoryBlobStorage::new();
        let (owner, everyone) = owner_and_everyone(&store).await;
        let importer = Importer::new(&store, &blobs, owner, everyone);
        let report = importer.run(&[entry(source.path(), "mirror")]).await.unwrap();

        assert_eq!(report.files_imported, 1);
        assert_eq!(report.entries_skipped, 2);
        let mirror = store.find_directory("mirror", None).await.unwrap().unwrap();
        let names: Vec<_> = store
            .files_in(mirror.id)
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["own.cml"]);
        assert!(store.find_directory("linked", Some(mirror.id)).await.unwrap().is_none());
        assert_eq!(store.count_directories().await.unwrap(), 1);
    }
}
