//! Process start-up: well-known groups, the default admin, initial import.

use tracing::info;

use crate::config::HubConfig;
use crate::error::{Error, Result};
use crate::import::{ImportReport, Importer};
use crate::model::{Group, GroupId, NewUser, User, UserId, ADMIN_GROUP, EVERYONE_GROUP};
use crate::storage::{BlobStorage, RecordStore};

/// Ids every request handler needs, resolved once at start-up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WellKnown {
    pub everyone: GroupId,
    pub admin_group: GroupId,
    pub admin_user: UserId,
}

async fn find_or_create_group(store: &dyn RecordStore, name: &str) -> Result<Group> {
    if let Some(group) = store.find_group_by_name(name).await? {
        return Ok(group);
    }
    match store.create_group(name).await {
        Ok(group) => {
            info!("Created group {} ({})", group.name, group.id);
            Ok(group)
        }
        Err(e) if e.is_conflict() => store
            .find_group_by_name(name)
            .await?
            .ok_or_else(|| Error::Storage(format!("group '{}' vanished after conflict", name))),
        Err(e) => Err(e),
    }
}

async fn find_or_create_user(store: &dyn RecordStore, user: NewUser) -> Result<User> {
    if let Some(existing) = store.find_user_by_name(&user.name).await? {
        return Ok(existing);
    }
    let name = user.name.clone();
    match store.create_user(user).await {
        Ok(created) => {
            info!("Created default user {} ({})", created.name, created.id);
            Ok(created)
        }
        Err(e) if e.is_conflict() => store
            .find_user_by_name(&name)
            .await?
            .ok_or_else(|| Error::Storage(format!("user '{}' vanished after conflict", name))),
        Err(e) => Err(e),
    }
}

/// Make sure `@everyone`, `admin` and the default admin user exist, and that
/// the admin belongs to both groups. Safe to call on every start.
pub async fn ensure_well_known(store: &dyn RecordStore, config: &HubConfig) -> Result<WellKnown> {
    let everyone = find_or_create_group(store, EVERYONE_GROUP).await?;
    let admin_group = find_or_create_group(store, ADMIN_GROUP).await?;
    let admin_user = find_or_create_user(
        store,
        NewUser {
            name: config.default_user.name.clone(),
            email: config.default_user.email.clone(),
            verified: true,
        },
    )
    .await?;

    store.add_member(admin_user.id, admin_group.id).await?;
    store.add_member(admin_user.id, everyone.id).await?;

    Ok(WellKnown {
        everyone: everyone.id,
        admin_group: admin_group.id,
        admin_user: admin_user.id,
    })
}

/// Full start-up sequence. The import only runs against an empty hierarchy
/// unless `force_import` is set.
pub async fn initialize(
    store: &dyn RecordStore,
    blobs: &dyn BlobStorage,
    config: &HubConfig,
) -> Result<(WellKnown, Option<ImportReport>)> {
    let well_known = ensure_well_known(store, config).await?;

    let existing = store.count_directories().await?;
    if existing > 0 && !config.force_import {
        info!("{} directories present; skipping import", existing);
        return Ok((well_known, None));
    }

    let report = Importer::new(store, blobs, well_known.admin_user, well_known.everyone)
        .with_extension(config.content_extension.clone())
        .run(&config.load)
        .await?;
    info!(
        "Import finished: {} directories created, {} files imported",
        report.directories_created, report.files_imported
    );
    Ok((well_known, Some(report)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access;
    use crate::storage::{MemoryBlobStorage, MemoryStore};

    #[tokio::test]
    async fn running_twice_creates_everything_once() {
        let store = MemoryStore::new();
        let config = HubConfig::default();
        let first = ensure_well_known(&store, &config).await.unwrap();
        let second = ensure_well_known(&store, &config).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.list_groups().await.unwrap().len(), 2);
        assert_eq!(store.list_users().await.unwrap().len(), 1);
        assert!(access::is_admin(&store, first.admin_user).await.unwrap());
    }

    #[tokio::test]
    async fn import_is_skipped_once_directories_exist() {
        let source = tempfile::tempdir().unwrap();
        std::fs::write(source.path().join("a.cml"), "<a/>").unwrap();

        let store = MemoryStore::new();
        let blobs = MemoryBlobStorage::new();
        let mut config = HubConfig::default();
        config.load = crate::config::parse_load(
            &format!("/public:{}:true:true", source.path().display()),
            ":",
        );

        let (_, report) = initialize(&store, &blobs, &config).await.unwrap();
        assert_eq!(report.unwrap().files_imported, 1);

        let (_, report) = initialize(&store, &blobs, &config).await.unwrap();
        assert!(report.is_none());

        config.force_import = true;
        let (_, report) = initialize(&store, &blobs, &config).await.unwrap();
        let report = report.unwrap();
        assert_eq!(report.files_imported, 0);
        assert_eq!(report.files_present, 1);
    }
}
