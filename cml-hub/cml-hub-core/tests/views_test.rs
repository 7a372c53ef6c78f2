//! Integration tests for the tree and flat list views

use anyhow::Result;
use cml_hub_core::{
    accounts::{provision_user, Provisioning},
    bootstrap::{ensure_well_known, WellKnown},
    config::HubConfig,
    listing,
    model::{NewDirectory, NewFile},
    storage::{MemoryStore, RecordStore},
    tree::{self, TreeEntry, TreePermissions},
    AccessContext, PermissionSet,
};
use uuid::Uuid;

async fn mkdir(
    store: &MemoryStore,
    wk: &WellKnown,
    name: &str,
    parent: Option<Uuid>,
    perms: PermissionSet,
) -> Result<Uuid> {
    let dir = store
        .create_directory(
            NewDirectory {
                name: name.to_string(),
                parent,
                owner: wk.admin_user,
            },
            &perms,
        )
        .await?;
    Ok(dir.id)
}

async fn touch(store: &MemoryStore, wk: &WellKnown, name: &str, parent: Uuid) -> Result<Uuid> {
    let file = store
        .create_file(NewFile {
            name: name.to_string(),
            parent,
            owner: wk.admin_user,
        })
        .await?;
    Ok(file.id)
}

const MEMBER: Provisioning = Provisioning {
    verified: true,
    create_home: false,
};

#[tokio::test]
async fn test_read_only_group_directory() -> Result<()> {
    let store = MemoryStore::new();
    let wk = ensure_well_known(&store, &HubConfig::default()).await?;
    let user = provision_user(&store, &wk, "uma", "uma@test.com", MEMBER).await?;
    let group = store.create_group("G").await?;
    store.add_member(user.id, group.id).await?;
    let d = mkdir(&store, &wk, "D", None, PermissionSet::new().add_read(group.id)).await?;

    let ctx = AccessContext::resolve(&store, user.id, wk.everyone).await?;
    let forest = tree::assemble(&store, &ctx).await?;

    assert_eq!(forest.len(), 1);
    assert_eq!(
        forest[&d].permissions,
        TreePermissions {
            read: true,
            write: false,
            create: false,
            remove: false,
        }
    );
    Ok(())
}

#[tokio::test]
async fn test_tree_and_list_agree_on_paths() -> Result<()> {
    let store = MemoryStore::new();
    let wk = ensure_well_known(&store, &HubConfig::default()).await?;
    let user = provision_user(&store, &wk, "vic", "vic@test.com", MEMBER).await?;
    let read = PermissionSet::new().add_read(wk.everyone);

    let public = mkdir(&store, &wk, "public", None, read.clone()).await?;
    let docs = mkdir(&store, &wk, "docs", Some(public), read.clone()).await?;
    let specs = mkdir(&store, &wk, "specs", Some(public), read.clone()).await?;
    let secret = mkdir(&store, &wk, "secret", Some(public), PermissionSet::new()).await?;
    let a = touch(&store, &wk, "a.cml", docs).await?;
    let b = touch(&store, &wk, "b.cml", specs).await?;
    touch(&store, &wk, "s.cml", secret).await?;

    let ctx = AccessContext::resolve(&store, user.id, wk.everyone).await?;

    let forest = tree::assemble(&store, &ctx).await?;
    assert_eq!(forest.len(), 1);
    let root = &forest[&public];
    // docs and specs share `public`; `secret` is absent.
    assert_eq!(root.contents.len(), 2);
    assert!(root.child_directory(secret).is_none());
    let docs_node = root.child_directory(docs).unwrap();
    assert!(matches!(docs_node.contents.get(&a), Some(TreeEntry::File(f)) if f.name == "a.cml"));

    let list = listing::list(&store, &ctx).await?;
    let pairs: Vec<_> = list.iter().map(|f| (f.id, f.name.as_str())).collect();
    assert_eq!(
        pairs,
        vec![(a, "public/docs/a.cml"), (b, "public/specs/b.cml")]
    );

    let admin = AccessContext::resolve(&store, wk.admin_user, wk.everyone).await?;
    assert_eq!(listing::list(&store, &admin).await?.len(), 3);
    let forest = tree::assemble(&store, &admin).await?;
    assert!(forest[&public].child_directory(secret).is_some());

    Ok(())
}

#[tokio::test]
async fn test_membership_unions_rights() -> Result<()> {
    let store = MemoryStore::new();
    let wk = ensure_well_known(&store, &HubConfig::default()).await?;
    let user = provision_user(&store, &wk, "wes", "wes@test.com", MEMBER).await?;
    let writers = store.create_group("writers").await?;
    store.add_member(user.id, writers.id).await?;

    let perms = PermissionSet::new()
        .add_read(wk.everyone)
        .add_write(writers.id)
        .add_create(writers.id);
    let shared = mkdir(&store, &wk, "shared", None, perms).await?;

    let ctx = AccessContext::resolve(&store, user.id, wk.everyone).await?;
    let forest = tree::assemble(&store, &ctx).await?;
    assert_eq!(
        forest[&shared].permissions,
        TreePermissions {
            read: true,
            write: true,
            create: true,
            remove: false,
        }
    );

    store.remove_member(user.id, writers.id).await?;
    let ctx = AccessContext::resolve(&store, user.id, wk.everyone).await?;
    let forest = tree::assemble(&store, &ctx).await?;
    assert!(!forest[&shared].permissions.write);

    Ok(())
}
