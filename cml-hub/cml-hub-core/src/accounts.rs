//! User and group administration.
//!
//! Everything except [`provision_user`] and [`describe_self`] is admin-only
//! and takes the caller's [`AccessContext`].

use serde::Serialize;
use tracing::info;

use crate::access::{self, AccessContext};
use crate::bootstrap::WellKnown;
use crate::error::{Error, Result};
use crate::model::{Group, GroupId, NewDirectory, NewUser, User, UserId, EVERYONE_GROUP};
use crate::permissions::PermissionSet;
use crate::storage::RecordStore;

/// Options applied when a user registers.
#[derive(Clone, Copy, Debug)]
pub struct Provisioning {
    /// Mark the new user verified immediately.
    pub verified: bool,
    /// Create a top-level directory named after the user.
    pub create_home: bool,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct GroupRef {
    pub id: GroupId,
    pub name: String,
}

impl From<Group> for GroupRef {
    fn from(group: Group) -> Self {
        Self {
            id: group.id,
            name: group.name,
        }
    }
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SelfView {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub verified: bool,
    pub is_admin: bool,
    pub groups: Vec<GroupRef>,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub verified: bool,
    pub is_admin: bool,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct MemberRef {
    pub id: UserId,
    pub name: String,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct GroupView {
    pub id: GroupId,
    pub name: String,
    pub members: Vec<MemberRef>,
}

fn require_admin(ctx: &AccessContext, action: &str) -> Result<()> {
    if ctx.is_admin {
        Ok(())
    } else {
        Err(Error::forbidden(format!(
            "You don't have permission to {}.",
            action
        )))
    }
}

fn validate_name(kind: &str, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::Invalid(format!("Missing {} name.", kind)));
    }
    if name.contains('/') || name.starts_with('@') {
        return Err(Error::Invalid(format!(
            "'{}' is not a valid {} name.",
            name, kind
        )));
    }
    Ok(())
}

/// Register a user: personal group, `@everyone` membership and optionally a
/// home directory on which the personal group holds every right.
pub async fn provision_user(
    store: &dyn RecordStore,
    well_known: &WellKnown,
    name: &str,
    email: &str,
    options: Provisioning,
) -> Result<User> {
    validate_name("user", name)?;
    if !email.contains('@') {
        return Err(Error::Invalid(format!("'{}' is not an e-mail address.", email)));
    }
    let taken = store.find_user_by_name(name).await?.is_some()
        || store.find_group_by_name(name).await?.is_some()
        || (options.create_home && store.find_directory(name, None).await?.is_some());
    if taken {
        return Err(Error::Conflict(format!(
            "Couldn't create user '{}': the name is already in use.",
            name
        )));
    }

    let user = store
        .create_user(NewUser {
            name: name.to_string(),
            email: email.to_string(),
            verified: options.verified,
        })
        .await?;
    let group = store.create_group(name).await?;
    store.add_member(user.id, group.id).await?;
    store.add_member(user.id, well_known.everyone).await?;

    if options.create_home {
        store
            .create_directory(
                NewDirectory {
                    name: name.to_string(),
                    parent: None,
                    owner: user.id,
                },
                &PermissionSet::new().add_all(group.id),
            )
            .await?;
    }

    info!(user = %user.id, verified = user.verified, "Registered user {}", user.name);
    Ok(user)
}

pub async fn describe_self(store: &dyn RecordStore, user: &User) -> Result<SelfView> {
    let groups = store.groups_of(user.id).await?;
    Ok(SelfView {
        id: user.id,
        name: user.name.clone(),
        email: user.email.clone(),
        verified: user.verified,
        is_admin: access::is_admin(store, user.id).await?,
        groups: groups.into_iter().map(GroupRef::from).collect(),
    })
}

pub async fn list_users(store: &dyn RecordStore, ctx: &AccessContext) -> Result<Vec<UserSummary>> {
    require_admin(ctx, "list all users")?;
    let mut out = Vec::new();
    for user in store.list_users().await? {
        out.push(UserSummary {
            is_admin: access::is_admin(store, user.id).await?,
            id: user.id,
            name: user.name,
            email: user.email,
            verified: user.verified,
        });
    }
    Ok(out)
}

pub async fn list_groups(store: &dyn RecordStore, ctx: &AccessContext) -> Result<Vec<GroupView>> {
    require_admin(ctx, "list all groups")?;
    let mut out = Vec::new();
    for group in store.list_groups().await? {
        let members = store
            .members_of(group.id)
            .await?
            .into_iter()
            .map(|u| MemberRef {
                id: u.id,
                name: u.name,
            })
            .collect();
        out.push(GroupView {
            id: group.id,
            name: group.name,
            members,
        });
    }
    Ok(out)
}

pub async fn verify_user(store: &dyn RecordStore, ctx: &AccessContext, user: UserId) -> Result<()> {
    require_admin(ctx, "verify users")?;
    store.set_verified(user, true).await?;
    info!(user = %user, "Verified user");
    Ok(())
}

/// Delete `user`, handing its directories and files to the default admin.
pub async fn remove_user(
    store: &dyn RecordStore,
    well_known: &WellKnown,
    ctx: &AccessContext,
    user: UserId,
) -> Result<()> {
    require_admin(ctx, "remove users")?;
    if user == well_known.admin_user {
        return Err(Error::Invalid("The default admin cannot be removed.".to_string()));
    }
    if store.get_user(user).await?.is_none() {
        return Err(Error::not_found(format!("User with ID {}", user)));
    }
    let moved = store.reassign_owner(user, well_known.admin_user).await?;
    store.delete_user(user).await?;
    info!(user = %user, reassigned = moved, "Removed user");
    Ok(())
}

pub async fn create_group(store: &dyn RecordStore, ctx: &AccessContext, name: &str) -> Result<Group> {
    require_admin(ctx, "create groups")?;
    validate_name("group", name)?;
    store.create_group(name).await
}

pub async fn join_group(
    store: &dyn RecordStore,
    ctx: &AccessContext,
    user: UserId,
    group: GroupId,
) -> Result<()> {
    require_admin(ctx, "change group memberships")?;
    store.add_member(user, group).await
}

/// Remove a membership. `@everyone` cannot be left.
pub async fn leave_group(
    store: &dyn RecordStore,
    ctx: &AccessContext,
    user: UserId,
    group: GroupId,
) -> Result<()> {
    require_admin(ctx, "change group memberships")?;
    let target = store
        .get_group(group)
        .await?
        .ok_or_else(|| Error::not_found(format!("Group with ID {}", group)))?;
    if target.name == EVERYONE_GROUP {
        return Err(Error::Invalid(format!(
            "Every user belongs to {}.",
            EVERYONE_GROUP
        )));
    }
    store.remove_member(user, group).await
}
