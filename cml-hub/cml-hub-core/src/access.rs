//! Admin check, group resolution and per-directory rights aggregation.

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::model::{Group, GroupId, Permission, UserId, ADMIN_GROUP};
use crate::permissions::{Right, Rights};
use crate::storage::RecordStore;

/// True iff `user` is a member of the `admin` group. Unknown users are not
/// admins.
pub async fn is_admin(store: &dyn RecordStore, user: UserId) -> Result<bool> {
    if store.get_user(user).await?.is_none() {
        return Ok(false);
    }
    Ok(holds_admin(&store.groups_of(user).await?))
}

/// Every group `user` belongs to, always including `everyone`.
pub async fn groups_of(
    store: &dyn RecordStore,
    user: UserId,
    everyone: GroupId,
) -> Result<HashSet<GroupId>> {
    Ok(group_ids(&store.groups_of(user).await?, everyone))
}

fn holds_admin(memberships: &[Group]) -> bool {
    memberships.iter().any(|g| g.name == ADMIN_GROUP)
}

fn group_ids(memberships: &[Group], everyone: GroupId) -> HashSet<GroupId> {
    memberships
        .iter()
        .map(|g| g.id)
        .chain(std::iter::once(everyone))
        .collect()
}

/// Per-flag OR over the rows whose group is in `groups`; all flags when
/// `is_admin`.
pub fn effective_permission(
    rows: &[Permission],
    groups: &HashSet<GroupId>,
    is_admin: bool,
) -> Rights {
    if is_admin {
        return Rights::ALL;
    }
    rows.iter()
        .filter(|row| groups.contains(&row.group))
        .fold(Rights::NONE, |acc, row| acc | row.rights)
}

/// The requesting user's identity, resolved once per request.
#[derive(Clone, Debug)]
pub struct AccessContext {
    pub user: UserId,
    pub is_admin: bool,
    pub groups: HashSet<GroupId>,
}

impl AccessContext {
    pub async fn resolve(store: &dyn RecordStore, user: UserId, everyone: GroupId) -> Result<Self> {
        if store.get_user(user).await?.is_none() {
            return Err(Error::not_found(format!("User with ID {}", user)));
        }
        let memberships = store.groups_of(user).await?;
        Ok(Self {
            user,
            is_admin: holds_admin(&memberships),
            groups: group_ids(&memberships, everyone),
        })
    }

    pub fn rights_on(&self, rows: &[Permission]) -> Rights {
        effective_permission(rows, &self.groups, self.is_admin)
    }

    pub fn require(&self, rights: Rights, right: Right, what: impl std::fmt::Display) -> Result<()> {
        if rights.allows(right) {
            Ok(())
        } else {
            Err(Error::forbidden(format!(
                "Missing {} permission on {}.",
                right.as_str(),
                what
            )))
        }
    }
}
