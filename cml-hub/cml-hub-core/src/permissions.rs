//! The four-flag rights record and the permission builder used when
//! directories are created.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::BitOr;

use crate::model::GroupId;

/// The rights a group (or, after aggregation, a user) holds on a directory.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Rights {
    pub read: bool,
    pub write: bool,
    pub create: bool,
    pub delete: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Right {
    Read,
    Write,
    Create,
    Delete,
}

impl Right {
    pub fn as_str(&self) -> &'static str {
        match self {
            Right::Read => "read",
            Right::Write => "write",
            Right::Create => "create",
            Right::Delete => "delete",
        }
    }
}

impl Rights {
    pub const NONE: Rights = Rights {
        read: false,
        write: false,
        create: false,
        delete: false,
    };

    pub const ALL: Rights = Rights {
        read: true,
        write: true,
        create: true,
        delete: true,
    };

    pub fn only(right: Right) -> Self {
        let mut rights = Self::NONE;
        match right {
            Right::Read => rights.read = true,
            Right::Write => rights.write = true,
            Right::Create => rights.create = true,
            Right::Delete => rights.delete = true,
        }
        rights
    }

    /// True if at least one flag is set.
    pub fn any(&self) -> bool {
        self.read || self.write || self.create || self.delete
    }

    pub fn allows(&self, right: Right) -> bool {
        match right {
            Right::Read => self.read,
            Right::Write => self.write,
            Right::Create => self.create,
            Right::Delete => self.delete,
        }
    }
}

impl BitOr for Rights {
    type Output = Rights;

    fn bitor(self, rhs: Rights) -> Rights {
        Rights {
            read: self.read || rhs.read,
            write: self.write || rhs.write,
            create: self.create || rhs.create,
            delete: self.delete || rhs.delete,
        }
    }
}

/// Group → rights accumulator applied as a batch of permission rows when a
/// directory is created.
///
/// Every `add_*` call consumes the set and returns the updated value, so a
/// template shared between several directories is cloned rather than
/// mutated. Flags only ever go up: granting one right never clears another.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PermissionSet {
    groups: BTreeMap<GroupId, Rights>,
}

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn grant(mut self, group: GroupId, rights: Rights) -> Self {
        let entry = self.groups.entry(group).or_default();
        *entry = *entry | rights;
        self
    }

    /// Record an entry for `group` without raising any flag.
    pub fn add_none(self, group: GroupId) -> Self {
        self.grant(group, Rights::NONE)
    }

    pub fn add_read(self, group: GroupId) -> Self {
        self.grant(group, Rights::only(Right::Read))
    }

    pub fn add_write(self, group: GroupId) -> Self {
        self.grant(group, Rights::only(Right::Write))
    }

    pub fn add_create(self, group: GroupId) -> Self {
        self.grant(group, Rights::only(Right::Create))
    }

    pub fn add_delete(self, group: GroupId) -> Self {
        self.grant(group, Rights::only(Right::Delete))
    }

    pub fn add_all(self, group: GroupId) -> Self {
        self.grant(group, Rights::ALL)
    }

    /// Rights recorded for `group`; `None` when the group was never added.
    pub fn get(&self, group: GroupId) -> Option<Rights> {
        self.groups.get(&group).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (GroupId, Rights)> + '_ {
        self.groups.iter().map(|(group, rights)| (*group, *rights))
    }
}
