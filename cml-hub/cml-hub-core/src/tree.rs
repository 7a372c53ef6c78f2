//! Nested, permission-filtered view of the directory forest.
//!
//! Directories are loaded in one bulk read, placed through an id-indexed
//! arena, and materialized once each. A directory the user holds no right on
//! hides its whole subtree, even when descendants would be visible on their
//! own.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::warn;
use uuid::Uuid;

use crate::access::AccessContext;
use crate::error::Result;
use crate::model::{DirectoryId, DirectoryRecord, File, UserId};
use crate::permissions::Rights;
use crate::storage::RecordStore;

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
pub struct TreePermissions {
    pub read: bool,
    pub write: bool,
    pub create: bool,
    pub remove: bool,
}

impl From<Rights> for TreePermissions {
    fn from(rights: Rights) -> Self {
        Self {
            read: rights.read,
            write: rights.write,
            create: rights.create,
            remove: rights.delete,
        }
    }
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct FileLeaf {
    pub id: Uuid,
    pub name: String,
    pub owner: UserId,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct DirectoryNode {
    pub id: DirectoryId,
    pub name: String,
    pub owner: UserId,
    pub permissions: TreePermissions,
    pub contents: BTreeMap<Uuid, TreeEntry>,
}

impl DirectoryNode {
    pub fn child_directory(&self, id: DirectoryId) -> Option<&DirectoryNode> {
        match self.contents.get(&id) {
            Some(TreeEntry::Directory(node)) => Some(node),
            _ => None,
        }
    }

    pub fn files(&self) -> impl Iterator<Item = &FileLeaf> {
        self.contents.values().filter_map(|entry| match entry {
            TreeEntry::File(leaf) => Some(leaf),
            TreeEntry::Directory(_) => None,
        })
    }
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum TreeEntry {
    File(FileLeaf),
    Directory(DirectoryNode),
}

/// Top-level directory id to node. There is no wrapper root.
pub type Forest = BTreeMap<DirectoryId, DirectoryNode>;

/// Build the tree visible to `ctx` from the current store contents.
pub async fn assemble(store: &dyn RecordStore, ctx: &AccessContext) -> Result<Forest> {
    let records = store.load_directories_with_permissions().await?;
    let files = store.list_files().await?;
    Ok(build_forest(records, files, ctx))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Placement {
    Root,
    Under(DirectoryId),
    Hidden,
}

struct Slot {
    record: DirectoryRecord,
    rights: Rights,
}

struct Arena {
    slots: Vec<Slot>,
    index: HashMap<DirectoryId, usize>,
}

impl Arena {
    fn new(records: Vec<DirectoryRecord>, ctx: &AccessContext) -> Self {
        let mut slots = Vec::with_capacity(records.len());
        let mut index = HashMap::with_capacity(records.len());
        for record in records {
            if index.contains_key(&record.directory.id) {
                continue;
            }
            index.insert(record.directory.id, slots.len());
            let rights = ctx.rights_on(&record.permissions);
            slots.push(Slot { record, rights });
        }
        Self { slots, index }
    }

    fn get(&self, id: DirectoryId) -> Option<&Slot> {
        self.index.get(&id).map(|&i| &self.slots[i])
    }
}

/// Resolve where `start` sits, walking up until a directory whose placement
/// is already known, and record a placement for every directory passed on
/// the way.
fn place(start: DirectoryId, arena: &Arena, placements: &mut HashMap<DirectoryId, Placement>) {
    // (child, parent) pairs still waiting for their parent's outcome.
    let mut pending: Vec<(DirectoryId, DirectoryId)> = Vec::new();
    let mut seen = HashSet::new();
    let mut current = start;

    let hidden = loop {
        if let Some(known) = placements.get(&current) {
            break *known == Placement::Hidden;
        }
        if !seen.insert(current) {
            warn!(directory = %current, "Directory parent chain forms a cycle; excluding it from the tree.");
            break true;
        }
        let Some(slot) = arena.get(current) else {
            break true;
        };
        if !slot.rights.any() {
            placements.insert(current, Placement::Hidden);
            break true;
        }
        match slot.record.directory.parent {
            None => {
                placements.insert(current, Placement::Root);
                break false;
            }
            Some(parent) if arena.get(parent).is_none() => {
                warn!(directory = %current, parent = %parent, "Directory with ID {} does not exist.", parent);
                placements.insert(current, Placement::Root);
                break false;
            }
            Some(parent) => {
                pending.push((current, parent));
                current = parent;
            }
        }
    };

    for (child, parent) in pending.into_iter().rev() {
        let placement = if hidden {
            Placement::Hidden
        } else {
            Placement::Under(parent)
        };
        placements.insert(child, placement);
    }
}

/// Pure tree construction over already-loaded records.
pub fn build_forest(records: Vec<DirectoryRecord>, files: Vec<File>, ctx: &AccessContext) -> Forest {
    let arena = Arena::new(records, ctx);

    let mut placements = HashMap::with_capacity(arena.slots.len());
    for slot in &arena.slots {
        place(slot.record.directory.id, &arena, &mut placements);
    }

    let mut roots = Vec::new();
    let mut children: HashMap<DirectoryId, Vec<DirectoryId>> = HashMap::new();
    for slot in &arena.slots {
        let id = slot.record.directory.id;
        match placements.get(&id) {
            Some(Placement::Root) => roots.push(id),
            Some(Placement::Under(parent)) => children.entry(*parent).or_default().push(id),
            Some(Placement::Hidden) | None => {}
        }
    }

    let mut files_by_dir: HashMap<DirectoryId, Vec<File>> = HashMap::new();
    for file in files {
        files_by_dir.entry(file.parent).or_default().push(file);
    }

    let mut forest = Forest::new();
    for root in roots {
        if let Some(node) = materialize(root, &arena, &children, &mut files_by_dir) {
            forest.insert(root, node);
        }
    }
    forest
}

fn materialize(
    id: DirectoryId,
    arena: &Arena,
    children: &HashMap<DirectoryId, Vec<DirectoryId>>,
    files_by_dir: &mut HashMap<DirectoryId, Vec<File>>,
) -> Option<DirectoryNode> {
    let slot = arena.get(id)?;
    let directory = &slot.record.directory;
    let mut contents = BTreeMap::new();

    for child in children.get(&id).into_iter().flatten() {
        if let Some(node) = materialize(*child, arena, children, files_by_dir) {
            contents.insert(*child, TreeEntry::Directory(node));
        }
    }
    for file in files_by_dir.remove(&id).unwrap_or_default() {
        contents.insert(
            file.id,
            TreeEntry::File(FileLeaf {
                id: file.id,
                name: file.name,
                owner: file.owner,
            }),
        );
    }

    Some(DirectoryNode {
        id: directory.id,
        name: directory.name.clone(),
        owner: directory.owner,
        permissions: slot.rights.into(),
        contents,
    })
}
