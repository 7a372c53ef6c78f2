//! Flat list of every file the user may read, with full slash-joined paths.

use serde::Serialize;
use std::collections::HashSet;
use tracing::warn;

use crate::access::AccessContext;
use crate::error::Result;
use crate::model::{Directory, FileId};
use crate::storage::RecordStore;

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct FileListing {
    pub id: FileId,
    /// Full path, e.g. `public/docs/a.cml`.
    pub name: String,
}

/// Files in every directory on which `ctx` holds `read`, sorted by path.
pub async fn list(store: &dyn RecordStore, ctx: &AccessContext) -> Result<Vec<FileListing>> {
    let records = store.load_directories_with_permissions().await?;
    let mut listing = Vec::new();

    for record in records {
        if !ctx.rights_on(&record.permissions).read {
            continue;
        }
        let files = store.files_in(record.directory.id).await?;
        if files.is_empty() {
            continue;
        }
        let dir_path = path_of(store, &record.directory).await?;
        listing.extend(files.into_iter().map(|file| FileListing {
            id: file.id,
            name: format!("{}/{}", dir_path, file.name),
        }));
    }

    listing.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(listing)
}

/// Slash-joined names from the top-level ancestor down to `directory`. A
/// missing or repeated ancestor ends the walk at the last known name.
async fn path_of(store: &dyn RecordStore, directory: &Directory) -> Result<String> {
    let mut names = vec![directory.name.clone()];
    let mut seen = HashSet::from([directory.id]);
    let mut parent = directory.parent;

    while let Some(parent_id) = parent {
        if !seen.insert(parent_id) {
            warn!(directory = %directory.id, "Directory parent chain forms a cycle; truncating path.");
            break;
        }
        match store.get_directory(parent_id).await? {
            Some(ancestor) => {
                names.push(ancestor.name);
                parent = ancestor.parent;
            }
            None => {
                warn!(directory = %directory.id, "Directory with ID {} does not exist.", parent_id);
                break;
            }
        }
    }

    names.reverse();
    Ok(names.join("/"))
}
