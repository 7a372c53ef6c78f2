//! Reading file contents on behalf of a user.

use crate::access::AccessContext;
use crate::error::{Error, Result};
use crate::model::{File, FileId};
use crate::permissions::Right;
use crate::storage::{BlobStorage, RecordStore};

/// A file record together with its bytes.
#[derive(Clone, Debug)]
pub struct FileContent {
    pub file: File,
    pub bytes: Vec<u8>,
}

/// Fetch `id` if `ctx` may read its parent directory. Files carry no ACL of
/// their own.
pub async fn read_file(
    store: &dyn RecordStore,
    blobs: &dyn BlobStorage,
    ctx: &AccessContext,
    id: FileId,
) -> Result<FileContent> {
    let file = store
        .get_file(id)
        .await?
        .ok_or_else(|| Error::not_found(format!("File with ID {}", id)))?;

    if !ctx.is_admin {
        let rows = store.permissions_of(file.parent).await?;
        ctx.require(ctx.rights_on(&rows), Right::Read, format!("file {}", id))?;
    }

    let bytes = blobs.get(file.id).await?;
    Ok(FileContent { file, bytes })
}
