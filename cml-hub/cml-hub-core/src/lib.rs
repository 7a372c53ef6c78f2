pub mod access;
pub mod accounts;
pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod files;
pub mod import;
pub mod listing;
pub mod model;
pub mod permissions;
pub mod storage;
pub mod tree;

pub use access::AccessContext;
pub use bootstrap::WellKnown;
pub use config::HubConfig;
pub use error::{Error, Result};
pub use permissions::{PermissionSet, Right, Rights};
pub use storage::{BlobStorage, RecordStore};
