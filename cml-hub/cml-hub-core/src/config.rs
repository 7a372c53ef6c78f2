//! Process configuration read from the environment (and `.env`).

use std::path::PathBuf;
use tracing::warn;

use crate::import::{ImportEntry, DEFAULT_EXTENSION};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DefaultUser {
    pub name: String,
    pub email: String,
}

#[derive(Clone, Debug)]
pub struct HubConfig {
    /// Blob directory.
    pub storage: PathBuf,
    /// Record store directory.
    pub data_dir: PathBuf,
    pub load: Vec<ImportEntry>,
    pub default_user: DefaultUser,
    /// New users start unverified and wait for an admin.
    pub require_accept: bool,
    pub auto_create_directory: bool,
    pub content_extension: String,
    pub jwt_secret: Option<String>,
    /// Accept the caller named by `X-User-Id` when no `jwt_secret` is set.
    pub trust_user_header: bool,
    /// Import even when the store already holds directories.
    pub force_import: bool,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl HubConfig {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unset and empty values fall back
    /// to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).unwrap_or_default();
        let separator = non_empty(&get("SEPARATOR"), ":");

        Self {
            storage: PathBuf::from(trim_path(&non_empty(&get("STORAGE"), "./storage"))),
            data_dir: PathBuf::from(trim_path(&non_empty(&get("DATA_DIR"), "./data"))),
            load: parse_load(&get("LOAD"), &separator),
            default_user: DefaultUser {
                name: non_empty(&get("DEFAULT_USER"), "admin"),
                email: non_empty(&get("DEFAULT_EMAIL"), "admin@test.com"),
            },
            require_accept: flag(&get("REQUIRE_ACCEPT"), false),
            auto_create_directory: flag(&get("AUTO_CREATE_DIRECTORY"), true),
            content_extension: non_empty(&get("CONTENT_EXTENSION"), DEFAULT_EXTENSION)
                .trim_start_matches('.')
                .to_string(),
            jwt_secret: lookup("JWT_SECRET").filter(|s| !s.is_empty()),
            trust_user_header: flag(&get("TRUST_USER_HEADER"), false),
            force_import: flag(&get("FORCE_IMPORT"), false),
        }
    }
}

fn non_empty(input: &str, default: &str) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        default.to_string()
    } else {
        trimmed.to_string()
    }
}

fn trim_path(input: &str) -> &str {
    let trimmed = input.trim();
    match trimmed.strip_suffix('/') {
        Some(stripped) if !stripped.is_empty() => stripped,
        _ => trimmed,
    }
}

fn flag(input: &str, default: bool) -> bool {
    match input.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => true,
        "false" | "0" | "no" => false,
        _ => default,
    }
}

/// Parse `target{sep}source{sep}recursive{sep}readable` tuples separated by
/// `;`. Malformed tuples are logged and dropped.
pub fn parse_load(input: &str, separator: &str) -> Vec<ImportEntry> {
    input
        .split(';')
        .filter(|entry| !entry.trim().is_empty())
        .filter_map(|entry| {
            let tuple: Vec<&str> = entry.trim().split(separator).collect();
            let parsed = match tuple.as_slice() {
                [target, source, recursive, readable] if !target.is_empty() && !source.is_empty() => {
                    parse_bool(recursive)
                        .zip(parse_bool(readable))
                        .map(|(recursive, readable)| ImportEntry {
                            source: PathBuf::from(*source),
                            target: target.to_string(),
                            recursive,
                            readable,
                        })
                }
                _ => None,
            };
            if parsed.is_none() {
                warn!(
                    "Invalid LOAD tuple: {} (tuple: {:?}, sep: {})",
                    entry, tuple, separator
                );
            }
            parsed
        })
        .collect()
}

fn parse_bool(input: &str) -> Option<bool> {
    match input {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}
