//! Snapshot Persistence
//!
//! Best-effort durability: the table is restored once before the listener
//! opens and persisted once after the server has drained its connections.
//! Nothing is written while the server runs.

pub mod snapshot;

pub use snapshot::{PersistenceError, SnapshotStore, SNAPSHOT_FILE_NAME};

use std::path::PathBuf;

/// Directory name used under the user's configuration directory.
pub const APP_DIR_NAME: &str = "cacher";

/// Per-user data directory for snapshots.
///
/// Uses `$XDG_CONFIG_HOME/cacher`, falling back to `$HOME/.config/cacher`.
/// Returns `None` when neither variable is set.
pub fn default_data_dir() -> Option<PathBuf> {
    let config_dir = std::env::var_os("XDG_CONFIG_HOME")
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var_os("HOME")
                .filter(|dir| !dir.is_empty())
                .map(|home| PathBuf::from(home).join(".config"))
        })?;

    Some(config_dir.join(APP_DIR_NAME))
}
