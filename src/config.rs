//! Location of the service account credential.

use std::path::PathBuf;

/// Directory under the user configuration directory holding gbackup files.
pub const APP_DIR: &str = "gbackup";

/// File name of the service account key.
pub const CREDENTIAL_FILE: &str = "gdrive-credential.json";

/// Environment variable overriding the credential location.
pub const CREDENTIAL_ENV: &str = "GBACKUP_CREDENTIAL";

/// Default credential path: `<config_dir>/gbackup/gdrive-credential.json`.
///
/// `config_dir` is `~/.config` on Linux. Returns `None` when the platform has
/// no configuration directory.
pub fn default_credential_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CREDENTIAL_FILE))
}

/// Pick the explicit path when given, the default location otherwise.
pub fn resolve_credential_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
    explicit.or_else(default_credential_path)
}
