//! Self-update: replace the installed binary with the latest release.
//!
//! The release artifact is only installed when its SHA-256 digest matches the
//! `<url>.sha256` file published next to it.

use std::path::{Path, PathBuf};

use reqwest::Client;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::{DriveError, Result};

/// Latest release artifact.
pub const UPDATE_URL: &str =
    "https://github.com/DoyunShin/gdrive-backup-script/releases/latest/download/gbackup";

/// Downloads, verifies and installs a replacement binary.
pub struct SelfUpdater {
    url: String,
    checksum_url: String,
    target: PathBuf,
    http: Client,
}

impl SelfUpdater {
    /// Update `target` from `url`, verified against `<url>.sha256`.
    pub fn new(url: &str, target: impl Into<PathBuf>) -> Self {
        Self {
            url: url.to_string(),
            checksum_url: format!("{}.sha256", url),
            target: target.into(),
            http: Client::new(),
        }
    }

    /// Update the running executable from [`UPDATE_URL`].
    pub fn for_current_exe() -> Result<Self> {
        Ok(Self::new(UPDATE_URL, std::env::current_exe()?))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Fetch, verify and install. Returns the number of bytes installed.
    ///
    /// Nothing is written unless the digest matches.
    pub async fn run(&self) -> Result<usize> {
        let expected = self.expected_digest().await?;

        debug!("downloading {}", self.url);
        let bytes = self
            .http
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        let actual = format!("{:x}", Sha256::digest(&bytes));
        if !actual.eq_ignore_ascii_case(&expected) {
            return Err(DriveError::UpdateChecksumMismatch { expected, actual });
        }

        self.install(&bytes).await?;
        info!("installed {} bytes to {}", bytes.len(), self.target.display());
        Ok(bytes.len())
    }

    /// Read the digest from a `sha256sum`-style line.
    async fn expected_digest(&self) -> Result<String> {
        let response = self.http.get(&self.checksum_url).send().await?;
        if !response.status().is_success() {
            return Err(DriveError::UpdateChecksumMissing(format!(
                "{} returned {}",
                self.checksum_url,
                response.status()
            )));
        }

        let body = response.text().await?;
        parse_digest(&body).ok_or_else(|| {
            DriveError::UpdateChecksumMissing(format!("{} has no SHA-256 digest", self.checksum_url))
        })
    }

    /// Write beside the target, then rename over it.
    async fn install(&self, bytes: &[u8]) -> Result<()> {
        let file_name = self
            .target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "gbackup".to_string());
        let staging = self.target.with_file_name(format!(".{}.update", file_name));

        let result = async {
            tokio::fs::write(&staging, bytes).await?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                tokio::fs::set_permissions(&staging, std::fs::Permissions::from_mode(0o755))
                    .await?;
            }
            tokio::fs::rename(&staging, &self.target).await
        }
        .await;

        if result.is_err() {
            let _ = tokio::fs::remove_file(&staging).await;
        }
        Ok(result?)
    }
}

/// First token of the checksum file, if it is a 64 digit hex string.
pub fn parse_digest(body: &str) -> Option<String> {
    let token = body.split_whitespace().next()?;
    (token.len() == 64 && token.chars().all(|c| c.is_ascii_hexdigit()))
        .then(|| token.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_digest() {
        let digest = "a".repeat(64);
        assert_eq!(parse_digest(&format!("{}  gbackup\n", digest)), Some(digest.clone()));
        assert_eq!(parse_digest(&digest.to_uppercase()), Some(digest));
        assert_eq!(parse_digest("deadbeef gbackup"), None);
        assert_eq!(parse_digest(""), None);
    }

    #[test]
    fn test_checksum_url() {
        let updater = SelfUpdater::new("http://localhost/gbackup", "/tmp/gbackup");
        assert_eq!(updater.checksum_url, "http://localhost/gbackup.sha256");
        assert_eq!(updater.target(), Path::new("/tmp/gbackup"));
    }
}
