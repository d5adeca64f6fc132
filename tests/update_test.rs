//! Tests for the verified self-update.

use std::fs;

use mockito::Server;
use sha2::{Digest, Sha256};
use tempfile::TempDir;

use gbackup::error::DriveError;
use gbackup::update::SelfUpdater;

const NEW_BINARY: &[u8] = b"#!/bin/sh\necho new gbackup\n";

fn digest(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

#[tokio::test]
async fn test_verified_update_replaces_target() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("gbackup");
    fs::write(&target, b"old").unwrap();

    let mut server = Server::new_async().await;
    let checksum = server
        .mock("GET", "/gbackup.sha256")
        .with_status(200)
        .with_body(format!("{}  gbackup\n", digest(NEW_BINARY)))
        .create_async()
        .await;
    let binary = server
        .mock("GET", "/gbackup")
        .with_status(200)
        .with_body(NEW_BINARY)
        .create_async()
        .await;

    let updater = SelfUpdater::new(&format!("{}/gbackup", server.url()), &target);
    let written = updater.run().await.unwrap();

    assert_eq!(written, NEW_BINARY.len());
    assert_eq!(fs::read(&target).unwrap(), NEW_BINARY);
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(&target).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }
    checksum.assert_async().await;
    binary.assert_async().await;
}

#[tokio::test]
async fn test_checksum_mismatch_leaves_target() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("gbackup");
    fs::write(&target, b"old").unwrap();

    let mut server = Server::new_async().await;
    server
        .mock("GET", "/gbackup.sha256")
        .with_status(200)
        .with_body(digest(b"something else"))
        .create_async()
        .await;
    server
        .mock("GET", "/gbackup")
        .with_status(200)
        .with_body(NEW_BINARY)
        .create_async()
        .await;

    let updater = SelfUpdater::new(&format!("{}/gbackup", server.url()), &target);
    let err = updater.run().await.unwrap_err();

    assert!(matches!(err, DriveError::UpdateChecksumMismatch { .. }));
    assert_eq!(fs::read(&target).unwrap(), b"old");
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[tokio::test]
async fn test_missing_checksum_skips_download() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("gbackup");
    fs::write(&target, b"old").unwrap();

    let mut server = Server::new_async().await;
    server
        .mock("GET", "/gbackup.sha256")
        .with_status(404)
        .create_async()
        .await;
    let binary = server
        .mock("GET", "/gbackup")
        .expect(0)
        .create_async()
        .await;

    let updater = SelfUpdater::new(&format!("{}/gbackup", server.url()), &target);
    let err = updater.run().await.unwrap_err();

    assert!(matches!(err, DriveError::UpdateChecksumMissing(_)));
    assert_eq!(fs::read(&target).unwrap(), b"old");
    binary.assert_async().await;
}
