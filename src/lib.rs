//! gbackup - Upload local files to a Google Drive folder with a service account.
//!
//! This library provides functionality to:
//! - Load a service account key and obtain Drive access tokens
//! - Verify that a destination folder is reachable
//! - List and create folders
//! - Upload files, resumably or in a single request
//!
//! # Example
//!
//! ```no_run
//! use gbackup::{Authenticator, DriveClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let auth = Authenticator::from_file("gdrive-credential.json")?;
//!     let client = DriveClient::new(auth, "folder-id").connect().await?;
//!
//!     let id = client.upload_file("backup.tar.gz", None).await?;
//!     println!("{} - backup.tar.gz", id);
//!
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod folder_id;
pub mod models;
pub mod update;
pub mod uploader;

// Re-exports for convenience
pub use auth::{Authenticator, StaticToken, TokenProvider};
pub use client::{DriveClient, TransferMode};
pub use error::{DriveError, Result};
pub use models::FileRef;
pub use uploader::{resolve_targets, upload_all};
