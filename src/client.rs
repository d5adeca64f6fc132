//! Google Drive API client for folder listing, folder creation and uploads.

use std::collections::HashMap;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};

use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, LOCATION, RANGE};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Response, StatusCode};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use crate::auth::{Authenticator, TokenProvider};
use crate::error::{DriveError, Result};
use crate::models::{ApiErrorResponse, CreatedFile, FileListResponse, FileRef, NewFile};

/// Base URL for Google Drive API v3.
const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Upload URL for Google Drive API.
const UPLOAD_API_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

/// Maximum page size accepted by files.list. Only the first page is fetched.
const LIST_PAGE_SIZE: &str = "1000";

/// Resumable chunks must be a multiple of this size.
const CHUNK_GRANULARITY: u64 = 256 * 1024;

/// Default resumable chunk size (8 MiB).
const DEFAULT_CHUNK_SIZE: u64 = 32 * CHUNK_GRANULARITY;

/// How file content is transferred by [`DriveClient::upload_file`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferMode {
    /// Chunked upload session that resumes from the last acknowledged offset.
    #[default]
    Resumable,
    /// Single request carrying metadata and content.
    Multipart,
}

/// Local content attached to a create request.
#[derive(Debug, Clone)]
pub struct MediaSource {
    pub path: PathBuf,
    pub size: u64,
    pub mime_type: Option<String>,
}

impl MediaSource {
    /// Inspect a local file. Fails with [`DriveError::UploadTargetNotFound`]
    /// when `path` does not exist or is not a regular file.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let metadata = tokio::fs::metadata(path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => DriveError::UploadTargetNotFound(path.to_path_buf()),
            _ => DriveError::IoError(e),
        })?;
        if !metadata.is_file() {
            return Err(DriveError::UploadTargetNotFound(path.to_path_buf()));
        }

        Ok(Self {
            path: path.to_path_buf(),
            size: metadata.len(),
            mime_type: guess_mime_type(path),
        })
    }
}

/// Guess a MIME type from the file name extension.
///
/// Returns `None` when the extension is missing or unknown, in which case the
/// content type is left for the remote service to decide.
pub fn guess_mime_type(path: &Path) -> Option<String> {
    mime_guess::from_path(path).first().map(|m| m.to_string())
}

/// Progress of a resumable upload session.
enum SessionState {
    Incomplete(u64),
    Complete(String),
}

/// Client for a Google Drive folder tree rooted at `root`.
pub struct DriveClient<A = Authenticator> {
    root: String,
    auth: A,
    http: Client,
    api_base: String,
    upload_base: String,
    transfer: TransferMode,
    chunk_size: u64,
}

impl<A: TokenProvider> DriveClient<A> {
    /// Create a new client without contacting the service.
    ///
    /// # Arguments
    /// * `auth` - Source of access tokens
    /// * `root` - Folder id used when no parent is given
    pub fn new(auth: A, root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            auth,
            http: Client::new(),
            api_base: DRIVE_API_BASE.to_string(),
            upload_base: UPLOAD_API_BASE.to_string(),
            transfer: TransferMode::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Point the client at different API and upload endpoints.
    pub fn with_endpoints(mut self, api_base: &str, upload_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self.upload_base = upload_base.trim_end_matches('/').to_string();
        self
    }

    pub fn with_transfer_mode(mut self, transfer: TransferMode) -> Self {
        self.transfer = transfer;
        self
    }

    /// Set the resumable chunk size, rounded up to a multiple of 256 KiB.
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        let granules = chunk_size
            .div_ceil(CHUNK_GRANULARITY)
            .clamp(1, u64::MAX / CHUNK_GRANULARITY);
        self.chunk_size = granules * CHUNK_GRANULARITY;
        self
    }

    /// Verify the root folder and return the ready client.
    pub async fn connect(self) -> Result<Self> {
        self.verify_root().await?;
        Ok(self)
    }

    /// Fail fast when the root folder id is empty or cannot be listed.
    ///
    /// Token acquisition failures are returned as they are, since they say
    /// nothing about the folder.
    pub async fn verify_root(&self) -> Result<()> {
        if self.root.trim().is_empty() {
            return Err(DriveError::RootNotSet);
        }

        self.list_files(&self.root).await.map_err(|e| {
            if e.is_auth() {
                return e;
            }
            DriveError::RootInaccessible {
                root: self.root.clone(),
                source: Box::new(e),
            }
        })?;

        debug!("root folder {} is accessible", self.root);
        Ok(())
    }

    /// Get the root folder ID.
    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// List non-trashed children of a folder in server order.
    ///
    /// Only the first page (up to 1000 entries) is returned. Duplicate names
    /// are all kept.
    pub async fn list_files(&self, parent_id: &str) -> Result<Vec<FileRef>> {
        let token = self.auth.access_token().await?;
        let query = format!(
            "'{}' in parents and trashed = false",
            escape_query_value(parent_id)
        );

        let response = self
            .http
            .get(format!("{}/files", self.api_base))
            .bearer_auth(&token)
            .query(&[
                ("q", query.as_str()),
                ("pageSize", LIST_PAGE_SIZE),
                ("includeItemsFromAllDrives", "true"),
                ("supportsAllDrives", "true"),
                ("fields", "nextPageToken, files(id, name, mimeType)"),
            ])
            .send()
            .await?;

        let list_response: FileListResponse = check_response(response).await?.json().await?;

        if list_response.next_page_token.is_some() {
            warn!(
                "folder {} has more than {} entries; only the first page was listed",
                parent_id, LIST_PAGE_SIZE
            );
        }

        Ok(list_response.files)
    }

    /// List a folder as a name to id mapping.
    ///
    /// When several children share a name, the last one in server order wins.
    pub async fn list(&self, parent_id: &str) -> Result<HashMap<String, String>> {
        let files = self.list_files(parent_id).await?;
        Ok(files.into_iter().map(|f| (f.name, f.id)).collect())
    }

    /// Create an object from metadata and optional media content.
    ///
    /// Returns the remote identifier of the new object.
    pub async fn create(&self, metadata: &NewFile, media: Option<&MediaSource>) -> Result<String> {
        let id = match media {
            None => self.create_metadata_only(metadata).await?,
            Some(media) => match self.transfer {
                TransferMode::Resumable => self.upload_resumable(metadata, media).await?,
                TransferMode::Multipart => self.upload_multipart(metadata, media).await?,
            },
        };

        debug!("created {} ({})", metadata.name, id);
        Ok(id)
    }

    /// Create a folder under `parent_id`, or under the root when `None`.
    pub async fn create_folder(&self, name: &str, parent_id: Option<&str>) -> Result<String> {
        let parent_id = parent_id.unwrap_or(&self.root);
        self.create(&NewFile::folder(name, parent_id), None).await
    }

    /// Upload a local file under `parent_id`, or under the root when `None`.
    ///
    /// The local path is checked before any request is made.
    pub async fn upload_file<P: AsRef<Path>>(
        &self,
        local_path: P,
        parent_id: Option<&str>,
    ) -> Result<String> {
        let local_path = local_path.as_ref();
        let media = MediaSource::from_path(local_path).await?;
        let name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| DriveError::UploadTargetNotFound(local_path.to_path_buf()))?;

        let metadata = NewFile {
            name,
            mime_type: None,
            parents: vec![parent_id.unwrap_or(&self.root).to_string()],
        };

        let id = self.create(&metadata, Some(&media)).await?;
        info!(
            "uploaded {} ({} bytes, {}) as {}",
            local_path.display(),
            media.size,
            media.mime_type.as_deref().unwrap_or("unknown type"),
            id
        );
        Ok(id)
    }

    async fn create_metadata_only(&self, metadata: &NewFile) -> Result<String> {
        let token = self.auth.access_token().await?;

        let response = self
            .http
            .post(format!("{}/files", self.api_base))
            .bearer_auth(&token)
            .query(&[("supportsAllDrives", "true"), ("fields", "id")])
            .json(metadata)
            .send()
            .await?;

        let created: CreatedFile = check_response(response).await?.json().await?;
        Ok(created.id)
    }

    /// Upload metadata and content in a single multipart request.
    async fn upload_multipart(&self, metadata: &NewFile, media: &MediaSource) -> Result<String> {
        let token = self.auth.access_token().await?;
        let file = File::open(&media.path).await?;

        let metadata_part =
            Part::bytes(serde_json::to_vec(metadata)?).mime_str("application/json")?;

        let mut file_part = Part::stream_with_length(
            Body::wrap_stream(ReaderStream::new(file)),
            media.size,
        )
        .file_name(metadata.name.clone());
        if let Some(mime_type) = &media.mime_type {
            file_part = file_part.mime_str(mime_type)?;
        }

        let form = Form::new()
            .part("metadata", metadata_part)
            .part("file", file_part);

        let response = self
            .http
            .post(format!("{}/files", self.upload_base))
            .bearer_auth(&token)
            .query(&[
                ("uploadType", "multipart"),
                ("supportsAllDrives", "true"),
                ("fields", "id"),
            ])
            .multipart(form)
            .send()
            .await?;

        let created: CreatedFile = check_response(response).await?.json().await?;
        Ok(created.id)
    }

    /// Upload content through a resumable session, chunk by chunk.
    async fn upload_resumable(&self, metadata: &NewFile, media: &MediaSource) -> Result<String> {
        let token = self.auth.access_token().await?;

        let mut init = self
            .http
            .post(format!("{}/files", self.upload_base))
            .bearer_auth(&token)
            .query(&[
                ("uploadType", "resumable"),
                ("supportsAllDrives", "true"),
                ("fields", "id"),
            ])
            .header("X-Upload-Content-Length", media.size.to_string());
        if let Some(mime_type) = &media.mime_type {
            init = init.header("X-Upload-Content-Type", mime_type);
        }

        let init_response = check_response(init.json(metadata).send().await?).await?;
        let session_url = init_response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| DriveError::ApiError {
                status: init_response.status().as_u16(),
                message: "No upload URL in response".to_string(),
            })?
            .to_string();
        debug!("resumable session opened for {}", metadata.name);

        if media.size == 0 {
            let response = self
                .http
                .put(&session_url)
                .header(CONTENT_LENGTH, "0")
                .header(CONTENT_RANGE, "bytes */0")
                .send()
                .await?;
            let created: CreatedFile = check_response(response).await?.json().await?;
            return Ok(created.id);
        }

        let mut file = File::open(&media.path).await?;
        let mut offset = 0u64;
        let mut resumed_at: Option<u64> = None;

        loop {
            if offset >= media.size {
                return Err(DriveError::ApiError {
                    status: StatusCode::PERMANENT_REDIRECT.as_u16(),
                    message: "upload session stored every byte but did not complete".to_string(),
                });
            }
            let len = (media.size - offset).min(self.chunk_size);
            let mut chunk = vec![0u8; len as usize];
            file.seek(SeekFrom::Start(offset)).await?;
            file.read_exact(&mut chunk).await?;

            let content_range = format!("bytes {}-{}/{}", offset, offset + len - 1, media.size);
            debug!("sending {} of {}", content_range, metadata.name);

            let sent = self
                .http
                .put(&session_url)
                .header(CONTENT_LENGTH, len.to_string())
                .header(CONTENT_RANGE, &content_range)
                .body(chunk)
                .send()
                .await;

            let response = match sent {
                Ok(response) => response,
                Err(e) => {
                    warn!("chunk {} of {} interrupted: {}", content_range, metadata.name, e);
                    match self.session_state(&session_url, media.size).await {
                        Ok(SessionState::Complete(id)) => return Ok(id),
                        Ok(SessionState::Incomplete(acked)) if resumed_at != Some(acked) => {
                            info!("resuming {} at byte {}", metadata.name, acked);
                            resumed_at = Some(acked);
                            offset = acked;
                            continue;
                        }
                        _ => return Err(DriveError::HttpError(e)),
                    }
                }
            };

            match parse_session_response(response).await? {
                SessionState::Complete(id) => return Ok(id),
                SessionState::Incomplete(acked) if acked > offset => offset = acked,
                SessionState::Incomplete(_) => {
                    return Err(DriveError::ApiError {
                        status: StatusCode::PERMANENT_REDIRECT.as_u16(),
                        message: format!("upload session stalled at byte {}", offset),
                    })
                }
            }
        }
    }

    /// Ask an upload session how many bytes it has stored.
    async fn session_state(&self, session_url: &str, size: u64) -> Result<SessionState> {
        let response = self
            .http
            .put(session_url)
            .header(CONTENT_LENGTH, "0")
            .header(CONTENT_RANGE, format!("bytes */{}", size))
            .send()
            .await?;
        parse_session_response(response).await
    }
}

/// Interpret a response from an upload session URL.
///
/// `308 Resume Incomplete` carries the stored byte range; success carries the
/// created object.
async fn parse_session_response(response: Response) -> Result<SessionState> {
    if response.status() == StatusCode::PERMANENT_REDIRECT {
        let range = response.headers().get(RANGE).and_then(|v| v.to_str().ok());
        return Ok(SessionState::Incomplete(acknowledged_offset(range)));
    }

    let created: CreatedFile = check_response(response).await?.json().await?;
    Ok(SessionState::Complete(created.id))
}

/// Next byte to send given a `Range: bytes=0-<last>` header.
///
/// A missing or unparsable header means nothing was stored yet.
pub fn acknowledged_offset(range: Option<&str>) -> u64 {
    range
        .and_then(|r| r.strip_prefix("bytes="))
        .and_then(|r| r.split('-').nth(1))
        .and_then(|last| last.trim().parse::<u64>().ok())
        .map(|last| last + 1)
        .unwrap_or(0)
}

/// Escape a value for use inside a quoted Drive query string.
fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Turn a non-success response into [`DriveError::ApiError`].
async fn check_response(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let error_body = response.text().await.unwrap_or_default();
    if let Ok(api_error) = serde_json::from_str::<ApiErrorResponse>(&error_body) {
        return Err(DriveError::ApiError {
            status: api_error.error.code,
            message: api_error.error.message,
        });
    }

    Err(DriveError::ApiError {
        status: status.as_u16(),
        message: error_body,
    })
}
