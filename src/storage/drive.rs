//! Google Drive (v2 REST API) storage service

use async_trait::async_trait;
use reqwest::header::{CONTENT_RANGE, LOCATION, RANGE};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::io::SeekFrom;
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use crate::Result;
use crate::auth::Session;
use crate::error::Error;
use super::{ProgressFn, RemoteFile, StorageService, UploadMetadata};

const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v2";
const UPLOAD_API_BASE: &str = "https://www.googleapis.com/upload/drive/v2";
const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Resumable uploads must be sent in multiples of 256 KiB
const CHUNK_GRANULARITY: usize = 256 * 1024;

/// 308 responses in a row that did not move the offset
const MAX_STALLED_CHUNKS: u32 = 3;

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    items: Vec<RemoteFile>,
}

/// Google Drive implementation of [`StorageService`]
#[derive(Debug, Clone)]
pub struct DriveService {
    chunk_size: usize,
}

impl DriveService {
    pub fn new(chunk_size: usize) -> Self {
        let chunk_size = (chunk_size / CHUNK_GRANULARITY).max(1) * CHUNK_GRANULARITY;
        Self { chunk_size }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

#[async_trait]
impl StorageService for DriveService {
    async fn find_folder(&self, session: &Session, name: &str) -> Result<Option<String>> {
        let query = folder_query(name);
        let request = session.http()
            .get(format!("{}/files", DRIVE_API_BASE))
            .query(&[("q", query.as_str()), ("maxResults", "1")]);

        let response = check(session.authorize(request).send().await?, "Folder lookup").await?;
        let list: FileList = response.json().await?;

        Ok(list.items.into_iter().next().map(|f| f.id))
    }

    async fn create_folder(&self, session: &Session, name: &str, description: &str) -> Result<String> {
        let body = json!({
            "title": name,
            "description": description,
            "mimeType": FOLDER_MIME_TYPE,
        });
        let request = session.http()
            .post(format!("{}/files", DRIVE_API_BASE))
            .json(&body);

        let response = check(session.authorize(request).send().await?, "Folder creation").await?;
        let folder: RemoteFile = response.json().await?;
        Ok(folder.id)
    }

    async fn upload_resumable(
        &self,
        session: &Session,
        metadata: &UploadMetadata,
        path: &Path,
        progress: &mut ProgressFn<'_>,
    ) -> Result<RemoteFile> {
        let total = tokio::fs::metadata(path).await?.len();
        let location = self.start_session(session, metadata, total).await?;
        tracing::debug!("Resumable upload session opened for {} bytes", total);

        let mut file = tokio::fs::File::open(path).await?;
        let mut offset = 0u64;
        let mut stalled = 0;

        loop {
            let len = (self.chunk_size as u64).min(total - offset);
            file.seek(SeekFrom::Start(offset)).await?;
            let mut chunk = Vec::with_capacity(len as usize);
            (&mut file).take(len).read_to_end(&mut chunk).await?;
            if (chunk.len() as u64) < len {
                return Err(Error::Storage(format!("{:?} shrank during upload", path)));
            }

            let request = session.http()
                .put(&location)
                .header(CONTENT_RANGE, content_range(offset, len, total))
                .body(chunk);
            let response = session.authorize(request).send().await?;

            match response.status() {
                status if status.is_success() => {
                    progress(total, total);
                    return Ok(response.json().await?);
                }
                status if status == StatusCode::PERMANENT_REDIRECT => {
                    let range = response.headers().get(RANGE).and_then(|v| v.to_str().ok());
                    let acknowledged = acknowledged_offset(range, total)?;

                    stalled = if acknowledged > offset { 0 } else { stalled + 1 };
                    if stalled >= MAX_STALLED_CHUNKS {
                        return Err(Error::Storage(format!("Upload stalled at byte {}", offset)));
                    }
                    offset = acknowledged;
                    progress(offset, total);
                }
                _ => return Err(status_error(response, "Upload").await),
            }
        }
    }
}

impl DriveService {
    /// Open a resumable upload session and return its URI
    async fn start_session(&self, session: &Session, metadata: &UploadMetadata, total: u64) -> Result<String> {
        let request = session.http()
            .post(format!("{}/files", UPLOAD_API_BASE))
            .query(&[("uploadType", "resumable")])
            .header("X-Upload-Content-Type", &metadata.mime_type)
            .header("X-Upload-Content-Length", total.to_string())
            .json(&file_resource(metadata));

        let response = check(session.authorize(request).send().await?, "Upload session").await?;
        response.headers().get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| Error::Storage("Upload session response has no Location header".to_string()))
    }
}

/// Drive v2 file resource for the upload
fn file_resource(metadata: &UploadMetadata) -> serde_json::Value {
    let mut resource = json!({
        "title": metadata.title,
        "mimeType": metadata.mime_type,
    });
    if !metadata.description.is_empty() {
        resource["description"] = json!(metadata.description);
    }
    if let Some(parent) = &metadata.parent_id {
        resource["parents"] = json!([{ "id": parent }]);
    }
    resource
}

fn folder_query(name: &str) -> String {
    let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
    format!("title=\"{}\" and mimeType=\"{}\"", escaped, FOLDER_MIME_TYPE)
}

fn content_range(offset: u64, len: u64, total: u64) -> String {
    if len == 0 {
        return format!("bytes */{}", total);
    }
    format!("bytes {}-{}/{}", offset, offset + len - 1, total)
}

/// Offset to continue from, given a `Range: bytes=0-N` acknowledgement
fn next_offset(range: &str) -> Option<u64> {
    let last = range.strip_prefix("bytes=")?.split_once('-')?.1;
    last.trim().parse::<u64>().ok().map(|n| n + 1)
}

/// Offset confirmed by a 308 answer; no `Range` header means nothing stored yet
fn acknowledged_offset(range: Option<&str>, total: u64) -> Result<u64> {
    let acknowledged = range.and_then(next_offset).unwrap_or(0);
    if acknowledged > total {
        return Err(Error::Storage(format!(
            "Server acknowledged {} bytes of a {} byte upload",
            acknowledged, total
        )));
    }
    Ok(acknowledged)
}

async fn check(response: Response, what: &str) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    Err(status_error(response, what).await)
}

async fn status_error(response: Response, what: &str) -> Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::UNAUTHORIZED {
        return Error::Unauthorized(body);
    }
    Error::Storage(format!("{} failed ({}): {}", what, status, body))
}
