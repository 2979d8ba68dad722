//! Remote storage
//!
//! The upload target is reached through the [`StorageService`] trait so the
//! transfer logic does not depend on a particular provider. [`DriveService`]
//! implements it for Google Drive.

mod drive;
pub mod progress;

pub use drive::DriveService;
pub use progress::{format_rate, format_size, TransferRate};

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use crate::Result;
use crate::auth::Session;

/// Metadata of the file being created remotely
#[derive(Debug, Clone, PartialEq)]
pub struct UploadMetadata {
    pub title: String,
    pub description: String,
    pub mime_type: String,
    /// Folder to place the file in; `None` uploads to the root
    pub parent_id: Option<String>,
}

/// File created by an upload
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub embed_link: Option<String>,
    #[serde(default)]
    pub alternate_link: Option<String>,
}

impl RemoteFile {
    /// Link that renders the file in a browser
    pub fn shareable_link(&self) -> Option<&str> {
        self.embed_link.as_deref()
            .or(self.alternate_link.as_deref())
            .filter(|link| !link.is_empty())
    }
}

/// Progress callback: bytes sent so far, total bytes
pub type ProgressFn<'a> = dyn FnMut(u64, u64) + Send + 'a;

/// Operations the transfer needs from a storage provider
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Id of the folder with this exact name, if one exists
    async fn find_folder(&self, session: &Session, name: &str) -> Result<Option<String>>;

    /// Create a folder and return its id
    async fn create_folder(&self, session: &Session, name: &str, description: &str) -> Result<String>;

    /// Upload a local file in resumable chunks, reporting progress after each
    async fn upload_resumable(
        &self,
        session: &Session,
        metadata: &UploadMetadata,
        path: &Path,
        progress: &mut ProgressFn<'_>,
    ) -> Result<RemoteFile>;
}
