//! Upload orchestration
//!
//! Turns the dropped file into a [`TransferTask`], makes sure the destination
//! folder exists, uploads and finally opens the shareable link.

use std::path::{Path, PathBuf};
use crate::Result;
use crate::auth::Session;
use crate::config::Config;
use crate::error::Error;
use crate::opener::Opener;
use crate::storage::{RemoteFile, StorageService, TransferRate, UploadMetadata};

/// Content type used when the extension says nothing
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Upload progress listener: bytes sent, total bytes, formatted rate
pub type ReportFn<'a> = dyn FnMut(u64, u64, &str) + Send + 'a;

/// Everything known about the upload before it starts
#[derive(Debug, Clone, PartialEq)]
pub struct TransferTask {
    pub local_path: PathBuf,
    pub display_title: String,
    pub mime_type: String,
    pub destination_folder: String,
}

impl TransferTask {
    pub fn new(local_path: PathBuf, title_override: Option<String>, destination_folder: &str) -> Result<Self> {
        let display_title = match title_override.filter(|t| !t.trim().is_empty()) {
            Some(title) => title,
            None => base_name(&local_path)?,
        };
        let mime_type = mime_type_for(&local_path);

        Ok(Self {
            local_path,
            display_title,
            mime_type,
            destination_folder: destination_folder.to_string(),
        })
    }
}

fn base_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| Error::Other(format!("{:?} does not name a file", path)))
}

/// Top-level types taken from the extension table; the rest (`chemical/*`,
/// `x-conference/*`, ...) are treated as unknown
const COMMON_TOP_LEVEL_TYPES: &[&str] = &["application", "audio", "font", "image", "text", "video"];

/// Content type by extension, falling back to [`DEFAULT_MIME_TYPE`]
pub fn mime_type_for(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(|ext| mime_guess::from_ext(ext).first())
        .filter(|mime| COMMON_TOP_LEVEL_TYPES.contains(&mime.type_().as_str()))
        .map(|mime| mime.essence_str().to_string())
        .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string())
}

/// Runs one upload against a storage service
pub struct Transfer<'a> {
    storage: &'a dyn StorageService,
    opener: &'a dyn Opener,
    folder_description: String,
}

impl<'a> Transfer<'a> {
    pub fn new(config: &Config, storage: &'a dyn StorageService, opener: &'a dyn Opener) -> Self {
        Self {
            storage,
            opener,
            folder_description: config.folder_description.clone(),
        }
    }

    /// Id of the destination folder, creating it when missing
    ///
    /// A failed lookup is fatal. A failed creation is only logged and
    /// yields `None`, so the file lands at the root instead.
    pub async fn resolve_folder(&self, session: &Session, name: &str) -> Result<Option<String>> {
        if name.is_empty() {
            return Ok(None);
        }

        if let Some(id) = self.storage.find_folder(session, name).await? {
            tracing::debug!("Found folder {} ({})", name, id);
            return Ok(Some(id));
        }

        tracing::info!("Folder not found. Create new folder : {}", name);
        match self.storage.create_folder(session, name, &self.folder_description).await {
            Ok(id) => Ok(Some(id)),
            Err(Error::Unauthorized(reason)) => Err(Error::Unauthorized(reason)),
            Err(e) => {
                tracing::error!("An error occurred when create folder: {}", e);
                Ok(None)
            }
        }
    }

    /// Resolve the folder and upload the file into it
    pub async fn upload(
        &self,
        session: &Session,
        task: &TransferTask,
        report: &mut ReportFn<'_>,
    ) -> Result<RemoteFile> {
        let parent_id = self.resolve_folder(session, &task.destination_folder).await?;
        let metadata = UploadMetadata {
            title: task.display_title.clone(),
            description: String::new(),
            mime_type: task.mime_type.clone(),
            parent_id,
        };

        let rate = TransferRate::start();
        let mut progress = |sent: u64, total: u64| {
            let current = rate.rate(sent);
            tracing::info!("Uploaded at {}", current);
            report(sent, total, &current);
        };

        self.storage.upload_resumable(session, &metadata, &task.local_path, &mut progress).await
    }

    /// Upload, then open the shareable link; returns the link
    pub async fn run(
        &self,
        session: &Session,
        task: &TransferTask,
        report: &mut ReportFn<'_>,
    ) -> Result<String> {
        let file = self.upload(session, task, report).await?;
        let link = file.shareable_link()
            .ok_or_else(|| Error::Storage(format!("Uploaded file {} has no shareable link", file.id)))?
            .to_string();

        tracing::info!("Document Link is {}", link);
        self.opener.open(&link)?;
        Ok(link)
    }
}
