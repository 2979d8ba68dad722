//! End-to-end run: authenticate, upload, open
//!
//! After a first-run authorization the upload continues in the same process
//! unless `resume_after_authorization` is off, in which case the run stops
//! once the token is stored and the tool has to be started again.

use crate::Result;
use crate::auth::{ApplicationSecret, Authenticator, SessionSource, TokenExchanger};
use crate::config::Config;
use crate::error::Error;
use crate::opener::Opener;
use crate::storage::StorageService;
use crate::transfer::{ReportFn, Transfer, TransferTask};

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The file was uploaded and its link opened
    Uploaded { link: String, source: SessionSource },
    /// A token was obtained and stored; nothing was uploaded
    AuthorizedOnly,
}

/// Wires the authenticator and the transfer together
pub struct App<'a> {
    config: &'a Config,
    secret: &'a ApplicationSecret,
    storage: &'a dyn StorageService,
    opener: &'a dyn Opener,
    exchanger: &'a dyn TokenExchanger,
}

impl<'a> App<'a> {
    pub fn new(
        config: &'a Config,
        secret: &'a ApplicationSecret,
        storage: &'a dyn StorageService,
        opener: &'a dyn Opener,
        exchanger: &'a dyn TokenExchanger,
    ) -> Self {
        Self {
            config,
            secret,
            storage,
            opener,
            exchanger,
        }
    }

    pub async fn run(&self, task: &TransferTask, report: &mut ReportFn<'_>) -> Result<Outcome> {
        let auth = Authenticator::new(self.config, self.secret, self.opener, self.exchanger);
        let resolved = auth.session().await?;

        if resolved.source == SessionSource::Authorized && !self.config.resume_after_authorization {
            tracing::info!("Credential stored, run again to upload {:?}", task.local_path);
            return Ok(Outcome::AuthorizedOnly);
        }

        let transfer = Transfer::new(self.config, self.storage, self.opener);
        let session = resolved.session;

        let link = match transfer.run(&session, task, &mut *report).await {
            Err(Error::Unauthorized(reason)) if session.token().can_refresh() => {
                tracing::warn!("Cached token rejected: {}", reason);
                let session = auth.refresh(&session).await?;
                transfer.run(&session, task, report).await?
            }
            result => result?,
        };

        Ok(Outcome::Uploaded {
            link,
            source: resolved.source,
        })
    }
}
