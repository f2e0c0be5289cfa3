use std::path::PathBuf;

use clap::Args;
use uuid::Uuid;

use common::crypto::PublicKey;
use common::prelude::VaultError;

use crate::state::{Runtime, StateError};

#[derive(Args, Debug, Clone)]
pub struct Download {
    pub file_id: Uuid,

    /// Where to write the plaintext
    pub out: PathBuf,

    /// Owner of a file shared with this identity
    #[arg(long, value_parser = super::parse_public_key)]
    pub owner: Option<PublicKey>,
}

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Vault(#[from] VaultError),
    #[error("failed to write {0}: {1}")]
    Write(PathBuf, std::io::Error),
}

#[async_trait::async_trait]
impl crate::op::Op for Download {
    type Error = DownloadError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let runtime = Runtime::open(ctx.config_path.clone()).await?;
        let me = runtime.client.owner();

        let result = match &self.owner {
            Some(owner) if *owner != me => {
                runtime
                    .client
                    .open_shared(owner, &self.file_id, None)
                    .await
            }
            _ => runtime.client.download(&self.file_id).await,
        };
        // Access counters changed on the ledger
        runtime.persist()?;
        let plaintext = result?;

        tokio::fs::write(&self.out, &plaintext)
            .await
            .map_err(|e| DownloadError::Write(self.out.clone(), e))?;
        Ok(format!(
            "Wrote {} bytes to {}",
            plaintext.len(),
            self.out.display()
        ))
    }
}
