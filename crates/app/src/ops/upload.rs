use std::path::PathBuf;

use clap::Args;

use common::prelude::{SecurityLevel, UploadOptions, VaultError};

use crate::state::{Runtime, StateError};

#[derive(Args, Debug, Clone)]
pub struct Upload {
    /// File to encrypt and store
    pub path: PathBuf,

    /// standard, sensitive or maximum
    #[arg(long, default_value = "standard")]
    pub level: SecurityLevel,

    /// Override the MIME type guessed from the file extension
    #[arg(long)]
    pub mime_type: Option<String>,

    /// Providers each artifact must reach (defaults to the configured redundancy)
    #[arg(long)]
    pub redundancy: Option<usize>,

    /// Skip the critical-bytes proof. Unproven files cannot be shared.
    #[arg(long)]
    pub no_proof: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Vault(#[from] VaultError),
    #[error("failed to read {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("{0} has no file name")]
    NoFileName(PathBuf),
}

#[async_trait::async_trait]
impl crate::op::Op for Upload {
    type Error = UploadError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let filename = self
            .path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| UploadError::NoFileName(self.path.clone()))?
            .to_string();
        let data = tokio::fs::read(&self.path)
            .await
            .map_err(|e| UploadError::Read(self.path.clone(), e))?;

        let runtime = Runtime::open(ctx.config_path.clone()).await?;
        let options = UploadOptions {
            mime_type: self.mime_type.clone(),
            redundancy: self.redundancy,
            skip_proof: self.no_proof,
        };
        let result = runtime
            .client
            .upload_with(&filename, &data, self.level, options)
            .await;
        // A retryable failure may still have committed, so persist either way
        runtime.persist()?;
        let record = result?;

        Ok(format!(
            "Uploaded {} as {}\n\
             - Level: {}\n\
             - Size: {} bytes ({} encrypted)\n\
             - Shard: {} slot {}\n\
             - Providers: {}\n\
             - Proof: {}",
            filename,
            record.file_id,
            record.security_level,
            record.file_size,
            record.encrypted_size,
            record.shard_index,
            record.slot,
            record.provider_count,
            if record.proof.is_some() { "yes" } else { "no" }
        ))
    }
}
