use clap::Args;

use common::prelude::VaultError;

use crate::state::{Runtime, StateError};

#[derive(Args, Debug, Clone)]
pub struct Ls;

#[derive(Debug, thiserror::Error)]
pub enum LsError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Vault(#[from] VaultError),
}

#[async_trait::async_trait]
impl crate::op::Op for Ls {
    type Error = LsError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let runtime = Runtime::open(ctx.config_path.clone()).await?;
        let files = runtime.client.list_files().await?;

        if files.is_empty() {
            return Ok("No files found".to_string());
        }
        let output = files
            .iter()
            .map(|f| {
                let created = chrono::DateTime::from_timestamp(f.created_at, 0)
                    .map(|ts| ts.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                format!(
                    "{}  {:<9}  {:>12}  {:?}  shares: {}  reads: {}  {}",
                    f.file_id,
                    f.security_level.to_string(),
                    f.file_size,
                    f.status,
                    f.delegation_count,
                    f.access_count,
                    created
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        Ok(output)
    }
}
