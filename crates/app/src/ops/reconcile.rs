use clap::Args;

use common::prelude::VaultError;

use crate::state::{Runtime, StateError};

/// Recount vault and shard counters from the file records.
#[derive(Args, Debug, Clone)]
pub struct Reconcile;

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Vault(#[from] VaultError),
}

#[async_trait::async_trait]
impl crate::op::Op for Reconcile {
    type Error = ReconcileError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let runtime = Runtime::open(ctx.config_path.clone()).await?;
        let report = runtime.client.reconcile().await?;
        runtime.persist()?;

        if !report.changed() {
            return Ok(format!(
                "Vault consistent: {} files, {} bytes",
                report.file_count, report.total_storage
            ));
        }
        Ok(format!(
            "Vault repaired\n\
             - Files: {} -> {}\n\
             - Storage: {} -> {} bytes\n\
             - Shards repaired: {}",
            report.previous_file_count,
            report.file_count,
            report.previous_total_storage,
            report.total_storage,
            report.shards_repaired
        ))
    }
}
