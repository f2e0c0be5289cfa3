use clap::Args;
use uuid::Uuid;

use common::crypto::PublicKey;
use common::prelude::VaultError;

use crate::state::{Runtime, StateError};

#[derive(Args, Debug, Clone)]
pub struct Revoke {
    pub file_id: Uuid,

    #[arg(value_parser = super::parse_public_key)]
    pub grantee: PublicKey,
}

#[derive(Debug, thiserror::Error)]
pub enum RevokeError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Vault(#[from] VaultError),
}

#[async_trait::async_trait]
impl crate::op::Op for Revoke {
    type Error = RevokeError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let runtime = Runtime::open(ctx.config_path.clone()).await?;
        let result = runtime.client.revoke(&self.file_id, &self.grantee).await;
        runtime.persist()?;
        let delegation = result?;

        Ok(format!(
            "Revoked {} access to {} after {} reads",
            delegation.grantee, self.file_id, delegation.access_count
        ))
    }
}
