use clap::Args;
use uuid::Uuid;

use common::crypto::PublicKey;
use common::prelude::{Permission, VaultError};

use crate::state::{Runtime, StateError};

#[derive(Args, Debug, Clone)]
pub struct Share {
    pub file_id: Uuid,

    /// Hex-encoded identity key of the grantee
    #[arg(value_parser = super::parse_public_key)]
    pub grantee: PublicKey,

    /// view, download or reshare
    #[arg(long, default_value = "download")]
    pub permission: Permission,

    /// Seconds until the grant expires (never when omitted)
    #[arg(long)]
    pub expires_in: Option<u64>,

    /// Owner of the file when resharing someone else's grant
    #[arg(long, value_parser = super::parse_public_key)]
    pub owner: Option<PublicKey>,
}

#[derive(Debug, thiserror::Error)]
pub enum ShareError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Vault(#[from] VaultError),
}

#[async_trait::async_trait]
impl crate::op::Op for Share {
    type Error = ShareError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let runtime = Runtime::open(ctx.config_path.clone()).await?;
        let client = &runtime.client;
        let expires_at = self.expires_in.map(|secs| {
            client
                .registry()
                .now()
                .saturating_add(i64::try_from(secs).unwrap_or(i64::MAX))
        });

        let result = match &self.owner {
            Some(owner) if *owner != client.owner() => {
                client
                    .reshare(owner, &self.file_id, &self.grantee, self.permission, expires_at)
                    .await
            }
            _ => {
                client
                    .share(&self.file_id, &self.grantee, self.permission, expires_at)
                    .await
            }
        };
        runtime.persist()?;
        let delegation = result?;

        let expires = delegation
            .expires_at
            .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
            .map(|ts| ts.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());
        Ok(format!(
            "Shared {} with {}\n\
             - Permission: {:?}\n\
             - Expires: {}\n\
             - Payload: {}",
            self.file_id,
            delegation.grantee,
            delegation.permission,
            expires,
            delegation.payload.short()
        ))
    }
}
