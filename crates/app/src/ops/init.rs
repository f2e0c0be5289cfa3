use clap::Args;

use crate::state::{AppConfig, AppState, Runtime, StateError};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Number of local directory providers to replicate across
    #[arg(long, default_value_t = 1)]
    pub providers: usize,

    /// Directory for daily rolling log files
    #[arg(long)]
    pub log_dir: Option<std::path::PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] StateError),
}

#[async_trait::async_trait]
impl crate::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let dir = AppState::dir(ctx.config_path.clone())?;
        let mut config = AppConfig::with_local_providers(&dir, self.providers);
        config.log_dir = self.log_dir.clone();

        let state = AppState::init(Some(dir), Some(config))?;
        let runtime = Runtime::from_state(state).await?;
        let vault = runtime
            .client
            .initialize()
            .await
            .map_err(StateError::from)?;
        runtime.persist()?;

        let state = &runtime.state;
        let providers = state
            .config
            .providers
            .iter()
            .map(|p| format!("   {} (priority {})", p.name, p.priority))
            .collect::<Vec<_>>()
            .join("\n");

        Ok(format!(
            "Initialized vaultline directory at: {}\n\
             - Identity: {}\n\
             - Key: {}\n\
             - Config: {}\n\
             - Ledger: {}\n\
             - Master key commitment: {}\n\
             - Redundancy: {}\n\
             - Providers:\n{}",
            state.dir.display(),
            runtime.client.owner(),
            state.key_path.display(),
            state.config_path.display(),
            state.ledger_path.display(),
            vault.master_key_commitment.short(),
            state.config.storage.redundancy,
            providers
        ))
    }
}
