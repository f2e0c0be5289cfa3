pub use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "vaultline")]
#[command(about = "Split-ciphertext file vault with ledger-anchored sharing")]
pub struct Args {
    /// Path to the vaultline state directory (defaults to ~/.vaultline)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: crate::Command,
}
