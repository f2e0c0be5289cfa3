mod args;
mod logging;
mod op;
mod ops;
mod state;

use args::Args;
use clap::{Parser, Subcommand};
use op::Op;
use ops::{Download, Init, Ls, Reconcile, Revoke, Share, Upload, Version};
use state::{AppConfig, AppState};

command_enum! {
    (Init, Init),
    (Upload, Upload),
    (Download, Download),
    (Share, Share),
    (Revoke, Revoke),
    (Ls, Ls),
    (Reconcile, Reconcile),
    (Version, Version),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Logging settings come from the state directory when it exists
    let config = AppState::load(args.config_path.clone())
        .map(|state| state.config)
        .unwrap_or_else(|_| AppConfig::default());
    let guards = logging::init_logging(&config);

    let ctx = op::OpContext::new(args.config_path);

    let code = match args.command.execute(&ctx).await {
        Ok(output) => {
            println!("{}", output);
            0
        }
        Err(e) => {
            tracing::debug!(error = ?e, "command failed");
            eprintln!("Error: {}", e);
            1
        }
    };

    // Flush the non-blocking writers before exiting
    drop(guards);
    std::process::exit(code);
}
