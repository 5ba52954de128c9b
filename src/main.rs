//! droidscope - inspect and drive Android UI hierarchies
//!
//! This is the binary entry point. All logic lives in the library.

use clap::Parser;
use droidscope::Cli;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    let log_file = droidscope_core::logging::init()?;
    tracing::info!("droidscope {}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = droidscope::run(cli).await {
        if e.is_fatal() {
            eprintln!("Error: {e}");
            std::process::exit(droidscope::exit_code(&e));
        }
        eprintln!("Details logged to {}", log_file.display());
        return Err(e.into());
    }
    Ok(())
}
