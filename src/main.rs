//! qrlogin CLI binary entry point.

use clap::Parser;
use qrlogin::cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    qrlogin::cli::login::init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Login(args) => qrlogin::cli::login::handle_login(args).await,
        Commands::Apps => {
            qrlogin::cli::login::handle_apps();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
