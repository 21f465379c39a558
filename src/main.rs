use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use kubectl_unmount::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    // Install the TLS crypto provider before any TLS operations
    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
        && rustls::crypto::CryptoProvider::get_default().is_none()
    {
        eprintln!("Error: failed to install rustls crypto provider");
        return ExitCode::FAILURE;
    }

    // Diagnostics go to stderr; stdout is reserved for target identifiers
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("kubectl_unmount=warn,kube=warn")
            }),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match cli.run().await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Unmount failed: {:?}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
