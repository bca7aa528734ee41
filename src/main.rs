use clap::Parser;
use socketchat::chat::ChatServer;
use socketchat::cli::Cli;
use socketchat::config::ServerConfig;
use socketchat::error::Result;
use socketchat::log_error;
use socketchat::logging::LoggingConfig;

#[tokio::main]
async fn main() {
    // Parse CLI arguments first to get logging configuration
    let cli = Cli::parse();

    let log_config =
        LoggingConfig::from_args(cli.quiet, cli.verbose, cli.json).with_file_output(cli.log_file.clone());
    if let Err(e) = socketchat::logging::init_logging(log_config) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(cli).await {
        log_error!(e, "socketchat");
        let error_response = e.to_error_response();
        match serde_json::to_string_pretty(&error_response) {
            Ok(json) => eprintln!("{}", json),
            Err(_) => eprintln!("{}", e),
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = ServerConfig::from_env()?.with_overrides(cli.host, cli.port, cli.max_frame_bytes)?;
    let server = ChatServer::bind(&config).await?;

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "Failed to listen for Ctrl-C, running until killed");
                std::future::pending::<()>().await;
            }
        })
        .await
}
