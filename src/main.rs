use clap::Parser;
use site_auditor::cli::{self, Cli};
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    cli::setup_logging(args.verbose);

    info!("starting site-auditor v{}", env!("CARGO_PKG_VERSION"));

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
    let _shutdown_handler = setup_shutdown_handler(shutdown_tx.clone());

    let result = cli::run(args, shutdown_tx.subscribe())
        .await
        .map_err(anyhow::Error::from);

    if let Err(e) = result {
        error!("application error: {e}");
        std::process::exit(1);
    }

    info!("site-auditor stopped");
    Ok(())
}

fn setup_shutdown_handler(
    shutdown_tx: tokio::sync::broadcast::Sender<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())
            .expect("failed to create SIGINT handler");
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to create SIGTERM handler");

        tokio::select! {
            _ = sigint.recv() => {
                info!("received SIGINT");
            }
            _ = sigterm.recv() => {
                info!("received SIGTERM");
            }
        }

        let _ = shutdown_tx.send(());
    })
}

