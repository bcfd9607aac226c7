use std::sync::Arc;

use clap::Parser;
use log::{error, info};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use timeshift::clock::{format_instant, ReferenceClock};
use timeshift::config::{parse_config, Args};
use timeshift::error::TimeshiftError;
use timeshift::server::{get_router, ServerState};

// Runs the axum server until the oneshot Receiver fires (i.e. user hit
// ctrl+c)
async fn run_server(
    state: Arc<ServerState>,
    server_shutdown_rx: oneshot::Receiver<()>,
) -> Result<(), TimeshiftError> {
    let addr = state.config.socket_addr();
    let listener = TcpListener::bind(&addr).await?;
    let app = get_router(state);

    info!("listening on {addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(server_shutdown_signal(server_shutdown_rx))
        .await?;
    Ok(())
}

async fn server_shutdown_signal(server_shutdown_rx: oneshot::Receiver<()>) {
    if server_shutdown_rx.await.is_err() {
        error!("shutdown sender dropped, exiting...");
        return;
    }
    info!("Server received shutdown signal, exiting...");
}

#[tokio::main]
async fn main() -> Result<(), TimeshiftError> {
    env_logger::init();

    let args = Args::parse();
    let config = args.apply(parse_config(&args.config_path).await?);

    let reference_clock = match config.start_date()? {
        Some(start_date) => ReferenceClock::new(start_date),
        None => ReferenceClock::default(),
    };
    info!(
        "initial start date: {}",
        format_instant(&reference_clock.get())
    );

    let (server_shutdown_tx, server_shutdown_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("Unable to listen for shutdown signal: {err}");
        }
        let _ = server_shutdown_tx.send(());
    });

    let state = Arc::new(ServerState::new(config, reference_clock));
    run_server(state, server_shutdown_rx).await?;

    info!("see you later...");
    Ok(())
}
