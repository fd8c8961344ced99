use anyhow::{Context, Result};
use lib_common::{LoggerLocal, LoggerLocalOptions};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

mod enc_logic;
use enc_logic::{config, listener, state};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let settings = config::load_config().context("Invalid configuration")?;

    let logger_options = LoggerLocalOptions {
        use_tty: true,
        use_file: settings.log_to_file,
        log_dir: Some(settings.log_dir.clone()),
        level: settings.log_level.clone(),
    };
    // Held until main returns so buffered file lines are flushed.
    let _log_guard = LoggerLocal::new(config::APP_NAME, Some(logger_options))?.init()?;

    let addr = format!("{}:{}", settings.bind_address, settings.port);
    let tcp_listener = match TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Listen error. {}: {}", addr, e);
            return Err(e).with_context(|| format!("Could not listen on {addr}"));
        }
    };

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
    let app_state = state::AppState::new(settings.request_timeout);

    let mut server_handle = tokio::spawn(listener::run(
        tcp_listener,
        app_state,
        settings.serve_mode,
        shutdown_tx.subscribe(),
    ));

    // Wait for the listener to finish on its own or for a shutdown signal
    tokio::select! {
        finished = &mut server_handle => {
            finished.context("Listener task failed")??;
            info!("Listener finished.");
            return Ok(());
        }
        _ = signal::ctrl_c() => {
            info!("Ctrl-C received, initiating shutdown.");
        }
        _ = async {
            #[cfg(unix)]
            {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut term_signal) => {
                        term_signal.recv().await;
                        info!("SIGTERM received, initiating shutdown.");
                    }
                    Err(e) => {
                        error!("Could not install SIGTERM handler: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {}
    }

    let _ = shutdown_tx.send(());
    server_handle.await.context("Listener task failed")??;

    info!("Shutdown complete.");
    Ok(())
}
