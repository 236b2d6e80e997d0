//! Daemon mode: owns the cover service and serves IPC commands.

pub mod handler;

use crate::config::Config;
use crate::error::{Result, VoicoverError};
use crate::ipc::server::IpcServer;
use crate::models::ModelRegistry;
use crate::service::{Capabilities, CoverService};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Notify;

/// Run the daemon: load the model index, start the worker and the IPC
/// server, wait for a signal or a shutdown command.
///
/// Queued jobs are abandoned on shutdown and every voice session is
/// released before returning.
pub async fn run_daemon(config: Config, socket_path: Option<PathBuf>) -> Result<()> {
    let models = ModelRegistry::load(&config.models)?;
    tracing::info!(
        index = %config.models.index_path().display(),
        models = models.len(),
        "model index loaded"
    );

    let caps = Capabilities::from_config(&config);
    let service = Arc::new(CoverService::start(&config, models, caps)?);

    let socket_path = socket_path.unwrap_or_else(IpcServer::default_socket_path);
    let server = Arc::new(IpcServer::new(socket_path)?);
    tracing::info!(socket = %server.socket_path().display(), "daemon ready");

    let shutdown = Arc::new(Notify::new());
    let handler = handler::DaemonCommandHandler::new(Arc::clone(&service), Arc::clone(&shutdown));

    let server_clone = Arc::clone(&server);
    let server_handle = tokio::spawn(async move { server_clone.start(handler).await });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received SIGINT, shutting down");
        }
        res = wait_for_sigterm() => {
            if let Err(e) = res {
                tracing::error!("error setting up signal handler: {}", e);
            }
            tracing::info!("received SIGTERM, shutting down");
        }
        _ = shutdown.notified() => {
            tracing::info!("shutdown requested over IPC");
        }
    }

    server.stop().await?;
    match server_handle.await {
        Ok(Err(e)) => tracing::error!("ipc server failed: {}", e),
        Err(e) => tracing::error!("ipc server task failed: {}", e),
        Ok(Ok(())) => {}
    }

    service.shutdown().await;
    tracing::info!("daemon stopped");
    Ok(())
}

/// Wait for SIGTERM signal (used by systemd).
#[cfg(unix)]
async fn wait_for_sigterm() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| VoicoverError::Other(format!("Failed to register SIGTERM handler: {}", e)))?;
    sigterm.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_sigterm() -> Result<()> {
    std::future::pending::<()>().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::client::send_command;
    use crate::ipc::protocol::{Command, Response};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_daemon_stops_on_shutdown_command() {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = temp_dir.path().join("daemon.sock");

        let mut config = Config::default();
        config.models.dir = temp_dir.path().join("models");
        config.output.dir = temp_dir.path().join("out");

        let daemon = tokio::spawn(run_daemon(config, Some(socket_path.clone())));
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        let response = send_command(&socket_path, Command::QueueDepth)
            .await
            .unwrap();
        assert_eq!(response, Response::QueueDepth { depth: 0 });

        let response = send_command(&socket_path, Command::Shutdown).await.unwrap();
        assert_eq!(response, Response::Ok);

        let result = tokio::time::timeout(tokio::time::Duration::from_secs(2), daemon)
            .await
            .expect("daemon should stop")
            .unwrap();
        assert!(result.is_ok());
        assert!(!socket_path.exists());
    }
}
