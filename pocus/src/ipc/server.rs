//! Unix domain socket server for IPC
//!
//! The server never touches the app. Each decoded command is forwarded to
//! the event loop together with a reply channel, so all state changes stay
//! on the loop's task.

use anyhow::{Context, Result};
use pocus_ipc::{read_message, write_message, Command, IpcError, Response};
use std::path::{Path, PathBuf};
use tokio::io::BufReader;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

pub struct Request {
    pub command: Command,
    pub reply: oneshot::Sender<Response>,
}

pub fn bind(path: &Path) -> Result<UnixListener> {
    // Remove old socket if it exists
    let _ = std::fs::remove_file(path);
    let listener = UnixListener::bind(path)
        .with_context(|| format!("Failed to bind IPC socket at {:?}", path))?;
    info!("IPC server listening on {:?}", path);
    Ok(listener)
}

pub async fn serve(listener: UnixListener, requests: mpsc::Sender<Request>) {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let requests = requests.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, requests).await {
                        error!("Error handling client: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {}", e);
            }
        }
    }
}

async fn handle_client(stream: UnixStream, requests: mpsc::Sender<Request>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    // One response per command until the client hangs up.
    loop {
        let response = match read_message::<_, Command>(&mut reader).await {
            Ok(Some(command)) => {
                debug!(?command, "IPC command");
                dispatch(command, &requests).await
            }
            Ok(None) => return Ok(()),
            Err(IpcError::Serialization(e)) => Response::Error(format!("Malformed command: {}", e)),
            Err(e) => return Err(e.into()),
        };
        write_message(&mut writer, &response).await?;
    }
}

async fn dispatch(command: Command, requests: &mpsc::Sender<Request>) -> Response {
    let (reply, rx) = oneshot::channel();
    if requests.send(Request { command, reply }).await.is_err() {
        return Response::Error("pocus is shutting down".to_string());
    }
    rx.await
        .unwrap_or_else(|_| Response::Error("pocus is shutting down".to_string()))
}

/// Removes the socket file on drop.
pub struct SocketGuard(pub PathBuf);

impl Drop for SocketGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}
