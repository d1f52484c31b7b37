//! Page-facing socket server
//!
//! Each connection is one page message channel. Requests are dispatched as
//! they arrive and replies are written back in completion order. When the
//! connection closes, every ceremony it started is closed with it.

use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use gnubby_core::{ErrorCode, WebReply, ENROLL_WEB_REQUEST, ERROR_WEB_REPLY, SIGN_WEB_REQUEST};

use crate::error::{DaemonError, Result};
use crate::requests::{handle_enroll_request, handle_sign_request, RequestContext, RequestHandle};
use crate::responder::Responder;

use super::types::PageMessage;

/// Page-facing IPC server
pub struct IpcServer {
    socket_path: PathBuf,
    context: RequestContext,
}

impl IpcServer {
    pub fn new(socket_path: PathBuf, context: RequestContext) -> Self {
        Self {
            socket_path,
            context,
        }
    }

    /// Serve until the process exits
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Serve until `shutdown` resolves, then remove the socket
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = bind_page_socket(&self.socket_path).await?;
        info!("IPC server listening on {:?}", self.socket_path);

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        let context = self.context.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, context).await {
                                error!("Connection error: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Accept error: {}", e);
                    }
                },
            }
        }

        drop(listener);
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }
        Ok(())
    }
}

/// Bind the page socket, replacing one left behind by a dead daemon
///
/// A socket that still accepts connections belongs to a running daemon and
/// is left alone.
async fn bind_page_socket(path: &Path) -> Result<UnixListener> {
    if path.exists() {
        if UnixStream::connect(path).await.is_ok() {
            return Err(DaemonError::Ipc(format!("Another daemon is serving {:?}", path)));
        }
        debug!("Removing stale socket {:?}", path);
        std::fs::remove_file(path)?;
    }

    UnixListener::bind(path)
        .map_err(|e| DaemonError::Ipc(format!("Failed to bind {:?}: {}", path, e)))
}

/// Serve one page connection until it closes
pub async fn handle_connection<S>(stream: S, context: RequestContext) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut lines = BufReader::new(reader).lines();
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel();
    let mut handles: Vec<RequestHandle> = Vec::new();

    let result = loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    handles.retain(|handle| !handle.is_finished());
                    if let Some(handle) = dispatch(&context, &line, Responder::new(reply_tx.clone())) {
                        handles.push(handle);
                    }
                }
                Ok(None) => break flush_ready(&mut writer, &mut reply_rx).await,
                Err(e) => break Err(e.into()),
            },
            Some(reply) = reply_rx.recv() => {
                if let Err(e) = send_reply(&mut writer, &reply).await {
                    break Err(e);
                }
            }
        }
    };

    if !handles.is_empty() {
        debug!("Page channel closed with {} requests outstanding", handles.len());
    }
    for mut handle in handles {
        handle.close();
    }
    result
}

/// Route one inbound line to its entry point
fn dispatch(context: &RequestContext, line: &str, mut responder: Responder) -> Option<RequestHandle> {
    let message: PageMessage = match serde_json::from_str(line) {
        Ok(message) => message,
        Err(e) => {
            warn!("Unparseable page message: {}", e);
            responder.send(WebReply::error(ERROR_WEB_REPLY, ErrorCode::BadRequest, None));
            return None;
        }
    };

    let request_type = message.request_type().map(str::to_owned);
    let PageMessage { sender, request } = message;
    match request_type.as_deref() {
        Some(ENROLL_WEB_REQUEST) => handle_enroll_request(context, &sender, request, responder),
        Some(SIGN_WEB_REQUEST) => handle_sign_request(context, &sender, request, responder),
        other => {
            warn!("Unknown page request type {:?} from {}", other, sender.url);
            responder.send(WebReply::error(ERROR_WEB_REPLY, ErrorCode::BadRequest, None));
            None
        }
    }
}

/// Write replies that finished before the page stopped sending
async fn flush_ready<W>(
    writer: &mut W,
    replies: &mut mpsc::UnboundedReceiver<WebReply>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Ok(reply) = replies.try_recv() {
        send_reply(writer, &reply).await?;
    }
    Ok(())
}

/// Write one reply line
async fn send_reply<W>(writer: &mut W, reply: &WebReply) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let json = serde_json::to_string(reply)?;
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}
