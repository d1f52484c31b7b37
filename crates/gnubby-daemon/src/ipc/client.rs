//! Device helper reached over a socket

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::warn;

use gnubby_core::DeviceStatus;

use crate::error::{DaemonError, Result};
use crate::helper::{
    EnrollHelperReply, EnrollHelperRequest, Helper, HelperFactory, SignHelperReply,
    SignHelperRequest,
};

/// Creates helpers that talk to the helper socket
#[derive(Debug, Clone)]
pub struct SocketHelperFactory {
    socket_path: PathBuf,
}

impl SocketHelperFactory {
    pub fn new(socket_path: PathBuf) -> Self {
        Self { socket_path }
    }
}

impl HelperFactory for SocketHelperFactory {
    fn create_helper(&self) -> Box<dyn Helper> {
        Box::new(SocketHelper::new(self.socket_path.clone()))
    }
}

/// One request, one reply, one connection
///
/// Anything that goes wrong on the socket is reported to the ceremony as
/// GONE_STATUS.
#[derive(Debug)]
pub struct SocketHelper {
    socket_path: PathBuf,
    closed: bool,
}

impl SocketHelper {
    pub fn new(socket_path: PathBuf) -> Self {
        Self {
            socket_path,
            closed: false,
        }
    }

    async fn exchange<Req, Rep>(&self, request: &Req) -> Result<Rep>
    where
        Req: Serialize + Sync,
        Rep: DeserializeOwned,
    {
        if self.closed {
            return Err(DaemonError::Helper("helper is closed".to_string()));
        }

        let stream = connect_helper(&self.socket_path).await?;
        let (reader, mut writer) = tokio::io::split(stream);
        let mut reader = BufReader::new(reader);

        let json = serde_json::to_string(request)?;
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;

        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Err(DaemonError::Helper(
                "helper closed the connection without replying".to_string(),
            ));
        }
        Ok(serde_json::from_str(&line)?)
    }
}

/// Connect to the helper socket
///
/// A missing socket file and a stale one nobody listens on both mean the
/// helper is not running.
async fn connect_helper(path: &Path) -> Result<UnixStream> {
    UnixStream::connect(path).await.map_err(|e| match e.kind() {
        ErrorKind::NotFound | ErrorKind::ConnectionRefused => {
            DaemonError::Helper(format!("device helper not running at {:?}", path))
        }
        _ => DaemonError::Ipc(format!("Failed to connect to {:?}: {}", path, e)),
    })
}

#[async_trait]
impl Helper for SocketHelper {
    async fn do_enroll(&mut self, request: EnrollHelperRequest) -> EnrollHelperReply {
        match self.exchange(&request).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Enroll helper exchange failed: {}", e);
                EnrollHelperReply::error(DeviceStatus::GONE)
            }
        }
    }

    async fn do_sign(&mut self, request: SignHelperRequest) -> Result<SignHelperReply> {
        if request.sign_data.is_empty() {
            return Err(DaemonError::Helper(
                "sign request carries no challenges".to_string(),
            ));
        }

        match self.exchange(&request).await {
            Ok(reply) => Ok(reply),
            Err(e) => {
                warn!("Sign helper exchange failed: {}", e);
                Ok(SignHelperReply::error(DeviceStatus::GONE))
            }
        }
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
