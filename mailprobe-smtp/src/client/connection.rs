use std::sync::Arc;

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};
use tokio_rustls::{
    TlsConnector,
    client::TlsStream,
    rustls::{ClientConfig, pki_types::ServerName},
};

use crate::error::{ClientError, Result};

/// An SMTP client connection that can be either plain TCP or TLS-wrapped.
pub(super) enum ClientConnection {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl ClientConnection {
    /// Sends data over the connection.
    pub(super) async fn send(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Self::Plain(stream) => {
                stream.write_all(data).await.map_err(ClientError::Write)?;
                stream.flush().await.map_err(ClientError::Write)
            }
            Self::Tls(stream) => {
                stream.write_all(data).await.map_err(ClientError::Write)?;
                stream.flush().await.map_err(ClientError::Write)
            }
        }
    }

    /// Reads data from the connection into the provided buffer.
    pub(super) async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = match self {
            Self::Plain(stream) => stream.read(buf).await,
            Self::Tls(stream) => stream.read(buf).await,
        }
        .map_err(ClientError::Read)?;

        if n == 0 {
            return Err(ClientError::ConnectionClosed);
        }
        Ok(n)
    }

    /// Upgrades a plain connection to TLS.
    pub(super) async fn upgrade_to_tls(
        self,
        config: Arc<ClientConfig>,
        server_name: ServerName<'static>,
    ) -> Result<Self> {
        match self {
            Self::Plain(stream) => {
                let tls_stream = TlsConnector::from(config)
                    .connect(server_name, stream)
                    .await
                    .map_err(|e| ClientError::TlsError(e.to_string()))?;

                Ok(Self::Tls(Box::new(tls_stream)))
            }
            Self::Tls(_) => Err(ClientError::TlsError(
                "Connection is already TLS".to_string(),
            )),
        }
    }
}
