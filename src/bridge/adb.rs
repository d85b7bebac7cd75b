//! Client for the adb server's host protocol over TCP.

use std::{collections::HashMap, time::Duration};

use tokio::{io::AsyncReadExt, net::TcpStream, time::timeout};
use tracing::{debug, info};

use super::{Bridge, DeviceEvents, bootstrap, props, protocol};
use crate::{
    config::{BridgeConfig, Config},
    device::{DeviceIdentity, RawDevice},
    error::{BridgeError, BridgeStartError},
};

/// [`Bridge`] backed by a real adb server.
///
/// Every request opens its own connection; the device feed keeps one
/// connection open for as long as its receiver lives.
#[derive(Debug, Clone)]
pub struct AdbBridge {
    config: BridgeConfig,
    channel_capacity: usize,
}

impl AdbBridge {
    /// Create a client for the server described by `config`.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.bridge.clone(),
            channel_capacity: config.discovery.channel_capacity,
        }
    }

    /// Connection settings in use.
    #[must_use]
    pub const fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Ask the server for its protocol version.
    ///
    /// # Errors
    /// Fails when no server answers at the configured address.
    pub async fn server_version(&self) -> Result<u32, BridgeError> {
        const REQUEST: &str = "host:version";
        self.bounded(REQUEST, async {
            let mut stream = self.connect().await?;
            protocol::send_request(&mut stream, REQUEST).await?;
            let version = protocol::read_length_prefixed(&mut stream).await?;
            u32::from_str_radix(version.trim(), 16)
                .map_err(|_| BridgeError::Protocol(format!("invalid server version {version:?}")))
        })
        .await
    }

    async fn connect(&self) -> Result<TcpStream, BridgeError> {
        let address = self.config.address();
        TcpStream::connect(&address)
            .await
            .map_err(|source| BridgeError::Connect { address, source })
    }

    async fn bounded<T>(
        &self,
        request: &str,
        future: impl Future<Output = Result<T, BridgeError>>,
    ) -> Result<T, BridgeError> {
        bounded(self.config.request_timeout(), request, future).await
    }
}

async fn bounded<T>(
    limit: Duration,
    request: &str,
    future: impl Future<Output = Result<T, BridgeError>>,
) -> Result<T, BridgeError> {
    timeout(limit, future)
        .await
        .map_err(|_| BridgeError::Timeout {
            request: request.to_string(),
        })?
}

impl Bridge for AdbBridge {
    async fn start(&self) -> Result<(), BridgeStartError> {
        bootstrap::ensure_server(self).await
    }

    async fn track_devices(&self) -> Result<DeviceEvents, BridgeError> {
        const REQUEST: &str = "host:track-devices";
        let mut stream = self
            .bounded(REQUEST, async {
                let mut stream = self.connect().await?;
                protocol::send_request(&mut stream, REQUEST).await?;
                Ok(stream)
            })
            .await?;

        let (sender, events) = DeviceEvents::channel(self.channel_capacity);
        tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    () = sender.closed() => break,
                    frame = protocol::read_frame(&mut stream) => frame,
                };
                match frame {
                    Ok(Some(payload)) => {
                        let devices = protocol::parse_device_list(&payload);
                        debug!("adb -> {} tracked device(s)", devices.len());
                        if sender.send(Ok(devices)).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        info!("adb server closed the device tracking connection");
                        break;
                    }
                    Err(err) => {
                        let _ = sender.send(Err(err)).await;
                        break;
                    }
                }
            }
        });
        Ok(events)
    }

    async fn list_devices(&self) -> Result<Vec<RawDevice>, BridgeError> {
        const REQUEST: &str = "host:devices";
        self.bounded(REQUEST, async {
            let mut stream = self.connect().await?;
            protocol::send_request(&mut stream, REQUEST).await?;
            let payload = protocol::read_length_prefixed(&mut stream).await?;
            Ok(protocol::parse_device_list(&payload))
        })
        .await
    }

    async fn properties(
        &self,
        identity: &DeviceIdentity,
    ) -> Result<HashMap<String, String>, BridgeError> {
        let transport = format!("host:transport:{identity}");
        self.bounded("shell:getprop", async {
            let mut stream = self.connect().await?;
            protocol::send_request(&mut stream, &transport).await?;
            protocol::send_request(&mut stream, "shell:getprop").await?;
            let mut output = Vec::new();
            stream.read_to_end(&mut output).await?;
            Ok(props::parse_getprop(&String::from_utf8_lossy(&output)))
        })
        .await
    }
}
