use crate::proxy::model::{RelayEvent, RelayHealth, TcpProxyConfig};
use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::{timeout, Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Listener on the public port forwarding every connection to the database
/// container. Shutdown goes through the cancellation token so the port is
/// released even with connections in flight.
pub struct TcpRelay {
    config: TcpProxyConfig,
    pub event_rx: Option<watch::Receiver<RelayEvent>>,
    pub bound_addr: Option<SocketAddr>,
    shutdown_token: CancellationToken,
}

impl TcpRelay {
    pub fn new(config: TcpProxyConfig) -> Self {
        Self {
            config,
            event_rx: None,
            bound_addr: None,
            shutdown_token: CancellationToken::new(),
        }
    }

    pub fn shutdown(&self) {
        debug!("Relay shutdown triggered for {}", self.config.name);
        self.shutdown_token.cancel();
    }

    pub async fn serve(&mut self) -> Result<()> {
        let bind_addr = format!("{}:{}", self.config.bind_host, self.config.bind_port);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .context(format!("Failed to bind proxy listener: {bind_addr}"))?;
        self.bound_addr = listener.local_addr().ok();

        info!(
            "Proxy started: {} -> {}:{}",
            bind_addr, self.config.target_host, self.config.target_port
        );

        let (event_tx, event_rx) = watch::channel::<RelayEvent>(RelayEvent::default());

        let monitor_token = self.shutdown_token.clone();
        let listener_token = self.shutdown_token.clone();
        let config = self.config.clone();

        // Periodic target health probe
        let monitor_tx = event_tx.clone();
        let probe_host = self.config.target_host.clone();
        let probe_port = self.config.target_port;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(5));
            loop {
                tokio::select! {
                    _ = monitor_token.cancelled() => {
                        debug!("Health probe task shutting down due to cancellation");
                        break;
                    }
                    _ = interval.tick() => {
                        let start = Instant::now();
                        let probe = timeout(
                            Duration::from_secs(5),
                            TcpStream::connect((probe_host.as_str(), probe_port)),
                        )
                        .await;
                        match probe {
                            Ok(Ok(_)) => {
                                monitor_tx.send_modify(|e| {
                                    e.health = RelayHealth::Healthy { latency: start.elapsed() };
                                });
                            }
                            _ => {
                                monitor_tx.send_modify(|e| {
                                    e.health = RelayHealth::Unstable { reason: "Timeout/Err".into() };
                                });
                            }
                        }
                    }
                }
            }
        });

        // Accept loop, one task per connection
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = listener_token.cancelled() => {
                        info!("Proxy listener shutting down, releasing port");
                        break;
                    }
                    accept_result = listener.accept() => {
                        match accept_result {
                            Ok((socket, src_addr)) => {
                                let target_host = config.target_host.clone();
                                let target_port = config.target_port;
                                let tx_traffic = event_tx.clone();

                                let child_token = listener_token.clone();

                                tokio::spawn(async move {
                                    tokio::select! {
                                        _ = child_token.cancelled() => {
                                            debug!("Forward task shutting down due to cancellation");
                                        }
                                        res = TcpRelay::handle_forward(socket, &target_host, target_port) => {
                                            match res {
                                                Ok((bytes_tx, bytes_rx)) => {
                                                    tx_traffic.send_modify(|e| {
                                                        e.traffic.append_traffic(bytes_tx as u128, bytes_rx as u128);
                                                    });
                                                }
                                                Err(e) => warn!("Connection {} error: {:#}", src_addr, e),
                                            }
                                        }
                                    }
                                });
                            }
                            Err(e) => {
                                warn!("Accept error: {}", e);
                                tokio::time::sleep(Duration::from_millis(100)).await;
                            }
                        }
                    }
                }
            }
        });

        self.event_rx = Some(event_rx);

        Ok(())
    }

    async fn handle_forward(
        mut stream: TcpStream,
        target_host: &str,
        target_port: u16,
    ) -> Result<(u64, u64)> {
        let time_out = 10;
        let mut target = timeout(
            Duration::from_secs(time_out),
            TcpStream::connect((target_host, target_port)),
        )
        .await
        .with_context(|| format!("Connect to target timed out: {time_out}s"))?
        .with_context(|| format!("Failed to reach target {target_host}:{target_port}"))?;

        let (mut ri, mut wi) = stream.split();
        let (mut ro, mut wo) = target.split();

        let client_to_target = tokio::io::copy(&mut ri, &mut wo);
        let target_to_client = tokio::io::copy(&mut ro, &mut wi);

        match tokio::try_join!(client_to_target, target_to_client) {
            Ok((bytes_tx, bytes_rx)) => {
                debug!("Traffic: TX {} bytes, RX {} bytes", bytes_tx, bytes_rx);
                Ok((bytes_tx, bytes_rx))
            }
            Err(e) => {
                debug!("Traffic: forward stream closed with error, {e}");
                Err(e.into())
            }
        }
    }
}
