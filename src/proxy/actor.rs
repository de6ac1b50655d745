use crate::proxy::docker_cmd::{exec_local, GetContainerAddrCmd};
use crate::proxy::model::{ProxyCommand, ProxyMetric, ProxyState, TcpProxyConfig};
use crate::proxy::relay::TcpRelay;
use log::debug;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// One actor per exposed database. Owns the relay, reacts to commands and
/// publishes state and traffic through the metric channel.
pub struct ProxyActor {
    config: TcpProxyConfig,
    cmd_rx: mpsc::Receiver<ProxyCommand>,
    metric_tx: watch::Sender<ProxyMetric>,
    relay: Option<TcpRelay>,
    running_task: Option<JoinHandle<()>>,
}

impl ProxyActor {
    pub fn new(
        config: TcpProxyConfig,
        cmd_rx: mpsc::Receiver<ProxyCommand>,
        metric_tx: watch::Sender<ProxyMetric>,
    ) -> Self {
        Self {
            config,
            cmd_rx,
            metric_tx,
            relay: None,
            running_task: None,
        }
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                Some(cmd) = self.cmd_rx.recv() => {
                    match cmd {
                        ProxyCommand::Start => {
                            self.handle_start().await;
                        }
                        ProxyCommand::Stop => {
                            self.handle_stop().await;
                        }
                        ProxyCommand::Remove => {
                            self.handle_stop().await;
                            break;
                        }
                    }
                }

                // Watch the running metric pump for unexpected exits
                _ = async {
                    if let Some(task) = &mut self.running_task {
                        task.await
                    } else {
                        std::future::pending::<Result<(), _>>().await
                    }
                }, if self.running_task.is_some() => {
                    self.metric_tx.send_modify(|m| m.state = ProxyState::Error("Relay dropped".into()));
                    self.running_task = None;
                    if let Some(relay) = &self.relay { relay.shutdown(); }
                    self.relay = None;
                }
                else => {
                    continue;
                }
            }
        }
    }

    async fn handle_start(&mut self) {
        // Start on a live mapping confirms it instead of rebinding the port.
        if self
            .running_task
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
        {
            debug!("Proxy {} already running, confirming", self.config.name);
            return;
        }

        self.metric_tx
            .send_modify(|m| m.state = ProxyState::Starting);

        let mut config = self.config.clone();

        if config.resolve_container_addr {
            let cmd = GetContainerAddrCmd {
                container_name: config.name.clone(),
            };
            let addr_res = exec_local(&cmd, Duration::from_secs(10)).await;

            match addr_res {
                Ok(Some(addr)) => config.target_host = addr,
                Ok(None) => {
                    self.metric_tx.send_modify(|m| {
                        m.state = ProxyState::Error("Container address not found".into())
                    });
                    return;
                }
                Err(e) => {
                    self.metric_tx
                        .send_modify(|m| m.state = ProxyState::Error(e.to_string()));
                    return;
                }
            }
        }

        let mut relay = TcpRelay::new(config);
        if let Err(e) = relay.serve().await {
            self.metric_tx
                .send_modify(|m| m.state = ProxyState::Error(e.to_string()));
            return;
        }

        // Clone the receiver: the relay stays in self.relay while the pump
        // task consumes events.
        let mut event_rx = relay
            .event_rx
            .as_ref()
            .expect("Event RX must be initialized")
            .clone();

        self.relay = Some(relay);

        let metric_tx = self.metric_tx.clone();

        let task = tokio::spawn(async move {
            loop {
                if event_rx.changed().await.is_err() {
                    metric_tx.send_modify(|m| m.state = ProxyState::Error("Channel closed".into()));
                    break;
                } else {
                    let event = event_rx.borrow_and_update().clone();
                    metric_tx.send_modify(|m| {
                        m.traffic
                            .set(event.traffic.send_bytes, event.traffic.recv_bytes);
                        m.state = ProxyState::from(&event.health);
                    });
                }
            }
        });

        self.running_task = Some(task);
    }

    async fn handle_stop(&mut self) {
        self.metric_tx
            .send_modify(|m| m.state = ProxyState::Stopping);

        if let Some(relay) = &self.relay {
            relay.shutdown();
        }

        if let Some(task) = self.running_task.take() {
            task.abort();
        }

        if self.relay.take().is_some() {
            debug!("Proxy {} stopped", self.config.name);
        } else {
            debug!("Proxy {} was not running, stop is a no-op", self.config.name);
        }

        self.metric_tx
            .send_modify(|m| m.state = ProxyState::Stopped);
    }
}
