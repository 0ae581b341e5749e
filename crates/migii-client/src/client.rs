use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use migii_core::config::ClientConfig;
use migii_core::Scheduler;
use migii_protocol::{ChangeEvent, ChangeMessage};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::connector::{Connector, TransportStream};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Terminal: the reconnect cap was hit and the loop has exited.
    GaveUp,
}

/// Signals delivered to local listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Connected,
    Change(ChangeEvent),
    Disconnected,
    Error(String),
    /// Consecutive connect failures hit the cap. Emitted once; the client
    /// makes no further attempts. A listener that lagged behind the event
    /// channel can still read this from [`ClientHandle::watch_state`], which
    /// settles on [`ConnectionState::GaveUp`] before the event is sent.
    MaxReconnectAttemptsReached,
}

/// Realtime client that reconnects with linear backoff.
///
/// The wait before a reconnect is `base_delay × max(failures, 1)`, where
/// `failures` counts consecutive failed connects and resets on every
/// successful open.
pub struct ReconnectingClient {
    connector: Arc<dyn Connector>,
    scheduler: Arc<dyn Scheduler>,
    base_delay: Duration,
    max_attempts: u32,
    state: watch::Sender<ConnectionState>,
    events: broadcast::Sender<ClientEvent>,
    cancel: CancellationToken,
}

impl ReconnectingClient {
    pub fn new(
        connector: Arc<dyn Connector>,
        config: &ClientConfig,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            connector,
            scheduler,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_attempts: config.max_attempts.max(1),
            state,
            events,
            cancel: CancellationToken::new(),
        }
    }

    /// Build and start in one step. Listeners that must not miss the first
    /// `Connected` should use [`new`](Self::new), subscribe, then [`start`](Self::start).
    pub fn spawn(
        connector: Arc<dyn Connector>,
        config: &ClientConfig,
        scheduler: Arc<dyn Scheduler>,
    ) -> ClientHandle {
        Self::new(connector, config, scheduler).start()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub fn start(self) -> ClientHandle {
        let handle = ClientHandle {
            state: self.state.subscribe(),
            events: self.events.clone(),
            cancel: self.cancel.clone(),
            task: None,
        };
        let task = tokio::spawn(self.run());
        ClientHandle {
            task: Some(task),
            ..handle
        }
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    fn reconnect_delay(&self, failures: u32) -> Duration {
        self.base_delay * failures.max(1)
    }

    async fn run(self) {
        let mut failures: u32 = 0;
        let mut attempt: u32 = 0;

        loop {
            if attempt > 0 {
                let delay = self.reconnect_delay(failures);
                info!(attempt = attempt + 1, delay_ms = delay.as_millis() as u64, "reconnecting");
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = self.scheduler.sleep(delay) => {}
                }
            }
            if self.cancel.is_cancelled() {
                break;
            }

            attempt += 1;
            self.set_state(ConnectionState::Connecting);
            let opened = tokio::select! {
                _ = self.cancel.cancelled() => break,
                r = self.connector.connect() => r,
            };

            match opened {
                Ok(stream) => {
                    failures = 0;
                    self.set_state(ConnectionState::Connected);
                    self.emit(ClientEvent::Connected);
                    info!(attempt, "realtime connection open");

                    let cancelled = self.pump(stream).await;
                    self.set_state(ConnectionState::Disconnected);
                    self.emit(ClientEvent::Disconnected);
                    if cancelled {
                        break;
                    }
                }
                Err(e) => {
                    failures += 1;
                    warn!(attempt, failures, error = %e, "realtime connect failed");
                    self.emit(ClientEvent::Error(e.to_string()));
                    self.set_state(ConnectionState::Disconnected);
                    self.emit(ClientEvent::Disconnected);
                    if failures >= self.max_attempts {
                        warn!(failures, "max reconnect attempts reached, giving up");
                        self.set_state(ConnectionState::GaveUp);
                        self.emit(ClientEvent::MaxReconnectAttemptsReached);
                        return;
                    }
                }
            }
        }

        self.set_state(ConnectionState::Disconnected);
        debug!("realtime client stopped");
    }

    /// Read frames until the transport ends or the client is cancelled.
    /// Returns `true` on cancellation. The stream is dropped on return.
    async fn pump(&self, mut stream: TransportStream) -> bool {
        loop {
            let frame = tokio::select! {
                _ = self.cancel.cancelled() => return true,
                f = stream.next() => f,
            };
            match frame {
                Some(Ok(text)) => match ChangeMessage::parse(&text) {
                    Ok(ev) => {
                        debug!(collection = %ev.collection, operation = %ev.operation, "change received");
                        self.emit(ClientEvent::Change(ev));
                    }
                    Err(e) => warn!(error = %e, "dropping malformed realtime message"),
                },
                Some(Err(e)) => {
                    warn!(error = %e, "realtime transport error");
                    self.emit(ClientEvent::Error(e.to_string()));
                    return false;
                }
                None => {
                    info!("realtime connection closed by peer");
                    return false;
                }
            }
        }
    }
}

/// Handle to a running [`ReconnectingClient`].
pub struct ClientHandle {
    state: watch::Receiver<ConnectionState>,
    events: broadcast::Sender<ClientEvent>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ClientHandle {
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Latest connection state. Unlike the event channel this never lags,
    /// so it is the reliable way to learn the client gave up.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Close the active transport and stop reconnecting. Idempotent.
    pub fn disconnect(&self) {
        if !self.cancel.is_cancelled() {
            info!("realtime client disconnect requested");
        }
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Wait for the loop to exit on its own (for example after the
    /// reconnect cap is hit).
    pub async fn join(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "realtime client task failed");
            }
        }
    }

    /// Disconnect and wait for the loop to exit.
    pub async fn shutdown(mut self) {
        self.disconnect();
        self.join().await;
    }
}
