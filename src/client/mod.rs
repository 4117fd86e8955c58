//! Client: discovery, dial, parse loop, and reconnection (§4.7 client
//! states, §6 CLI `client --host/--port`).

use crate::discovery::Browser;
use crate::error::ConnectionError;
use crate::protocol::codec::{self, Decoded, Direction, FrameDecoder};
use crate::protocol::{AudioInfoJson, Packet, SettingsJson, StatusJson, WindowsDisplaysResponse};
use log::{info, warn};
use parking_lot::Mutex;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

const INITIAL_DIAL_TIMEOUT: Duration = Duration::from_secs(8);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, PartialEq)]
pub enum ClientState {
    Discovering,
    Connecting,
    Streaming,
    Reconnecting { attempt: u32 },
    Failed,
}

/// What the parse loop hands back to subscribers (FrameSink/StatusSink
/// folded into one event type, ResponseRouter kept separate below).
#[derive(Debug, Clone)]
pub enum FrameEvent {
    Video { status: StatusJson, image: Vec<u8> },
    Audio { info: AudioInfoJson, samples: Vec<u8> },
}

pub struct Client {
    state: Mutex<ClientState>,
    frame_tx: broadcast::Sender<FrameEvent>,
    response_tx: broadcast::Sender<WindowsDisplaysResponse>,
    outbound_tx: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    cancel: CancellationToken,
}

impl Client {
    pub fn new() -> Self {
        let (frame_tx, _) = broadcast::channel(64);
        let (response_tx, _) = broadcast::channel(8);
        Self {
            state: Mutex::new(ClientState::Discovering),
            frame_tx,
            response_tx,
            outbound_tx: Mutex::new(None),
            cancel: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> ClientState {
        self.state.lock().clone()
    }

    pub fn subscribe_frames(&self) -> broadcast::Receiver<FrameEvent> {
        self.frame_tx.subscribe()
    }

    pub fn subscribe_responses(&self) -> broadcast::Receiver<WindowsDisplaysResponse> {
        self.response_tx.subscribe()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
        *self.state.lock() = ClientState::Failed;
    }

    /// Send a settings update to the server, if connected.
    pub fn send_settings(&self, settings: SettingsJson) {
        if let Some(tx) = self.outbound_tx.lock().as_ref() {
            let _ = tx.send(codec::encode_settings(&settings));
        }
    }

    pub fn request_windows_displays(&self) {
        if let Some(tx) = self.outbound_tx.lock().as_ref() {
            let _ = tx.send(codec::encode_request_windows_displays());
        }
    }

    /// Run with an explicit endpoint, bypassing discovery (`--host`).
    pub async fn run_with_endpoint(&self, host: String, port: u16) -> Result<(), ConnectionError> {
        let mut attempt = 0u32;
        loop {
            if self.cancel.is_cancelled() {
                return Ok(());
            }
            *self.state.lock() = ClientState::Connecting;
            match self.dial_and_stream(&host, port).await {
                Ok(()) => {
                    // stream ended cleanly (peer closed); treat as reconnect
                }
                Err(e) => warn!("connection attempt failed: {}", e),
            }

            if self.cancel.is_cancelled() {
                return Ok(());
            }
            attempt += 1;
            if attempt > MAX_RECONNECT_ATTEMPTS {
                *self.state.lock() = ClientState::Failed;
                return Err(ConnectionError::ConnectionFailed("reconnect attempts exhausted".to_string()));
            }
            let delay = Duration::from_secs(2u64.saturating_pow(attempt).min(30));
            *self.state.lock() = ClientState::Reconnecting { attempt };
            info!("reconnecting in {:?} (attempt {})", delay, attempt);
            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Run with discovery: browse, then dial the first candidate.
    pub async fn run_with_discovery(&self) -> Result<(), ConnectionError> {
        *self.state.lock() = ClientState::Discovering;
        let browser = Browser::new().map_err(|e| {
            warn!("discovery browser init failed: {}", e);
            ConnectionError::NetworkUnavailable
        })?;
        let candidates = browser.browse().map_err(|e| {
            warn!("discovery browse failed: {}", e);
            ConnectionError::NetworkUnavailable
        })?;
        let candidate = candidates.first().ok_or(ConnectionError::ServerNotFound)?.clone();
        self.run_with_endpoint(candidate.host, candidate.port).await
    }

    async fn dial_and_stream(&self, host: &str, port: u16) -> Result<(), ConnectionError> {
        let addr = format!("{}:{}", host, port);
        let stream = tokio::time::timeout(INITIAL_DIAL_TIMEOUT, TcpStream::connect(&addr))
            .await
            .map_err(|_| ConnectionError::ConnectionFailed("dial timed out".to_string()))?
            .map_err(|e| ConnectionError::ConnectionFailed(e.to_string()))?;
        let _ = stream.set_nodelay(true);

        *self.state.lock() = ClientState::Streaming;
        info!("connected to {}", addr);

        let (mut read_half, mut write_half) = stream.into_split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        *self.outbound_tx.lock() = Some(outbound_tx);

        let cancel = self.cancel.clone();
        let write_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    msg = outbound_rx.recv() => match msg {
                        Some(bytes) => {
                            if write_half.write_all(&bytes).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        });

        let mut decoder = FrameDecoder::new(Direction::ServerToClient);
        let mut buf = [0u8; 16384];
        let result = loop {
            let n = tokio::select! {
                _ = self.cancel.cancelled() => break Ok(()),
                r = read_half.read(&mut buf) => match r {
                    Ok(0) => break Ok(()),
                    Ok(n) => n,
                    Err(e) => break Err(ConnectionError::ConnectionFailed(e.to_string())),
                },
            };
            decoder.extend(&buf[..n]);

            loop {
                match decoder.next_packet() {
                    Ok(Some(Decoded::Packet(packet))) => self.dispatch(packet),
                    Ok(Some(Decoded::Malformed(reason))) => warn!("malformed packet from server: {}", reason),
                    Ok(None) => break,
                    Err(e) => {
                        warn!("protocol violation from server: {}", e);
                        break;
                    }
                }
            }
        };

        *self.outbound_tx.lock() = None;
        write_task.abort();
        result
    }

    fn dispatch(&self, packet: Packet) {
        match packet {
            Packet::VideoFrame { status, image } => {
                let _ = self.frame_tx.send(FrameEvent::Video { status, image });
                self.send_ack();
            }
            Packet::AudioPacket { info, samples } => {
                let _ = self.frame_tx.send(FrameEvent::Audio { info, samples });
            }
            Packet::WindowsDisplaysResponse(resp) => {
                let _ = self.response_tx.send(resp);
            }
            Packet::Ack | Packet::RequestWindowsDisplays | Packet::Settings(_) => {
                // these are C->S only; a compliant server never sends them
            }
        }
    }

    fn send_ack(&self) {
        if let Some(tx) = self.outbound_tx.lock().as_ref() {
            let _ = tx.send(codec::encode_ack());
        }
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_client_starts_discovering() {
        let client = Client::new();
        assert_eq!(client.state(), ClientState::Discovering);
    }

    #[test]
    fn cancel_moves_to_failed() {
        let client = Client::new();
        client.cancel();
        assert_eq!(client.state(), ClientState::Failed);
    }
}
