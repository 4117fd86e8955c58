//! Server lifecycle (§4.7): listener, acceptor, and the
//! Listening/Streaming/Restarting state machine, wiring the pipeline,
//! controller, audio pipeline, and connection set together.

use crate::audio::AudioPipeline;
use crate::connection::{ConnectionSet, RttEstimator};
use crate::controller::{AdaptiveController, ControllerInputs, ThermalState};
use crate::discovery::Advertiser;
use crate::pipeline::{GuardState, Pipeline};
use crate::protocol::{codec, Packet, SettingsJson};
use crate::status::StatusBoard;
use crate::stream_config::{CaptureTarget, StreamConfig, UserMode};
use crate::windows_displays::ContentEnumerator;
use log::{error, info, warn};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

const RESTART_DELAY: Duration = Duration::from_secs(5);
const STARTUP_RESTART_DELAY: Duration = Duration::from_secs(10);
const CONTROLLER_CADENCE: Duration = Duration::from_secs(3);
const BACKGROUND_CONTROLLER_CADENCE: Duration = Duration::from_secs(10);
const MEMORY_GUARD_CADENCE: Duration = Duration::from_secs(3);

/// Resident set size of this process, read fresh each call (§4.3
/// memory-guard track, §9 "memory thresholds are parameters"). `statm`'s
/// second field is resident pages; `0` on any read failure so a guard
/// evaluation on an unreadable `/proc` is a no-op rather than a panic.
fn resident_memory_bytes() -> u64 {
    let statm = match std::fs::read_to_string("/proc/self/statm") {
        Ok(s) => s,
        Err(_) => return 0,
    };
    let resident_pages: u64 = statm.split_whitespace().nth(1).and_then(|s| s.parse().ok()).unwrap_or(0);
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    resident_pages * page_size.max(0) as u64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Listening,
    Streaming,
    Restarting,
}

pub struct Server {
    pub connections: Arc<ConnectionSet>,
    pub stream_config: Arc<Mutex<StreamConfig>>,
    pub pipeline: Arc<Pipeline>,
    pub audio: Arc<AudioPipeline>,
    pub rtt: Arc<RttEstimator>,
    pub controller: Arc<AdaptiveController>,
    pub status: Arc<StatusBoard>,
    pub enumerator: Arc<dyn ContentEnumerator>,
    state: Mutex<ServerState>,
    user_setpoint: Mutex<(u32, f32)>,
    streaming_signal: Notify,
    cancel: CancellationToken,
}

impl Server {
    pub fn new(
        pipeline: Arc<Pipeline>,
        audio: Arc<AudioPipeline>,
        connections: Arc<ConnectionSet>,
        stream_config: Arc<Mutex<StreamConfig>>,
        enumerator: Arc<dyn ContentEnumerator>,
        status: Arc<StatusBoard>,
    ) -> Self {
        let user_setpoint = {
            let cfg = stream_config.lock();
            (cfg.fps_target, cfg.image_quality)
        };
        Self {
            connections,
            stream_config,
            pipeline,
            audio,
            rtt: Arc::new(RttEstimator::new()),
            controller: Arc::new(AdaptiveController::new()),
            status,
            enumerator,
            state: Mutex::new(ServerState::Listening),
            user_setpoint: Mutex::new(user_setpoint),
            streaming_signal: Notify::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> ServerState {
        *self.state.lock()
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Run the listener/acceptor with automatic restart (§4.7), plus
    /// the capture, audio, and controller background tasks. Returns
    /// once cancelled.
    pub async fn run(self: Arc<Self>, port: u16, background_mode: bool) -> std::io::Result<()> {
        let mut advertiser: Option<Advertiser> = None;
        let mut first_attempt = true;

        tokio::spawn({
            let server = self.clone();
            async move { server.run_capture_loop().await }
        });
        tokio::spawn({
            let server = self.clone();
            async move { server.run_audio_loop().await }
        });
        tokio::spawn({
            let server = self.clone();
            async move { server.run_controller_loop(background_mode).await }
        });
        tokio::spawn({
            let server = self.clone();
            async move { server.run_memory_guard_loop().await }
        });

        loop {
            if self.cancel.is_cancelled() {
                return Ok(());
            }
            *self.state.lock() = ServerState::Listening;

            match TcpListener::bind(("0.0.0.0", port)).await {
                Ok(listener) => {
                    match &advertiser {
                        Some(a) => {
                            if let Err(e) = a.republish(port, background_mode) {
                                warn!("discovery re-advertisement failed: {}", e);
                            }
                        }
                        None => match Advertiser::advertise(port, background_mode) {
                            Ok(a) => advertiser = Some(a),
                            Err(e) => warn!("discovery advertisement failed: {}", e),
                        },
                    }
                    info!("listening on port {}", port);
                    if let Err(e) = Self::accept_loop(self.clone(), listener).await {
                        let e = crate::error::LifecycleError::ListenerFailure(e.to_string());
                        error!("{}", e);
                        self.status.record_error("ListenerFailure");
                    }
                }
                Err(e) => {
                    let e = crate::error::LifecycleError::ListenerFailure(e.to_string());
                    error!("failed to bind port {}: {}", port, e);
                    self.status.record_error("ListenerFailure");
                }
            }

            if self.cancel.is_cancelled() {
                return Ok(());
            }
            *self.state.lock() = ServerState::Restarting;
            let delay = if first_attempt { STARTUP_RESTART_DELAY } else { RESTART_DELAY };
            first_attempt = false;
            tokio::time::sleep(delay).await;
        }
    }

    async fn accept_loop(&self, listener: TcpListener) -> std::io::Result<()> {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                accepted = listener.accept() => {
                    let (socket, addr) = accepted?;
                    if let Err(e) = socket.set_nodelay(true) {
                        warn!("failed to set TCP_NODELAY for {}: {}", addr, e);
                    }
                    self.spawn_peer(socket);
                }
            }
        }
    }

    fn spawn_peer(self: &Arc<Self>, socket: TcpStream) {
        let server = self.clone();
        tokio::spawn(async move { server.run_peer(socket).await });
    }

    async fn run_peer(self: Arc<Self>, socket: TcpStream) {
        let (handle, mut outbound_rx) = self.connections.insert();
        let was_empty = self.connections.len() == 1;
        if was_empty {
            *self.state.lock() = ServerState::Streaming;
            self.streaming_signal.notify_waiters();
            if let Err(e) = self.audio.start() {
                warn!("audio init failed, disabling audio for this session: {}", e);
            }
        }
        self.status.update_peer_count(self.connections.len() as u32);

        let (mut read_half, mut write_half) = socket.into_split();

        let connections = self.connections.clone();
        let write_task = tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            while let Some(bytes) = outbound_rx.recv().await {
                let len = bytes.len();
                if let Err(e) = write_half.write_all(&bytes).await {
                    connections.mark_send_error(handle);
                    warn!("{}", crate::error::PeerError::Send(e.to_string()));
                    break;
                }
                connections.release_backlog(handle, len);
            }
        });

        let mut decoder = codec::FrameDecoder::new(codec::Direction::ClientToServer);
        let mut buf = [0u8; 8192];
        let mut consecutive_malformed = 0u32;

        loop {
            use tokio::io::AsyncReadExt;
            let n = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = read_half.read(&mut buf) => match result {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) => {
                        warn!("read from peer failed: {}", e);
                        break;
                    }
                },
            };
            decoder.extend(&buf[..n]);

            loop {
                match decoder.next_packet() {
                    Ok(Some(codec::Decoded::Packet(packet))) => {
                        consecutive_malformed = 0;
                        self.handle_inbound_packet(handle, packet).await;
                    }
                    Ok(Some(codec::Decoded::Malformed(reason))) => {
                        warn!("malformed packet from peer: {}", reason);
                        consecutive_malformed += 1;
                        if consecutive_malformed >= 2 {
                            warn!("two consecutive malformed packets, closing connection");
                            self.connections.remove(handle);
                            write_task.abort();
                            self.on_peer_left().await;
                            return;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("protocol violation, closing connection: {}", e);
                        self.connections.remove(handle);
                        write_task.abort();
                        self.on_peer_left().await;
                        return;
                    }
                }
            }
        }

        self.connections.remove(handle);
        write_task.abort();
        self.on_peer_left().await;
    }

    async fn on_peer_left(&self) {
        self.status.update_peer_count(self.connections.len() as u32);
        if self.connections.is_empty() {
            *self.state.lock() = ServerState::Listening;
            self.audio.stop();
        }
    }

    async fn handle_inbound_packet(&self, handle: crate::connection::PeerHandle, packet: Packet) {
        match packet {
            Packet::Ack => {
                if let Some(rtt) = self.connections.take_rtt_sample(handle) {
                    self.rtt.record_sample(rtt);
                }
            }
            Packet::Settings(settings) => self.apply_settings(settings),
            Packet::RequestWindowsDisplays => {
                let resp = crate::protocol::WindowsDisplaysResponse {
                    windows: self.enumerator.list_windows().await,
                    displays: self.enumerator.list_displays().await,
                };
                let bytes = codec::encode_windows_displays_response(&resp);
                self.connections.fan_out(&bytes);
            }
            Packet::VideoFrame { .. } | Packet::AudioPacket { .. } | Packet::WindowsDisplaysResponse(_) => {
                // these are S->C only; a compliant client never sends them
            }
        }
    }

    fn apply_settings(&self, settings: SettingsJson) {
        let mut cfg = self.stream_config.lock();
        if let Some(mode_str) = &settings.streaming_mode {
            if let Some(mode) = UserMode::parse(mode_str) {
                let (fps, quality, max_frame_time) = mode.setpoint();
                cfg.user_mode = mode;
                cfg.fps_target = fps;
                cfg.image_quality = quality;
                cfg.max_frame_time = max_frame_time;
                *self.user_setpoint.lock() = (fps, quality);
            } else {
                warn!("ignoring unrecognized streamingMode {:?}", mode_str);
            }
        }
        if let Some(fps) = settings.preferred_fps {
            cfg.fps_target = fps.clamp(10, 45) as u32;
        }
        if let Some(q) = settings.preferred_quality {
            cfg.image_quality = (q.clamp(20, 80) as f32) / 100.0;
        }
        if let Some(source) = &settings.capture_source {
            match source.as_str() {
                "Full Display" => {
                    let display_id = match cfg.capture_target {
                        CaptureTarget::FullDisplay { display_id } => display_id,
                        CaptureTarget::SingleWindow { .. } => 0,
                    };
                    cfg.capture_target = CaptureTarget::FullDisplay { display_id };
                }
                "Single Window" => {
                    let window_id = match cfg.capture_target {
                        CaptureTarget::SingleWindow { window_id } => window_id,
                        CaptureTarget::FullDisplay { .. } => 0,
                    };
                    cfg.capture_target = CaptureTarget::SingleWindow { window_id };
                }
                other => warn!("ignoring unrecognized captureSource {:?}", other),
            }
        }
        if let Some(id) = settings.selected_window_id {
            if id != 0 {
                cfg.capture_target = CaptureTarget::SingleWindow { window_id: id };
            }
        }
        if let Some(id) = settings.selected_display_id {
            if id != 0 {
                cfg.capture_target = CaptureTarget::FullDisplay { display_id: id };
            }
        }
        if let Some(enabled) = settings.audio_enabled {
            cfg.audio_enabled = enabled;
        }
        if let Some(q) = settings.audio_quality {
            cfg.audio_quality = q.clamp(0.10, 1.00);
        }
        cfg.clamp();
    }

    async fn run_capture_loop(self: Arc<Self>) {
        loop {
            if self.cancel.is_cancelled() {
                return;
            }
            if self.connections.is_empty() {
                tokio::select! {
                    _ = self.cancel.cancelled() => return,
                    _ = self.streaming_signal.notified() => {}
                    _ = tokio::time::sleep(Duration::from_millis(200)) => {}
                }
                continue;
            }

            let tick_period = self.stream_config.lock().tick_period();
            let cfg = self.stream_config.lock().clone();
            let guard = GuardState {
                thermal: ThermalState::Nominal,
                memory_warning_count: self.controller.memory_warning_count(),
            };
            let rtt_ms_f = self.rtt.estimated_rtt_ms();
            let rtt_ms = rtt_ms_f.round() as i32;
            self.pipeline.tick(&cfg, guard, rtt_ms, rtt_ms).await;
            let audio_enabled = cfg.audio_enabled && !self.audio.is_failed();
            self.status.update_stream(cfg.fps_target, (cfg.image_quality * 100.0).round() as i32, rtt_ms, audio_enabled);

            // Output-scale sub-rule (§4.3): computed per capture tick,
            // not by the controller, from this tick's fresh frame-time
            // average and RTT.
            let output_scale =
                crate::controller::compute_output_scale(self.pipeline.avg_frame_time(), cfg.max_frame_time, rtt_ms_f);
            {
                let mut live = self.stream_config.lock();
                live.output_scale = output_scale;
                live.clamp();
            }

            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(tick_period) => {}
            }
        }
    }

    async fn run_audio_loop(self: Arc<Self>) {
        let mut timestamp = 0.0f64;
        loop {
            if self.cancel.is_cancelled() {
                return;
            }
            if !self.connections.is_empty() && !self.audio.is_disabled() {
                let audio_quality = self.stream_config.lock().audio_quality;
                if let Some(bytes) = self.audio.flush(audio_quality, timestamp) {
                    self.connections.fan_out(&bytes);
                }
            }
            timestamp += crate::audio::FLUSH_INTERVAL.as_secs_f64();
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(crate::audio::FLUSH_INTERVAL) => {}
            }
        }
    }

    /// §4.3: evaluated every 3s, or every 10s while in background mode.
    /// Background mode's only effect on the state machine is this
    /// cadence change (§4.7) — the listener/peer/audio transitions are
    /// unaffected.
    async fn run_controller_loop(self: Arc<Self>, background_mode: bool) {
        let cadence = if background_mode { BACKGROUND_CONTROLLER_CADENCE } else { CONTROLLER_CADENCE };
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(cadence) => {}
            }
            let avg_frame_time = self.pipeline.avg_frame_time();
            let dropped = self.pipeline.dropped_frames();
            self.pipeline.reset_dropped_frames();
            let estimated_rtt = Duration::from_secs_f64(self.rtt.estimated_rtt_ms() / 1000.0);
            let inputs = ControllerInputs { avg_frame_time, dropped_frames: dropped, estimated_rtt, thermal: ThermalState::Nominal };
            let setpoint = *self.user_setpoint.lock();
            let mut cfg = self.stream_config.lock();
            self.controller.evaluate(&mut cfg, inputs, setpoint);
            cfg.clamp();
        }
    }

    /// Independent memory-guard track (§4.3): its own 3s cadence,
    /// unrelated to the controller's evaluation cadence.
    async fn run_memory_guard_loop(self: Arc<Self>) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(MEMORY_GUARD_CADENCE) => {}
            }
            let memory_bytes = resident_memory_bytes();
            self.status.update_memory(memory_bytes);
            let mut cfg = self.stream_config.lock();
            self.controller.evaluate_memory(&mut cfg, memory_bytes);
        }
    }
}
