//! Error taxonomy for the capture/encode/transport pipeline.
//!
//! Each subsystem gets its own enum so call sites can match on the
//! specific failure instead of inspecting a string. `main` collapses
//! everything into `anyhow::Error` at the process boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture target not resolvable this tick")]
    Unavailable,
    #[error("capture primitive timed out")]
    Timeout,
    #[error("capture primitive failed: {0}")]
    Failed(String),
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("encoder produced an empty buffer")]
    Empty,
    #[error("encoder failed: {0}")]
    Failed(String),
}

#[derive(Debug, Error)]
pub enum PeerError {
    #[error("write to peer failed: {0}")]
    Send(String),
    #[error("peer outbound backlog exceeded high-water mark")]
    BacklogOverflow,
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed packet: {0}")]
    Malformed(String),
    #[error("length prefix {0} exceeds receive budget")]
    BudgetExceeded(usize),
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("listener bind/accept failed: {0}")]
    ListenerFailure(String),
    #[error("listener restart attempts exhausted")]
    RestartExhausted,
}

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("audio capture initialization failed: {0}")]
    InitFailed(String),
    #[error("audio permanently disabled for this session")]
    Disabled,
}

/// Client-visible connection error surface (§7).
#[derive(Debug, Error, Clone)]
pub enum ConnectionError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("connection cancelled")]
    ConnectionCancelled,
    #[error("connection waiting: {0}")]
    ConnectionWaiting(String),
    #[error("network unavailable")]
    NetworkUnavailable,
    #[error("server not found")]
    ServerNotFound,
    #[error("authentication failed")]
    AuthenticationFailed,
}
