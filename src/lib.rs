//! MacMirror core — desktop-to-mobile screen mirroring server and client.
//!
//! The wire protocol, capture-encode-send pipeline, adaptive quality
//! controller, and connection lifecycle live here; the capture
//! primitive, image encoder, audio tap, and content enumerator are
//! injected collaborators with narrow trait interfaces.

pub mod args;
pub mod audio;
pub mod capture;
pub mod client;
pub mod config;
pub mod connection;
pub mod controller;
pub mod discovery;
pub mod encode;
pub mod error;
pub mod pipeline;
pub mod protocol;
pub mod server;
pub mod status;
pub mod stream_config;
pub mod web;
pub mod windows_displays;

pub use config::Config;
pub use server::Server;
pub use stream_config::{CaptureTarget, StreamConfig, UserMode};
