//! Wire protocol: packet types, JSON envelopes, and the framed codec.
//!
//! All multi-byte integer lengths on the wire are big-endian. See
//! `codec` for the stateful decoder that turns a byte stream into
//! `Packet` values.

pub mod codec;

use serde::{Deserialize, Serialize};

/// Minimum video image length, padded if necessary, so that the first
/// byte of `image_len` (big-endian `u32`) never collides with a tag
/// byte in use on the same direction of the stream.
pub const MIN_IMAGE_LEN: usize = 256;

/// Receive budget: a length prefix beyond this is a protocol violation.
pub const MAX_PACKET_LEN: usize = 1_500_000;

pub const TAG_AUDIO: u8 = 0xFA;
pub const TAG_WINDOWS_DISPLAYS_RESPONSE: u8 = 0xFD;
pub const TAG_REQUEST_WINDOWS_DISPLAYS: u8 = 0xFE;
pub const TAG_SETTINGS: u8 = 0xFF;
pub const TAG_ACK: u8 = 0x01;

/// Tag bytes meaningful on the server->client direction.
pub const S2C_TAGS: [u8; 3] = [TAG_ACK, TAG_AUDIO, TAG_WINDOWS_DISPLAYS_RESPONSE];
/// Tag bytes meaningful on the client->server direction.
pub const C2S_TAGS: [u8; 3] = [TAG_ACK, TAG_REQUEST_WINDOWS_DISPLAYS, TAG_SETTINGS];

/// Status JSON sent alongside every video frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusJson {
    pub fps: i32,
    pub quality: i32,
    pub latency: i32,
    #[serde(rename = "audioEnabled")]
    pub audio_enabled: bool,
    #[serde(rename = "audioLatency")]
    pub audio_latency: i32,
}

/// Info JSON sent alongside every audio packet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioInfoJson {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "sampleRate")]
    pub sample_rate: f64,
    pub channels: i32,
    pub samples: i32,
    pub timestamp: f64,
    pub quality: f64,
    pub format: String,
}

impl AudioInfoJson {
    pub fn new(sample_rate: u32, channels: u16, samples: usize, quality: f32, timestamp: f64) -> Self {
        Self {
            kind: "audio".to_string(),
            sample_rate: sample_rate as f64,
            channels: channels as i32,
            samples: samples as i32,
            timestamp,
            quality: quality as f64,
            format: "int16".to_string(),
        }
    }
}

/// Settings update, client -> server (`0xFF`). Every field is optional;
/// an absent field leaves the corresponding setting unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsJson {
    #[serde(rename = "streamingMode")]
    pub streaming_mode: Option<String>,
    #[serde(rename = "preferredFPS")]
    pub preferred_fps: Option<i32>,
    #[serde(rename = "preferredQuality")]
    pub preferred_quality: Option<i32>,
    #[serde(rename = "captureSource")]
    pub capture_source: Option<String>,
    #[serde(rename = "selectedWindowId")]
    pub selected_window_id: Option<u32>,
    #[serde(rename = "selectedDisplayId")]
    pub selected_display_id: Option<u32>,
    #[serde(rename = "audioEnabled")]
    pub audio_enabled: Option<bool>,
    #[serde(rename = "audioQuality")]
    pub audio_quality: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowInfo {
    pub id: u32,
    pub title: String,
    #[serde(rename = "ownerName")]
    pub owner_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayInfo {
    pub id: u32,
    pub name: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WindowsDisplaysResponse {
    pub windows: Vec<WindowInfo>,
    pub displays: Vec<DisplayInfo>,
}

/// A single decoded packet from the byte stream, in either direction.
#[derive(Debug, Clone)]
pub enum Packet {
    /// S->C, untagged.
    VideoFrame { status: StatusJson, image: Vec<u8> },
    /// S->C, `0xFA`.
    AudioPacket { info: AudioInfoJson, samples: Vec<u8> },
    /// S->C, `0xFD`.
    WindowsDisplaysResponse(WindowsDisplaysResponse),
    /// C->S, `0xFE`.
    RequestWindowsDisplays,
    /// C->S, `0xFF`.
    Settings(SettingsJson),
    /// Either direction, `0x01`.
    Ack,
}

/// Pad an encoded image up to [`MIN_IMAGE_LEN`] bytes so its length
/// prefix's high byte can never be mistaken for a tag byte. Padding is
/// appended; consumers that care about exact JPEG boundaries use the
/// length embedded in the JPEG stream itself, not the padded length.
pub fn pad_image(mut image: Vec<u8>) -> Vec<u8> {
    if image.len() < MIN_IMAGE_LEN {
        image.resize(MIN_IMAGE_LEN, 0);
    }
    image
}
