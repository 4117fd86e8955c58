//! Stateful, incremental framed-packet decoder.
//!
//! Mirrors a classic length-prefixed TCP frame decoder: bytes are
//! appended to an internal buffer as they arrive and `next_packet` is
//! called in a loop to drain whatever complete packets are available,
//! leaving partial trailing data in the buffer for the next read.

use super::{
    AudioInfoJson, Packet, SettingsJson, StatusJson, WindowsDisplaysResponse, C2S_TAGS,
    MAX_PACKET_LEN, S2C_TAGS, TAG_ACK, TAG_AUDIO, TAG_REQUEST_WINDOWS_DISPLAYS, TAG_SETTINGS,
    TAG_WINDOWS_DISPLAYS_RESPONSE,
};
use crate::error::ProtocolError;
use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ServerToClient,
    ClientToServer,
}

impl Direction {
    fn tag_set(self) -> [u8; 3] {
        match self {
            Direction::ServerToClient => S2C_TAGS,
            Direction::ClientToServer => C2S_TAGS,
        }
    }
}

/// What happened when draining one packet off the buffer.
pub enum Decoded {
    /// A well-formed packet.
    Packet(Packet),
    /// The packet's bytes were consumed but its payload was malformed
    /// (bad JSON, an out-of-range field). The stream position is still
    /// valid; the caller should log-and-continue, counting this toward
    /// the two-consecutive-malformed-packets close rule.
    Malformed(String),
}

pub struct FrameDecoder {
    buf: Vec<u8>,
    direction: Direction,
}

impl FrameDecoder {
    pub fn new(direction: Direction) -> Self {
        Self { buf: Vec::with_capacity(8192), direction }
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Extract and decode the next complete packet, if the buffer holds
    /// one. Returns `Ok(None)` when more bytes are needed. A
    /// [`ProtocolError::BudgetExceeded`] means the stream is
    /// structurally unrecoverable and the connection must close.
    pub fn next_packet(&mut self) -> Result<Option<Decoded>, ProtocolError> {
        if self.buf.is_empty() {
            return Ok(None);
        }
        let first = self.buf[0];
        if first == TAG_ACK {
            self.buf.drain(..1);
            return Ok(Some(Decoded::Packet(Packet::Ack)));
        }
        if self.direction.tag_set().contains(&first) && first != TAG_ACK {
            match first {
                TAG_AUDIO => self.decode_audio(),
                TAG_WINDOWS_DISPLAYS_RESPONSE => self.decode_windows_displays_response(),
                TAG_REQUEST_WINDOWS_DISPLAYS => self.decode_request_windows_displays(),
                TAG_SETTINGS => self.decode_settings(),
                _ => unreachable!("tag_set() only yields known tags"),
            }
        } else {
            self.decode_video_frame()
        }
    }

    fn decode_video_frame(&mut self) -> Result<Option<Decoded>, ProtocolError> {
        if self.buf.len() < 4 + 1 {
            return Ok(None);
        }
        let image_len = u32::from_be_bytes(self.buf[0..4].try_into().unwrap()) as usize;
        check_budget(image_len)?;
        let status_len = self.buf[4] as usize;
        let header = 4 + 1;
        let total = header + status_len + image_len;
        check_budget(total)?;
        if self.buf.len() < total {
            return Ok(None);
        }
        let status_bytes = self.buf[header..header + status_len].to_vec();
        let image = self.buf[header + status_len..total].to_vec();
        self.buf.drain(..total);

        match serde_json::from_slice::<StatusJson>(&status_bytes) {
            Ok(status) => Ok(Some(Decoded::Packet(Packet::VideoFrame { status, image }))),
            Err(err) => {
                debug!("video frame status JSON malformed: {}", err);
                Ok(Some(Decoded::Malformed(format!("status json: {}", err))))
            }
        }
    }

    fn decode_audio(&mut self) -> Result<Option<Decoded>, ProtocolError> {
        // tag(1) + info_len(2) + audio_len(4)
        if self.buf.len() < 1 + 2 + 4 {
            return Ok(None);
        }
        let info_len = u16::from_be_bytes(self.buf[1..3].try_into().unwrap()) as usize;
        let audio_len = u32::from_be_bytes(self.buf[3..7].try_into().unwrap()) as usize;
        let header = 1 + 2 + 4;
        let total = header + info_len + audio_len;
        check_budget(total)?;
        if self.buf.len() < total {
            return Ok(None);
        }
        let info_bytes = self.buf[header..header + info_len].to_vec();
        let samples = self.buf[header + info_len..total].to_vec();
        self.buf.drain(..total);

        match serde_json::from_slice::<AudioInfoJson>(&info_bytes) {
            Ok(info) => Ok(Some(Decoded::Packet(Packet::AudioPacket { info, samples }))),
            Err(err) => {
                debug!("audio info JSON malformed: {}", err);
                Ok(Some(Decoded::Malformed(format!("audio info json: {}", err))))
            }
        }
    }

    fn decode_windows_displays_response(&mut self) -> Result<Option<Decoded>, ProtocolError> {
        let (body, total) = match self.read_tagged_body(1 + 4)? {
            Some(v) => v,
            None => return Ok(None),
        };
        let _ = total;
        match serde_json::from_slice::<WindowsDisplaysResponse>(&body) {
            Ok(resp) => Ok(Some(Decoded::Packet(Packet::WindowsDisplaysResponse(resp)))),
            Err(err) => {
                debug!("windows/displays response JSON malformed: {}", err);
                Ok(Some(Decoded::Malformed(format!("windows/displays json: {}", err))))
            }
        }
    }

    fn decode_request_windows_displays(&mut self) -> Result<Option<Decoded>, ProtocolError> {
        let (body, _total) = match self.read_tagged_body(1 + 4)? {
            Some(v) => v,
            None => return Ok(None),
        };
        match serde_json::from_slice::<serde_json::Value>(&body) {
            Ok(_) => Ok(Some(Decoded::Packet(Packet::RequestWindowsDisplays))),
            Err(err) => {
                debug!("request-windows-displays JSON malformed: {}", err);
                Ok(Some(Decoded::Malformed(format!("request json: {}", err))))
            }
        }
    }

    fn decode_settings(&mut self) -> Result<Option<Decoded>, ProtocolError> {
        let (body, _total) = match self.read_tagged_body(1 + 4)? {
            Some(v) => v,
            None => return Ok(None),
        };
        match serde_json::from_slice::<SettingsJson>(&body) {
            Ok(settings) => Ok(Some(Decoded::Packet(Packet::Settings(settings)))),
            Err(err) => {
                debug!("settings JSON malformed: {}", err);
                Ok(Some(Decoded::Malformed(format!("settings json: {}", err))))
            }
        }
    }

    /// Shared helper for the `tag(1) + u32 body_len + body` packets.
    fn read_tagged_body(&mut self, header: usize) -> Result<Option<(Vec<u8>, usize)>, ProtocolError> {
        if self.buf.len() < header {
            return Ok(None);
        }
        let body_len = u32::from_be_bytes(self.buf[1..5].try_into().unwrap()) as usize;
        let total = header + body_len;
        check_budget(total)?;
        if self.buf.len() < total {
            return Ok(None);
        }
        let body = self.buf[header..total].to_vec();
        self.buf.drain(..total);
        Ok(Some((body, total)))
    }

    pub fn take_remaining(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }
}

fn check_budget(len: usize) -> Result<(), ProtocolError> {
    if len > MAX_PACKET_LEN {
        return Err(ProtocolError::BudgetExceeded(len));
    }
    Ok(())
}

/// Encode the S->C video-frame packet: untagged, `u32 image_len · u8
/// status_len · status · image`.
pub fn encode_video_frame(status: &StatusJson, image: &[u8]) -> Vec<u8> {
    let status_bytes = serde_json::to_vec(status).expect("StatusJson always serializes");
    debug_assert!(status_bytes.len() <= u8::MAX as usize);
    let mut out = Vec::with_capacity(4 + 1 + status_bytes.len() + image.len());
    out.extend_from_slice(&(image.len() as u32).to_be_bytes());
    out.push(status_bytes.len() as u8);
    out.extend_from_slice(&status_bytes);
    out.extend_from_slice(image);
    out
}

/// Encode the S->C audio packet (`0xFA`).
pub fn encode_audio_packet(info: &AudioInfoJson, samples: &[u8]) -> Vec<u8> {
    let info_bytes = serde_json::to_vec(info).expect("AudioInfoJson always serializes");
    debug_assert!(info_bytes.len() <= u16::MAX as usize);
    let mut out = Vec::with_capacity(1 + 2 + 4 + info_bytes.len() + samples.len());
    out.push(TAG_AUDIO);
    out.extend_from_slice(&(info_bytes.len() as u16).to_be_bytes());
    out.extend_from_slice(&(samples.len() as u32).to_be_bytes());
    out.extend_from_slice(&info_bytes);
    out.extend_from_slice(samples);
    out
}

/// Encode the S->C windows/displays response (`0xFD`).
pub fn encode_windows_displays_response(resp: &WindowsDisplaysResponse) -> Vec<u8> {
    let body = serde_json::to_vec(resp).expect("WindowsDisplaysResponse always serializes");
    tagged_u32(TAG_WINDOWS_DISPLAYS_RESPONSE, &body)
}

/// Encode the C->S request-windows-displays packet (`0xFE`).
pub fn encode_request_windows_displays() -> Vec<u8> {
    let body = serde_json::to_vec(&serde_json::json!({"action": "getWindowsDisplays"}))
        .expect("static json always serializes");
    tagged_u32(TAG_REQUEST_WINDOWS_DISPLAYS, &body)
}

/// Encode the C->S settings update packet (`0xFF`).
pub fn encode_settings(settings: &SettingsJson) -> Vec<u8> {
    let body = serde_json::to_vec(settings).expect("SettingsJson always serializes");
    tagged_u32(TAG_SETTINGS, &body)
}

/// Encode the ack packet (`0x01`), either direction.
pub fn encode_ack() -> Vec<u8> {
    vec![TAG_ACK]
}

fn tagged_u32(tag: u8, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + 4 + body.len());
    out.push(tag);
    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
    out.extend_from_slice(body);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::pad_image;

    fn sample_status() -> StatusJson {
        StatusJson { fps: 30, quality: 50, latency: 12, audio_enabled: true, audio_latency: 12 }
    }

    #[test]
    fn video_frame_roundtrip() {
        let status = sample_status();
        let image = pad_image(b"fake-jpeg-bytes".to_vec());
        let framed = encode_video_frame(&status, &image);

        let mut dec = FrameDecoder::new(Direction::ServerToClient);
        dec.extend(&framed);
        match dec.next_packet().unwrap().unwrap() {
            Decoded::Packet(Packet::VideoFrame { status: s, image: img }) => {
                assert_eq!(s.fps, status.fps);
                assert_eq!(img, image);
            }
            _ => panic!("expected video frame"),
        }
        assert!(dec.next_packet().unwrap().is_none());
    }

    #[test]
    fn audio_packet_roundtrip() {
        let info = AudioInfoJson::new(48_000, 2, 960, 0.8, 1.5);
        let samples = vec![0u8; 3840];
        let framed = encode_audio_packet(&info, &samples);

        let mut dec = FrameDecoder::new(Direction::ServerToClient);
        dec.extend(&framed);
        match dec.next_packet().unwrap().unwrap() {
            Decoded::Packet(Packet::AudioPacket { info: i, samples: s }) => {
                assert_eq!(i.sample_rate, 48_000.0);
                assert_eq!(s.len(), 3840);
            }
            _ => panic!("expected audio packet"),
        }
    }

    #[test]
    fn control_response_roundtrip() {
        let resp = WindowsDisplaysResponse::default();
        let framed = encode_windows_displays_response(&resp);
        let mut dec = FrameDecoder::new(Direction::ServerToClient);
        dec.extend(&framed);
        match dec.next_packet().unwrap().unwrap() {
            Decoded::Packet(Packet::WindowsDisplaysResponse(r)) => {
                assert!(r.windows.is_empty() && r.displays.is_empty());
            }
            _ => panic!("expected windows/displays response"),
        }
    }

    #[test]
    fn ack_roundtrip_both_directions() {
        for dir in [Direction::ServerToClient, Direction::ClientToServer] {
            let mut dec = FrameDecoder::new(dir);
            dec.extend(&encode_ack());
            assert!(matches!(dec.next_packet().unwrap().unwrap(), Decoded::Packet(Packet::Ack)));
        }
    }

    #[test]
    fn settings_roundtrip() {
        let settings = SettingsJson { streaming_mode: Some("Balanced".into()), ..Default::default() };
        let framed = encode_settings(&settings);
        let mut dec = FrameDecoder::new(Direction::ClientToServer);
        dec.extend(&framed);
        match dec.next_packet().unwrap().unwrap() {
            Decoded::Packet(Packet::Settings(s)) => {
                assert_eq!(s.streaming_mode.as_deref(), Some("Balanced"));
            }
            _ => panic!("expected settings"),
        }
    }

    /// Tag disambiguation: for random frame sizes >= MIN_IMAGE_LEN, the
    /// length prefix's high byte never collides with a tag in use on
    /// the same direction.
    #[test]
    fn tag_disambiguation_holds_for_varying_sizes() {
        let mut state = 0x243F6A8885A308D3u64; // fixed seed, deterministic
        let mut next = || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state
        };
        for _ in 0..500 {
            let extra = (next() % 200_000) as usize;
            let size = super::super::MIN_IMAGE_LEN + extra;
            let image = pad_image(vec![0u8; size]);
            let framed = encode_video_frame(&sample_status(), &image);
            let first = framed[0];
            assert!(
                !super::super::S2C_TAGS.contains(&first),
                "image_len high byte {} collided with a tag for size {}",
                first,
                size
            );

            let mut dec = FrameDecoder::new(Direction::ServerToClient);
            dec.extend(&framed);
            assert!(matches!(
                dec.next_packet().unwrap().unwrap(),
                Decoded::Packet(Packet::VideoFrame { .. })
            ));
        }
    }

    #[test]
    fn parser_recovers_from_byte_level_fragmentation() {
        let status = sample_status();
        let image = pad_image(b"payload".to_vec());
        let video = encode_video_frame(&status, &image);
        let audio = encode_audio_packet(&AudioInfoJson::new(48_000, 2, 10, 0.5, 0.0), &[1, 2, 3, 4]);
        let mut combined = video.clone();
        combined.extend_from_slice(&audio);

        let mut dec = FrameDecoder::new(Direction::ServerToClient);
        let mut decoded = Vec::new();
        for &byte in &combined {
            dec.extend(&[byte]);
            while let Some(d) = dec.next_packet().unwrap() {
                decoded.push(d);
            }
        }
        assert_eq!(decoded.len(), 2);
        assert!(matches!(decoded[0], Decoded::Packet(Packet::VideoFrame { .. })));
        assert!(matches!(decoded[1], Decoded::Packet(Packet::AudioPacket { .. })));
    }

    #[test]
    fn malformed_status_json_is_discarded_not_fatal() {
        let image = pad_image(b"img".to_vec());
        let mut out = Vec::new();
        out.extend_from_slice(&(image.len() as u32).to_be_bytes());
        let bad_status = b"{not json";
        out.push(bad_status.len() as u8);
        out.extend_from_slice(bad_status);
        out.extend_from_slice(&image);

        let mut dec = FrameDecoder::new(Direction::ServerToClient);
        dec.extend(&out);
        match dec.next_packet().unwrap().unwrap() {
            Decoded::Malformed(_) => {}
            _ => panic!("expected malformed"),
        }
        assert!(dec.next_packet().unwrap().is_none());
    }

    #[test]
    fn budget_exceeded_is_protocol_violation() {
        let mut out = Vec::new();
        out.extend_from_slice(&((MAX_PACKET_LEN as u32) + 1).to_be_bytes());
        out.push(0);
        let mut dec = FrameDecoder::new(Direction::ServerToClient);
        dec.extend(&out);
        assert!(matches!(dec.next_packet(), Err(ProtocolError::BudgetExceeded(_))));
    }
}
