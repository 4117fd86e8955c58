//! Image compression. The actual compressor is an injected
//! collaborator (§6); this module defines the interface it must
//! satisfy and a default `turbojpeg`-backed implementation.

pub mod encoder;
pub use encoder::{encode_jpeg, JpegEncoder};
