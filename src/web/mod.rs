//! Minimal read-only HTTP status endpoint (§7 "user-visible surface").

pub mod http_server;
pub use http_server::run_status_server;
