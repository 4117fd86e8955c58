//! LAN service discovery (§6): advertise `_macmirror._tcp` on the
//! server, browse for it on the client.

use log::{info, warn};
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use std::net::IpAddr;
use std::time::Duration;

const SERVICE_TYPE: &str = "_macmirror._tcp.local.";
const BROWSE_TIMEOUT: Duration = Duration::from_secs(5);

/// A discovered candidate endpoint, from the client's browse.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub host: String,
    pub port: u16,
}

/// Server-side advertiser. Dropping it withdraws the advertisement.
pub struct Advertiser {
    daemon: ServiceDaemon,
    fullname: String,
}

impl Advertiser {
    /// Advertise on `port`. `background` selects the instance name
    /// variant (§6).
    pub fn advertise(port: u16, background: bool) -> Result<Self, mdns_sd::Error> {
        let daemon = ServiceDaemon::new()?;
        let instance_name = if background { "Mac Screen (Background)" } else { "Mac Screen" };
        let host_name = format!("{}.local.", hostname());
        let ip = local_ip_v4();

        let service = ServiceInfo::new(
            SERVICE_TYPE,
            instance_name,
            &host_name,
            ip.as_deref().unwrap_or(""),
            port,
            None,
        )?;
        daemon.register(service.clone())?;
        info!("advertising {} on port {}", instance_name, port);
        Ok(Self { daemon, fullname: service.get_fullname().to_string() })
    }

    /// Re-publish after a listener restart (§6).
    pub fn republish(&self, port: u16, background: bool) -> Result<(), mdns_sd::Error> {
        let _ = self.daemon.unregister(&self.fullname);
        let instance_name = if background { "Mac Screen (Background)" } else { "Mac Screen" };
        let host_name = format!("{}.local.", hostname());
        let ip = local_ip_v4();
        let service =
            ServiceInfo::new(SERVICE_TYPE, instance_name, &host_name, ip.as_deref().unwrap_or(""), port, None)?;
        self.daemon.register(service)?;
        Ok(())
    }
}

impl Drop for Advertiser {
    fn drop(&mut self) {
        let _ = self.daemon.unregister(&self.fullname);
        let _ = self.daemon.shutdown();
    }
}

/// Client-side browser: one-shot scan for available candidates.
pub struct Browser {
    daemon: ServiceDaemon,
}

impl Browser {
    pub fn new() -> Result<Self, mdns_sd::Error> {
        Ok(Self { daemon: ServiceDaemon::new()? })
    }

    pub fn browse(&self) -> Result<Vec<Candidate>, mdns_sd::Error> {
        let receiver = self.daemon.browse(SERVICE_TYPE)?;
        let mut candidates = Vec::new();
        let deadline = std::time::Instant::now() + BROWSE_TIMEOUT;
        loop {
            let remaining = match deadline.checked_duration_since(std::time::Instant::now()) {
                Some(d) if !d.is_zero() => d,
                _ => break,
            };
            match receiver.recv_timeout(remaining) {
                Ok(ServiceEvent::ServiceResolved(info)) => {
                    if let Some(addr) = info.get_addresses().iter().next() {
                        candidates.push(Candidate { host: addr.to_string(), port: info.get_port() });
                    }
                }
                Ok(_) => continue,
                Err(_) => break,
            }
        }
        let _ = self.daemon.stop_browse(SERVICE_TYPE);
        if candidates.is_empty() {
            warn!("no MacMirror servers found on the local network");
        }
        Ok(candidates)
    }
}

impl Drop for Browser {
    fn drop(&mut self) {
        let _ = self.daemon.shutdown();
    }
}

fn hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "macmirror-host".to_string())
}

fn local_ip_v4() -> Option<String> {
    use std::net::UdpSocket;
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(ip) => Some(ip.to_string()),
        IpAddr::V6(_) => None,
    }
}
