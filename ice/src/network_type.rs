//! Address-family comparison used by candidate pairing.

use std::net::{IpAddr, SocketAddr};

#[derive(PartialEq, Eq, Debug, Copy, Clone, Hash)]
pub enum NetworkType {
    Udp4,
    Udp6,
}

impl NetworkType {
    pub fn for_addr(addr: &SocketAddr) -> Self {
        match addr.ip() {
            IpAddr::V4(_) => NetworkType::Udp4,
            IpAddr::V6(_) => NetworkType::Udp6,
        }
    }
}
