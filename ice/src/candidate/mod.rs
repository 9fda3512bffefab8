//! The ICE candidate model.

pub mod pair;

use std::fmt;
use std::net::SocketAddr;

use crc::{Crc, CRC_32_ISCSI};

use crate::network_type::NetworkType;

#[derive(PartialEq, Eq, Debug, Copy, Clone, Hash)]
pub enum CandidateType {
    Host,
    ServerReflexive,
    PeerReflexive,
    Relay,
}

impl CandidateType {
    /// `type_prio` from the candidate priority formula.
    fn type_preference(self) -> u32 {
        match self {
            CandidateType::Host => 126,
            CandidateType::PeerReflexive => 110,
            CandidateType::ServerReflexive => 100,
            CandidateType::Relay => 0,
        }
    }
}

impl fmt::Display for CandidateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CandidateType::Host => "host",
            CandidateType::ServerReflexive => "srflx",
            CandidateType::PeerReflexive => "prflx",
            CandidateType::Relay => "relay",
        };
        write!(f, "{s}")
    }
}

/// A single local or remote ICE candidate.
///
/// `base` is the candidate's own address for host candidates, and the local
/// source address it was derived from for reflexive/relay candidates — it is
/// what pruning compares on.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub candidate_type: CandidateType,
    pub component: u16,
    pub address: SocketAddr,
    pub base: SocketAddr,
    pub network_type: NetworkType,
    pub local_preference: u16,
    foundation_override: Option<String>,
    priority_override: Option<u32>,
}

impl Candidate {
    pub fn host(component: u16, address: SocketAddr) -> Self {
        Candidate {
            candidate_type: CandidateType::Host,
            component,
            address,
            base: address,
            network_type: NetworkType::for_addr(&address),
            local_preference: 65535,
            foundation_override: None,
            priority_override: None,
        }
    }

    pub fn server_reflexive(component: u16, address: SocketAddr, base: SocketAddr) -> Self {
        Candidate {
            candidate_type: CandidateType::ServerReflexive,
            component,
            address,
            base,
            network_type: NetworkType::for_addr(&address),
            local_preference: 65535,
            foundation_override: None,
            priority_override: None,
        }
    }

    pub fn peer_reflexive(component: u16, address: SocketAddr, base: SocketAddr) -> Self {
        Candidate {
            candidate_type: CandidateType::PeerReflexive,
            component,
            address,
            base,
            network_type: NetworkType::for_addr(&address),
            local_preference: 65535,
            foundation_override: None,
            priority_override: None,
        }
    }

    pub fn relay(component: u16, address: SocketAddr, base: SocketAddr) -> Self {
        Candidate {
            candidate_type: CandidateType::Relay,
            component,
            address,
            base,
            network_type: NetworkType::for_addr(&address),
            local_preference: 65535,
            foundation_override: None,
            priority_override: None,
        }
    }

    /// `type_prio<<24 | local_pref<<8 | (256 − compid)`.
    pub fn priority(&self) -> u32 {
        if let Some(p) = self.priority_override {
            return p;
        }
        (self.candidate_type.type_preference() << 24)
            | ((self.local_preference as u32) << 8)
            | (256 - self.component as u32)
    }

    /// Pins a candidate's priority to a value announced by the remote peer
    /// rather than one this side computed: a peer-reflexive remote candidate
    /// is created with the announced PRIORITY, not a locally-derived one.
    pub fn with_priority_override(mut self, priority: u32) -> Self {
        self.priority_override = Some(priority);
        self
    }

    /// Opaque grouping key shared by candidates with the same type, base,
    /// and network.
    pub fn foundation(&self) -> String {
        if let Some(f) = &self.foundation_override {
            return f.clone();
        }
        let mut buf = Vec::new();
        buf.extend_from_slice(self.candidate_type.to_string().as_bytes());
        buf.extend_from_slice(self.base.ip().to_string().as_bytes());
        buf.push(match self.network_type {
            NetworkType::Udp4 | NetworkType::Udp6 => b'u',
        });
        let checksum = Crc::<u32>::new(&CRC_32_ISCSI).checksum(&buf);
        format!("{checksum}")
    }

    /// Used by peer-reflexive discovery to pin a candidate's foundation so
    /// it doesn't change if its base is later reinterpreted.
    pub fn with_foundation_override(mut self, foundation: String) -> Self {
        self.foundation_override = Some(foundation);
        self
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} comp={} {} (base {})",
            self.candidate_type, self.component, self.address, self.base
        )
    }
}
