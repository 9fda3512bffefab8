//! ICE candidate model, checklist formation/pruning, the connectivity
//! checker, and an embedded STUN server. This core owns no socket and no
//! timer; the embedding application supplies both and drives
//! [`agent::Agent`] with inbound datagrams and periodic ticks.

pub mod agent;
pub mod candidate;
pub mod checker;
pub mod checklist;
pub mod control;
pub mod error;
pub mod network_type;
pub mod stun_server;

pub use agent::{Agent, AgentConfig};
pub use candidate::{Candidate, CandidateType};
pub use control::Role;
pub use error::Error;
