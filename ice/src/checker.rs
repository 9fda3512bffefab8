//! Connectivity checker: emits STUN Binding requests for Waiting pairs,
//! matches responses against a pending-request table, and applies RFC 8445
//! role-conflict and peer-reflexive-discovery handling. Owns no socket and
//! no timer; the caller feeds it inbound bytes and polls it for outbound
//! bytes and periodic keepalive.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use stun::agent::TransactionId;
use stun::integrity::MessageIntegrity;
use stun::message::{Getter, Message, Setter, BINDING_ERROR, BINDING_REQUEST, BINDING_SUCCESS};
use stun::textattrs::Username;
use stun::xoraddr::XorMappedAddress;

use crate::candidate::pair::CandidatePairState;
use crate::candidate::Candidate;
use crate::checklist::Checklist;
use crate::control::{read_control_attr, ControlAttr, PriorityAttr, Role, TieBreaker, UseCandidateAttr};
use crate::error::{Error, Result};

/// RFC 8445 Appendix B.1's recommended pending-transaction lifetime.
const PENDING_REQUEST_TIMEOUT: Duration = Duration::from_millis(4000);

struct PendingRequest {
    transaction_id: TransactionId,
    destination: SocketAddr,
    pair_index: usize,
    is_nominating: bool,
    sent_at: Instant,
}

/// Outcome of feeding the checker an inbound STUN message.
pub enum CheckEvent {
    /// The pair at this index was just marked Succeeded.
    Succeeded(usize),
    /// The local role just flipped after losing a tiebreak; the pair stays
    /// Waiting and will be retried.
    RoleFlipped,
    /// The pair at this index was marked Failed.
    Failed(usize),
    /// The message wasn't a response to any outstanding request of ours, or
    /// carried no actionable outcome (e.g. a 4xx other than role conflict).
    Ignored,
}

pub struct Checker {
    pub local_ufrag: String,
    pub local_pwd: String,
    pub remote_ufrag: String,
    pub remote_pwd: String,
    pub role: Role,
    pub tie_breaker: TieBreaker,
    pending: Vec<PendingRequest>,
}

impl Checker {
    pub fn new(
        local_ufrag: String,
        local_pwd: String,
        remote_ufrag: String,
        remote_pwd: String,
        role: Role,
        tie_breaker: TieBreaker,
    ) -> Self {
        Checker {
            local_ufrag,
            local_pwd,
            remote_ufrag,
            remote_pwd,
            role,
            tie_breaker,
            pending: Vec::new(),
        }
    }

    /// Picks the highest-priority Waiting pair, moves it to In-Progress, and
    /// returns the Binding request to send plus its destination.
    pub fn poll(&mut self, checklist: &mut Checklist) -> Option<(SocketAddr, Vec<u8>)> {
        let controlling = self.role == Role::Controlling;
        let index = checklist.next_waiting(controlling)?;
        let pair = &mut checklist.pairs[index];
        pair.state = CandidatePairState::InProgress;
        pair.binding_request_count += 1;
        pair.last_activity = Instant::now();
        let destination = pair.remote.address;
        let priority = pair.local.priority();

        let bytes = self
            .build_request(priority, false)
            .expect("binding request encoding cannot fail for well-formed attributes");
        self.record_pending(&bytes, destination, index, false);
        Some((destination, bytes))
    }

    /// Builds and records the nominating Binding request for the selected
    /// pair, issued by the controlling side once.
    pub fn nominate(&mut self, checklist: &mut Checklist, index: usize) -> (SocketAddr, Vec<u8>) {
        let pair = &mut checklist.pairs[index];
        pair.nominated = true;
        pair.last_activity = Instant::now();
        let destination = pair.remote.address;
        let priority = pair.local.priority();

        let bytes = self
            .build_request(priority, true)
            .expect("binding request encoding cannot fail for well-formed attributes");
        self.record_pending(&bytes, destination, index, true);
        (destination, bytes)
    }

    /// Re-sends a Binding request on an already-succeeded pair to keep its
    /// consent fresh (RFC 7675). Returns `Error::UnknownPair` if `index` is
    /// out of range for `checklist`.
    pub fn keepalive(&mut self, checklist: &mut Checklist, index: usize) -> Result<(SocketAddr, Vec<u8>)> {
        let pair = checklist.pairs.get_mut(index).ok_or(Error::UnknownPair)?;
        pair.last_activity = Instant::now();
        let destination = pair.remote.address;
        let priority = pair.local.priority();

        let bytes = self.build_request(priority, false)?;
        self.record_pending(&bytes, destination, index, false);
        Ok((destination, bytes))
    }

    fn build_request(&self, priority: u32, use_candidate: bool) -> Result<Vec<u8>> {
        let mut m = Message::new();
        m.typ = BINDING_REQUEST;
        m.new_transaction_id().map_err(Error::Stun)?;

        let username = format!("{}:{}", self.remote_ufrag, self.local_ufrag);
        let control = ControlAttr {
            role: self.role,
            tie_breaker: self.tie_breaker,
        };

        let mut setters: Vec<Box<dyn Setter>> = vec![
            Box::new(Username::new(stun::attributes::ATTR_USERNAME, username)),
            Box::new(PriorityAttr(priority)),
            Box::new(control),
        ];
        if use_candidate {
            setters.push(Box::new(UseCandidateAttr));
        }
        setters.push(Box::new(MessageIntegrity::new_short_term_integrity(
            self.remote_pwd.clone(),
        )));
        setters.push(Box::new(stun::fingerprint::FINGERPRINT));

        m.build(&setters).map_err(Error::Stun)?;
        Ok(m.raw)
    }

    fn record_pending(&mut self, bytes: &[u8], destination: SocketAddr, pair_index: usize, is_nominating: bool) {
        let mut m = Message::new();
        if m.unmarshal_binary(bytes).is_ok() {
            self.pending.push(PendingRequest {
                transaction_id: m.transaction_id,
                destination,
                pair_index,
                is_nominating,
                sent_at: Instant::now(),
            });
        }
    }

    /// Drops pending requests older than the RFC 8445 timeout, failing their
    /// pairs.
    pub fn expire_pending(&mut self, checklist: &mut Checklist, now: Instant) {
        let mut expired = Vec::new();
        self.pending.retain(|p| {
            if now.duration_since(p.sent_at) >= PENDING_REQUEST_TIMEOUT {
                expired.push(p.pair_index);
                false
            } else {
                true
            }
        });
        for index in expired {
            log::warn!("pair {index}: {}", Error::TransactionTimeout);
            checklist.pairs[index].state = CandidatePairState::Failed;
        }
    }

    /// Handles an inbound STUN message addressed to this checker. Requests
    /// (triggered checks / the peer's own checking) are handled by
    /// [`crate::stun_server`]; this only processes responses to our own
    /// outstanding requests.
    pub fn handle_response(
        &mut self,
        checklist: &mut Checklist,
        data: &[u8],
        source: SocketAddr,
    ) -> Result<CheckEvent> {
        let mut m = Message::new();
        m.unmarshal_binary(data).map_err(Error::Stun)?;

        let Some(pos) = self.pending.iter().position(|p| p.transaction_id == m.transaction_id) else {
            return Ok(CheckEvent::Ignored);
        };

        // RFC 8445 §7.2.5.2.1: the response must arrive from the address the
        // request was sent to.
        if source != self.pending[pos].destination {
            return Ok(CheckEvent::Ignored);
        }
        let pending = self.pending.remove(pos);

        if m.typ == BINDING_SUCCESS {
            let mut mapped = XorMappedAddress::default();
            mapped.get_from(&m).map_err(Error::Stun)?;
            let mapped_addr = SocketAddr::new(mapped.ip, mapped.port);

            let pair = &checklist.pairs[pending.pair_index];
            let local_base = pair.local.base;
            if mapped_addr != local_base {
                let new_local =
                    Candidate::peer_reflexive(pair.local.component, mapped_addr, local_base)
                        .with_foundation_override(pair.local.foundation());
                checklist.pairs[pending.pair_index].local = new_local;
            }
            checklist.mark_valid(pending.pair_index);
            checklist.pairs[pending.pair_index].last_activity = Instant::now();
            if pending.is_nominating {
                checklist.pairs[pending.pair_index].nominated = true;
            }
            return Ok(CheckEvent::Succeeded(pending.pair_index));
        }

        if m.typ == BINDING_ERROR {
            let (_peer_role, peer_tie_breaker) = match read_control_attr(&m) {
                Ok(v) => v,
                Err(_) => {
                    checklist.pairs[pending.pair_index].state = CandidatePairState::Failed;
                    return Ok(CheckEvent::Failed(pending.pair_index));
                }
            };

            if is_role_conflict(&m) {
                // we lose the tiebreak if our value is not strictly greater.
                if !(self.tie_breaker.0 > peer_tie_breaker.0) {
                    log::debug!("{}", Error::RoleConflict);
                    self.role = self.role.flipped();
                }
                checklist.pairs[pending.pair_index].state = CandidatePairState::Waiting;
                return Ok(CheckEvent::RoleFlipped);
            }

            checklist.pairs[pending.pair_index].state = CandidatePairState::Failed;
            return Ok(CheckEvent::Failed(pending.pair_index));
        }

        Ok(CheckEvent::Ignored)
    }
}

fn is_role_conflict(m: &Message) -> bool {
    use stun::error_code::ErrorCodeAttribute;
    let mut attr = ErrorCodeAttribute::default();
    attr.get_from(m).map(|_| attr.code.0 == 487).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::Candidate;
    use std::net::SocketAddr;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    fn checklist_of_one() -> Checklist {
        let local = Candidate::host(1, addr("10.0.0.1:5000"));
        let remote = Candidate::host(1, addr("10.0.0.2:6000"));
        Checklist::form(&[local], &[remote], Role::Controlling).unwrap()
    }

    #[test]
    fn poll_emits_a_binding_request_for_the_waiting_pair() {
        let mut checklist = checklist_of_one();
        let mut checker = Checker::new(
            "lfrag".into(),
            "lpwd".into(),
            "rfrag".into(),
            "rpwd".into(),
            Role::Controlling,
            TieBreaker(1),
        );

        let (dest, bytes) = checker.poll(&mut checklist).expect("a waiting pair exists");
        assert_eq!(dest, addr("10.0.0.2:6000"));
        assert!(stun::message::is_message(&bytes));
        assert_eq!(checklist.pairs[0].state, CandidatePairState::InProgress);
    }

    #[test]
    fn unmatched_response_is_ignored() {
        let mut checklist = checklist_of_one();
        let mut checker = Checker::new(
            "lfrag".into(),
            "lpwd".into(),
            "rfrag".into(),
            "rpwd".into(),
            Role::Controlling,
            TieBreaker(1),
        );
        let mut m = Message::new();
        m.typ = BINDING_SUCCESS;
        m.new_transaction_id().unwrap();
        m.build(&[]).unwrap();

        let event = checker
            .handle_response(&mut checklist, &m.raw, addr("10.0.0.2:6000"))
            .unwrap();
        assert!(matches!(event, CheckEvent::Ignored));
    }

    #[test]
    fn response_from_unexpected_source_is_ignored() {
        let mut checklist = checklist_of_one();
        let mut checker = Checker::new(
            "lfrag".into(),
            "lpwd".into(),
            "rfrag".into(),
            "rpwd".into(),
            Role::Controlling,
            TieBreaker(1),
        );
        let (_dest, request) = checker.poll(&mut checklist).unwrap();
        let mut sent = Message::new();
        sent.unmarshal_binary(&request).unwrap();

        let mut response = Message::new();
        response.typ = BINDING_SUCCESS;
        response.transaction_id = sent.transaction_id;
        response
            .build(&[Box::new(XorMappedAddress {
                ip: addr("10.0.0.2:6000").ip(),
                port: 6000,
            })])
            .unwrap();

        let event = checker
            .handle_response(&mut checklist, &response.raw, addr("203.0.113.9:1"))
            .unwrap();
        assert!(matches!(event, CheckEvent::Ignored));
        assert_eq!(checklist.pairs[0].state, CandidatePairState::InProgress);
    }
}
