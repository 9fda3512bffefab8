//! Inbound STUN Binding-request handling: runs entirely inside the caller's
//! reactor callback for an inbound datagram, synchronously returning the
//! reply bytes (if any) and whatever side effects occurred.

use std::net::SocketAddr;

use stun::attributes::ATTR_FINGERPRINT;
use stun::error_code::{ErrorCodeAttribute, ErrorCode, CODE_BAD_REQUEST, CODE_ROLE_CONFLICT, CODE_UNAUTHORIZED};
use stun::fingerprint::FingerprintAttr;
use stun::integrity::MessageIntegrity;
use stun::message::{Getter, Message, Setter, BINDING_ERROR, BINDING_REQUEST, BINDING_SUCCESS};
use stun::textattrs::{Software, Username};
use stun::xoraddr::XorMappedAddress;

use crate::candidate::pair::CandidatePairState;
use crate::candidate::Candidate;
use crate::checklist::Checklist;
use crate::control::{read_control_attr, PriorityAttr, Role, TieBreaker, UseCandidateAttr};
use crate::error::{Error, Result};

const SOFTWARE_NAME: &str = "rtc-core-ice";

/// Side effects the agent needs to act on after the server processed a
/// request, beyond sending the reply.
#[derive(Debug, PartialEq)]
pub enum ServerEvent {
    /// Nothing beyond the reply (if any).
    None,
    /// A pair just transitioned to Waiting via a triggered check; the
    /// checker should schedule it next.
    Triggered(usize),
    /// The local role just flipped after the peer won a tiebreak.
    RoleFlipped,
    /// The peer nominated this pair and it was already Succeeded.
    Nominated(usize),
}

pub struct StunServer {
    pub local_ufrag: String,
    pub local_pwd: String,
    pub remote_ufrag: Option<String>,
}

impl StunServer {
    pub fn new(local_ufrag: String, local_pwd: String, remote_ufrag: Option<String>) -> Self {
        StunServer {
            local_ufrag,
            local_pwd,
            remote_ufrag,
        }
    }

    /// Processes one inbound datagram against the given checklist, returning
    /// the reply to send (if any) and the resulting side effect.
    ///
    /// `role` and `tie_breaker` are taken by value and `role` may be
    /// overwritten by the caller based on the returned [`ServerEvent`] —
    /// this function never mutates the agent's role itself, since the
    /// caller may need to react to the flip elsewhere (e.g. re-freezing
    /// in-flight checks).
    #[allow(clippy::too_many_arguments)]
    pub fn handle_request(
        &self,
        checklist: &mut Checklist,
        data: &[u8],
        source: SocketAddr,
        component: u16,
        role: Role,
        tie_breaker: TieBreaker,
        retrigger_in_progress: bool,
    ) -> Result<(Option<Vec<u8>>, ServerEvent)> {
        let mut m = Message::new();
        m.unmarshal_binary(data).map_err(Error::Stun)?;

        if m.typ != BINDING_REQUEST {
            return Ok((None, ServerEvent::None));
        }

        // step 1: FINGERPRINT mismatch -> silent drop.
        if FingerprintAttr.check(&m).is_err() {
            return Ok((None, ServerEvent::None));
        }

        // step 2: MESSAGE-INTEGRITY with lpwd.
        let mut integrity = MessageIntegrity::new_short_term_integrity(self.local_pwd.clone());
        if integrity.check(&mut m).is_err() {
            log::debug!("{}", Error::Unauthorized);
            return Ok((
                Some(self.error_response(&m, CODE_UNAUTHORIZED)?),
                ServerEvent::None,
            ));
        }

        // step 3: USERNAME must match lufrag:rufrag.
        if !self.username_matches(&m) {
            log::debug!("{}", Error::Unauthorized);
            return Ok((
                Some(self.error_response(&m, CODE_UNAUTHORIZED)?),
                ServerEvent::None,
            ));
        }

        // step 4: role resolution.
        let (peer_role, peer_tie_breaker) = read_control_attr(&m)?;
        let mut effective_role = role;
        let mut event = ServerEvent::None;
        if peer_role == role {
            if tie_breaker.0 < peer_tie_breaker.0 {
                effective_role = role.flipped();
                event = ServerEvent::RoleFlipped;
            } else {
                return Ok((
                    Some(self.error_response(&m, CODE_ROLE_CONFLICT)?),
                    ServerEvent::None,
                ));
            }
        }

        // step 5: PRIORITY required.
        let priority = match PriorityAttr::get_from(&m) {
            Ok(p) => p,
            Err(_) => {
                log::debug!("{}", Error::MissingPriorityAttribute);
                return Ok((
                    Some(self.error_response(&m, CODE_BAD_REQUEST)?),
                    ServerEvent::None,
                ))
            }
        };

        // step 6/7: resolve remote candidate, then local candidate via an
        // existing pair or any checklist entry for this component.
        let pair_index = self.resolve_pair(checklist, component, source, priority)?;

        // step 8: triggered-check semantics.
        let use_candidate = UseCandidateAttr::is_set(&m);
        let pair = &mut checklist.pairs[pair_index];
        let mut triggered = matches!(
            pair.state,
            CandidatePairState::Frozen | CandidatePairState::Waiting | CandidatePairState::Failed
        );
        // whether an inbound request on an In-Progress pair cancels and
        // retries it is left to a policy knob rather than guessed; default
        // is to leave it alone.
        if !triggered && retrigger_in_progress && pair.state == CandidatePairState::InProgress {
            triggered = true;
        }
        if triggered {
            pair.state = CandidatePairState::Waiting;
        }
        if use_candidate && effective_role == Role::Controlled && pair.state == CandidatePairState::Succeeded {
            pair.nominated = true;
            event = ServerEvent::Nominated(pair_index);
        } else if triggered && matches!(event, ServerEvent::None) {
            event = ServerEvent::Triggered(pair_index);
        }

        // step 9: reply 2xx.
        let reply = self.success_response(&m, source)?;
        Ok((Some(reply), event))
    }

    fn username_matches(&self, m: &Message) -> bool {
        let mut username = Username::default();
        username.attr = stun::attributes::ATTR_USERNAME;
        if username.get_from(m).is_err() {
            return false;
        }
        let expected = match &self.remote_ufrag {
            Some(r) => format!("{}:{}", self.local_ufrag, r),
            None => return username.text.starts_with(&format!("{}:", self.local_ufrag)),
        };
        username.text == expected
    }

    fn resolve_pair(
        &self,
        checklist: &mut Checklist,
        component: u16,
        source: SocketAddr,
        priority: u32,
    ) -> Result<usize> {
        if let Some(i) = checklist
            .pairs
            .iter()
            .position(|p| p.local.component == component && p.remote.address == source)
        {
            return Ok(i);
        }

        let local = checklist
            .pairs
            .iter()
            .find(|p| p.local.component == component)
            .map(|p| p.local.clone())
            .ok_or(Error::UnknownComponent(component))?;

        let remote = Candidate::peer_reflexive(component, source, source).with_priority_override(priority);
        checklist.pairs.push(crate::candidate::pair::CandidatePair::new(local, remote));
        Ok(checklist.pairs.len() - 1)
    }

    fn error_response(&self, request: &Message, code: ErrorCode) -> Result<Vec<u8>> {
        let mut m = Message::new();
        m.typ = BINDING_ERROR;
        m.transaction_id = request.transaction_id;
        let setters: Vec<Box<dyn Setter>> = vec![
            Box::new(ErrorCodeAttribute {
                code,
                reason: Vec::new(),
            }),
            Box::new(FingerprintAttr),
        ];
        m.build(&setters).map_err(Error::Stun)?;
        Ok(m.raw)
    }

    fn success_response(&self, request: &Message, source: SocketAddr) -> Result<Vec<u8>> {
        let mut m = Message::new();
        m.typ = BINDING_SUCCESS;
        m.transaction_id = request.transaction_id;
        let setters: Vec<Box<dyn Setter>> = vec![
            Box::new(XorMappedAddress {
                ip: source.ip(),
                port: source.port(),
            }),
            Box::new(MessageIntegrity::new_short_term_integrity(self.local_pwd.clone())),
            Box::new(FingerprintAttr),
            Box::new(Software::new(stun::attributes::ATTR_SOFTWARE, SOFTWARE_NAME.to_owned())),
        ];
        m.build(&setters).map_err(Error::Stun)?;
        Ok(m.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checklist::Checklist;
    use crate::control::ControlAttr;
    use std::net::SocketAddr;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    /// `username` is as it appears on the wire: `<recipient ufrag>:<sender ufrag>`.
    fn build_request(
        username: &str,
        pwd: &str,
        role: Role,
        tie_breaker: TieBreaker,
        priority: u32,
        use_candidate: bool,
    ) -> Message {
        let mut m = Message::new();
        m.typ = BINDING_REQUEST;
        m.new_transaction_id().unwrap();
        let mut setters: Vec<Box<dyn Setter>> = vec![
            Box::new(Username::new(stun::attributes::ATTR_USERNAME, username.to_owned())),
            Box::new(PriorityAttr(priority)),
            Box::new(ControlAttr { role, tie_breaker }),
        ];
        if use_candidate {
            setters.push(Box::new(UseCandidateAttr));
        }
        setters.push(Box::new(MessageIntegrity::new_short_term_integrity(pwd.to_owned())));
        setters.push(Box::new(FingerprintAttr));
        m.build(&setters).unwrap();
        m
    }

    fn checklist_of_one() -> Checklist {
        let local = Candidate::host(1, addr("10.0.0.1:5000"));
        let remote = Candidate::host(1, addr("10.0.0.2:6000"));
        Checklist::form(&[local], &[remote], Role::Controlling).unwrap()
    }

    #[test]
    fn role_conflict_rejects_equal_role_with_losing_tiebreaker() {
        let mut checklist = checklist_of_one();
        let server = StunServer::new("lfrag".into(), "lpwd".into(), Some("rfrag".into()));
        let request = build_request(
            "lfrag:rfrag",
            "lpwd",
            Role::Controlling,
            TieBreaker(2),
            10,
            false,
        );

        let (reply, event) = server
            .handle_request(&mut checklist, &request.raw, addr("10.0.0.2:6000"), 1, Role::Controlling, TieBreaker(1), false)
            .unwrap();

        assert_eq!(event, ServerEvent::None);
        let mut resp = Message::new();
        resp.unmarshal_binary(&reply.unwrap()).unwrap();
        assert_eq!(resp.typ, BINDING_ERROR);
    }

    #[test]
    fn role_conflict_flips_local_when_local_tiebreaker_is_smaller() {
        let mut checklist = checklist_of_one();
        let server = StunServer::new("lfrag".into(), "lpwd".into(), Some("rfrag".into()));
        let request = build_request(
            "lfrag:rfrag",
            "lpwd",
            Role::Controlling,
            TieBreaker(1),
            10,
            false,
        );

        let (reply, event) = server
            .handle_request(&mut checklist, &request.raw, addr("10.0.0.2:6000"), 1, Role::Controlling, TieBreaker(2), false)
            .unwrap();

        assert_eq!(event, ServerEvent::RoleFlipped);
        let mut resp = Message::new();
        resp.unmarshal_binary(&reply.unwrap()).unwrap();
        assert_eq!(resp.typ, BINDING_SUCCESS);
    }

    #[test]
    fn missing_priority_is_bad_request() {
        let mut checklist = checklist_of_one();
        let server = StunServer::new("lfrag".into(), "lpwd".into(), Some("rfrag".into()));
        let mut m = Message::new();
        m.typ = BINDING_REQUEST;
        m.new_transaction_id().unwrap();
        let setters: Vec<Box<dyn Setter>> = vec![
            Box::new(Username::new(stun::attributes::ATTR_USERNAME, "lfrag:rfrag".to_owned())),
            Box::new(ControlAttr {
                role: Role::Controlled,
                tie_breaker: TieBreaker(1),
            }),
            Box::new(MessageIntegrity::new_short_term_integrity("lpwd".to_owned())),
            Box::new(FingerprintAttr),
        ];
        m.build(&setters).unwrap();

        let (reply, _event) = server
            .handle_request(&mut checklist, &m.raw, addr("10.0.0.2:6000"), 1, Role::Controlling, TieBreaker(1), false)
            .unwrap();

        let mut resp = Message::new();
        resp.unmarshal_binary(&reply.unwrap()).unwrap();
        assert_eq!(resp.typ, BINDING_ERROR);
    }

    #[test]
    fn fingerprint_mismatch_is_silently_dropped() {
        let mut checklist = checklist_of_one();
        let server = StunServer::new("lfrag".into(), "lpwd".into(), Some("rfrag".into()));
        let mut m = build_request("lfrag:rfrag", "lpwd", Role::Controlled, TieBreaker(1), 10, false);
        let last = m.raw.len() - 1;
        m.raw[last] ^= 0xff;

        let (reply, event) = server
            .handle_request(&mut checklist, &m.raw, addr("10.0.0.2:6000"), 1, Role::Controlling, TieBreaker(1), false)
            .unwrap();
        assert!(reply.is_none());
        assert_eq!(event, ServerEvent::None);
    }

    #[test]
    fn in_progress_pair_is_left_alone_unless_retrigger_is_enabled() {
        let mut checklist = checklist_of_one();
        checklist.pairs[0].state = CandidatePairState::InProgress;
        let server = StunServer::new("lfrag".into(), "lpwd".into(), Some("rfrag".into()));
        let request = build_request("lfrag:rfrag", "lpwd", Role::Controlled, TieBreaker(1), 10, false);

        let (_reply, event) = server
            .handle_request(&mut checklist, &request.raw, addr("10.0.0.2:6000"), 1, Role::Controlling, TieBreaker(1), false)
            .unwrap();
        assert_eq!(event, ServerEvent::None);
        assert_eq!(checklist.pairs[0].state, CandidatePairState::InProgress);

        let (_reply, event) = server
            .handle_request(&mut checklist, &request.raw, addr("10.0.0.2:6000"), 1, Role::Controlling, TieBreaker(1), true)
            .unwrap();
        assert_eq!(event, ServerEvent::Triggered(0));
        assert_eq!(checklist.pairs[0].state, CandidatePairState::Waiting);
    }
}
