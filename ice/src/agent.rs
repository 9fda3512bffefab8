//! Top-level ICE media agent: owns the checklist, checker, and STUN server
//! for a single media component set, and exposes the `icem_*`-shaped
//! interface the application drives. No async/Send/Sync scaffolding, since
//! this core owns no socket or timer.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::candidate::pair::CandidatePairState;
use crate::candidate::Candidate;
use crate::checker::{CheckEvent, Checker};
use crate::checklist::{Checklist, ChecklistState};
use crate::control::{Role, TieBreaker};
use crate::error::{Error, Result};
use crate::stun_server::{ServerEvent, StunServer};

/// Fired once per component when its checklist concludes.
pub type OnCompleteHdlrFn = Box<dyn FnMut(Role, std::result::Result<(), Error>)>;

/// RFC 7675's consent-freshness interval: how long a selected pair may sit
/// quiet before `Agent::on_tick` re-pings it.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(2);

pub struct AgentConfig {
    pub role: Role,
    pub tie_breaker: TieBreaker,
    pub local_ufrag: String,
    pub local_pwd: String,
    pub remote_ufrag: String,
    pub remote_pwd: String,
    /// Whether an inbound Binding request retriggers a pair that is
    /// currently In-Progress; default false (do not disturb in-flight
    /// checks).
    pub retrigger_in_progress: bool,
}

pub struct Agent {
    role: Role,
    tie_breaker: TieBreaker,
    local_candidates: Vec<Candidate>,
    remote_candidates: Vec<Candidate>,
    checklist: Option<Checklist>,
    checker: Checker,
    server: StunServer,
    retrigger_in_progress: bool,
    selected: Vec<Option<usize>>,
    on_complete: Option<OnCompleteHdlrFn>,
    concluded: bool,
}

impl Agent {
    /// `icem_alloc`.
    pub fn new(config: AgentConfig) -> Self {
        let checker = Checker::new(
            config.local_ufrag.clone(),
            config.local_pwd.clone(),
            config.remote_ufrag.clone(),
            config.remote_pwd.clone(),
            config.role,
            config.tie_breaker,
        );
        let server = StunServer::new(
            config.local_ufrag.clone(),
            config.local_pwd.clone(),
            Some(config.remote_ufrag.clone()),
        );
        Agent {
            role: config.role,
            tie_breaker: config.tie_breaker,
            local_candidates: Vec::new(),
            remote_candidates: Vec::new(),
            checklist: None,
            checker,
            server,
            retrigger_in_progress: config.retrigger_in_progress,
            selected: Vec::new(),
            on_complete: None,
            concluded: false,
        }
    }

    pub fn on_complete(&mut self, handler: OnCompleteHdlrFn) {
        self.on_complete = Some(handler);
    }

    /// `icem_add_local_candidate`.
    pub fn add_local_candidate(&mut self, candidate: Candidate) {
        self.local_candidates.push(candidate);
    }

    /// `icem_add_remote_candidate`.
    pub fn add_remote_candidate(&mut self, candidate: Candidate) {
        self.remote_candidates.push(candidate);
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// `icem_conncheck_start`: forms the checklist from the candidates
    /// gathered so far.
    pub fn conncheck_start(&mut self) -> Result<()> {
        let checklist = Checklist::form(&self.local_candidates, &self.remote_candidates, self.role)?;
        let components = checklist
            .pairs
            .iter()
            .map(|p| p.local.component)
            .max()
            .unwrap_or(0);
        self.selected = vec![None; components as usize + 1];
        self.checklist = Some(checklist);
        self.concluded = false;
        Ok(())
    }

    /// Emits the next outbound Binding request, if any pair is Waiting.
    pub fn poll_check(&mut self) -> Option<(SocketAddr, Vec<u8>)> {
        let checklist = self.checklist.as_mut()?;
        self.checker.poll(checklist)
    }

    /// Periodic keepalive / pending-request expiry hook driven by the
    /// embedder's timer collaborator. Expires timed-out pending requests,
    /// then re-sends a Binding request on any selected pair that has gone
    /// quiet for longer than [`KEEPALIVE_INTERVAL`], returning the datagrams
    /// to send.
    pub fn on_tick(&mut self, now: Instant) -> Vec<(SocketAddr, Vec<u8>)> {
        let mut outbound = Vec::new();
        let Some(checklist) = self.checklist.as_mut() else {
            return outbound;
        };
        self.checker.expire_pending(checklist, now);

        for index in self.selected.iter().flatten().copied() {
            let stale = now.duration_since(checklist.pairs[index].last_activity) >= KEEPALIVE_INTERVAL;
            if stale {
                if let Ok(datagram) = self.checker.keepalive(checklist, index) {
                    outbound.push(datagram);
                }
            }
        }

        self.try_conclude();
        outbound
    }

    /// Feeds an inbound datagram addressed to this agent's socket. The
    /// caller is responsible for demultiplexing STUN from media traffic and
    /// for routing by component.
    pub fn handle_packet(
        &mut self,
        data: &[u8],
        source: SocketAddr,
        component: u16,
    ) -> Result<Option<Vec<u8>>> {
        if !stun::message::is_message(data) {
            return Ok(None);
        }
        let mut probe = stun::message::Message::new();
        probe.unmarshal_binary(data).map_err(Error::Stun)?;
        let is_request = probe.typ.class == stun::message::CLASS_REQUEST;

        let checklist = self.checklist.as_mut().ok_or(Error::EmptyCandidateList)?;

        if is_request {
            let (reply, event) = self.server.handle_request(
                checklist,
                data,
                source,
                component,
                self.role,
                self.tie_breaker,
                self.retrigger_in_progress,
            )?;
            match event {
                ServerEvent::RoleFlipped => {
                    self.role = self.role.flipped();
                    self.checker.role = self.role;
                }
                ServerEvent::Triggered(_) | ServerEvent::Nominated(_) | ServerEvent::None => {}
            }
            self.try_conclude();
            return Ok(reply);
        }

        match self.checker.handle_response(checklist, data, source)? {
            CheckEvent::RoleFlipped => self.role = self.checker.role,
            CheckEvent::Succeeded(_) | CheckEvent::Failed(_) | CheckEvent::Ignored => {}
        }
        self.try_conclude();
        Ok(None)
    }

    /// A checklist is complete once every pair is Succeeded or Failed.
    /// Idempotent — calling this again after a component has concluded is a
    /// no-op for that component.
    fn try_conclude(&mut self) {
        if self.concluded {
            return;
        }
        let Some(checklist) = self.checklist.as_mut() else {
            return;
        };
        if !checklist.is_complete() {
            return;
        }

        let components: Vec<u16> = {
            let mut cs: Vec<u16> = checklist.pairs.iter().map(|p| p.local.component).collect();
            cs.sort_unstable();
            cs.dedup();
            cs
        };

        let mut failed = false;
        for &component in &components {
            if checklist.best_valid_for_component(component).is_none() {
                failed = true;
                continue;
            }
            if self.selected[component as usize].is_some() {
                continue;
            }
            let index = checklist
                .pairs
                .iter()
                .enumerate()
                .filter(|(_, p)| {
                    p.local.component == component && p.state == CandidatePairState::Succeeded
                })
                .max_by_key(|(_, p)| p.priority(self.role == Role::Controlling))
                .map(|(i, _)| i);
            if let Some(index) = index {
                self.selected[component as usize] = Some(index);
                if self.role == Role::Controlling {
                    let (_dest, _bytes) = self.checker.nominate(checklist, index);
                }
            }
        }

        checklist.state = if failed {
            ChecklistState::Failed
        } else {
            ChecklistState::Completed
        };
        self.concluded = true;

        if let Some(handler) = self.on_complete.as_mut() {
            let result = if failed {
                Err(Error::NoValidPair(0))
            } else {
                Ok(())
            };
            handler(self.role, result);
        }
    }

    /// `icem_selected_lcand`.
    pub fn selected_local_candidate(&self, component: u16) -> Option<&Candidate> {
        let checklist = self.checklist.as_ref()?;
        let index = (*self.selected.get(component as usize)?)?;
        Some(&checklist.pairs[index].local)
    }

    /// `icem_selected_rcand`.
    pub fn selected_remote_candidate(&self, component: u16) -> Option<&Candidate> {
        let checklist = self.checklist.as_ref()?;
        let index = (*self.selected.get(component as usize)?)?;
        Some(&checklist.pairs[index].remote)
    }

    /// `icem_selected_laddr`.
    pub fn selected_local_address(&self, component: u16) -> Option<SocketAddr> {
        self.selected_local_candidate(component).map(|c| c.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    fn config(role: Role, tie_breaker: u64) -> AgentConfig {
        AgentConfig {
            role,
            tie_breaker: TieBreaker(tie_breaker),
            local_ufrag: "lfrag".into(),
            local_pwd: "lpwd0000000000000".into(),
            remote_ufrag: "rfrag".into(),
            remote_pwd: "rpwd0000000000000".into(),
            retrigger_in_progress: false,
        }
    }

    #[test]
    fn pruning_selects_the_host_pair_over_shared_base_srflx() {
        // a host and an srflx candidate sharing the same base prune to one pair.
        let mut agent = Agent::new(config(Role::Controlling, 1));
        agent.add_local_candidate(Candidate::host(1, addr("10.0.0.1:5000")));
        agent.add_local_candidate(Candidate::server_reflexive(
            1,
            addr("203.0.113.1:5000"),
            addr("10.0.0.1:5000"),
        ));
        agent.add_remote_candidate(Candidate::host(1, addr("10.0.0.2:6000")));
        agent.conncheck_start().unwrap();

        let checklist = agent.checklist.as_ref().unwrap();
        assert_eq!(checklist.pairs.len(), 1);
        assert_eq!(checklist.pairs[0].local.candidate_type, crate::candidate::CandidateType::Host);
    }

    #[test]
    fn completion_callback_fires_once() {
        let mut agent = Agent::new(config(Role::Controlling, 1));
        agent.add_local_candidate(Candidate::host(1, addr("10.0.0.1:5000")));
        agent.add_remote_candidate(Candidate::host(1, addr("10.0.0.2:6000")));
        agent.conncheck_start().unwrap();

        let calls = Arc::new(Mutex::new(0));
        let calls_clone = calls.clone();
        agent.on_complete(Box::new(move |_role, _result| {
            *calls_clone.lock().unwrap() += 1;
        }));

        // force completion without real network traffic.
        agent.checklist.as_mut().unwrap().pairs[0].state = CandidatePairState::Succeeded;
        agent
            .checklist
            .as_mut()
            .unwrap()
            .mark_valid(0);
        agent.try_conclude();
        agent.try_conclude();

        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[test]
    fn role_conflict_response_flips_local_role() {
        // both sides start Controlling; the peer's tiebreaker wins, so a 487
        // response flips us to Controlled.
        let mut agent = Agent::new(config(Role::Controlling, 1));
        agent.add_local_candidate(Candidate::host(1, addr("10.0.0.1:5000")));
        agent.add_remote_candidate(Candidate::host(1, addr("10.0.0.2:6000")));
        agent.conncheck_start().unwrap();

        let (dest, request) = agent.poll_check().expect("a waiting pair exists");
        assert_eq!(dest, addr("10.0.0.2:6000"));

        let mut sent = stun::message::Message::new();
        sent.unmarshal_binary(&request).unwrap();

        let mut response = stun::message::Message::new();
        response.typ = stun::message::BINDING_ERROR;
        response.transaction_id = sent.transaction_id;
        let setters: Vec<Box<dyn stun::message::Setter>> = vec![
            Box::new(stun::error_code::ErrorCodeAttribute {
                code: stun::error_code::CODE_ROLE_CONFLICT,
                reason: Vec::new(),
            }),
            Box::new(crate::control::ControlAttr {
                role: Role::Controlling,
                tie_breaker: TieBreaker(2),
            }),
            Box::new(stun::fingerprint::FingerprintAttr),
        ];
        response.build(&setters).unwrap();

        agent
            .handle_packet(&response.raw, addr("10.0.0.2:6000"), 1)
            .unwrap();

        assert_eq!(agent.role(), Role::Controlled);
        assert_eq!(
            agent.checklist.as_ref().unwrap().pairs[0].state,
            CandidatePairState::Waiting
        );
    }
}
