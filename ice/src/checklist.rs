//! Checklist formation, pruning, prioritisation, and state computation,
//! structured as a standalone, synchronous data structure the agent drives
//! rather than a method tangled with networking.

use crate::candidate::pair::{CandidatePair, CandidatePairState};
use crate::candidate::Candidate;
use crate::control::Role;
use crate::error::{Error, Result};
use crate::network_type::NetworkType;

#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub enum ChecklistState {
    Null,
    Running,
    Completed,
    Failed,
}

#[derive(Debug)]
pub struct Checklist {
    pub state: ChecklistState,
    pub pairs: Vec<CandidatePair>,
    pub valid: Vec<usize>,
}

impl Checklist {
    /// Pair formation + pruning + prioritisation + state computation, all in
    /// one pass.
    pub fn form(local: &[Candidate], remote: &[Candidate], local_role: Role) -> Result<Self> {
        if local.is_empty() || remote.is_empty() {
            return Err(Error::EmptyCandidateList);
        }

        // step 1: pair formation
        let mut pairs = Vec::new();
        for l in local {
            for r in remote {
                if l.component == r.component && same_family(l, r) {
                    pairs.push(CandidatePair::new(l.clone(), r.clone()));
                }
            }
        }
        if pairs.is_empty() {
            return Err(Error::EmptyCandidateList);
        }

        // step 2: prioritisation
        let controlling = local_role == Role::Controlling;
        pairs.sort_by(|a, b| b.priority(controlling).cmp(&a.priority(controlling)));

        // step 3: pruning — duplicates share component, local base, and
        // remote address; keep the higher-priority (earlier, post-sort) one.
        let mut kept: Vec<CandidatePair> = Vec::new();
        for pair in pairs {
            let is_duplicate = kept.iter().any(|existing| {
                existing.local.component == pair.local.component
                    && existing.local.base == pair.local.base
                    && existing.remote.address == pair.remote.address
            });
            if !is_duplicate {
                kept.push(pair);
            }
        }

        let mut checklist = Checklist {
            state: ChecklistState::Running,
            pairs: kept,
            valid: Vec::new(),
        };
        checklist.compute_states();
        Ok(checklist)
    }

    /// step 4: group by foundation; within a foundation, the pair with the
    /// lowest component id (ties broken by highest priority) becomes
    /// Waiting, the rest stay Frozen, per RFC 5245 §5.7.4.
    fn compute_states(&mut self) {
        let mut foundations: Vec<String> = self
            .pairs
            .iter()
            .map(CandidatePair::foundation)
            .collect::<Vec<_>>();
        foundations.sort();
        foundations.dedup();

        for foundation in foundations {
            let mut best: Option<usize> = None;
            for (i, pair) in self.pairs.iter().enumerate() {
                if pair.foundation() != foundation {
                    continue;
                }
                best = Some(match best {
                    None => i,
                    Some(b) => {
                        let b_pair = &self.pairs[b];
                        if pair.local.component < b_pair.local.component {
                            i
                        } else if pair.local.component == b_pair.local.component
                            && pair.priority(true) > b_pair.priority(true)
                        {
                            i
                        } else {
                            b
                        }
                    }
                });
            }
            if let Some(i) = best {
                self.pairs[i].state = CandidatePairState::Waiting;
            }
        }
    }

    pub fn pair_mut(&mut self, local: &Candidate, remote: &Candidate) -> Option<&mut CandidatePair> {
        self.pairs
            .iter_mut()
            .find(|p| p.is_same_pair(local, remote))
    }

    pub fn next_waiting(&self, controlling: bool) -> Option<usize> {
        self.pairs
            .iter()
            .enumerate()
            .filter(|(_, p)| p.state == CandidatePairState::Waiting)
            .max_by_key(|(_, p)| p.priority(controlling))
            .map(|(i, _)| i)
    }

    pub fn mark_valid(&mut self, index: usize) {
        self.pairs[index].state = CandidatePairState::Succeeded;
        if !self.valid.contains(&index) {
            self.valid.push(index);
        }
    }

    /// A checklist is complete when every pair is Succeeded or Failed.
    pub fn is_complete(&self) -> bool {
        self.pairs
            .iter()
            .all(|p| matches!(p.state, CandidatePairState::Succeeded | CandidatePairState::Failed))
    }

    pub fn best_valid_for_component(&self, component: u16) -> Option<&CandidatePair> {
        self.valid
            .iter()
            .map(|&i| &self.pairs[i])
            .filter(|p| p.local.component == component)
            .max_by_key(|p| p.priority(true))
    }
}

fn same_family(a: &Candidate, b: &Candidate) -> bool {
    matches!(
        (a.network_type, b.network_type),
        (NetworkType::Udp4, NetworkType::Udp4) | (NetworkType::Udp6, NetworkType::Udp6)
    )
}
