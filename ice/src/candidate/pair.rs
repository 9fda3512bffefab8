//! Candidate pairs.

use std::fmt;
use std::time::Instant;

use super::Candidate;

/// Includes `Frozen`, required by RFC 5245 §5.7.4's grouping step.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub enum CandidatePairState {
    Frozen,
    Waiting,
    InProgress,
    Succeeded,
    Failed,
}

impl fmt::Display for CandidatePairState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CandidatePairState::Frozen => "frozen",
            CandidatePairState::Waiting => "waiting",
            CandidatePairState::InProgress => "in-progress",
            CandidatePairState::Succeeded => "succeeded",
            CandidatePairState::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CandidatePair {
    pub local: Candidate,
    pub remote: Candidate,
    pub state: CandidatePairState,
    pub nominated: bool,
    pub binding_request_count: u16,
    /// Last time a Binding request was sent on this pair or a response was
    /// received for it; the keepalive hook re-pings a selected pair once
    /// this goes stale.
    pub last_activity: Instant,
}

impl fmt::Display for CandidatePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} <-> {}",
            self.state, self.local, self.remote
        )
    }
}

impl CandidatePair {
    pub fn new(local: Candidate, remote: Candidate) -> Self {
        CandidatePair {
            local,
            remote,
            state: CandidatePairState::Frozen,
            nominated: false,
            binding_request_count: 0,
            last_activity: Instant::now(),
        }
    }

    /// RFC 5245 §5.7.2: `2^32*MIN(G,D) + 2*MAX(G,D) + (G>D?1:0)`, where G is
    /// the controlling side's candidate priority and D the controlled side's.
    /// Not cached: recomputed whenever the local role flips, since the
    /// identity of "controlling" can change after pair creation. Uses the
    /// exact `2^32` multiplier rather than `2^32 - 1`, which would undercount
    /// by `min(g,d)`.
    pub fn priority(&self, local_is_controlling: bool) -> u64 {
        let (g, d) = if local_is_controlling {
            (self.local.priority(), self.remote.priority())
        } else {
            (self.remote.priority(), self.local.priority())
        };
        (1u64 << 32) * std::cmp::min(g, d) as u64
            + 2 * std::cmp::max(g, d) as u64
            + u64::from(g > d)
    }

    /// The pair's own foundation, used to group pairs for state computation.
    pub fn foundation(&self) -> String {
        format!("{}:{}", self.local.foundation(), self.remote.foundation())
    }

    pub fn is_same_pair(&self, local: &Candidate, remote: &Candidate) -> bool {
        self.local == *local && self.remote == *remote
    }
}
