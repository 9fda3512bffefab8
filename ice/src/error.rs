use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by candidate/pair management, checklist formation, the
/// connectivity checker, and the embedded STUN server.
#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum Error {
    #[error("no candidates to form a checklist from")]
    EmptyCandidateList,
    #[error("no pair for component {0}")]
    UnknownComponent(u16),
    #[error("component {0} has no valid pair")]
    NoValidPair(u16),

    #[error("STUN message failed MESSAGE-INTEGRITY or USERNAME validation")]
    Unauthorized,
    #[error("Binding request missing required PRIORITY attribute")]
    MissingPriorityAttribute,
    #[error("local tiebreaker lost a role conflict")]
    RoleConflict,

    #[error("no such candidate pair is tracked by this checker")]
    UnknownPair,
    #[error("STUN transaction timed out")]
    TransactionTimeout,

    #[error("STUN codec: {0}")]
    Stun(#[from] stun::Error),
}
