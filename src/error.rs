//! Crate-wide error type.
//!
//! Construction-time errors (bad names, unresolved links, missing iops) are
//! fatal to `Boxer::resolve`/the builder. Runtime errors raised from inside
//! an act are fatal to the hosting boxer; guard evaluation errors are the
//! one kind that is *not* propagated as an `Err` (see `need::Need::eval`,
//! which downgrades `GuardError` to a logged event and a `false` result).

use crate::mine::KeyPath;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid name: {0:?}")]
    InvalidName(String),

    #[error("invalid key: {0}")]
    InvalidKey(KeyPath),

    #[error("missing key in mine: {0}")]
    MissingKey(KeyPath),

    #[error("missing bag for key: {0}")]
    MissingBag(KeyPath),

    #[error("missing required iop {iop:?} for act {act:?}")]
    MissingIop { act: String, iop: &'static str },

    #[error("duplicate box name: {0:?}")]
    DuplicateBox(String),

    #[error("unresolved link: {0}")]
    UnresolvedLink(String),

    #[error("unresolved transition destination: {0:?}")]
    UnresolvedDest(String),

    #[error("invalid nabe {found:?} for act kind {kind:?}, expected {expected:?}")]
    InvalidNabe { kind: &'static str, expected: &'static str, found: String },

    #[error("no act kind registered under {0:?}")]
    UnknownActKind(String),

    #[error("guard evaluation error: {0}")]
    GuardError(String),

    #[error("scheduler run reached its configured limit")]
    SchedulerLimit,
}
