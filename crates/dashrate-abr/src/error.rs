use thiserror::Error;

use crate::FamilyId;

/// Construction-time failures.
///
/// Everything that can go wrong once a session is running (degenerate ladder,
/// missing metrics, inconsistent controller state, mid-session
/// reconfiguration) is recovered locally and never surfaces here.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AbrError {
    #[error("ladder has no bitrate levels")]
    EmptyLadder,

    #[error("ladder bitrate at level {level} is zero")]
    ZeroBitrate { level: usize },

    #[error("ladder is not strictly increasing at level {level}")]
    NonIncreasingLadder { level: usize },

    #[error("quality table has no encoding families")]
    NoFamilies,

    #[error("unknown encoding family {0}")]
    UnknownFamily(FamilyId),

    #[error("family {family} has no level {level}")]
    UnknownLevel { family: FamilyId, level: usize },

    #[error("invalid option: {0}")]
    InvalidOption(String),
}

pub type AbrResult<T> = Result<T, AbrError>;
