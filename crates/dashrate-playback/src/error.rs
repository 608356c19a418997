use dashrate_abr::AbrError;
use thiserror::Error;

/// Errors produced by `dashrate-playback`.
///
/// Notes:
/// - `Abr` wraps engine construction failures (bad ladder, unknown baseline).
/// - `Cancelled` is returned once the session token fires or the buffer was stopped.
/// - `ChannelClosed` is returned when the session is gone and a command cannot be delivered.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("abr: {0}")]
    Abr(#[from] AbrError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("cancelled")]
    Cancelled,

    #[error("internal channel closed")]
    ChannelClosed,
}

pub type PlaybackResult<T> = Result<T, PlaybackError>;

/// Failure of a single segment download.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("fetch failed: {0}")]
    Failed(String),

    #[error("fetch cancelled")]
    Cancelled,
}
