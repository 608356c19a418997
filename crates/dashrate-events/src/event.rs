use crate::{AbrEvent, PlaybackEvent};

/// Unified event: one variant per subsystem.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Abr(AbrEvent),
    Playback(PlaybackEvent),
}

impl From<AbrEvent> for Event {
    fn from(e: AbrEvent) -> Self {
        Self::Abr(e)
    }
}

impl From<PlaybackEvent> for Event {
    fn from(e: PlaybackEvent) -> Self {
        Self::Playback(e)
    }
}
