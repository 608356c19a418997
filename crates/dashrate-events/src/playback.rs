use std::time::Duration;

use dashrate_abr::PlaybackState;

/// Events emitted by the playback buffer and the fetch path.
#[derive(Clone, Debug, PartialEq)]
pub enum PlaybackEvent {
    StateChanged {
        from: PlaybackState,
        to: PlaybackState,
    },
    SegmentDownloaded {
        segment: usize,
        bytes: u64,
        duration: Duration,
    },
    /// Fetch failed; the segment is skipped.
    FetchFailed { segment: usize, error: String },
    /// Playback stalled mid-stream and resumed after `duration`.
    Interruption { duration: Duration },
    Ended,
}
