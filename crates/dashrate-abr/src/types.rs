use std::{fmt, time::Duration};

use web_time::Instant;

/// Identifier of an encoding family (adaptation set), e.g. one codec's ladder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FamilyId(u32);

impl FamilyId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for FamilyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for FamilyId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Coarse lifecycle of the playback simulation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PlaybackState {
    /// Created, nothing downloaded yet.
    #[default]
    Initialized,
    /// Filling the buffer before the first frame is shown.
    InitialBuffering,
    /// Draining one segment per segment duration.
    Playing,
    /// Stalled mid-stream, waiting for the buffer to refill.
    Buffering,
    /// Paused by the user; the buffer is not drained.
    Paused,
    /// Every segment was played out.
    Ended,
    /// Stopped before the end (cancelled).
    Stopped,
}

impl PlaybackState {
    /// `true` only for a mid-stream stall. Initial buffering does not count.
    pub fn is_rebuffering(self) -> bool {
        matches!(self, Self::Buffering)
    }

    /// `true` once the playback simulation can make no further progress.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ended | Self::Stopped)
    }
}

/// Read-only view of the playback buffer taken right before a decision.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BufferSnapshot {
    /// Downloaded but not yet played segments.
    pub occupancy: usize,
    pub state: PlaybackState,
    /// Nominal duration of one segment.
    pub segment_duration: Duration,
    /// Buffer capacity in segments, `None` when unbounded.
    pub max_segments: Option<usize>,
}

impl BufferSnapshot {
    /// Buffered media in seconds.
    #[expect(clippy::cast_precision_loss)] // segment counts are tiny
    pub fn level_secs(&self) -> f64 {
        self.occupancy as f64 * self.segment_duration.as_secs_f64()
    }

    pub fn segment_secs(&self) -> f64 {
        self.segment_duration.as_secs_f64()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ThroughputSampleSource {
    Network,
    Cache,
}

#[derive(Clone, Copy, Debug)]
pub struct ThroughputSample {
    pub bytes: u64,
    pub duration: Duration,
    pub at: Instant,
    pub source: ThroughputSampleSource,
}

impl ThroughputSample {
    pub fn network(bytes: u64, duration: Duration, at: Instant) -> Self {
        Self {
            bytes,
            duration,
            at,
            source: ThroughputSampleSource::Network,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DecisionReason {
    /// Single effective quality level; nothing to decide.
    OneBitrate,
    /// BOLA startup phase deferred to the throughput-matching level.
    Startup,
    /// BOLA steady state picked the score maximizer.
    Steady,
    /// BOLA steady state was clamped to avoid an unsustainable up-switch.
    OscillationGuard,
    /// Controller state was inconsistent and has been reset to startup.
    InvalidStateRecovered,
    /// Refinement moved the pick to another encoding family.
    Refined,
    /// Refinement evaluated the candidates and kept the baseline.
    BaselineKept,
    /// Quality or size data was unavailable for this segment.
    MissingMetrics,
    /// Joint optimizer picked the candidate.
    JointOptimized,
}

/// Output of one per-segment decision.
#[derive(Clone, Debug, PartialEq)]
pub struct Decision {
    pub family: Option<FamilyId>,
    pub level: usize,
    pub bitrate: u64,
    /// Predicted VMAF of the chosen candidate, `None` if it could not be evaluated.
    pub quality: Option<f64>,
    /// Pacing delay to wait before issuing the fetch.
    pub delay: Duration,
    pub reason: DecisionReason,
}
