use dashrate_abr::{DecisionReason, FamilyId};

/// Events emitted by the decision loop.
#[derive(Clone, Debug, PartialEq)]
pub enum AbrEvent {
    /// A segment's (family, level) was chosen.
    Decision {
        segment: usize,
        family: Option<FamilyId>,
        level: usize,
        bitrate: u64,
        quality: Option<f64>,
        reason: DecisionReason,
    },
    /// Controller state was cleared for a jump to `segment`.
    Seek { segment: usize },
    /// Stable buffer target changed mid-session.
    Reconfigured { stable_buffer_secs: f64 },
}
