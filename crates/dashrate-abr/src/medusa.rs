//! Joint (family × level) optimizer (MEDUSA).
//!
//! Scores every candidate of the configured families with
//! `alpha * quality / max_quality - (1 - alpha) * size / max_size`, where
//! `alpha` follows buffer occupancy, and only accepts improvements whose
//! download fits before the buffer runs low.

use derivative::Derivative;
use tracing::{debug, trace};

use crate::{
    AbrError, AbrResult, BufferSnapshot, FamilyId, QualitySource, SegmentMetrics, refine::ratio,
};

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum AlphaPolicy {
    /// Occupancy over buffer capacity.
    #[default]
    BufferRatio,
    Fixed(f64),
}

#[derive(Clone, Debug, Derivative, PartialEq)]
#[derivative(Default)]
pub struct MedusaOptions {
    /// Families whose candidates are scored.
    #[derivative(Default(value = "vec![FamilyId::new(4)]"))]
    pub families: Vec<FamilyId>,
    pub alpha: AlphaPolicy,
    /// Alpha while rebuffering or at low occupancy.
    #[derivative(Default(value = "0.1"))]
    pub low_buffer_alpha: f64,
    /// Alpha used instead of anything >= 1.
    #[derivative(Default(value = "0.8"))]
    pub saturated_alpha: f64,
    /// Occupancy (segments) at or below which the buffer counts as low and
    /// the feasibility gate is bypassed.
    #[derivative(Default(value = "2"))]
    pub low_buffer_segments: usize,
}

impl MedusaOptions {
    pub fn validate(&self) -> AbrResult<()> {
        if self.families.is_empty() {
            return Err(AbrError::InvalidOption(
                "medusa needs at least one family".into(),
            ));
        }
        let unit = |name: &str, v: f64| {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(AbrError::InvalidOption(format!(
                    "{name} must be within [0, 1], got {v}"
                )))
            }
        };
        if let AlphaPolicy::Fixed(a) = self.alpha {
            unit("alpha", a)?;
        }
        unit("low_buffer_alpha", self.low_buffer_alpha)?;
        unit("saturated_alpha", self.saturated_alpha)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct JointPick {
    pub family: FamilyId,
    pub level: usize,
    pub bitrate: u64,
    pub quality: f64,
}

#[derive(Clone, Debug, Default)]
pub struct JointOptimizer {
    opts: MedusaOptions,
}

impl JointOptimizer {
    /// Alpha used when the buffer capacity is unbounded.
    const UNBOUNDED_ALPHA: f64 = 0.5;

    pub fn new(opts: MedusaOptions) -> Self {
        Self { opts }
    }

    pub fn options(&self) -> &MedusaOptions {
        &self.opts
    }

    fn is_low_buffer(&self, buffer: &BufferSnapshot) -> bool {
        buffer.state.is_rebuffering() || buffer.occupancy <= self.opts.low_buffer_segments
    }

    /// Quality weight for the current buffer.
    pub fn alpha(&self, buffer: &BufferSnapshot) -> f64 {
        if self.is_low_buffer(buffer) {
            return self.opts.low_buffer_alpha;
        }
        #[expect(clippy::cast_precision_loss)] // segment counts are tiny
        let alpha = match self.opts.alpha {
            AlphaPolicy::Fixed(a) => a,
            AlphaPolicy::BufferRatio => match buffer.max_segments {
                Some(max) if max > 0 => buffer.occupancy as f64 / max as f64,
                _ => Self::UNBOUNDED_ALPHA,
            },
        };
        if alpha >= 1.0 {
            self.opts.saturated_alpha
        } else {
            alpha
        }
    }

    /// `None` when any candidate of the configured families lacks metrics.
    pub fn select(
        &self,
        source: &dyn QualitySource,
        segment: usize,
        buffer: &BufferSnapshot,
        estimate_bps: Option<u64>,
    ) -> Option<JointPick> {
        let mut candidates: Vec<(JointPick, SegmentMetrics)> = Vec::new();
        for family in source
            .families()
            .into_iter()
            .filter(|f| self.opts.families.contains(f))
        {
            let ladder = source.ladder(family)?;
            for (level, &bitrate) in ladder.bitrates().iter().enumerate() {
                let Some(metrics) = source.metrics(family, level, segment) else {
                    debug!(%family, level, segment, "MEDUSA: metrics unavailable");
                    return None;
                };
                let pick = JointPick {
                    family,
                    level,
                    bitrate,
                    quality: metrics.quality,
                };
                candidates.push((pick, metrics));
            }
        }

        let alpha = self.alpha(buffer);
        let max_q = candidates
            .iter()
            .map(|(_, m)| m.quality)
            .fold(f64::MIN, f64::max);
        let max_size = candidates
            .iter()
            .map(|(_, m)| m.size())
            .fold(f64::MIN, f64::max);
        let bypass_gate = buffer.occupancy <= self.opts.low_buffer_segments;
        #[expect(clippy::cast_precision_loss)] // segment counts are tiny
        let available_secs = buffer.segment_secs()
            * (buffer.occupancy as f64 - self.opts.low_buffer_segments as f64);

        let mut selected: Option<(JointPick, f64)> = None;
        for (pick, m) in candidates {
            let objective = alpha * ratio(m.quality, max_q) - (1.0 - alpha) * ratio(m.size(), max_size);
            let feasible = bypass_gate
                || estimate_bps.is_some_and(|bps| m.download_secs(bps) < available_secs);
            trace!(
                family = %pick.family,
                level = pick.level,
                objective,
                feasible,
                "MEDUSA candidate"
            );
            match selected {
                None => selected = Some((pick, objective)),
                Some((_, best)) if objective > best && feasible => {
                    selected = Some((pick, objective));
                }
                Some(_) => {}
            }
        }

        let (pick, objective) = selected?;
        debug!(
            segment,
            alpha,
            family = %pick.family,
            level = pick.level,
            bitrate = pick.bitrate,
            quality = pick.quality,
            objective,
            "MEDUSA select"
        );
        Some(pick)
    }
}
