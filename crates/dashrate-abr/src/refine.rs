//! Cross-family refinement of a single-family pick (MCOM).
//!
//! Every family contributes the candidate at the same ladder position as the
//! baseline pick; one of three rules re-ranks them using quality and size.

use tracing::{debug, trace};

use crate::{AbrError, AbrResult, BufferSnapshot, FamilyId, QualitySource, SegmentMetrics};

/// Size growth below which a large quality gain is worth it.
const MARGINAL_COST_RATIO: f64 = 0.10;
/// Size reduction above which an imperceptible quality loss is worth it.
const MARGINAL_SAVING_RATIO: f64 = 0.15;
const INSTABILITY_WEIGHT: f64 = 0.5;
/// Occupancy (segments) at or below which the buffer counts as low.
const LOW_BUFFER_SEGMENTS: usize = 2;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RefineRule {
    /// Strict improvement, marginal-cost improvement, marginal-quality trade.
    Dominance,
    /// Prefer shorter estimated download time within the JND.
    DownloadTime,
    /// Maximize normalized quality minus size minus temporal instability.
    Instability,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RefineOptions {
    pub rule: RefineRule,
    /// Just-noticeable VMAF difference.
    pub jnd: f64,
}

impl RefineOptions {
    pub fn dominance() -> Self {
        Self {
            rule: RefineRule::Dominance,
            jnd: 6.0,
        }
    }

    pub fn download_time() -> Self {
        Self {
            rule: RefineRule::DownloadTime,
            jnd: 4.0,
        }
    }

    pub fn instability() -> Self {
        Self {
            rule: RefineRule::Instability,
            jnd: 2.0,
        }
    }

    #[must_use]
    pub fn with_jnd(mut self, jnd: f64) -> Self {
        self.jnd = jnd;
        self
    }

    pub fn validate(&self) -> AbrResult<()> {
        if self.jnd.is_finite() && self.jnd >= 0.0 {
            Ok(())
        } else {
            Err(AbrError::InvalidOption(format!(
                "jnd must be >= 0, got {}",
                self.jnd
            )))
        }
    }
}

impl Default for RefineOptions {
    fn default() -> Self {
        Self::dominance()
    }
}

/// What the refiner is asked to improve on.
#[derive(Clone, Copy, Debug)]
pub struct RefineInput<'a> {
    pub baseline: FamilyId,
    pub level: usize,
    pub bitrate: u64,
    pub segment: usize,
    pub buffer: &'a BufferSnapshot,
    pub estimate_bps: Option<u64>,
    /// Quality realized for the previous segment.
    pub previous_quality: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Refinement {
    pub family: FamilyId,
    pub level: usize,
    pub bitrate: u64,
    /// `None` when the baseline could not be evaluated.
    pub quality: Option<f64>,
    /// Whether another family replaced the baseline.
    pub changed: bool,
}

#[derive(Clone, Copy, Debug)]
struct Candidate {
    family: FamilyId,
    bitrate: u64,
    metrics: SegmentMetrics,
}

impl Candidate {
    fn quality(&self) -> f64 {
        self.metrics.quality
    }

    fn size(&self) -> f64 {
        self.metrics.size()
    }
}

#[derive(Clone, Debug, Default)]
pub struct Refiner {
    opts: RefineOptions,
}

impl Refiner {
    pub fn new(opts: RefineOptions) -> Self {
        Self { opts }
    }

    pub fn options(&self) -> &RefineOptions {
        &self.opts
    }

    pub fn refine(&self, source: &dyn QualitySource, input: &RefineInput<'_>) -> Refinement {
        let Some(metrics) = source.metrics(input.baseline, input.level, input.segment) else {
            debug!(
                family = %input.baseline,
                level = input.level,
                segment = input.segment,
                "MCOM: baseline metrics unavailable, keeping baseline"
            );
            return Refinement {
                family: input.baseline,
                level: input.level,
                bitrate: input.bitrate,
                quality: None,
                changed: false,
            };
        };
        let baseline = Candidate {
            family: input.baseline,
            bitrate: input.bitrate,
            metrics,
        };
        let candidates = collect_candidates(source, input);

        let selected = match self.opts.rule {
            RefineRule::Dominance => self.by_dominance(baseline, &candidates),
            RefineRule::DownloadTime => self.by_download_time(baseline, &candidates, input),
            RefineRule::Instability => by_instability(baseline, &candidates, input.previous_quality),
        };

        let changed = selected.family != baseline.family;
        debug!(
            rule = ?self.opts.rule,
            segment = input.segment,
            baseline = %baseline.family,
            selected = %selected.family,
            quality = selected.quality(),
            size_bytes = selected.metrics.size_bytes,
            changed,
            "MCOM refine"
        );
        Refinement {
            family: selected.family,
            level: input.level,
            bitrate: selected.bitrate,
            quality: Some(selected.quality()),
            changed,
        }
    }

    fn by_dominance(&self, baseline: Candidate, candidates: &[Candidate]) -> Candidate {
        let jnd = self.opts.jnd;
        let mut sel = baseline;
        for &c in candidates {
            let (size, q) = (c.size(), c.quality());
            let (sel_size, sel_q) = (sel.size(), sel.quality());

            let strict = size < sel_size && q >= sel_q;
            let marginal_cost = size > sel_size
                && q > sel_q
                && (size - sel_size) / sel_size < MARGINAL_COST_RATIO
                && q - sel_q > jnd;
            let marginal_trade = size < sel_size
                && q < sel_q
                && (sel_size - size) / sel_size > MARGINAL_SAVING_RATIO
                && sel_q - q < jnd;

            trace!(family = %c.family, size, q, strict, marginal_cost, marginal_trade, "MCOM dominance");
            if strict || marginal_cost || marginal_trade {
                sel = c;
            }
        }
        sel
    }

    fn by_download_time(
        &self,
        baseline: Candidate,
        candidates: &[Candidate],
        input: &RefineInput<'_>,
    ) -> Candidate {
        let jnd = self.opts.jnd;
        // Without an estimate download time is proportional to size.
        let dt = |c: &Candidate| {
            input
                .estimate_bps
                .map_or(c.size(), |bps| c.metrics.download_secs(bps))
        };
        let low_buffer =
            input.buffer.state.is_rebuffering() || input.buffer.occupancy <= LOW_BUFFER_SEGMENTS;
        let baseline_q = baseline.quality();

        let mut sel = baseline;
        let mut sel_dt = dt(&baseline);
        for c in candidates.iter().filter(|c| c.family != baseline.family) {
            let (q, c_dt) = (c.quality(), dt(c));
            let take = if low_buffer {
                c_dt < sel_dt && sel.quality() - q <= jnd
            } else {
                (q >= sel.quality() && c_dt <= sel_dt) || (baseline_q - q <= jnd && c_dt < sel_dt)
            };
            trace!(family = %c.family, q, dt = c_dt, low_buffer, take, "MCOM download time");
            if take {
                sel = *c;
                sel_dt = c_dt;
            }
        }
        sel
    }
}

fn by_instability(
    baseline: Candidate,
    candidates: &[Candidate],
    previous_quality: Option<f64>,
) -> Candidate {
    let all = || std::iter::once(&baseline).chain(candidates);
    let max_q = all().map(Candidate::quality).fold(f64::MIN, f64::max);
    let max_size = all().map(Candidate::size).fold(f64::MIN, f64::max);
    let max_inst = previous_quality
        .map(|prev| all().map(|c| (c.quality() - prev).abs()).fold(0.0, f64::max))
        .filter(|&m| m > 0.0);

    let objective = |c: &Candidate| {
        let mut obj = ratio(c.quality(), max_q) - ratio(c.size(), max_size);
        if let (Some(prev), Some(max_inst)) = (previous_quality, max_inst) {
            obj -= INSTABILITY_WEIGHT * (c.quality() - prev).abs() / max_inst;
        }
        obj
    };

    let mut sel = baseline;
    let mut sel_obj = objective(&baseline);
    for c in candidates {
        let obj = objective(c);
        trace!(family = %c.family, objective = obj, "MCOM instability");
        if obj > sel_obj {
            sel = *c;
            sel_obj = obj;
        }
    }
    sel
}

/// Same ladder position in every family that has it and has metrics, in ladder order.
fn collect_candidates(source: &dyn QualitySource, input: &RefineInput<'_>) -> Vec<Candidate> {
    source
        .families()
        .into_iter()
        .filter_map(|family| {
            let bitrate = source.ladder(family)?.bitrate(input.level)?;
            let Some(metrics) = source.metrics(family, input.level, input.segment) else {
                trace!(%family, level = input.level, segment = input.segment, "MCOM: no metrics");
                return None;
            };
            Some(Candidate {
                family,
                bitrate,
                metrics,
            })
        })
        .collect()
}

pub(crate) fn ratio(value: f64, max: f64) -> f64 {
    if max > 0.0 { value / max } else { 0.0 }
}
