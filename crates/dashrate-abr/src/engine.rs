use std::{sync::Arc, time::Duration};

use derivative::Derivative;
use tracing::debug;
use web_time::Instant;

use crate::{
    AbrError, AbrResult, BolaController, BolaOptions, BufferSnapshot, Decision, DecisionReason,
    Estimator, FamilyId, JointOptimizer, MedusaOptions, QualitySource, RefineInput,
    RefineOptions, Refiner, ThroughputEstimator, ThroughputSample,
};

/// Quality source shared between a session and its engine.
pub type SharedQualitySource = Arc<dyn QualitySource + Send + Sync>;

/// Per-segment decision pipeline.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Strategy {
    /// BOLA on the baseline family only.
    #[default]
    Bola,
    /// BOLA, then cross-family refinement of its pick.
    BolaRefined(RefineOptions),
    /// Joint optimization over whole ladders, no BOLA pick.
    Medusa(MedusaOptions),
}

#[derive(Clone, Debug, Derivative, PartialEq)]
#[derivative(Default)]
pub struct AbrOptions {
    /// Family whose ladder BOLA runs on.
    #[derivative(Default(value = "FamilyId::new(4)"))]
    pub baseline: FamilyId,
    pub bola: BolaOptions,
    pub strategy: Strategy,
}

impl AbrOptions {
    pub fn validate(&self) -> AbrResult<()> {
        self.bola.validate()?;
        match &self.strategy {
            Strategy::Bola => Ok(()),
            Strategy::BolaRefined(opts) => opts.validate(),
            Strategy::Medusa(opts) => opts.validate(),
        }
    }
}

#[derive(Clone, Debug)]
enum Stage {
    Bola,
    Refined(Refiner),
    Medusa(JointOptimizer),
}

/// One playback session's decision state: BOLA controller, second stage,
/// throughput estimator and the last realized quality.
pub struct AbrEngine<E: Estimator = ThroughputEstimator> {
    source: SharedQualitySource,
    baseline: FamilyId,
    bola: BolaController,
    stage: Stage,
    estimator: E,
    previous_quality: Option<f64>,
}

impl AbrEngine<ThroughputEstimator> {
    pub fn new(source: SharedQualitySource, opts: AbrOptions) -> AbrResult<Self> {
        Self::with_estimator(source, opts, ThroughputEstimator::new())
    }
}

impl<E: Estimator> AbrEngine<E> {
    pub fn with_estimator(
        source: SharedQualitySource,
        opts: AbrOptions,
        estimator: E,
    ) -> AbrResult<Self> {
        opts.validate()?;
        let ladder = source
            .ladder(opts.baseline)
            .ok_or(AbrError::UnknownFamily(opts.baseline))?
            .clone();
        let bola = BolaController::new(ladder, opts.bola)?;
        let stage = match opts.strategy {
            Strategy::Bola => Stage::Bola,
            Strategy::BolaRefined(o) => Stage::Refined(Refiner::new(o)),
            Strategy::Medusa(o) => Stage::Medusa(JointOptimizer::new(o)),
        };
        Ok(Self {
            source,
            baseline: opts.baseline,
            bola,
            stage,
            estimator,
            previous_quality: None,
        })
    }

    pub fn baseline(&self) -> FamilyId {
        self.baseline
    }

    pub fn bola(&self) -> &BolaController {
        &self.bola
    }

    pub fn estimate_bps(&self) -> Option<u64> {
        self.estimator.estimate_bps()
    }

    pub fn previous_quality(&self) -> Option<f64> {
        self.previous_quality
    }

    pub fn push_throughput_sample(&mut self, sample: ThroughputSample) {
        self.estimator.push_sample(sample);
    }

    /// Mark a segment as downloaded. `quality` becomes the realized quality
    /// the instability rule compares against; skipped segments never reach here.
    pub fn on_segment_downloaded(&mut self, at: Instant, quality: Option<f64>) {
        self.bola.on_segment_downloaded(at);
        self.previous_quality = quality;
    }

    /// Reset everything tied to the playback position. The throughput
    /// estimate survives a seek.
    pub fn clear_on_seek(&mut self) {
        self.bola.clear_on_seek();
        self.previous_quality = None;
    }

    pub fn reconfigure(&mut self, stable_buffer_secs: f64) {
        self.bola.reconfigure(stable_buffer_secs);
    }

    pub fn decide(&mut self, segment: usize, buffer: &BufferSnapshot, now: Instant) -> Decision {
        let estimate_bps = self.estimator.estimate_bps();

        let decision = match &self.stage {
            Stage::Bola => {
                let pick = self.bola.decide(buffer, estimate_bps, now);
                Decision {
                    family: Some(self.baseline),
                    level: pick.level,
                    bitrate: self.baseline_bitrate(pick.level),
                    quality: self
                        .source
                        .metrics(self.baseline, pick.level, segment)
                        .map(|m| m.quality),
                    delay: pick.delay,
                    reason: pick.reason,
                }
            }
            Stage::Refined(refiner) => {
                let pick = self.bola.decide(buffer, estimate_bps, now);
                let refined = refiner.refine(
                    self.source.as_ref(),
                    &RefineInput {
                        baseline: self.baseline,
                        level: pick.level,
                        bitrate: self.baseline_bitrate(pick.level),
                        segment,
                        buffer,
                        estimate_bps,
                        previous_quality: self.previous_quality,
                    },
                );
                let reason = match (refined.quality, refined.changed) {
                    (None, _) => DecisionReason::MissingMetrics,
                    (Some(_), true) => DecisionReason::Refined,
                    (Some(_), false) => DecisionReason::BaselineKept,
                };
                Decision {
                    family: Some(refined.family),
                    level: refined.level,
                    bitrate: refined.bitrate,
                    quality: refined.quality,
                    delay: pick.delay,
                    reason,
                }
            }
            Stage::Medusa(optimizer) => {
                match optimizer.select(self.source.as_ref(), segment, buffer, estimate_bps) {
                    Some(p) => Decision {
                        family: Some(p.family),
                        level: p.level,
                        bitrate: p.bitrate,
                        quality: Some(p.quality),
                        delay: Duration::ZERO,
                        reason: DecisionReason::JointOptimized,
                    },
                    None => Decision {
                        family: Some(self.baseline),
                        level: 0,
                        bitrate: self.baseline_bitrate(0),
                        quality: None,
                        delay: Duration::ZERO,
                        reason: DecisionReason::MissingMetrics,
                    },
                }
            }
        };

        debug!(
            segment,
            estimate_bps,
            occupancy = buffer.occupancy,
            state = ?buffer.state,
            family = ?decision.family,
            level = decision.level,
            bitrate = decision.bitrate,
            quality = ?decision.quality,
            delay_secs = decision.delay.as_secs_f64(),
            reason = ?decision.reason,
            "ABR decide"
        );
        decision
    }

    fn baseline_bitrate(&self, level: usize) -> u64 {
        self.bola.ladder().bitrate(level).unwrap_or_default()
    }
}
