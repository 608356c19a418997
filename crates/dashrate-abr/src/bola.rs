//! Buffer-based Lyapunov rate controller (BOLA).
//!
//! Maps buffer occupancy to a ladder level through the score
//! `(Vp * (utility[i] + gp) - buffer) / bitrate[i]`, with a startup phase that
//! defers to throughput rate matching.

use std::time::Duration;

use derivative::Derivative;
use tracing::{debug, trace, warn};
use web_time::Instant;

use crate::{AbrError, AbrResult, BufferSnapshot, DecisionReason, Ladder};

/// How the steady state compensates for delays not caused by bandwidth.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BolaMode {
    /// Track a virtual placeholder buffer on top of the real one and absorb
    /// pacing delay into it before asking the scheduler to wait.
    #[default]
    Placeholder,
    /// No placeholder: startup while the real buffer holds fewer than two
    /// segments, up-switches snapped around the throughput level, pacing
    /// delay fully realized as a wait.
    Basic,
}

#[derive(Clone, Debug, Derivative, PartialEq)]
#[derivative(Default)]
pub struct BolaOptions {
    /// Buffer level (seconds) at which the lowest level is always preferred.
    #[derivative(Default(value = "8.0"))]
    pub min_buffer_secs: f64,
    /// Extra buffer (seconds) per ladder level added to the buffer timeline floor.
    #[derivative(Default(value = "2.0"))]
    pub per_level_buffer_secs: f64,
    /// Target stable buffer time (seconds).
    #[derivative(Default(value = "10.0"))]
    pub stable_buffer_secs: f64,
    pub mode: BolaMode,
}

impl BolaOptions {
    pub fn validate(&self) -> AbrResult<()> {
        let positive = |name: &str, v: f64| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(AbrError::InvalidOption(format!("{name} must be > 0, got {v}")))
            }
        };
        positive("min_buffer_secs", self.min_buffer_secs)?;
        positive("per_level_buffer_secs", self.per_level_buffer_secs)?;
        positive("stable_buffer_secs", self.stable_buffer_secs)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BolaPhase {
    /// Degenerate ladder: level 0 forever.
    OneBitrate,
    Startup,
    Steady,
}

/// Controller parameters derived from (ladder, stable buffer target).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BolaParams {
    pub gp: f64,
    /// Buffer-seconds.
    pub vp: f64,
}

/// Result of one BOLA step, before any refinement.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BolaPick {
    pub level: usize,
    pub delay: Duration,
    pub reason: DecisionReason,
}

impl BolaPick {
    fn immediate(level: usize, reason: DecisionReason) -> Self {
        Self {
            level,
            delay: Duration::ZERO,
            reason,
        }
    }
}

/// Per-session BOLA state. Owned by exactly one session and mutated only
/// through `&mut self`.
#[derive(Clone, Debug)]
pub struct BolaController {
    ladder: Ladder,
    opts: BolaOptions,
    phase: BolaPhase,
    params: Option<BolaParams>,
    last_level: usize,
    placeholder_secs: f64,
    last_call_at: Option<Instant>,
    last_segment_finished_at: Option<Instant>,
    /// Real buffer level seen by the most recent decision; reference point
    /// for placeholder rescaling on reconfigure.
    last_real_buffer_secs: f64,
}

impl BolaController {
    pub fn new(ladder: Ladder, opts: BolaOptions) -> AbrResult<Self> {
        opts.validate()?;
        let params = compute_params(&ladder, &opts, opts.stable_buffer_secs);
        let phase = if params.is_some() {
            BolaPhase::Startup
        } else {
            BolaPhase::OneBitrate
        };
        debug!(
            levels = ladder.len(),
            ?phase,
            ?params,
            stable_buffer_secs = opts.stable_buffer_secs,
            "BOLA initialized"
        );
        Ok(Self {
            ladder,
            opts,
            phase,
            params,
            last_level: 0,
            placeholder_secs: 0.0,
            last_call_at: None,
            last_segment_finished_at: None,
            last_real_buffer_secs: 0.0,
        })
    }

    pub fn ladder(&self) -> &Ladder {
        &self.ladder
    }

    pub fn options(&self) -> &BolaOptions {
        &self.opts
    }

    pub fn phase(&self) -> BolaPhase {
        self.phase
    }

    pub fn params(&self) -> Option<BolaParams> {
        self.params
    }

    pub fn placeholder_secs(&self) -> f64 {
        self.placeholder_secs
    }

    pub fn last_level(&self) -> usize {
        self.last_level
    }

    /// Record the moment the last requested segment finished downloading.
    pub fn on_segment_downloaded(&mut self, at: Instant) {
        self.last_segment_finished_at = Some(at);
    }

    /// Forget everything tied to the current playback position.
    pub fn clear_on_seek(&mut self) {
        self.placeholder_secs = 0.0;
        self.last_call_at = None;
        self.last_segment_finished_at = None;
        self.last_real_buffer_secs = 0.0;
        if self.phase != BolaPhase::OneBitrate {
            self.phase = BolaPhase::Startup;
        }
    }

    /// Change the stable buffer target mid-session.
    ///
    /// The effective buffer (real + placeholder) is kept fixed at
    /// `min_buffer_secs` and scaled by `Vp_new / Vp_old` elsewhere.
    pub fn reconfigure(&mut self, stable_buffer_secs: f64) {
        if !(stable_buffer_secs.is_finite() && stable_buffer_secs > 0.0) {
            warn!(stable_buffer_secs, "BOLA reconfigure ignored: invalid target");
            return;
        }
        self.opts.stable_buffer_secs = stable_buffer_secs;
        if self.phase == BolaPhase::OneBitrate {
            return;
        }
        let Some(new) = compute_params(&self.ladder, &self.opts, stable_buffer_secs) else {
            return;
        };
        let Some(old) = self.params else {
            self.params = Some(new);
            return;
        };
        if old == new {
            return;
        }

        if self.opts.mode == BolaMode::Placeholder {
            let min = self.opts.min_buffer_secs;
            let real = self.last_real_buffer_secs;
            let effective = min + (real + self.placeholder_secs - min) * new.vp / old.vp;
            self.placeholder_secs = (effective - real).max(0.0);
        }
        self.params = Some(new);
        debug!(
            stable_buffer_secs,
            gp = new.gp,
            vp = new.vp,
            placeholder_secs = self.placeholder_secs,
            "BOLA reconfigured"
        );
    }

    /// Score argmax for a buffer level, ties to the higher level.
    ///
    /// Level 0 when the controller has no parameters.
    pub fn level_for_buffer(&self, buffer_secs: f64) -> usize {
        let Some(p) = self.params else {
            return 0;
        };
        let scores = self
            .ladder
            .utilities()
            .iter()
            .zip(self.ladder.bitrates())
            .enumerate()
            .map(|(level, (&u, &bps))| {
                #[expect(clippy::cast_precision_loss)] // bitrate precision loss is negligible for ABR
                let score = (p.vp * (u + p.gp) - buffer_secs) / bps as f64;
                trace!(level, score, buffer_secs, "BOLA score");
                score
            });
        best_level(scores)
    }

    /// Buffer level above which waiting beats requesting `level`.
    pub fn max_buffer_level(&self, level: usize) -> f64 {
        let (Some(p), Some(&u)) = (self.params, self.ladder.utilities().get(level)) else {
            return 0.0;
        };
        p.vp * (u + p.gp)
    }

    /// Smallest buffer level at which `level` beats every lower, lower-utility level.
    #[expect(clippy::cast_precision_loss)] // bitrate precision loss is negligible for ABR
    pub fn min_buffer_level(&self, level: usize) -> f64 {
        let Some(p) = self.params else {
            return 0.0;
        };
        let utilities = self.ladder.utilities();
        let bitrates = self.ladder.bitrates();
        let (Some(&qu), Some(&qb)) = (utilities.get(level), bitrates.get(level)) else {
            return 0.0;
        };
        let qb = qb as f64;

        (0..level)
            .filter(|&j| utilities[j] < qu)
            .map(|j| {
                let jb = bitrates[j] as f64;
                p.vp * (p.gp + (qb * utilities[j] - jb * qu) / (qb - jb))
            })
            .fold(0.0, f64::max)
    }

    pub fn decide(
        &mut self,
        buffer: &BufferSnapshot,
        estimate_bps: Option<u64>,
        now: Instant,
    ) -> BolaPick {
        let real = buffer.level_secs();
        self.last_real_buffer_secs = real;
        let tput_level = self.ladder.level_for_throughput(estimate_bps);

        if self.phase == BolaPhase::OneBitrate {
            return BolaPick::immediate(0, DecisionReason::OneBitrate);
        }
        if self.params.is_none() {
            return self.recover(tput_level);
        }

        let pick = match self.opts.mode {
            BolaMode::Placeholder => self.decide_placeholder(buffer, real, tput_level, now),
            BolaMode::Basic => self.decide_basic(buffer, real, estimate_bps),
        };
        debug!(
            phase = ?self.phase,
            level = pick.level,
            tput_level,
            buffer_secs = real,
            placeholder_secs = self.placeholder_secs,
            delay_secs = pick.delay.as_secs_f64(),
            reason = ?pick.reason,
            "BOLA decide"
        );
        pick
    }

    fn decide_placeholder(
        &mut self,
        buffer: &BufferSnapshot,
        real: f64,
        tput_level: usize,
        now: Instant,
    ) -> BolaPick {
        if self.phase == BolaPhase::Startup {
            let level = tput_level;
            self.placeholder_secs = (self.min_buffer_level(level) - real).max(0.0);
            self.last_level = level;
            if real >= buffer.segment_secs() {
                self.phase = BolaPhase::Steady;
            }
            return BolaPick::immediate(level, DecisionReason::Startup);
        }

        self.advance_placeholder(now);
        let mut level = self.level_for_buffer(real + self.placeholder_secs);
        let mut reason = DecisionReason::Steady;

        if level > self.last_level && level > tput_level {
            level = tput_level.max(self.last_level);
            reason = DecisionReason::OscillationGuard;
        }

        let mut delay = (real + self.placeholder_secs - self.max_buffer_level(level)).max(0.0);
        if delay <= self.placeholder_secs {
            self.placeholder_secs -= delay;
            delay = 0.0;
        } else {
            delay -= self.placeholder_secs;
            self.placeholder_secs = 0.0;
            // At or above the throughput level the scheduler fills the buffer itself.
            if level >= tput_level {
                delay = 0.0;
            }
        }

        self.last_level = level;
        BolaPick {
            level,
            delay: secs_to_duration(delay),
            reason,
        }
    }

    fn decide_basic(
        &mut self,
        buffer: &BufferSnapshot,
        real: f64,
        estimate_bps: Option<u64>,
    ) -> BolaPick {
        if real < 2.0 * buffer.segment_secs() {
            self.phase = BolaPhase::Startup;
            let level = self.ladder.level_for_throughput(estimate_bps);
            self.last_level = level;
            return BolaPick::immediate(level, DecisionReason::Startup);
        }
        self.phase = BolaPhase::Steady;

        let mut level = self.level_for_buffer(real);
        let mut reason = DecisionReason::Steady;
        if level > self.last_level {
            let floor = self.ladder.bitrates()[0];
            let capacity = self
                .ladder
                .level_for_throughput(Some(estimate_bps.map_or(floor, |e| e.max(floor))));
            let snapped = if capacity >= level {
                level
            } else if capacity < self.last_level {
                self.last_level
            } else {
                capacity + 1
            };
            if snapped != level {
                level = snapped;
                reason = DecisionReason::OscillationGuard;
            }
        }

        let delay = (real - self.max_buffer_level(level)).max(0.0);
        self.last_level = level;
        BolaPick {
            level,
            delay: secs_to_duration(delay),
            reason,
        }
    }

    /// Add wall-clock time not spent downloading to the placeholder.
    fn advance_placeholder(&mut self, now: Instant) {
        let since = self.last_segment_finished_at.or(self.last_call_at);
        if let Some(t) = since {
            self.placeholder_secs += now.saturating_duration_since(t).as_secs_f64();
        }
        self.last_call_at = Some(now);
        self.last_segment_finished_at = None;
    }

    fn recover(&mut self, tput_level: usize) -> BolaPick {
        warn!(
            phase = ?self.phase,
            tput_level,
            "BOLA invoked in invalid state, resetting to startup"
        );
        let real = self.last_real_buffer_secs;
        self.clear_on_seek();
        self.last_real_buffer_secs = real;
        self.phase = BolaPhase::Startup;
        self.params = compute_params(&self.ladder, &self.opts, self.opts.stable_buffer_secs);
        if self.params.is_none() {
            self.phase = BolaPhase::OneBitrate;
        }
        self.last_level = tput_level;
        BolaPick::immediate(tput_level, DecisionReason::InvalidStateRecovered)
    }
}

/// `None` when the highest-utility level is level 0.
fn compute_params(ladder: &Ladder, opts: &BolaOptions, stable_buffer_secs: f64) -> Option<BolaParams> {
    let top = ladder.top();
    if top == 0 {
        return None;
    }
    #[expect(clippy::cast_precision_loss)] // ladder sizes are tiny
    let floor = opts.min_buffer_secs + opts.per_level_buffer_secs * ladder.len() as f64;
    let timeline = stable_buffer_secs.max(floor);
    let gp = (ladder.utilities()[top] - 1.0) / (timeline / opts.min_buffer_secs - 1.0);
    let vp = opts.min_buffer_secs / gp;
    Some(BolaParams { gp, vp })
}

/// Ascending scan replacing on `>=`: exact ties go to the higher index.
fn best_level(scores: impl Iterator<Item = f64>) -> usize {
    let mut best: Option<(usize, f64)> = None;
    for (i, s) in scores.enumerate() {
        if best.is_none_or(|(_, b)| s >= b) {
            best = Some((i, s));
        }
    }
    best.map_or(0, |(i, _)| i)
}

fn secs_to_duration(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or_default()
}
