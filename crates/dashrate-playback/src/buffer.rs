//! Simulated playback buffer.
//!
//! The download loop pushes segments in; a spawned clock task plays the head
//! segment for one nominal segment duration and pops it while the state is
//! `Playing`. State changes are published on a `watch` channel and as
//! [`PlaybackEvent`]s; producers blocked on a full buffer are woken through a
//! `Notify`.
//!
//! Lifecycle:
//!
//! ```text
//! Initialized -> InitialBuffering -> Playing <-> Buffering
//!                                      |  ^
//!                                      v  |
//!                                     Paused
//! any -> Stopped (stop / cancel), Playing -> Ended (finish + drained)
//! ```

use std::{collections::VecDeque, sync::Arc, time::Duration};

use dashrate_abr::{BufferSnapshot, FamilyId, PlaybackState};
use dashrate_events::{EventBus, PlaybackEvent};
use derivative::Derivative;
use derive_setters::Setters;
use parking_lot::Mutex;
use tokio::{
    sync::{Notify, watch},
    time::{Instant, sleep_until},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::{PlaybackError, PlaybackResult};

/// Buffer geometry and start/resume thresholds.
#[derive(Clone, Debug, Derivative, Setters, PartialEq, Eq)]
#[derivative(Default)]
#[setters(prefix = "with_", strip_option)]
pub struct BufferConfig {
    /// Nominal playback duration of one segment. Default: 4 s.
    #[derivative(Default(value = "Duration::from_secs(4)"))]
    pub segment_duration: Duration,
    /// Capacity in segments. Default: unbounded.
    pub max_segments: Option<usize>,
    /// Buffered segments required before playback starts. Default: 1.
    #[derivative(Default(value = "1"))]
    pub initial_segments: usize,
    /// Buffered segments required to resume after a stall. Default: 1.
    #[derivative(Default(value = "1"))]
    pub rebuffer_segments: usize,
}

impl BufferConfig {
    pub fn validate(&self) -> PlaybackResult<()> {
        if self.segment_duration.is_zero() {
            return Err(PlaybackError::InvalidConfig(
                "segment_duration must be positive".into(),
            ));
        }
        if self.initial_segments == 0 || self.rebuffer_segments == 0 {
            return Err(PlaybackError::InvalidConfig(
                "start and resume thresholds must be at least one segment".into(),
            ));
        }
        match self.max_segments {
            Some(max) if max < self.initial_segments.max(self.rebuffer_segments) => {
                Err(PlaybackError::InvalidConfig(format!(
                    "max_segments {max} is below the start or resume threshold"
                )))
            }
            _ => Ok(()),
        }
    }
}

/// A downloaded segment waiting to be played.
#[derive(Clone, Debug, PartialEq)]
pub struct BufferedSegment {
    pub segment: usize,
    pub family: Option<FamilyId>,
    pub bitrate: u64,
    pub bytes: u64,
}

/// Playback-side QoE counters.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BufferStats {
    /// Mid-stream stalls (initial buffering excluded).
    pub interruptions: usize,
    /// Total time spent in finished stalls.
    pub interruption_time: Duration,
    /// Time from buffer creation until playback started.
    pub initial_buffering: Option<Duration>,
}

/// Handle to the simulated player buffer.
///
/// Dropping the handle stops the clock task.
#[derive(Debug)]
pub struct PlaybackBuffer {
    shared: Arc<Shared>,
}

impl PlaybackBuffer {
    /// Validate `config` and start the playback clock on the current runtime.
    ///
    /// The clock is stopped when `cancel` (or the returned handle) goes away.
    pub fn spawn(
        config: BufferConfig,
        bus: EventBus,
        cancel: &CancellationToken,
    ) -> PlaybackResult<Self> {
        config.validate()?;
        let (state_tx, _) = watch::channel(PlaybackState::Initialized);
        let shared = Arc::new(Shared {
            config,
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                finished: false,
                stats: BufferStats::default(),
                created_at: Instant::now(),
                stalled_at: None,
            }),
            state_tx,
            slot: Notify::new(),
            bus,
            cancel: cancel.child_token(),
        });
        tokio::spawn(run_clock(Arc::clone(&shared)));
        Ok(Self { shared })
    }

    pub fn config(&self) -> &BufferConfig {
        &self.shared.config
    }

    pub fn state(&self) -> PlaybackState {
        self.shared.state()
    }

    pub fn occupancy(&self) -> usize {
        self.shared.inner.lock().queue.len()
    }

    pub fn stats(&self) -> BufferStats {
        self.shared.inner.lock().stats
    }

    /// Consistent view of occupancy and state for one decision.
    pub fn snapshot(&self) -> BufferSnapshot {
        let inner = self.shared.inner.lock();
        BufferSnapshot {
            occupancy: inner.queue.len(),
            state: self.shared.state(),
            segment_duration: self.shared.config.segment_duration,
            max_segments: self.shared.config.max_segments,
        }
    }

    /// Wait until the buffer has room for one more segment.
    ///
    /// Fails with [`PlaybackError::Cancelled`] once the buffer is terminal.
    pub async fn wait_for_slot(&self) -> PlaybackResult<()> {
        loop {
            let notified = self.shared.slot.notified();
            if self.shared.cancel.is_cancelled() || self.state().is_terminal() {
                return Err(PlaybackError::Cancelled);
            }
            let Some(max) = self.shared.config.max_segments else {
                return Ok(());
            };
            if self.occupancy() < max {
                return Ok(());
            }
            tokio::select! {
                () = self.shared.cancel.cancelled() => return Err(PlaybackError::Cancelled),
                () = notified => { /* loop */ }
            }
        }
    }

    /// Append a downloaded segment, waiting for a free slot first.
    ///
    /// Only one producer is expected; the slot found by the wait is not reserved.
    pub async fn push(&self, segment: BufferedSegment) -> PlaybackResult<()> {
        self.wait_for_slot().await?;

        let mut inner = self.shared.inner.lock();
        if self.shared.state().is_terminal() {
            return Err(PlaybackError::Cancelled);
        }
        trace!(
            segment = segment.segment,
            bitrate = segment.bitrate,
            occupancy = inner.queue.len() + 1,
            "segment buffered"
        );
        inner.queue.push_back(segment);
        if self.shared.state() == PlaybackState::Initialized {
            self.shared.set_state(PlaybackState::InitialBuffering);
        }
        self.shared.try_start(&mut inner);
        Ok(())
    }

    /// No more segments will be pushed: play out what is left, then `Ended`.
    pub fn finish(&self) {
        let mut inner = self.shared.inner.lock();
        inner.finished = true;
        if self.shared.state().is_terminal() {
            return;
        }
        if inner.queue.is_empty() {
            self.shared.set_state(PlaybackState::Ended);
        } else {
            self.shared.try_start(&mut inner);
        }
    }

    /// Abort playback.
    pub fn stop(&self) {
        self.shared.stop();
    }

    /// Returns `false` unless the buffer was `Playing`.
    pub fn pause(&self) -> bool {
        let _inner = self.shared.inner.lock();
        if self.shared.state() != PlaybackState::Playing {
            return false;
        }
        self.shared.set_state(PlaybackState::Paused);
        true
    }

    /// Returns `false` unless the buffer was `Paused`.
    pub fn resume(&self) -> bool {
        let mut inner = self.shared.inner.lock();
        if self.shared.state() != PlaybackState::Paused {
            return false;
        }
        self.shared.set_state(PlaybackState::Playing);
        if inner.queue.is_empty() {
            self.shared.settle_empty(&mut inner);
        }
        true
    }

    /// Wait for `Ended` or `Stopped`.
    pub async fn wait_terminal(&self) -> PlaybackResult<PlaybackState> {
        let mut state_rx = self.shared.state_tx.subscribe();
        let state = *state_rx
            .wait_for(|s| s.is_terminal())
            .await
            .map_err(|_| PlaybackError::ChannelClosed)?;
        Ok(state)
    }
}

impl Drop for PlaybackBuffer {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}

#[derive(Debug)]
struct Shared {
    config: BufferConfig,
    inner: Mutex<Inner>,
    state_tx: watch::Sender<PlaybackState>,
    /// Woken whenever a slot frees up or the state changes.
    slot: Notify,
    bus: EventBus,
    cancel: CancellationToken,
}

#[derive(Debug)]
struct Inner {
    queue: VecDeque<BufferedSegment>,
    finished: bool,
    stats: BufferStats,
    created_at: Instant,
    stalled_at: Option<Instant>,
}

impl Shared {
    fn state(&self) -> PlaybackState {
        *self.state_tx.borrow()
    }

    /// Callers hold the `inner` lock so check-then-set stays atomic.
    fn set_state(&self, to: PlaybackState) {
        let from = self.state();
        if from == to {
            return;
        }
        self.state_tx.send_replace(to);
        debug!(?from, ?to, "playback state changed");
        self.bus.publish(PlaybackEvent::StateChanged { from, to });
        if to == PlaybackState::Ended {
            self.bus.publish(PlaybackEvent::Ended);
        }
        self.slot.notify_waiters();
    }

    /// Leave `InitialBuffering`/`Buffering` once enough is buffered.
    fn try_start(&self, inner: &mut Inner) {
        let occupancy = inner.queue.len();
        if occupancy == 0 {
            return;
        }
        let ready_initial = inner.finished || occupancy >= self.config.initial_segments;
        let ready_resume = inner.finished || occupancy >= self.config.rebuffer_segments;

        match self.state() {
            PlaybackState::InitialBuffering if ready_initial => {
                let waited = inner.created_at.elapsed();
                inner.stats.initial_buffering = Some(waited);
                debug!(
                    waited_secs = waited.as_secs_f64(),
                    occupancy, "playback started"
                );
                self.set_state(PlaybackState::Playing);
            }
            PlaybackState::Buffering if ready_resume => {
                if let Some(since) = inner.stalled_at.take() {
                    let duration = since.elapsed();
                    inner.stats.interruption_time += duration;
                    debug!(
                        stalled_secs = duration.as_secs_f64(),
                        occupancy, "playback resumed"
                    );
                    self.bus.publish(PlaybackEvent::Interruption { duration });
                }
                self.set_state(PlaybackState::Playing);
            }
            _ => {}
        }
    }

    /// The queue ran dry while `Playing`.
    fn settle_empty(&self, inner: &mut Inner) {
        if inner.finished {
            self.set_state(PlaybackState::Ended);
        } else if self.state() == PlaybackState::Playing {
            inner.stats.interruptions += 1;
            inner.stalled_at = Some(Instant::now());
            self.set_state(PlaybackState::Buffering);
        }
    }

    fn has_segments(&self) -> bool {
        !self.inner.lock().queue.is_empty()
    }

    fn pop_played(&self) {
        let mut inner = self.inner.lock();
        if let Some(played) = inner.queue.pop_front() {
            trace!(
                segment = played.segment,
                occupancy = inner.queue.len(),
                "segment played"
            );
        }
        if inner.queue.is_empty() {
            self.settle_empty(&mut inner);
        }
        drop(inner);
        self.slot.notify_waiters();
    }

    fn drained(&self) {
        let mut inner = self.inner.lock();
        if inner.queue.is_empty() {
            self.settle_empty(&mut inner);
        }
    }

    fn stop(&self) {
        let _inner = self.inner.lock();
        if !self.state().is_terminal() {
            self.set_state(PlaybackState::Stopped);
        }
        self.slot.notify_waiters();
    }
}

/// Plays the head segment for one segment duration per iteration while
/// `Playing`. Pausing keeps the unplayed remainder of the head segment.
async fn run_clock(shared: Arc<Shared>) {
    let mut state_rx = shared.state_tx.subscribe();
    let mut remaining: Option<Duration> = None;
    trace!("playback clock started");

    loop {
        let state = *state_rx.borrow_and_update();
        if state.is_terminal() {
            break;
        }

        if state == PlaybackState::Playing {
            if !shared.has_segments() {
                shared.drained();
                continue;
            }
            let deadline =
                Instant::now() + remaining.take().unwrap_or(shared.config.segment_duration);
            tokio::select! {
                biased;
                () = shared.cancel.cancelled() => {
                    shared.stop();
                    break;
                }
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    remaining = Some(deadline.saturating_duration_since(Instant::now()));
                }
                () = sleep_until(deadline) => shared.pop_played(),
            }
        } else {
            tokio::select! {
                biased;
                () = shared.cancel.cancelled() => {
                    shared.stop();
                    break;
                }
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
    }

    trace!("playback clock stopped");
}
