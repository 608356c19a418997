//! Per-segment decision loop.
//!
//! One [`Session`] owns an [`AbrEngine`], a [`PlaybackBuffer`] and a
//! [`SegmentFetcher`]. Commands from a [`SessionHandle`] are drained between
//! segments, so a seek or reconfiguration never lands in the middle of a
//! decision.

use dashrate_abr::{AbrEngine, Decision, Estimator, ThroughputEstimator, ThroughputSample};
use dashrate_events::{AbrEvent, EventBus, PlaybackEvent};
use derivative::Derivative;
use derive_setters::Setters;
use tokio::{sync::mpsc, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    BufferConfig, BufferedSegment, FetchError, PlaybackBuffer, PlaybackError, PlaybackResult,
    SegmentFetcher, SegmentRecord, SegmentRequest, SessionStats,
};

/// Session configuration.
#[derive(Clone, Debug, Derivative, Setters)]
#[derivative(Default)]
#[setters(prefix = "with_", strip_option)]
pub struct SessionConfig {
    /// Number of segments in the presentation. Must be set.
    pub segment_count: usize,
    /// First segment to download. Default: 0.
    pub start_segment: usize,
    pub buffer: BufferConfig,
    /// Pending command capacity. Default: 16.
    #[derivative(Default(value = "16"))]
    pub command_capacity: usize,
    /// Bus for decision and playback events. When `None`, a private bus is created.
    pub bus: Option<EventBus>,
}

impl SessionConfig {
    pub fn validate(&self) -> PlaybackResult<()> {
        if self.segment_count == 0 {
            return Err(PlaybackError::InvalidConfig(
                "segment_count must be positive".into(),
            ));
        }
        if self.command_capacity == 0 {
            return Err(PlaybackError::InvalidConfig(
                "command_capacity must be positive".into(),
            ));
        }
        self.buffer.validate()
    }
}

/// Control messages handled between two decisions.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionCommand {
    /// Continue downloading from `segment`; controller state is cleared.
    Seek { segment: usize },
    /// Change the stable buffer target.
    Reconfigure { stable_buffer_secs: f64 },
    /// Stop downloading and playback.
    Stop,
}

/// Cloneable control handle for a running [`Session`].
#[derive(Clone, Debug)]
pub struct SessionHandle {
    cmd_tx: mpsc::Sender<SessionCommand>,
    cancel: CancellationToken,
    bus: EventBus,
}

impl SessionHandle {
    pub async fn send(&self, cmd: SessionCommand) -> PlaybackResult<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| PlaybackError::ChannelClosed)
    }

    pub async fn seek(&self, segment: usize) -> PlaybackResult<()> {
        self.send(SessionCommand::Seek { segment }).await
    }

    pub async fn reconfigure(&self, stable_buffer_secs: f64) -> PlaybackResult<()> {
        self.send(SessionCommand::Reconfigure { stable_buffer_secs })
            .await
    }

    pub async fn stop(&self) -> PlaybackResult<()> {
        self.send(SessionCommand::Stop).await
    }

    /// Abort immediately; `run` returns [`PlaybackError::Cancelled`].
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }
}

enum Flow {
    Continue,
    Stop,
}

/// Drives one playback: decide, pace, fetch, buffer, repeat.
pub struct Session<F, E = ThroughputEstimator>
where
    F: SegmentFetcher,
    E: Estimator,
{
    config: SessionConfig,
    engine: AbrEngine<E>,
    fetcher: F,
    bus: EventBus,
    cancel: CancellationToken,
    cmd_rx: mpsc::Receiver<SessionCommand>,
    stats: SessionStats,
}

impl<F, E> Session<F, E>
where
    F: SegmentFetcher,
    E: Estimator,
{
    pub fn new(
        config: SessionConfig,
        engine: AbrEngine<E>,
        fetcher: F,
    ) -> PlaybackResult<(Self, SessionHandle)> {
        config.validate()?;
        let (cmd_tx, cmd_rx) = mpsc::channel(config.command_capacity);
        let bus = config.bus.clone().unwrap_or_default();
        let cancel = CancellationToken::new();
        let handle = SessionHandle {
            cmd_tx,
            cancel: cancel.clone(),
            bus: bus.clone(),
        };
        let session = Self {
            config,
            engine,
            fetcher,
            bus,
            cancel,
            cmd_rx,
            stats: SessionStats::default(),
        };
        Ok((session, handle))
    }

    pub fn engine(&self) -> &AbrEngine<E> {
        &self.engine
    }

    /// Run to the end of the presentation (or until stopped) and return QoE stats.
    ///
    /// Must be called inside a tokio runtime; the playback clock is spawned here.
    pub async fn run(mut self) -> PlaybackResult<SessionStats> {
        let buffer = PlaybackBuffer::spawn(self.config.buffer.clone(), self.bus.clone(), &self.cancel)?;
        let mut segment = self.config.start_segment;
        info!(
            segment_count = self.config.segment_count,
            start_segment = segment,
            baseline = %self.engine.baseline(),
            "session started"
        );

        while segment < self.config.segment_count {
            if let Flow::Stop = self.drain_pending_commands(&mut segment) {
                buffer.stop();
                self.stats.apply_buffer(&buffer.stats());
                info!(segment, "session stopped");
                return Ok(self.stats);
            }
            if segment >= self.config.segment_count {
                break;
            }

            let snapshot = buffer.snapshot();
            let decision = self.engine.decide(segment, &snapshot, Instant::now().into_std());
            self.stats.segments_decided += 1;
            self.publish_decision(segment, &decision);

            if !decision.delay.is_zero() {
                debug!(
                    segment,
                    delay_secs = decision.delay.as_secs_f64(),
                    "pacing next request"
                );
                tokio::select! {
                    biased;
                    () = self.cancel.cancelled() => return Err(PlaybackError::Cancelled),
                    () = tokio::time::sleep(decision.delay) => {}
                }
            }
            buffer.wait_for_slot().await?;

            let request = SegmentRequest {
                segment,
                family: decision.family,
                level: decision.level,
                bitrate: decision.bitrate,
            };
            let fetched = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Err(PlaybackError::Cancelled),
                result = self.fetcher.fetch(&request) => result,
            };
            let fetched = match fetched {
                Ok(fetched) => fetched,
                Err(FetchError::Cancelled) => return Err(PlaybackError::Cancelled),
                Err(FetchError::Failed(error)) => {
                    warn!(segment, %error, "segment fetch failed, skipping");
                    self.stats.fetch_failures += 1;
                    self.bus
                        .publish(PlaybackEvent::FetchFailed { segment, error });
                    segment += 1;
                    continue;
                }
            };

            let done_at = Instant::now().into_std();
            self.engine.push_throughput_sample(ThroughputSample::network(
                fetched.bytes,
                fetched.elapsed,
                done_at,
            ));
            self.engine.on_segment_downloaded(done_at, decision.quality);

            buffer
                .push(BufferedSegment {
                    segment,
                    family: decision.family,
                    bitrate: decision.bitrate,
                    bytes: fetched.bytes,
                })
                .await?;
            self.stats.record(SegmentRecord {
                segment,
                family: decision.family.map(|f| f.get()),
                level: decision.level,
                bitrate: decision.bitrate,
                quality: decision.quality,
                bytes: fetched.bytes,
                download_secs: fetched.elapsed.as_secs_f64(),
            });
            self.bus.publish(PlaybackEvent::SegmentDownloaded {
                segment,
                bytes: fetched.bytes,
                duration: fetched.elapsed,
            });
            segment += 1;
        }

        buffer.finish();
        let end = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Err(PlaybackError::Cancelled),
            end = buffer.wait_terminal() => end?,
        };
        self.stats.apply_buffer(&buffer.stats());
        info!(
            ?end,
            downloaded = self.stats.segments_downloaded,
            up_shifts = self.stats.up_shifts,
            down_shifts = self.stats.down_shifts,
            interruptions = self.stats.interruptions,
            "session finished"
        );
        Ok(self.stats)
    }

    /// Apply every queued command. Returns `Flow::Stop` on `Stop`.
    fn drain_pending_commands(&mut self, segment: &mut usize) -> Flow {
        while let Ok(cmd) = self.cmd_rx.try_recv() {
            debug!(?cmd, segment = *segment, "session command");
            match cmd {
                SessionCommand::Seek { segment: to } => {
                    self.engine.clear_on_seek();
                    *segment = to;
                    self.bus.publish(AbrEvent::Seek { segment: to });
                }
                SessionCommand::Reconfigure { stable_buffer_secs } => {
                    self.engine.reconfigure(stable_buffer_secs);
                    self.bus
                        .publish(AbrEvent::Reconfigured { stable_buffer_secs });
                }
                SessionCommand::Stop => return Flow::Stop,
            }
        }
        Flow::Continue
    }

    fn publish_decision(&self, segment: usize, decision: &Decision) {
        self.bus.publish(AbrEvent::Decision {
            segment,
            family: decision.family,
            level: decision.level,
            bitrate: decision.bitrate,
            quality: decision.quality,
            reason: decision.reason,
        });
    }
}
